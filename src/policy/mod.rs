//! Policy documents: loading, validation and derivation
//!
//! Every document goes through the same steps: it is read (or taken as an already
//! parsed YAML value), walked against its schema, checked for cross-field
//! constraints and finally deserialized into typed structs. Cross-field checks run
//! on the normalized document even when the schema walk failed, so every violation
//! of a document is reported at once.

pub mod asns;
pub mod bogons;
pub mod clients;
pub mod general;
pub mod roas;
pub mod schema;

pub use asns::{AsnInfo, AsnsConfig};
pub use bogons::{Bogon, BogonsConfig};
pub use clients::{Client, ClientsConfig};
pub use general::{
    BlackholePolicy, Community, CommunityDirection, GeneralConfig, MaxPrefixAction,
    TransitFreeAction,
};
pub use roas::{Roa, RoasConfig};

use crate::errors::{BuildError, FieldError};
use ipnet::IpNet;
use schema::{Field, Validator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::debug;

/// Source of a policy document
#[derive(Debug, Clone)]
pub enum Input {
    /// YAML file on disk
    Path(PathBuf),
    /// Document already parsed by the caller
    Document(Value),
}

impl From<PathBuf> for Input {
    fn from(path: PathBuf) -> Self {
        Input::Path(path)
    }
}

impl From<&str> for Input {
    fn from(path: &str) -> Self {
        Input::Path(PathBuf::from(path))
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Document(value)
    }
}

impl Input {
    pub(crate) fn check_exists(&self) -> Result<(), BuildError> {
        match self {
            Input::Path(path) if !path.is_file() => Err(BuildError::MissingFile(path.clone())),
            _ => Ok(()),
        }
    }

    fn read(&self, document: &'static str) -> Result<Value, BuildError> {
        match self {
            Input::Document(value) => Ok(value.clone()),
            Input::Path(path) => {
                self.check_exists()?;
                debug!("loading {} configuration from {}", document, path.display());
                let text = std::fs::read_to_string(path)?;
                serde_yaml_ng::from_str(&text).map_err(|e| {
                    BuildError::validation(
                        document,
                        vec![FieldError::new("", format!("invalid YAML: {}", e))],
                    )
                })
            }
        }
    }
}

/// Constraints spanning several fields, run on the normalized document
type CrossCheck = fn(&Value) -> Vec<FieldError>;

fn no_cross_checks(_: &Value) -> Vec<FieldError> {
    vec![]
}

/// Read, validate and deserialize one document
///
/// Schema and cross-field errors are reported together. A field the schema walk
/// rejected is not reported a second time by a cross-field check.
fn load_document<T: DeserializeOwned>(
    document: &'static str,
    input: &Input,
    fields: &[Field],
    parent: Option<&Value>,
    cross_check: CrossCheck,
) -> Result<T, BuildError> {
    let raw = input.read(document)?;
    let mut validator = Validator::new(parent);
    let normalized = validator.section(fields, &raw, "");
    let mut errors = validator.into_errors();
    let cross: Vec<FieldError> = cross_check(&normalized)
        .into_iter()
        .filter(|e| !errors.iter().any(|s| s.path == e.path))
        .collect();
    errors.extend(cross);
    if !errors.is_empty() {
        return Err(BuildError::validation(document, errors));
    }
    serde_yaml_ng::from_value(normalized)
        .map_err(|e| BuildError::validation(document, vec![FieldError::new("", e.to_string())]))
}

pub fn load_general(input: &Input) -> Result<GeneralConfig, BuildError> {
    let doc: general::GeneralDocument =
        load_document("general", input, general::DOCUMENT, None, general::check)?;
    Ok(doc.cfg)
}

pub fn load_bogons(input: &Input) -> Result<BogonsConfig, BuildError> {
    load_document("bogons", input, bogons::DOCUMENT, None, bogons::check)
}

pub fn load_asns(input: &Input) -> Result<AsnsConfig, BuildError> {
    load_document("asns", input, asns::DOCUMENT, None, no_cross_checks)
}

/// Load the clients; options they leave unset are taken from `general`
pub fn load_clients(input: &Input, general: &GeneralConfig) -> Result<ClientsConfig, BuildError> {
    let parent = serde_yaml_ng::to_value(general)
        .map_err(|e| BuildError::validation("clients", vec![FieldError::new("", e.to_string())]))?;
    load_document(
        "clients",
        input,
        clients::DOCUMENT,
        Some(&parent),
        clients::check,
    )
}

pub fn load_roas(input: &Input) -> Result<RoasConfig, BuildError> {
    load_document("roas", input, roas::DOCUMENT, None, roas::check)
}

/// Items of a normalized list; empty when the list itself was invalid
pub(crate) fn items(value: &Value) -> &[Value] {
    value.as_sequence().map(Vec::as_slice).unwrap_or_default()
}

pub(crate) fn ip_at(value: &Value) -> Option<IpAddr> {
    value.as_str()?.parse().ok()
}

/// `prefix/length` must fit the address family and have no host bits set
pub(crate) fn check_prefix(prefix: IpAddr, length: u8) -> Result<IpNet, String> {
    let net = IpNet::new(prefix, length)
        .map_err(|_| format!("invalid prefix length {} for {}", length, prefix))?;
    if net.network() != prefix {
        return Err(format!("{}/{} has host bits set", prefix, length));
    }
    Ok(net)
}

/// AS-SET names, optionally prefixed by a source (`RIPE::AS-FOO`)
///
/// Names are passed to bgpq3 as arguments, so they must start with a letter or digit.
pub(crate) fn check_as_set_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    let valid = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'));
    if valid {
        Ok(name.to_string())
    } else {
        Err(format!("invalid AS-SET name '{}'", name))
    }
}

/// Address family of a build or of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(ip: &IpAddr) -> Self {
        if ip.is_ipv4() {
            IpVersion::V4
        } else {
            IpVersion::V6
        }
    }

    pub fn number(self) -> u8 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

impl TryFrom<u8> for IpVersion {
    type Error = BuildError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(BuildError::InvalidArgument(format!(
                "invalid IP version: {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for IpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A route entry resolved from an AS-SET
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrrPrefix {
    pub prefix: IpAddr,
    pub length: u8,
    pub min_length: u8,
    pub max_length: u8,
}

/// An AS-SET (or a single ASN) with its resolved origins and routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrrSet {
    pub name: String,
    pub asns: Vec<u32>,
    pub prefixes: Vec<IrrPrefix>,
}

impl IrrSet {
    /// Template-safe identifier, `AS_SET_` followed by the name with every
    /// character other than letters and digits replaced by `_`
    pub fn id_for(name: &str) -> String {
        let sanitized: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("AS_SET_{}", sanitized)
    }
}

/// The validated, derived and (after enrichment) enriched configuration
#[derive(Debug, Clone, Serialize)]
pub struct ConfigTree {
    pub general: GeneralConfig,
    pub bogons: BogonsConfig,
    pub asns: AsnsConfig,
    pub clients: ClientsConfig,
    pub roas: Option<RoasConfig>,
    /// Keyed by [`IrrSet::id_for`]; filled by enrichment
    pub as_sets: BTreeMap<String, IrrSet>,
}

impl ConfigTree {
    /// Assemble the tree, assigning client ids and the built-in community attributes
    pub fn derive(
        mut general: GeneralConfig,
        bogons: BogonsConfig,
        asns: AsnsConfig,
        mut clients: ClientsConfig,
        roas: Option<RoasConfig>,
    ) -> Self {
        general.apply_community_schema();
        clients.assign_ids();
        ConfigTree {
            general,
            bogons,
            asns,
            clients,
            roas,
            as_sets: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_check_prefix() {
        assert!(check_prefix("10.0.0.0".parse().unwrap(), 8).is_ok());
        assert!(check_prefix("10.0.0.1".parse().unwrap(), 8).is_err());
        assert!(check_prefix("10.0.0.0".parse().unwrap(), 33).is_err());
        assert!(check_prefix("2001:db8::".parse().unwrap(), 32).is_ok());
    }

    #[test]
    fn test_as_set_names() {
        assert_eq!(check_as_set_name(" AS-FOO ").unwrap(), "AS-FOO");
        assert!(check_as_set_name("RIPE::AS-FOO").is_ok());
        assert!(check_as_set_name("AS FOO").is_err());
        assert!(check_as_set_name("").is_err());
        // would be read by bgpq3 as its -h option
        assert!(check_as_set_name("-hevil.example").is_err());
        assert!(check_as_set_name(" -S RADB").is_err());
        assert!(check_as_set_name("::AS-FOO").is_err());
        assert_eq!(IrrSet::id_for("RIPE::AS-FOO"), "AS_SET_RIPE__AS_FOO");
    }

    #[test]
    fn test_input_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bogons:\n  - {{prefix: 0.0.0.0, length: 8}}").unwrap();
        let cfg = load_bogons(&Input::Path(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.bogons.len(), 1);

        let missing = Input::from("/nonexistent/bogons.yml");
        assert!(matches!(
            load_bogons(&missing),
            Err(BuildError::MissingFile(_))
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bogons: [").unwrap();
        let err = load_bogons(&Input::Path(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("invalid YAML"));
    }

    fn paths(err: BuildError) -> Vec<String> {
        match err {
            BuildError::Validation { errors, .. } => errors.into_iter().map(|e| e.path).collect(),
            other => panic!("unexpected error {other}"),
        }
    }

    fn document(yaml: &str) -> Input {
        Input::Document(serde_yaml_ng::from_str(yaml).unwrap())
    }

    #[test]
    fn test_schema_and_cross_field_errors_together() {
        let err = load_general(&document(
            r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  gtsm: maybe
  blackhole_filtering: {policy_ipv6: rewrite-next-hop}
"#,
        ))
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("cfg.gtsm: expected a boolean"));
        assert!(text.contains("cfg.blackhole_filtering.rewrite_next_hop_ipv6: required"));

        let general = load_general(&document("cfg: {rs_as: 999, router_id: 192.0.2.2}")).unwrap();
        let err = load_clients(
            &document(
                r#"
clients:
  - {asn: 65501, ip: 192.0.2.1}
  - {asn: 65502, ip: 192.0.2.1}
  - {asn: 65503, ip: 192.0.2.3, cfg: {gtsm: maybe}}
"#,
            ),
            &general,
        )
        .unwrap_err();
        assert_eq!(paths(err), vec!["clients[2].cfg.gtsm", "clients[1].ip"]);
    }

    #[test]
    fn test_rejected_field_is_reported_once() {
        let err = load_general(&document(
            r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  blackhole_filtering:
    policy_ipv4: rewrite-next-hop
    rewrite_next_hop_ipv4: "2001:db8::1"
"#,
        ))
        .unwrap_err();
        assert_eq!(paths(err), vec!["cfg.blackhole_filtering.rewrite_next_hop_ipv4"]);

        // an invalid length leaves the prefix unchecked
        let err = load_bogons(&document(
            "bogons:\n  - {prefix: 10.0.0.0, length: 200}\n  - {prefix: 10.0.0.1, length: 8}",
        ))
        .unwrap_err();
        assert_eq!(paths(err), vec!["bogons[0].length", "bogons[1]"]);
    }
}
