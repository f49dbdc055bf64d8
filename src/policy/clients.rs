//! Route server clients (`clients.yml`)
//!
//! Options a client does not set are inherited from the general configuration
//! while the document is validated, so a loaded [`Client`] always carries the
//! effective value of every option.

use super::{check_as_set_name, ip_at, items};
use super::general::{MaxPrefixAction, NextHopPolicy, PrefixLenRange, MAX_PREFIX_ACTIONS};
use super::schema::{Fallback, Field, Kind};
use crate::errors::FieldError;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientsConfig {
    pub clients: Vec<Client>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// `AS<asn>_<n>`, assigned during derivation
    #[serde(default)]
    pub id: String,
    pub asn: u32,
    pub ip: IpAddr,
    pub password: Option<String>,
    pub description: Option<String>,
    pub cfg: ClientCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCfg {
    pub passive: bool,
    pub gtsm: bool,
    pub add_path: bool,
    pub prepend_rs_as: bool,
    pub filtering: ClientFiltering,
    pub blackhole_filtering: ClientBlackholeFiltering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFiltering {
    pub next_hop_policy: NextHopPolicy,
    pub ipv4_pref_len: PrefixLenRange,
    pub ipv6_pref_len: PrefixLenRange,
    pub max_as_path_len: u8,
    pub reject_invalid_as_in_as_path: bool,
    pub irrdb: ClientIrrdb,
    pub rpki: ClientRpki,
    pub max_prefix: ClientMaxPrefix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIrrdb {
    pub as_sets: Vec<String>,
    pub enforce_origin_in_as_set: bool,
    pub enforce_prefix_in_as_set: bool,
    /// Ids of the [`super::IrrSet`]s used to filter this client, set by enrichment
    #[serde(default)]
    pub as_set_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRpki {
    pub reject_invalid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMaxPrefix {
    pub peering_db: bool,
    pub limit_ipv4: Option<u32>,
    pub limit_ipv6: Option<u32>,
    pub action: Option<MaxPrefixAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBlackholeFiltering {
    pub announce_to_client: bool,
}

impl Client {
    pub fn is_ipv4(&self) -> bool {
        self.ip.is_ipv4()
    }
}

/// Client addresses must be unique and prefix length ranges ordered
pub(crate) fn check(doc: &Value) -> Vec<FieldError> {
    let mut errors = vec![];
    let mut seen: HashMap<IpAddr, usize> = HashMap::new();
    for (i, client) in items(&doc["clients"]).iter().enumerate() {
        if let Some(ip) = ip_at(&client["ip"]) {
            if let Some(first) = seen.insert(ip, i) {
                errors.push(FieldError::new(
                    format!("clients[{}].ip", i),
                    format!("{} is already used by clients[{}]", ip, first),
                ));
            }
        }
        for name in ["ipv4_pref_len", "ipv6_pref_len"] {
            let range = &client["cfg"]["filtering"][name];
            if let (Some(min), Some(max)) = (range["min"].as_u64(), range["max"].as_u64()) {
                if min > max {
                    errors.push(FieldError::new(
                        format!("clients[{}].cfg.filtering.{}", i, name),
                        "expected min <= max",
                    ));
                }
            }
        }
    }
    errors
}

impl ClientsConfig {
    /// Number clients per ASN in input order: `AS<asn>_1`, `AS<asn>_2`, ...
    pub fn assign_ids(&mut self) {
        let mut counters: HashMap<u32, usize> = HashMap::new();
        for client in self.clients.iter_mut() {
            let n = counters.entry(client.asn).or_insert(0);
            *n += 1;
            client.id = format!("AS{}_{}", client.asn, n);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }
}

// =============================================================================
// Schema
// =============================================================================

const PREF_LEN_V4: &[Field] = &[
    Field::new(
        "min",
        Kind::Uint { min: 0, max: 32 },
        Fallback::Inherit("filtering.ipv4_pref_len.min"),
    ),
    Field::new(
        "max",
        Kind::Uint { min: 0, max: 32 },
        Fallback::Inherit("filtering.ipv4_pref_len.max"),
    ),
];

const PREF_LEN_V6: &[Field] = &[
    Field::new(
        "min",
        Kind::Uint { min: 0, max: 128 },
        Fallback::Inherit("filtering.ipv6_pref_len.min"),
    ),
    Field::new(
        "max",
        Kind::Uint { min: 0, max: 128 },
        Fallback::Inherit("filtering.ipv6_pref_len.max"),
    ),
];

const AS_SET_NAME: Kind = Kind::Text(check_as_set_name);

const IRRDB: &[Field] = &[
    Field::new("as_sets", Kind::List(&AS_SET_NAME), Fallback::EmptyList),
    Field::new(
        "enforce_origin_in_as_set",
        Kind::Bool,
        Fallback::Inherit("filtering.irrdb.enforce_origin_in_as_set"),
    ),
    Field::new(
        "enforce_prefix_in_as_set",
        Kind::Bool,
        Fallback::Inherit("filtering.irrdb.enforce_prefix_in_as_set"),
    ),
];

const RPKI: &[Field] = &[Field::new(
    "reject_invalid",
    Kind::Bool,
    Fallback::Inherit("filtering.rpki.reject_invalid"),
)];

const MAX_PREFIX: &[Field] = &[
    Field::new(
        "peering_db",
        Kind::Bool,
        Fallback::Inherit("filtering.max_prefix.peering_db"),
    ),
    Field::new(
        "limit_ipv4",
        Kind::Uint { min: 1, max: u32::MAX as u64 },
        Fallback::Null,
    ),
    Field::new(
        "limit_ipv6",
        Kind::Uint { min: 1, max: u32::MAX as u64 },
        Fallback::Null,
    ),
    Field::new(
        "action",
        Kind::Choice(MAX_PREFIX_ACTIONS),
        Fallback::Inherit("filtering.max_prefix.action"),
    ),
];

const FILTERING: &[Field] = &[
    Field::new(
        "next_hop_policy",
        Kind::Choice(&["strict", "same-as"]),
        Fallback::Inherit("filtering.next_hop_policy"),
    ),
    Field::section("ipv4_pref_len", PREF_LEN_V4),
    Field::section("ipv6_pref_len", PREF_LEN_V6),
    Field::new(
        "max_as_path_len",
        Kind::Uint { min: 1, max: 64 },
        Fallback::Inherit("filtering.max_as_path_len"),
    ),
    Field::new(
        "reject_invalid_as_in_as_path",
        Kind::Bool,
        Fallback::Inherit("filtering.reject_invalid_as_in_as_path"),
    ),
    Field::section("irrdb", IRRDB),
    Field::section("rpki", RPKI),
    Field::section("max_prefix", MAX_PREFIX),
];

const BLACKHOLE_FILTERING: &[Field] = &[Field::new(
    "announce_to_client",
    Kind::Bool,
    Fallback::Inherit("blackhole_filtering.announce_to_client"),
)];

const CFG: &[Field] = &[
    Field::new("passive", Kind::Bool, Fallback::Inherit("passive")),
    Field::new("gtsm", Kind::Bool, Fallback::Inherit("gtsm")),
    Field::new("add_path", Kind::Bool, Fallback::Inherit("add_path")),
    Field::new("prepend_rs_as", Kind::Bool, Fallback::Inherit("prepend_rs_as")),
    Field::section("filtering", FILTERING),
    Field::section("blackhole_filtering", BLACKHOLE_FILTERING),
];

const CLIENT: &[Field] = &[
    Field::new("asn", Kind::Asn, Fallback::Required),
    Field::new("ip", Kind::Ip, Fallback::Required),
    Field::new("password", Kind::Str, Fallback::Null),
    Field::new("description", Kind::Str, Fallback::Null),
    Field::section("cfg", CFG),
];

const CLIENT_ITEM: Kind = Kind::Section(CLIENT);

pub(crate) const DOCUMENT: &[Field] = &[
    Field::new("clients", Kind::List(&CLIENT_ITEM), Fallback::EmptyList),
    // per-ASN data shares the file and is loaded on its own
    Field::new("asns", Kind::Discarded, Fallback::Null),
];

#[cfg(test)]
mod tests {
    use crate::policy::general::{MaxPrefixAction, NextHopPolicy};
    use crate::policy::{load_clients, load_general, GeneralConfig, Input};

    fn general() -> GeneralConfig {
        let doc = serde_yaml_ng::from_str(
            r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  filtering:
    next_hop_policy: same-as
    ipv4_pref_len: {min: 8, max: 24}
    max_prefix: {action: shutdown, peering_db: true}
"#,
        )
        .unwrap();
        load_general(&Input::Document(doc)).unwrap()
    }

    fn load(yaml: &str) -> Result<crate::policy::ClientsConfig, crate::errors::BuildError> {
        load_clients(&Input::Document(serde_yaml_ng::from_str(yaml).unwrap()), &general())
    }

    #[test]
    fn test_inherit_general_options() {
        let cfg = load(
            r#"
clients:
  - asn: 65501
    ip: 192.0.2.11
    cfg:
      filtering:
        ipv4_pref_len: {max: 26}
        max_prefix: {limit_ipv4: 100}
  - asn: AS65502
    ip: 2001:db8::12
    cfg:
      passive: false
      filtering:
        next_hop_policy: strict
        max_prefix: {action: restart}
asns:
  AS65501: {as_sets: [AS-FOO]}
"#,
        )
        .unwrap();

        let a = &cfg.clients[0];
        assert_eq!(a.cfg.filtering.next_hop_policy, NextHopPolicy::SameAs);
        assert_eq!(a.cfg.filtering.ipv4_pref_len.min, 8);
        assert_eq!(a.cfg.filtering.ipv4_pref_len.max, 26);
        assert_eq!(a.cfg.filtering.max_prefix.limit_ipv4, Some(100));
        assert_eq!(a.cfg.filtering.max_prefix.limit_ipv6, None);
        assert!(a.cfg.filtering.max_prefix.peering_db);
        assert_eq!(
            a.cfg.filtering.max_prefix.action,
            Some(MaxPrefixAction::Shutdown)
        );
        assert!(a.cfg.passive);

        let b = &cfg.clients[1];
        assert_eq!(b.asn, 65502);
        assert!(!b.cfg.passive);
        assert_eq!(b.cfg.filtering.next_hop_policy, NextHopPolicy::Strict);
        assert_eq!(
            b.cfg.filtering.max_prefix.action,
            Some(MaxPrefixAction::Restart)
        );
    }

    #[test]
    fn test_ids_are_numbered_per_asn() {
        let mut cfg = load(
            r#"
clients:
  - {asn: 65501, ip: 192.0.2.11}
  - {asn: 65502, ip: 192.0.2.21}
  - {asn: 65501, ip: 2001:db8::11}
"#,
        )
        .unwrap();
        cfg.assign_ids();
        let ids: Vec<&str> = cfg.clients.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["AS65501_1", "AS65502_1", "AS65501_2"]);
        assert_eq!(cfg.get("AS65501_2").map(|c| c.ip.is_ipv6()), Some(true));
    }

    #[test]
    fn test_invalid_clients() {
        let err = load(
            r#"
clients:
  - {asn: 65501, ip: 192.0.2.11}
  - {ip: 192.0.2.12, cfg: {filtering: {max_prefix: {action: drop}}}}
  - {asn: 65503, ip: 192.0.2.11, id: custom}
"#,
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("clients[1].asn: missing required field"));
        assert!(text.contains("clients[1].cfg.filtering.max_prefix.action"));
        assert!(text.contains("clients[2].id: unknown field"));
    }

    #[test]
    fn test_duplicate_ip() {
        let err = load(
            r#"
clients:
  - {asn: 65501, ip: 192.0.2.11}
  - {asn: 65502, ip: 192.0.2.11}
"#,
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("clients[1].ip: 192.0.2.11 is already used by clients[0]"));
    }
}
