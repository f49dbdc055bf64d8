//! Per-ASN metadata (`asns` section, usually found in `clients.yml`)

use super::check_as_set_name;
use super::schema::{Fallback, Field, Kind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsnsConfig {
    pub asns: BTreeMap<String, AsnInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnInfo {
    pub as_sets: Vec<String>,
}

impl AsnsConfig {
    /// AS-SETs registered for an ASN, if any
    pub fn as_sets_for(&self, asn: u32) -> Option<&[String]> {
        self.asns
            .get(&format!("AS{}", asn))
            .map(|info| info.as_sets.as_slice())
            .filter(|sets| !sets.is_empty())
    }
}

fn check_asn_key(key: &str) -> Result<String, String> {
    match key.strip_prefix("AS").map(|n| n.parse::<u32>()) {
        Some(Ok(n)) if n > 0 => Ok(format!("AS{}", n)),
        _ => Err(format!("invalid ASN key '{}': expected AS<number>", key)),
    }
}

const AS_SET_NAME: Kind = Kind::Text(check_as_set_name);

const ASN: &[Field] = &[Field::new(
    "as_sets",
    Kind::List(&AS_SET_NAME),
    Fallback::EmptyList,
)];

pub(crate) const DOCUMENT: &[Field] = &[
    Field::new(
        "asns",
        Kind::Map(check_asn_key, &Kind::Section(ASN)),
        Fallback::EmptyMap,
    ),
    Field::new("clients", Kind::Discarded, Fallback::Null),
];

#[cfg(test)]
mod tests {
    use crate::policy::{load_asns, Input};

    #[test]
    fn test_load_asns() {
        let doc = serde_yaml_ng::from_str(
            r#"
asns:
  AS3333:
    as_sets: ["RIPE-NCC-AS"]
  AS10745: {}
clients:
  - {asn: 3333, ip: 192.0.2.11}
"#,
        )
        .unwrap();
        let cfg = load_asns(&Input::Document(doc)).unwrap();
        assert_eq!(
            cfg.as_sets_for(3333),
            Some(&["RIPE-NCC-AS".to_string()][..])
        );
        assert_eq!(cfg.as_sets_for(10745), None);
        assert_eq!(cfg.as_sets_for(1), None);
    }

    #[test]
    fn test_invalid_key() {
        let doc = serde_yaml_ng::from_str("asns: {ASX: {}, '3333': {}}").unwrap();
        let err = load_asns(&Input::Document(doc)).unwrap_err().to_string();
        assert!(err.contains("invalid ASN key 'ASX'"));
        assert!(err.contains("invalid ASN key '3333'"));
    }
}
