//! Bogon prefixes (`bogons.yml`)

use super::{check_prefix, ip_at, items};
use super::schema::{Fallback, Field, Kind};
use crate::errors::FieldError;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::net::IpAddr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BogonsConfig {
    pub bogons: Vec<Bogon>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bogon {
    pub prefix: IpAddr,
    pub length: u8,
    pub comment: Option<String>,
}

/// Prefix lengths must fit the address
pub(crate) fn check(doc: &Value) -> Vec<FieldError> {
    items(&doc["bogons"])
        .iter()
        .enumerate()
        .filter_map(|(i, b)| {
            let prefix = ip_at(&b["prefix"])?;
            let length = u8::try_from(b["length"].as_u64()?).ok()?;
            check_prefix(prefix, length)
                .err()
                .map(|e| FieldError::new(format!("bogons[{}]", i), e))
        })
        .collect()
}

const BOGON: &[Field] = &[
    Field::new("prefix", Kind::Ip, Fallback::Required),
    Field::new("length", Kind::Uint { min: 0, max: 128 }, Fallback::Required),
    Field::new("comment", Kind::Str, Fallback::Null),
];

pub(crate) const DOCUMENT: &[Field] = &[Field::new(
    "bogons",
    Kind::List(&Kind::Section(BOGON)),
    Fallback::Required,
)];

#[cfg(test)]
mod tests {
    use crate::policy::{load_bogons, Input};

    #[test]
    fn test_load_bogons() {
        let doc = serde_yaml_ng::from_str(
            r#"
bogons:
  - {prefix: "0.0.0.0", length: 8, comment: "this network"}
  - {prefix: "2001:db8::", length: 32}
"#,
        )
        .unwrap();
        let cfg = load_bogons(&Input::Document(doc)).unwrap();
        assert_eq!(cfg.bogons.len(), 2);
        assert_eq!(cfg.bogons[0].comment.as_deref(), Some("this network"));
        assert!(cfg.bogons[1].comment.is_none());
    }

    #[test]
    fn test_bogon_with_host_bits() {
        let doc = serde_yaml_ng::from_str(
            r#"
bogons:
  - {prefix: "10.0.0.1", length: 8}
  - {prefix: "10.0.0.0", length: 33}
"#,
        )
        .unwrap();
        let err = load_bogons(&Input::Document(doc)).unwrap_err().to_string();
        assert!(err.contains("bogons[0]"));
        assert!(err.contains("bogons[1]"));
    }
}
