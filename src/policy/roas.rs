//! Locally provided ROAs (`roas.yml`)
//!
//! Used to build a static RPKI table when the daemon has no RTR feed.

use super::{check_prefix, ip_at, items};
use super::schema::{Fallback, Field, Kind};
use crate::errors::FieldError;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::net::IpAddr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoasConfig {
    pub roas: Vec<Roa>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roa {
    pub prefix: IpAddr,
    pub length: u8,
    pub max_len: u8,
    pub asn: u32,
}

pub(crate) fn check(doc: &Value) -> Vec<FieldError> {
    let mut errors = vec![];
    for (i, roa) in items(&doc["roas"]).iter().enumerate() {
        let path = format!("roas[{}]", i);
        let (Some(prefix), Some(length)) = (
            ip_at(&roa["prefix"]),
            roa["length"].as_u64().and_then(|l| u8::try_from(l).ok()),
        ) else {
            continue;
        };
        if let Err(e) = check_prefix(prefix, length) {
            errors.push(FieldError::new(&path, e));
            continue;
        }
        let width = if prefix.is_ipv4() { 32 } else { 128 };
        match roa["max_len"].as_u64() {
            Some(max_len) if max_len < length as u64 || max_len > width => {
                errors.push(FieldError::new(
                    format!("{}.max_len", path),
                    format!("must be between {} and {}", length, width),
                ));
            }
            _ => {}
        }
    }
    errors
}

const ROA: &[Field] = &[
    Field::new("prefix", Kind::Ip, Fallback::Required),
    Field::new("length", Kind::Uint { min: 0, max: 128 }, Fallback::Required),
    Field::new("max_len", Kind::Uint { min: 0, max: 128 }, Fallback::Required),
    Field::new("asn", Kind::Asn, Fallback::Required),
];

pub(crate) const DOCUMENT: &[Field] = &[Field::new(
    "roas",
    Kind::List(&Kind::Section(ROA)),
    Fallback::EmptyList,
)];

#[cfg(test)]
mod tests {
    use crate::policy::{load_roas, Input};

    #[test]
    fn test_load_roas() {
        let doc = serde_yaml_ng::from_str(
            r#"
roas:
  - {prefix: "192.0.2.0", length: 24, max_len: 24, asn: "AS65536"}
  - {prefix: "2001:db8::", length: 32, max_len: 48, asn: 65537}
"#,
        )
        .unwrap();
        let cfg = load_roas(&Input::Document(doc)).unwrap();
        assert_eq!(cfg.roas[0].asn, 65536);
        assert_eq!(cfg.roas[1].max_len, 48);
    }

    #[test]
    fn test_max_len_out_of_range() {
        let doc = serde_yaml_ng::from_str(
            r#"
roas:
  - {prefix: "192.0.2.0", length: 24, max_len: 23, asn: 1}
  - {prefix: "192.0.2.0", length: 24, max_len: 33, asn: 1}
"#,
        )
        .unwrap();
        let err = load_roas(&Input::Document(doc)).unwrap_err().to_string();
        assert!(err.contains("roas[0].max_len"));
        assert!(err.contains("roas[1].max_len"));
    }
}
