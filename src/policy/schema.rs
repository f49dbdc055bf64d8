//! Declarative schema for the input documents
//!
//! Each document is described by a static tree of [`Field`]s. [`Validator`] walks a
//! parsed YAML document against that tree, fills in defaults, normalizes values
//! (e.g. `AS65536` becomes `65536`) and records every violation instead of stopping
//! at the first one. The normalized document is then handed to serde to build the
//! strongly-typed configuration.

use crate::errors::{BuildError, FieldError};
use ipnet::IpNet;
use serde_yaml_ng::{Mapping, Number, Value};
use std::net::IpAddr;

/// Validates a free-form string and returns its normalized form
pub type TextCheck = fn(&str) -> Result<String, String>;

/// Type and constraints of a field value
pub enum Kind {
    Bool,
    /// Unsigned integer in the inclusive range
    Uint { min: u64, max: u64 },
    Str,
    /// String constrained to a set of values
    Choice(&'static [&'static str]),
    /// AS number, given as integer or as `AS<n>`
    Asn,
    Ip,
    Ipv4,
    Ipv6,
    Prefix,
    /// String validated by a custom check
    Text(TextCheck),
    List(&'static Kind),
    Section(&'static [Field]),
    /// Mapping with arbitrary keys, each validated by the check
    Map(TextCheck, &'static Kind),
    /// Accepted but dropped from the normalized document
    Discarded,
}

/// What to do when a field is missing or null
pub enum Fallback {
    Required,
    Null,
    Bool(bool),
    Uint(u64),
    Str(&'static str),
    EmptyList,
    EmptyMap,
    /// Build the nested section from its own defaults
    Section,
    /// Take the value found at this dotted path of the parent document
    Inherit(&'static str),
}

pub struct Field {
    pub name: &'static str,
    pub kind: Kind,
    pub default: Fallback,
}

impl Field {
    pub const fn new(name: &'static str, kind: Kind, default: Fallback) -> Self {
        Self {
            name,
            kind,
            default,
        }
    }

    pub const fn section(name: &'static str, fields: &'static [Field]) -> Self {
        Self::new(name, Kind::Section(fields), Fallback::Section)
    }
}

/// Walks documents against a schema, collecting violations
pub struct Validator<'a> {
    parent: Option<&'a Value>,
    errors: Vec<FieldError>,
}

impl<'a> Validator<'a> {
    /// `parent` is the document consulted by [`Fallback::Inherit`]
    pub fn new(parent: Option<&'a Value>) -> Self {
        Self {
            parent,
            errors: vec![],
        }
    }

    pub fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    pub fn finish(self, document: &'static str) -> Result<(), BuildError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BuildError::validation(document, self.errors))
        }
    }

    /// Validate a mapping against `fields`, returning the normalized mapping
    pub fn section(&mut self, fields: &[Field], value: &Value, path: &str) -> Value {
        let empty = Mapping::new();
        let mapping = match value {
            Value::Mapping(m) => m,
            Value::Null => &empty,
            _ => {
                self.error(path, "expected a mapping");
                return Value::Null;
            }
        };

        for key in mapping.keys() {
            match key.as_str() {
                Some(k) if fields.iter().any(|f| f.name == k) => {}
                Some(k) => self.error(&join(path, k), "unknown field"),
                None => self.error(path, format!("invalid key {:?}", key)),
            }
        }

        let mut out = Mapping::new();
        for field in fields {
            let field_path = join(path, field.name);
            let provided = mapping.get(field.name).filter(|v| !v.is_null());
            if let Some(v) = self.field(field, provided, &field_path) {
                out.insert(Value::String(field.name.to_string()), v);
            }
        }
        Value::Mapping(out)
    }

    fn field(&mut self, field: &Field, value: Option<&Value>, path: &str) -> Option<Value> {
        if let Kind::Discarded = field.kind {
            return None;
        }
        if let Some(v) = value {
            return Some(self.value(&field.kind, v, path));
        }
        let default = match &field.default {
            Fallback::Required => {
                self.error(path, "missing required field");
                Value::Null
            }
            Fallback::Null => Value::Null,
            Fallback::Bool(b) => Value::Bool(*b),
            Fallback::Uint(n) => Value::Number(Number::from(*n)),
            Fallback::Str(s) => Value::String(s.to_string()),
            Fallback::EmptyList => Value::Sequence(vec![]),
            Fallback::EmptyMap => Value::Mapping(Mapping::new()),
            Fallback::Section => match &field.kind {
                Kind::Section(fields) => self.section(fields, &Value::Null, path),
                _ => Value::Null,
            },
            Fallback::Inherit(from) => match &field.kind {
                // a section inherits field by field so partial overrides work
                Kind::Section(fields) => self.section(fields, &Value::Null, path),
                _ => self.inherited(from),
            },
        };
        Some(default)
    }

    fn inherited(&self, from: &str) -> Value {
        let mut current = match self.parent {
            Some(p) => p,
            None => return Value::Null,
        };
        for part in from.split('.') {
            match current.get(part) {
                Some(v) => current = v,
                None => return Value::Null,
            }
        }
        current.clone()
    }

    fn value(&mut self, kind: &Kind, value: &Value, path: &str) -> Value {
        match kind {
            Kind::Bool => match value {
                Value::Bool(_) => value.clone(),
                _ => self.invalid(path, "expected a boolean", value),
            },
            Kind::Uint { min, max } => match value.as_u64() {
                Some(n) if n >= *min && n <= *max => value.clone(),
                Some(n) => {
                    self.error(path, format!("{} is out of range [{}, {}]", n, min, max));
                    Value::Null
                }
                None => self.invalid(path, "expected a non-negative integer", value),
            },
            Kind::Str => match value {
                Value::String(_) => value.clone(),
                _ => self.invalid(path, "expected a string", value),
            },
            Kind::Choice(choices) => match value.as_str() {
                Some(s) if choices.contains(&s) => value.clone(),
                _ => self.invalid(
                    path,
                    &format!("expected one of {}", choices.join(", ")),
                    value,
                ),
            },
            Kind::Asn => match parse_asn(value) {
                Some(asn) => Value::Number(Number::from(asn)),
                None => self.invalid(path, "expected an AS number", value),
            },
            Kind::Ip => self.address(path, value, |_| true, "IP address"),
            Kind::Ipv4 => self.address(path, value, |ip| ip.is_ipv4(), "IPv4 address"),
            Kind::Ipv6 => self.address(path, value, |ip| ip.is_ipv6(), "IPv6 address"),
            Kind::Prefix => match value.as_str().map(|s| s.parse::<IpNet>()) {
                Some(Ok(net)) => Value::String(net.to_string()),
                _ => self.invalid(path, "expected an IP prefix", value),
            },
            Kind::Text(check) => match value.as_str() {
                Some(s) => match check(s) {
                    Ok(normalized) => Value::String(normalized),
                    Err(e) => {
                        self.error(path, e);
                        Value::Null
                    }
                },
                None => self.invalid(path, "expected a string", value),
            },
            Kind::List(item) => match value {
                Value::Sequence(items) => Value::Sequence(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| self.value(item, v, &format!("{}[{}]", path, i)))
                        .collect(),
                ),
                _ => self.invalid(path, "expected a list", value),
            },
            Kind::Section(fields) => self.section(fields, value, path),
            Kind::Map(key_check, item) => match value {
                Value::Mapping(m) => {
                    let mut out = Mapping::new();
                    for (k, v) in m {
                        let key = match k.as_str().map(|s| key_check(s)) {
                            Some(Ok(key)) => key,
                            Some(Err(e)) => {
                                self.error(path, e);
                                continue;
                            }
                            None => {
                                self.error(path, format!("invalid key {:?}", k));
                                continue;
                            }
                        };
                        let item_path = join(path, &key);
                        let normalized = self.value(item, v, &item_path);
                        out.insert(Value::String(key), normalized);
                    }
                    Value::Mapping(out)
                }
                _ => self.invalid(path, "expected a mapping", value),
            },
            Kind::Discarded => Value::Null,
        }
    }

    fn address(
        &mut self,
        path: &str,
        value: &Value,
        accept: fn(&IpAddr) -> bool,
        what: &str,
    ) -> Value {
        match value.as_str().map(|s| s.parse::<IpAddr>()) {
            Some(Ok(ip)) if accept(&ip) => Value::String(ip.to_string()),
            _ => self.invalid(path, &format!("expected an {}", what), value),
        }
    }

    fn invalid(&mut self, path: &str, expected: &str, value: &Value) -> Value {
        self.error(path, format!("{}, got {}", expected, describe(value)));
        Value::Null
    }
}

/// Parse `65536`, `"65536"` or `"AS65536"`
pub fn parse_asn(value: &Value) -> Option<u32> {
    let asn = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => {
            let digits = s
                .strip_prefix("AS")
                .or_else(|| s.strip_prefix("as"))
                .unwrap_or(s);
            digits.parse::<u64>().ok()?
        }
        _ => return None,
    };
    match u32::try_from(asn) {
        Ok(asn) if asn > 0 => Some(asn),
        _ => None,
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s),
        Value::Sequence(_) => "a list".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        _ => "an unsupported value".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INNER: &[Field] = &[
        Field::new("enabled", Kind::Bool, Fallback::Bool(false)),
        Field::new(
            "action",
            Kind::Choice(&["reject", "warning"]),
            Fallback::Str("reject"),
        ),
    ];

    const OUTER: &[Field] = &[
        Field::new("asn", Kind::Asn, Fallback::Required),
        Field::new("limit", Kind::Uint { min: 1, max: 10 }, Fallback::Uint(5)),
        Field::new("ips", Kind::List(&Kind::Ip), Fallback::EmptyList),
        Field::new("inherited", Kind::Bool, Fallback::Inherit("policy.enabled")),
        Field::section("inner", INNER),
    ];

    fn yaml(s: &str) -> Value {
        serde_yaml_ng::from_str(s).unwrap()
    }

    #[test]
    fn test_defaults_are_filled() {
        let mut v = Validator::new(None);
        let out = v.section(OUTER, &yaml("asn: AS65536"), "");
        assert!(!v.has_errors());
        assert_eq!(out["asn"].as_u64(), Some(65536));
        assert_eq!(out["limit"].as_u64(), Some(5));
        assert_eq!(out["inner"]["action"].as_str(), Some("reject"));
        assert!(out["inherited"].is_null());
    }

    #[test]
    fn test_inherit_from_parent() {
        let parent = yaml("policy: {enabled: true}");
        let mut v = Validator::new(Some(&parent));
        let out = v.section(OUTER, &yaml("asn: 1"), "");
        assert_eq!(out["inherited"].as_bool(), Some(true));

        let out = v.section(OUTER, &yaml("asn: 1\ninherited: false"), "");
        assert_eq!(out["inherited"].as_bool(), Some(false));
    }

    #[test]
    fn test_all_errors_are_collected() {
        let doc = yaml(
            r#"
limit: 11
ips: ["192.0.2.1", "nope"]
bogus: 1
inner:
  action: shutdown
"#,
        );
        let mut v = Validator::new(None);
        v.section(OUTER, &doc, "cfg");
        let err = v.finish("general").unwrap_err();
        let paths: Vec<String> = match err {
            BuildError::Validation { errors, .. } => errors.into_iter().map(|e| e.path).collect(),
            other => panic!("unexpected error {other}"),
        };
        assert!(paths.contains(&"cfg.bogus".to_string()));
        assert!(paths.contains(&"cfg.asn".to_string()));
        assert!(paths.contains(&"cfg.limit".to_string()));
        assert!(paths.contains(&"cfg.ips[1]".to_string()));
        assert!(paths.contains(&"cfg.inner.action".to_string()));
        assert_eq!(paths.len(), 5);
    }

    #[test]
    fn test_parse_asn() {
        assert_eq!(parse_asn(&yaml("65536")), Some(65536));
        assert_eq!(parse_asn(&yaml("AS3333")), Some(3333));
        assert_eq!(parse_asn(&yaml("0")), None);
        assert_eq!(parse_asn(&yaml("4294967296")), None);
        assert_eq!(parse_asn(&yaml("ASfoo")), None);
    }
}
