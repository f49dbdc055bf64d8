//! General policy configuration (`general.yml`)

use super::schema::{Fallback, Field, Kind};
use crate::errors::FieldError;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub rs_as: u32,
    pub router_id: Ipv4Addr,
    pub prepend_rs_as: bool,
    pub path_hiding: bool,
    pub passive: bool,
    pub gtsm: bool,
    pub add_path: bool,
    pub filtering: Filtering,
    pub blackhole_filtering: BlackholeFiltering,
    pub communities: BTreeMap<String, Community>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filtering {
    pub next_hop_policy: NextHopPolicy,
    pub ipv4_pref_len: PrefixLenRange,
    pub ipv6_pref_len: PrefixLenRange,
    pub max_as_path_len: u8,
    pub reject_invalid_as_in_as_path: bool,
    pub transit_free: TransitFree,
    pub irrdb: IrrdbPolicy,
    pub rpki: RpkiPolicy,
    pub max_prefix: MaxPrefixPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NextHopPolicy {
    Strict,
    SameAs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixLenRange {
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitFree {
    pub action: TransitFreeAction,
    pub asns: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitFreeAction {
    Reject,
    Warning,
    /// Tear the session down; not every daemon can do this from a filter
    Shutdown,
}

impl std::fmt::Display for TransitFreeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitFreeAction::Reject => write!(f, "reject"),
            TransitFreeAction::Warning => write!(f, "warning"),
            TransitFreeAction::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrdbPolicy {
    pub enforce_origin_in_as_set: bool,
    pub enforce_prefix_in_as_set: bool,
    pub tag_as_set: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpkiPolicy {
    pub enabled: bool,
    pub reject_invalid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPrefixPolicy {
    pub peering_db: bool,
    pub general_limit_ipv4: u32,
    pub general_limit_ipv6: u32,
    pub action: Option<MaxPrefixAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxPrefixAction {
    Shutdown,
    Restart,
    Block,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackholeFiltering {
    pub policy_ipv4: Option<BlackholePolicy>,
    pub policy_ipv6: Option<BlackholePolicy>,
    pub rewrite_next_hop_ipv4: Option<Ipv4Addr>,
    pub rewrite_next_hop_ipv6: Option<Ipv6Addr>,
    pub announce_to_client: bool,
    pub add_noexport: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlackholePolicy {
    PropagateUnchanged,
    RewriteNextHop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityDirection {
    /// Set by clients to request an action from the route server
    #[default]
    Inbound,
    /// Attached by the route server to the routes it announces
    Outbound,
}

/// A BGP community used by the policy, in its three encodings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    #[serde(rename = "type", default)]
    pub direction: CommunityDirection,
    #[serde(default)]
    pub peer_as: bool,
    pub std: Option<String>,
    pub ext: Option<String>,
    pub lrg: Option<String>,
}

impl Community {
    /// A community is unset when none of its encodings has a value
    pub fn is_set(&self) -> bool {
        self.std.is_some() || self.ext.is_some() || self.lrg.is_some()
    }
}

/// Built-in attributes of a community
#[derive(Debug, Clone, Copy)]
pub struct CommunityDef {
    pub name: &'static str,
    pub direction: CommunityDirection,
    pub peer_as: bool,
}

const fn def(name: &'static str, direction: CommunityDirection, peer_as: bool) -> CommunityDef {
    CommunityDef {
        name,
        direction,
        peer_as,
    }
}

use CommunityDirection::{Inbound, Outbound};

/// The communities known to the policy; users only provide their encodings
pub static COMMUNITIES_SCHEMA: &[CommunityDef] = &[
    def("origin_present_in_as_set", Outbound, false),
    def("origin_not_present_in_as_set", Outbound, false),
    def("prefix_present_in_as_set", Outbound, false),
    def("prefix_not_present_in_as_set", Outbound, false),
    def("roa_valid", Outbound, false),
    def("roa_invalid", Outbound, false),
    def("roa_unknown", Outbound, false),
    def("blackholing", Inbound, false),
    def("do_not_announce_to_any", Inbound, false),
    def("do_not_announce_to_peer", Inbound, true),
    def("announce_to_peer", Inbound, true),
    def("prepend_once_to_any", Inbound, false),
    def("prepend_twice_to_any", Inbound, false),
    def("prepend_thrice_to_any", Inbound, false),
    def("prepend_once_to_peer", Inbound, true),
    def("prepend_twice_to_peer", Inbound, true),
    def("prepend_thrice_to_peer", Inbound, true),
];

impl GeneralConfig {
    /// Overwrite `type` and `peer_as` of every community with the built-in values
    pub fn apply_community_schema(&mut self) {
        for def in COMMUNITIES_SCHEMA {
            let comm = self.communities.entry(def.name.to_string()).or_default();
            comm.direction = def.direction;
            comm.peer_as = def.peer_as;
        }
    }
}

/// Constraints spanning several fields of the normalized document
///
/// Fields rejected by the schema walk are null and take no part in these checks.
pub(crate) fn check(doc: &Value) -> Vec<FieldError> {
    let mut errors = vec![];
    let cfg = &doc["cfg"];

    for name in ["ipv4_pref_len", "ipv6_pref_len"] {
        let range = &cfg["filtering"][name];
        if let (Some(min), Some(max)) = (range["min"].as_u64(), range["max"].as_u64()) {
            if min > max {
                errors.push(FieldError::new(
                    format!("cfg.filtering.{}", name),
                    "min must be less than or equal to max",
                ));
            }
        }
    }

    let bh = &cfg["blackhole_filtering"];
    for ver in [4, 6] {
        let policy = format!("policy_ipv{}", ver);
        let next_hop = format!("rewrite_next_hop_ipv{}", ver);
        if bh[policy.as_str()].as_str() == Some("rewrite-next-hop") && bh[next_hop.as_str()].is_null()
        {
            errors.push(FieldError::new(
                format!("cfg.blackhole_filtering.{}", next_hop),
                format!("required when {} is 'rewrite-next-hop'", policy),
            ));
        }
    }

    let mut used: HashMap<&str, &str> = HashMap::new();
    for def in COMMUNITIES_SCHEMA {
        let comm = &cfg["communities"][def.name];
        for kind in ["std", "ext", "lrg"] {
            let Some(value) = comm[kind].as_str() else {
                continue;
            };
            let path = format!("cfg.communities.{}.{}", def.name, kind);
            if value.ends_with(":peer_as") && !def.peer_as {
                errors.push(FieldError::new(
                    &path,
                    "the 'peer_as' macro can only be used by peer-specific communities",
                ));
            }
            if !value.ends_with(":peer_as") && def.peer_as {
                errors.push(FieldError::new(
                    &path,
                    "peer-specific communities must end with the 'peer_as' macro",
                ));
            }
            if let Some(other) = used.insert(value, def.name) {
                errors.push(FieldError::new(
                    &path,
                    format!("community '{}' is already used by '{}'", value, other),
                ));
            }
        }
    }

    errors
}

// =============================================================================
// Community encodings
// =============================================================================

fn check_value(part: &str, max: u64, what: &str) -> Result<(), String> {
    match part.parse::<u64>() {
        Ok(n) if n <= max => Ok(()),
        _ => Err(format!("invalid {} '{}'", what, part)),
    }
}

fn check_last(part: &str, max: u64, what: &str) -> Result<(), String> {
    if part == "peer_as" {
        return Ok(());
    }
    check_value(part, max, what)
}

/// `ASN:value`, both 16 bits
pub fn check_std_community(s: &str) -> Result<String, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [asn, value] = parts.as_slice() else {
        return Err(format!("invalid standard community '{}': expected ASN:value", s));
    };
    check_value(asn, u16::MAX as u64, "ASN")
        .and_then(|_| check_last(value, u16::MAX as u64, "value"))
        .map_err(|e| format!("invalid standard community '{}': {}", s, e))?;
    Ok(s.to_string())
}

/// `ASN:value:value`, all 32 bits
pub fn check_lrg_community(s: &str) -> Result<String, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [asn, v1, v2] = parts.as_slice() else {
        return Err(format!("invalid large community '{}': expected ASN:value:value", s));
    };
    check_value(asn, u32::MAX as u64, "ASN")
        .and_then(|_| check_value(v1, u32::MAX as u64, "value"))
        .and_then(|_| check_last(v2, u32::MAX as u64, "value"))
        .map_err(|e| format!("invalid large community '{}': {}", s, e))?;
    Ok(s.to_string())
}

/// `rt|ro:ASN:value`
pub fn check_ext_community(s: &str) -> Result<String, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [kind, asn, value] = parts.as_slice() else {
        return Err(format!("invalid extended community '{}': expected type:ASN:value", s));
    };
    if *kind != "rt" && *kind != "ro" {
        return Err(format!(
            "invalid extended community '{}': type must be 'rt' or 'ro'",
            s
        ));
    }
    check_value(asn, u32::MAX as u64, "ASN")
        .and_then(|_| check_last(value, u32::MAX as u64, "value"))
        .map_err(|e| format!("invalid extended community '{}': {}", s, e))?;
    Ok(s.to_string())
}

// =============================================================================
// Schema
// =============================================================================

const PREF_LEN_V4: &[Field] = &[
    Field::new("min", Kind::Uint { min: 0, max: 32 }, Fallback::Uint(8)),
    Field::new("max", Kind::Uint { min: 0, max: 32 }, Fallback::Uint(24)),
];

const PREF_LEN_V6: &[Field] = &[
    Field::new("min", Kind::Uint { min: 0, max: 128 }, Fallback::Uint(12)),
    Field::new("max", Kind::Uint { min: 0, max: 128 }, Fallback::Uint(48)),
];

const TRANSIT_FREE: &[Field] = &[
    Field::new(
        "action",
        Kind::Choice(&["reject", "warning", "shutdown"]),
        Fallback::Str("reject"),
    ),
    Field::new("asns", Kind::List(&Kind::Asn), Fallback::EmptyList),
];

const IRRDB: &[Field] = &[
    Field::new("enforce_origin_in_as_set", Kind::Bool, Fallback::Bool(false)),
    Field::new("enforce_prefix_in_as_set", Kind::Bool, Fallback::Bool(false)),
    Field::new("tag_as_set", Kind::Bool, Fallback::Bool(true)),
];

const RPKI: &[Field] = &[
    Field::new("enabled", Kind::Bool, Fallback::Bool(false)),
    Field::new("reject_invalid", Kind::Bool, Fallback::Bool(true)),
];

pub(crate) const MAX_PREFIX_ACTIONS: &[&str] = &["shutdown", "restart", "block", "warning"];

const MAX_PREFIX: &[Field] = &[
    Field::new("peering_db", Kind::Bool, Fallback::Bool(false)),
    Field::new(
        "general_limit_ipv4",
        Kind::Uint { min: 1, max: u32::MAX as u64 },
        Fallback::Uint(170000),
    ),
    Field::new(
        "general_limit_ipv6",
        Kind::Uint { min: 1, max: u32::MAX as u64 },
        Fallback::Uint(12000),
    ),
    Field::new("action", Kind::Choice(MAX_PREFIX_ACTIONS), Fallback::Null),
];

const FILTERING: &[Field] = &[
    Field::new(
        "next_hop_policy",
        Kind::Choice(&["strict", "same-as"]),
        Fallback::Str("strict"),
    ),
    Field::section("ipv4_pref_len", PREF_LEN_V4),
    Field::section("ipv6_pref_len", PREF_LEN_V6),
    Field::new("max_as_path_len", Kind::Uint { min: 1, max: 64 }, Fallback::Uint(32)),
    Field::new("reject_invalid_as_in_as_path", Kind::Bool, Fallback::Bool(true)),
    Field::section("transit_free", TRANSIT_FREE),
    Field::section("irrdb", IRRDB),
    Field::section("rpki", RPKI),
    Field::section("max_prefix", MAX_PREFIX),
];

const BLACKHOLE_POLICIES: &[&str] = &["propagate-unchanged", "rewrite-next-hop"];

const BLACKHOLE_FILTERING: &[Field] = &[
    Field::new("policy_ipv4", Kind::Choice(BLACKHOLE_POLICIES), Fallback::Null),
    Field::new("policy_ipv6", Kind::Choice(BLACKHOLE_POLICIES), Fallback::Null),
    Field::new("rewrite_next_hop_ipv4", Kind::Ipv4, Fallback::Null),
    Field::new("rewrite_next_hop_ipv6", Kind::Ipv6, Fallback::Null),
    Field::new("announce_to_client", Kind::Bool, Fallback::Bool(true)),
    Field::new("add_noexport", Kind::Bool, Fallback::Bool(true)),
];

const COMMUNITY: &[Field] = &[
    Field::new("std", Kind::Text(check_std_community), Fallback::Null),
    Field::new("ext", Kind::Text(check_ext_community), Fallback::Null),
    Field::new("lrg", Kind::Text(check_lrg_community), Fallback::Null),
    // built-in attributes, overwritten during derivation
    Field::new("type", Kind::Discarded, Fallback::Null),
    Field::new("peer_as", Kind::Discarded, Fallback::Null),
];

const fn community(name: &'static str) -> Field {
    Field::section(name, COMMUNITY)
}

const COMMUNITIES: &[Field] = &[
    community("origin_present_in_as_set"),
    community("origin_not_present_in_as_set"),
    community("prefix_present_in_as_set"),
    community("prefix_not_present_in_as_set"),
    community("roa_valid"),
    community("roa_invalid"),
    community("roa_unknown"),
    community("blackholing"),
    community("do_not_announce_to_any"),
    community("do_not_announce_to_peer"),
    community("announce_to_peer"),
    community("prepend_once_to_any"),
    community("prepend_twice_to_any"),
    community("prepend_thrice_to_any"),
    community("prepend_once_to_peer"),
    community("prepend_twice_to_peer"),
    community("prepend_thrice_to_peer"),
];

const CFG: &[Field] = &[
    Field::new("rs_as", Kind::Asn, Fallback::Required),
    Field::new("router_id", Kind::Ipv4, Fallback::Required),
    Field::new("prepend_rs_as", Kind::Bool, Fallback::Bool(false)),
    Field::new("path_hiding", Kind::Bool, Fallback::Bool(true)),
    Field::new("passive", Kind::Bool, Fallback::Bool(true)),
    Field::new("gtsm", Kind::Bool, Fallback::Bool(false)),
    Field::new("add_path", Kind::Bool, Fallback::Bool(false)),
    Field::section("filtering", FILTERING),
    Field::section("blackhole_filtering", BLACKHOLE_FILTERING),
    Field::section("communities", COMMUNITIES),
];

/// Root of `general.yml`
pub(crate) const DOCUMENT: &[Field] = &[Field::new("cfg", Kind::Section(CFG), Fallback::Required)];

#[derive(Deserialize)]
pub(crate) struct GeneralDocument {
    pub cfg: GeneralConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{load_general, Input};

    fn load(yaml: &str) -> Result<GeneralConfig, crate::errors::BuildError> {
        load_general(&Input::Document(serde_yaml_ng::from_str(yaml).unwrap()))
    }

    #[test]
    fn test_schema_lists_every_community() {
        assert_eq!(COMMUNITIES.len(), COMMUNITIES_SCHEMA.len());
        for (field, def) in COMMUNITIES.iter().zip(COMMUNITIES_SCHEMA) {
            assert_eq!(field.name, def.name);
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = load("cfg: {rs_as: 999, router_id: 192.0.2.2}").unwrap();
        assert_eq!(cfg.rs_as, 999);
        assert!(cfg.path_hiding);
        assert_eq!(cfg.filtering.next_hop_policy, NextHopPolicy::Strict);
        assert_eq!(cfg.filtering.ipv6_pref_len, PrefixLenRange { min: 12, max: 48 });
        assert_eq!(cfg.filtering.transit_free.action, TransitFreeAction::Reject);
        assert_eq!(cfg.filtering.max_prefix.general_limit_ipv4, 170000);
        assert!(cfg.filtering.max_prefix.action.is_none());
        assert!(!cfg.filtering.rpki.enabled);
        assert_eq!(cfg.communities.len(), COMMUNITIES_SCHEMA.len());
        assert!(cfg.communities.values().all(|c| !c.is_set()));
    }

    #[test]
    fn test_community_attributes_come_from_schema() {
        let mut cfg = load(
            r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  communities:
    blackholing: {std: "65535:666", type: outbound, peer_as: true}
    do_not_announce_to_peer: {std: "0:peer_as", lrg: "999:0:peer_as", type: outbound, peer_as: false}
"#,
        )
        .unwrap();
        cfg.apply_community_schema();

        for def in COMMUNITIES_SCHEMA {
            let comm = &cfg.communities[def.name];
            assert_eq!(comm.direction, def.direction, "{}", def.name);
            assert_eq!(comm.peer_as, def.peer_as, "{}", def.name);
        }
        assert_eq!(cfg.communities["blackholing"].std.as_deref(), Some("65535:666"));
    }

    #[test]
    fn test_community_errors() {
        let err = load(
            r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  communities:
    blackholing: {std: "65535:666"}
    do_not_announce_to_any: {std: "65535:666"}
    announce_to_peer: {std: "999:1"}
    roa_valid: {ext: "xx:1:2"}
    unknown_comm: {std: "1:1"}
"#,
        )
        .unwrap_err();
        let text = err.to_string();
        // schema errors are reported before cross-field ones
        assert!(text.contains("cfg.communities.roa_valid.ext"));
        assert!(text.contains("cfg.communities.unknown_comm: unknown field"));
    }

    #[test]
    fn test_cross_field_errors() {
        let err = load(
            r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  filtering:
    ipv4_pref_len: {min: 25, max: 24}
  blackhole_filtering:
    policy_ipv6: rewrite-next-hop
  communities:
    blackholing: {std: "65535:666"}
    do_not_announce_to_any: {std: "65535:666"}
    announce_to_peer: {std: "999:1"}
"#,
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("cfg.filtering.ipv4_pref_len"));
        assert!(text.contains("cfg.blackhole_filtering.rewrite_next_hop_ipv6"));
        assert!(text.contains("already used by 'blackholing'"));
        assert!(text.contains("cfg.communities.announce_to_peer.std"));
    }

    #[test]
    fn test_community_formats() {
        assert!(check_std_community("65535:666").is_ok());
        assert!(check_std_community("0:peer_as").is_ok());
        assert!(check_std_community("65536:1").is_err());
        assert!(check_lrg_community("4200000000:1:2").is_ok());
        assert!(check_lrg_community("1:2").is_err());
        assert!(check_ext_community("rt:65501:1").is_ok());
        assert!(check_ext_community("xx:65501:1").is_err());
    }
}
