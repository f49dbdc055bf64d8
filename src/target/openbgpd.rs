//! OpenBGPD profile
//!
//! The generated configuration has no path hiding mitigation, no RPKI support,
//! no ADD-PATH, no large communities and only `shutdown`/`restart` max-prefix
//! actions. Operators can also hook their own `.local` files into the output at
//! fixed points.

use super::short_list;
use crate::builder::BuildArgs;
use crate::errors::{BuildError, Issue};
use crate::policy::general::{MaxPrefixAction, COMMUNITIES_SCHEMA};
use crate::policy::{BlackholePolicy, CommunityDirection, ConfigTree, TransitFreeAction};
use crate::render::Helper;
use minijinja::{Error, ErrorKind, Value};
use std::path::PathBuf;

/// Points of the configuration where `.local` files can be included
pub const LOCAL_FILES_IDS: &[&str] = &[
    "header",
    "pre-irrdb",
    "post-irrdb",
    "pre-clients",
    "post-clients",
    "client",
    "pre-filters",
    "post-filters",
    "footer",
];

pub(super) fn preconditions(args: &BuildArgs) -> Result<(), BuildError> {
    for id in &args.local_files {
        if !LOCAL_FILES_IDS.contains(&id.as_str()) {
            return Err(BuildError::InvalidArgument(format!(
                "the .local file ID '{}' is invalid, valid IDs are: {}",
                id,
                LOCAL_FILES_IDS.join(", ")
            )));
        }
    }
    Ok(())
}

/// `communit{y|ies}`-style plural helper
fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

pub(super) fn check_compatibility(tree: &ConfigTree) -> Vec<Issue> {
    let general = &tree.general;
    let mut issues = vec![];

    if general.path_hiding {
        issues.push(Issue::new(
            "path_hiding",
            "The 'path_hiding' general configuration parameter is set to True, but the \
             configuration generated for OpenBGPD does not support path-hiding mitigation \
             techniques.",
        ));
    }

    let action = general.filtering.transit_free.action;
    if action != TransitFreeAction::Reject {
        issues.push(Issue::new(
            "transit_free_action",
            format!(
                "Transit free ASNs policy is configured with 'action' = '{}' but only \
                 'reject' is supported for OpenBGPD.",
                action
            ),
        ));
    }

    if general.filtering.rpki.enabled {
        issues.push(Issue::new(
            "rpki",
            "RPKI-based filtering is configured but not supported by OpenBGPD.",
        ));
    }

    let mut add_path = vec![];
    let mut max_prefix_action = vec![];
    for client in &tree.clients.clients {
        if client.cfg.add_path {
            add_path.push(client.ip.to_string());
        }
        if matches!(
            client.cfg.filtering.max_prefix.action,
            Some(MaxPrefixAction::Block) | Some(MaxPrefixAction::Warning)
        ) {
            max_prefix_action.push(client.ip.to_string());
        }
    }
    if !add_path.is_empty() {
        issues.push(Issue::new(
            "add_path",
            format!(
                "ADD_PATH not supported by OpenBGPD but enabled for the following clients: {}.",
                short_list(&add_path)
            ),
        ));
    }
    if !max_prefix_action.is_empty() {
        issues.push(Issue::new(
            "max_prefix_action",
            format!(
                "Invalid max-prefix 'action' for the following clients: {}; only 'shutdown' \
                 and 'restart' are supported by OpenBGPD.",
                short_list(&max_prefix_action)
            ),
        ));
    }

    if general.blackhole_filtering.policy_ipv6 == Some(BlackholePolicy::RewriteNextHop) {
        issues.push(Issue::new(
            "blackhole_filtering_rewrite_ipv6_nh",
            "Next-hop rewriting of IPv6 blackhole routes is affected by an OpenBGPD issue \
             when 'blackhole_filtering.policy_ipv6' is 'rewrite-next-hop'.",
        ));
    }

    let mut only_large = vec![];
    let mut peer_as_ext = vec![];
    for def in COMMUNITIES_SCHEMA {
        let Some(comm) = general.communities.get(def.name) else {
            continue;
        };
        if let (Some(lrg), None, None) = (&comm.lrg, &comm.std, &comm.ext) {
            only_large.push((def.name, lrg.as_str()));
        }
        if let Some(ext) = &comm.ext {
            if def.peer_as && def.direction == CommunityDirection::Inbound {
                peer_as_ext.push((def.name, ext.as_str()));
            }
        }
    }

    if !only_large.is_empty() {
        let n = only_large.len();
        let names: Vec<String> = only_large.iter().map(|c| c.0.to_string()).collect();
        let comms: Vec<String> = only_large.iter().map(|c| c.1.to_string()).collect();
        issues.push(Issue::new(
            "large_communities",
            format!(
                "The communit{} '{}' ha{} been configured to be implemented using only the \
                 large communit{} '{}'; large communities are not supported by OpenBGPD so \
                 the function{} {} cover{} will be not available.",
                plural(n, "y", "ies"),
                short_list(&names),
                plural(n, "s", "ve"),
                plural(n, "y", "ies"),
                short_list(&comms),
                plural(n, "", "s"),
                plural(n, "it", "they"),
                plural(n, "s", ""),
            ),
        ));
    }

    if !peer_as_ext.is_empty() {
        let n = peer_as_ext.len();
        let names: Vec<String> = peer_as_ext.iter().map(|c| c.0.to_string()).collect();
        let comms: Vec<String> = peer_as_ext.iter().map(|c| c.1.to_string()).collect();
        issues.push(Issue::new(
            "extended_communities",
            format!(
                "The peer-ASN-specific communit{} '{}' ha{} been configured to be implemented \
                 using the extended communit{} '{}'; peer-ASN-specific extended communities \
                 are not scrubbed from routes that leave OpenBGPD route servers and they are \
                 propagated to the route server clients.",
                plural(n, "y", "ies"),
                short_list(&names),
                plural(n, "s", "ve"),
                plural(n, "y", "ies"),
                short_list(&comms),
            ),
        ));
    }

    issues
}

/// `rt:65501:1` becomes `rt 65501:1`
fn convert_ext_comm(value: Value) -> Result<Value, Error> {
    let s = value.as_str().unwrap_or_default();
    match s.split(':').collect::<Vec<_>>().as_slice() {
        [kind, asn, val] => Ok(Value::from(format!("{} {}:{}", kind, asn, val))),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid extended community '{}'", s),
        )),
    }
}

fn include_local_file(
    value: Value,
    enabled: &[String],
    dir: &std::path::Path,
) -> Result<Value, Error> {
    let id = value.as_str().unwrap_or_default();
    if !LOCAL_FILES_IDS.contains(&id) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("local file ID '{}' is not a known .local file ID", id),
        ));
    }
    if !enabled.iter().any(|e| e == id) {
        return Ok(Value::from(""));
    }
    let path = dir.join(format!("{}.local", id));
    Ok(Value::from(format!("include \"{}\"\n\n", path.display())))
}

pub(super) fn template_helpers(args: &BuildArgs) -> Vec<Helper> {
    let enabled: Vec<String> = args.local_files.clone();
    let dir: PathBuf = args.local_files_dir.clone();
    vec![
        Helper::filter("convert_ext_comm", convert_ext_comm),
        Helper::filter("include_local_file", move |value| {
            include_local_file(value, &enabled, &dir)
        }),
    ]
}
