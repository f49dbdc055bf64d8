use crate::builder::BuildArgs;
use crate::errors::{BuildError, Issue};
use crate::policy::{ConfigTree, TransitFreeAction};

pub(super) fn preconditions(args: &BuildArgs) -> Result<(), BuildError> {
    if args.ip_ver.is_none() {
        return Err(BuildError::InvalidArgument(
            "an explicit target IP version is needed to build BIRD configuration, \
             use --ip-ver to supply one"
                .to_string(),
        ));
    }
    Ok(())
}

pub(super) fn check_compatibility(tree: &ConfigTree) -> Vec<Issue> {
    let mut issues = vec![];
    let action = tree.general.filtering.transit_free.action;
    if action == TransitFreeAction::Shutdown {
        issues.push(Issue::new(
            "transit_free_action",
            format!(
                "Transit free ASNs policy is configured with 'action' = '{}' but \
                 BIRD filters can't tear sessions down; routes will be rejected instead.",
                action
            ),
        ));
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::tests::tree;
    use crate::policy::IpVersion;

    #[test]
    fn test_ip_version_is_required() {
        assert!(preconditions(&BuildArgs::new()).is_err());
        assert!(preconditions(&BuildArgs::new().with_ip_ver(Some(IpVersion::V6))).is_ok());
    }

    #[test]
    fn test_transit_free_shutdown() {
        let clients = "clients: []";
        let ok = tree(
            "cfg: {rs_as: 999, router_id: 192.0.2.2, filtering: {transit_free: {action: warning}}}",
            clients,
        );
        assert!(check_compatibility(&ok).is_empty());

        let shutdown = tree(
            "cfg: {rs_as: 999, router_id: 192.0.2.2, filtering: {transit_free: {action: shutdown}}}",
            clients,
        );
        let ids: Vec<&str> = check_compatibility(&shutdown).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["transit_free_action"]);
    }
}
