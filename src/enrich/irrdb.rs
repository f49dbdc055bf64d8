//! AS-SET expansion
//!
//! Every client is filtered against one or more AS-SETs: its own `irrdb.as_sets`,
//! else those listed for its ASN in the `asns` section, else its own ASN used as a
//! set. Each distinct set is resolved once per build, whatever the number of
//! clients referencing it.

use super::{resolve_all, stage_result, EnrichContext, Enricher};
use crate::errors::EnrichError;
use crate::policy::{Client, ConfigTree, IpVersion, IrrPrefix, IrrSet};
use itertools::Itertools;
use std::collections::BTreeSet;

/// Names of the AS-SETs used for a client
fn client_as_sets(tree: &ConfigTree, client: &Client) -> Vec<String> {
    let own = &client.cfg.filtering.irrdb.as_sets;
    if !own.is_empty() {
        return own.iter().unique().cloned().collect();
    }
    match tree.asns.as_sets_for(client.asn) {
        Some(sets) => sets.iter().unique().cloned().collect(),
        None => vec![format!("AS{}", client.asn)],
    }
}

/// Names of the sets whose data is needed, for clients matching `wanted`
fn wanted_sets(tree: &ConfigTree, wanted: impl Fn(&Client) -> bool) -> Vec<String> {
    let tag = tree.general.filtering.irrdb.tag_as_set;
    tree.clients
        .clients
        .iter()
        .filter(|c| tag || wanted(c))
        .flat_map(|c| client_as_sets(tree, c))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Resolves the origin ASNs of every AS-SET and assigns `as_set_ids` to the clients
pub struct IrrOriginAsns;

impl Enricher for IrrOriginAsns {
    fn name(&self) -> &'static str {
        "IRR origin ASNs"
    }

    fn enrich(&self, tree: &mut ConfigTree, ctx: &EnrichContext) -> Result<(), EnrichError> {
        let assignments: Vec<Vec<String>> = tree
            .clients
            .clients
            .iter()
            .map(|c| client_as_sets(tree, c))
            .collect();
        for (client, names) in tree.clients.clients.iter_mut().zip(assignments) {
            client.cfg.filtering.irrdb.as_set_ids = names.iter().map(|n| IrrSet::id_for(n)).collect();
            for name in names {
                tree.as_sets
                    .entry(IrrSet::id_for(&name))
                    .or_insert_with(|| IrrSet {
                        name,
                        ..Default::default()
                    });
            }
        }

        let names = wanted_sets(tree, |c| c.cfg.filtering.irrdb.enforce_origin_in_as_set);
        let (resolved, failures) = resolve_all(ctx.pool, names, |name| {
            ctx.cache
                .get_or_fetch(&format!("irr:origins:{}", name), || {
                    ctx.irr.origin_asns(name)
                })
        });
        for (name, asns) in resolved {
            if let Some(set) = tree.as_sets.get_mut(&IrrSet::id_for(&name)) {
                set.asns = asns.into_iter().sorted().dedup().collect();
            }
        }
        stage_result(self.name(), failures)
    }
}

/// Resolves the route entries of every AS-SET, for the address families of the build
pub struct IrrPrefixes;

struct PrefixLookup {
    name: String,
    ip_ver: IpVersion,
}

impl std::fmt::Display for PrefixLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (IPv{})", self.name, self.ip_ver)
    }
}

impl Enricher for IrrPrefixes {
    fn name(&self) -> &'static str {
        "IRR prefixes"
    }

    fn enrich(&self, tree: &mut ConfigTree, ctx: &EnrichContext) -> Result<(), EnrichError> {
        let lookups: Vec<PrefixLookup> = wanted_sets(tree, |c| {
            c.cfg.filtering.irrdb.enforce_prefix_in_as_set
        })
        .into_iter()
        .cartesian_product(ctx.ip_versions())
        .map(|(name, ip_ver)| PrefixLookup { name, ip_ver })
        .collect();

        let (resolved, failures) = resolve_all(ctx.pool, lookups, |lookup| {
            ctx.cache.get_or_fetch::<Vec<IrrPrefix>, _>(
                &format!("irr:prefixes{}:{}", lookup.ip_ver, lookup.name),
                || ctx.irr.prefixes(&lookup.name, lookup.ip_ver),
            )
        });
        for (lookup, prefixes) in resolved {
            if let Some(set) = tree.as_sets.get_mut(&IrrSet::id_for(&lookup.name)) {
                set.prefixes.extend(prefixes);
            }
        }
        stage_result(self.name(), failures)
    }
}

#[cfg(test)]
mod tests {
    use crate::enrich::tests::{run, tree};
    use crate::policy::IpVersion;
    use crate::resolvers::stubs::{StubIrr, StubPeeringDb};
    use tempfile::TempDir;

    const CLIENTS: &str = r#"
asns:
  AS65502: {as_sets: [AS-TWO]}
clients:
  - {asn: 65501, ip: 192.0.2.11, cfg: {filtering: {irrdb: {as_sets: [AS-ONE, AS-SHARED]}}}}
  - {asn: 65501, ip: 2001:db8::11, cfg: {filtering: {irrdb: {as_sets: [AS-SHARED]}}}}
  - {asn: 65502, ip: 192.0.2.21}
  - {asn: 65503, ip: 192.0.2.31}
"#;

    fn irr() -> StubIrr {
        StubIrr::default()
            .with_set("AS-ONE", &[65501, 65511], &["198.51.100.0/24"])
            .with_set("AS-SHARED", &[65501], &["203.0.113.0/24", "2001:db8:100::/48"])
            .with_set("AS-TWO", &[65502, 65502], &["192.0.2.128/25"])
            .with_set("AS65503", &[65503], &[])
    }

    #[test]
    fn test_as_set_ids_and_resolution() {
        let mut tree = tree("cfg: {rs_as: 999, router_id: 192.0.2.2}", CLIENTS);
        let dir = TempDir::new().unwrap();
        let irr = irr();
        run(&mut tree, &dir, &irr, &StubPeeringDb::default(), Some(IpVersion::V4)).unwrap();

        let ids: Vec<&Vec<String>> = tree
            .clients
            .clients
            .iter()
            .map(|c| &c.cfg.filtering.irrdb.as_set_ids)
            .collect();
        assert_eq!(ids[0], &vec!["AS_SET_AS_ONE", "AS_SET_AS_SHARED"]);
        assert_eq!(ids[1], &vec!["AS_SET_AS_SHARED"]);
        assert_eq!(ids[2], &vec!["AS_SET_AS_TWO"]);
        assert_eq!(ids[3], &vec!["AS_SET_AS65503"]);

        assert_eq!(tree.as_sets.len(), 4);
        assert_eq!(tree.as_sets["AS_SET_AS_TWO"].asns, vec![65502]);
        assert_eq!(tree.as_sets["AS_SET_AS_SHARED"].name, "AS-SHARED");
        // IPv4 build: IPv6 routes are not fetched
        assert_eq!(tree.as_sets["AS_SET_AS_SHARED"].prefixes.len(), 1);

        // 4 sets, origins + IPv4 prefixes, each resolved once
        assert_eq!(irr.calls(), 8);
    }

    #[test]
    fn test_warm_cache_skips_lookups() {
        let dir = TempDir::new().unwrap();
        let irr = irr();

        let mut first = tree("cfg: {rs_as: 999, router_id: 192.0.2.2}", CLIENTS);
        run(&mut first, &dir, &irr, &StubPeeringDb::default(), None).unwrap();
        assert_eq!(irr.calls(), 12);

        let mut second = tree("cfg: {rs_as: 999, router_id: 192.0.2.2}", CLIENTS);
        run(&mut second, &dir, &irr, &StubPeeringDb::default(), None).unwrap();
        assert_eq!(irr.calls(), 12);
        assert_eq!(first.as_sets, second.as_sets);
        assert_eq!(second.as_sets["AS_SET_AS_SHARED"].prefixes.len(), 2);
    }

    #[test]
    fn test_only_needed_sets_are_resolved() {
        let general = r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  filtering:
    irrdb: {tag_as_set: false}
"#;
        let clients = r#"
clients:
  - {asn: 65501, ip: 192.0.2.11, cfg: {filtering: {irrdb: {as_sets: [AS-ONE], enforce_origin_in_as_set: true}}}}
  - {asn: 65503, ip: 192.0.2.31}
"#;
        let mut tree = tree(general, clients);
        let dir = TempDir::new().unwrap();
        let irr = irr();
        run(&mut tree, &dir, &irr, &StubPeeringDb::default(), Some(IpVersion::V4)).unwrap();

        // origins of AS-ONE only, no prefixes
        assert_eq!(irr.calls(), 1);
        assert_eq!(tree.as_sets["AS_SET_AS_ONE"].asns, vec![65501, 65511]);
        assert!(tree.as_sets["AS_SET_AS65503"].asns.is_empty());
    }
}
