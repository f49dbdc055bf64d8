//! Max-prefix limits from PeeringDB

use super::{resolve_all, stage_result, EnrichContext, Enricher};
use crate::errors::EnrichError;
use crate::policy::ConfigTree;
use crate::resolvers::PeeringDbNet;
use std::collections::{BTreeSet, HashMap};

/// Fills the max-prefix limits that clients left unset with the values
/// their network announces on PeeringDB
pub struct PeeringDbLimits;

impl Enricher for PeeringDbLimits {
    fn name(&self) -> &'static str {
        "PeeringDB"
    }

    fn enrich(&self, tree: &mut ConfigTree, ctx: &EnrichContext) -> Result<(), EnrichError> {
        let asns: Vec<u32> = tree
            .clients
            .clients
            .iter()
            .filter(|c| {
                let max_prefix = &c.cfg.filtering.max_prefix;
                max_prefix.peering_db
                    && (max_prefix.limit_ipv4.is_none() || max_prefix.limit_ipv6.is_none())
            })
            .map(|c| c.asn)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (resolved, failures) = resolve_all(ctx.pool, asns, |asn| {
            ctx.cache
                .get_or_fetch::<Option<PeeringDbNet>, _>(&format!("peeringdb:net:{}", asn), || {
                    ctx.peeringdb.net(*asn)
                })
        });
        let nets: HashMap<u32, PeeringDbNet> = resolved
            .into_iter()
            .filter_map(|(asn, net)| net.map(|n| (asn, n)))
            .collect();

        for client in tree.clients.clients.iter_mut() {
            let max_prefix = &mut client.cfg.filtering.max_prefix;
            if !max_prefix.peering_db {
                continue;
            }
            let Some(net) = nets.get(&client.asn) else {
                continue;
            };
            if max_prefix.limit_ipv4.is_none() {
                max_prefix.limit_ipv4 = net.info_prefixes4.filter(|n| *n > 0);
            }
            if max_prefix.limit_ipv6.is_none() {
                max_prefix.limit_ipv6 = net.info_prefixes6.filter(|n| *n > 0);
            }
        }
        stage_result(self.name(), failures)
    }
}

#[cfg(test)]
mod tests {
    use crate::enrich::tests::{run, tree};
    use crate::resolvers::stubs::{StubIrr, StubPeeringDb};
    use tempfile::TempDir;

    #[test]
    fn test_limits_from_peeringdb() {
        let general = r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  filtering:
    irrdb: {tag_as_set: false}
    max_prefix: {peering_db: true}
"#;
        let clients = r#"
clients:
  - {asn: 65501, ip: 192.0.2.11}
  - {asn: 65501, ip: 2001:db8::11, cfg: {filtering: {max_prefix: {limit_ipv4: 50}}}}
  - {asn: 65502, ip: 192.0.2.21}
  - {asn: 65503, ip: 192.0.2.31, cfg: {filtering: {max_prefix: {peering_db: false}}}}
  - {asn: 65504, ip: 192.0.2.41}
"#;
        let mut tree = tree(general, clients);
        let dir = TempDir::new().unwrap();
        let pdb = StubPeeringDb::default()
            .with_net(65501, Some(100), Some(20))
            .with_net(65502, Some(0), None)
            .with_net(65503, Some(300), Some(30));
        run(&mut tree, &dir, &StubIrr::default(), &pdb, None).unwrap();

        let limits: Vec<(Option<u32>, Option<u32>)> = tree
            .clients
            .clients
            .iter()
            .map(|c| {
                let mp = &c.cfg.filtering.max_prefix;
                (mp.limit_ipv4, mp.limit_ipv6)
            })
            .collect();
        assert_eq!(
            limits,
            vec![
                (Some(100), Some(20)),
                // explicit value wins
                (Some(50), Some(20)),
                // zero means unknown
                (None, None),
                (None, None),
                // not on PeeringDB
                (None, None),
            ]
        );
        // 65501 is looked up once for both its clients, 65503 not at all
        assert_eq!(pdb.calls(), 3);
    }
}
