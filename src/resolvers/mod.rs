//! Clients of the external data sources
//!
//! Enrichment only talks to these traits, so tests and alternative back-ends can
//! plug their own implementation into [`crate::ConfigBuilder`].

pub mod irrdb;
pub mod peeringdb;

pub use irrdb::{Bgpq3, DEFAULT_BGPQ3_HOST, DEFAULT_BGPQ3_SOURCES};
pub use peeringdb::{PeeringDbApi, PeeringDbNet, DEFAULT_PEERINGDB_URL};

use crate::policy::{IpVersion, IrrPrefix};
use anyhow::Result;

/// Resolves AS-SETs from the IRR databases
pub trait IrrResolver: Send + Sync {
    /// Origin ASNs of the AS-SET (or of a single `AS<n>`)
    fn origin_asns(&self, name: &str) -> Result<Vec<u32>>;

    /// Route entries of one address family
    fn prefixes(&self, name: &str, ip_ver: IpVersion) -> Result<Vec<IrrPrefix>>;
}

/// Looks up network records on PeeringDB
pub trait PeeringDbResolver: Send + Sync {
    /// `None` when the ASN has no record
    fn net(&self, asn: u32) -> Result<Option<PeeringDbNet>>;
}

#[cfg(test)]
pub(crate) mod stubs {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory IRR data, counting lookups
    #[derive(Default)]
    pub struct StubIrr {
        pub origins: HashMap<String, Vec<u32>>,
        pub prefixes: HashMap<(String, IpVersion), Vec<IrrPrefix>>,
        pub calls: AtomicUsize,
    }

    impl StubIrr {
        pub fn with_set(mut self, name: &str, asns: &[u32], prefixes: &[&str]) -> Self {
            self.origins.insert(name.to_string(), asns.to_vec());
            for p in prefixes {
                let net: ipnet::IpNet = p.parse().unwrap();
                let ver = IpVersion::of(&net.addr());
                self.prefixes
                    .entry((name.to_string(), ver))
                    .or_default()
                    .push(IrrPrefix {
                        prefix: net.addr(),
                        length: net.prefix_len(),
                        min_length: net.prefix_len(),
                        max_length: net.prefix_len(),
                    });
            }
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IrrResolver for StubIrr {
        fn origin_asns(&self, name: &str) -> Result<Vec<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.origins
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("{} not found", name))
        }

        fn prefixes(&self, name: &str, ip_ver: IpVersion) -> Result<Vec<IrrPrefix>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.origins.contains_key(name) {
                return Err(anyhow!("{} not found", name));
            }
            Ok(self
                .prefixes
                .get(&(name.to_string(), ip_ver))
                .cloned()
                .unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct StubPeeringDb {
        pub nets: HashMap<u32, PeeringDbNet>,
        pub calls: AtomicUsize,
    }

    impl StubPeeringDb {
        pub fn with_net(mut self, asn: u32, v4: Option<u32>, v6: Option<u32>) -> Self {
            self.nets.insert(
                asn,
                PeeringDbNet {
                    asn,
                    info_prefixes4: v4,
                    info_prefixes6: v6,
                },
            );
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PeeringDbResolver for StubPeeringDb {
        fn net(&self, asn: u32) -> Result<Option<PeeringDbNet>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.nets.get(&asn).cloned())
        }
    }
}
