//! PeeringDB `net` records

use super::PeeringDbResolver;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_PEERINGDB_URL: &str = "https://www.peeringdb.com/api";

/// The part of a PeeringDB network record used to set max-prefix limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringDbNet {
    pub asn: u32,
    #[serde(default)]
    pub info_prefixes4: Option<u32>,
    #[serde(default)]
    pub info_prefixes6: Option<u32>,
}

#[derive(Deserialize)]
struct NetResponse {
    data: Vec<PeeringDbNet>,
}

/// PeeringDB REST API client
#[derive(Debug, Clone)]
pub struct PeeringDbApi {
    pub base_url: String,
}

impl Default for PeeringDbApi {
    fn default() -> Self {
        Self::new(DEFAULT_PEERINGDB_URL)
    }
}

impl PeeringDbApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn net_url(&self, asn: u32) -> String {
        format!("{}/net?asn={}", self.base_url, asn)
    }
}

impl PeeringDbResolver for PeeringDbApi {
    fn net(&self, asn: u32) -> Result<Option<PeeringDbNet>> {
        let url = self.net_url(asn);
        debug!("fetching {}", url);
        let resp = ureq::get(&url).call()?.body_mut().read_json::<NetResponse>()?;
        Ok(resp.data.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_url() {
        let api = PeeringDbApi::new("https://example.com/api/");
        assert_eq!(api.net_url(3333), "https://example.com/api/net?asn=3333");
    }

    #[test]
    fn test_parse_response() {
        let resp: NetResponse = serde_json::from_str(
            r#"{"data": [{"id": 1, "asn": 3333, "name": "RIPE NCC", "info_prefixes4": 10, "info_prefixes6": null}], "meta": {}}"#,
        )
        .unwrap();
        assert_eq!(
            resp.data,
            vec![PeeringDbNet {
                asn: 3333,
                info_prefixes4: Some(10),
                info_prefixes6: None,
            }]
        );

        let empty: NetResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(empty.data.is_empty());
    }
}
