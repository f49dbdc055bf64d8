//! Persistent cache for external data
//!
//! Results of IRR and PeeringDB lookups are stored as JSON records under the cache
//! directory and reused across builds until they expire. Within a build, each key
//! is resolved at most once, even when several workers ask for it concurrently.

mod file_cache;

pub use file_cache::{CachedRecord, CachedRecordMeta, ObjectCache};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default record lifetime (12 hours)
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(12 * 60 * 60);

/// What to do when an expired record can't be refreshed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// The lookup fails
    #[default]
    Fail,
    /// The expired payload is served and a warning is logged
    UseStale,
}

impl fmt::Display for StalePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalePolicy::Fail => write!(f, "fail"),
            StalePolicy::UseStale => write!(f, "use-stale"),
        }
    }
}

impl FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(StalePolicy::Fail),
            "use-stale" => Ok(StalePolicy::UseStale),
            _ => Err(format!(
                "invalid stale policy '{}': expected 'fail' or 'use-stale'",
                s
            )),
        }
    }
}
