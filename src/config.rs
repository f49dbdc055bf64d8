use crate::builder::{BuildArgs, DEFAULT_THREADS};
use crate::cache::{StalePolicy, DEFAULT_CACHE_EXPIRY};
use crate::resolvers::{DEFAULT_BGPQ3_HOST, DEFAULT_BGPQ3_SOURCES, DEFAULT_PEERINGDB_URL};
use crate::target::TargetProfile;
use anyhow::{anyhow, Result};
use config::Config;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every build, read from `~/.rsgen/rsgen.toml` and `RSGEN_*`
/// environment variables
#[derive(Debug, Clone)]
pub struct RsgenConfig {
    /// Path to the directory holding rsgen's data
    pub data_dir: String,

    /// Directory of cached IRR and PeeringDB records
    pub cache_dir: String,

    /// Records older than this are fetched again (default: 12 hours)
    pub cache_expiry: Duration,

    pub stale_policy: StalePolicy,

    /// Root of the template directories, one per target
    pub templates_dir: String,

    pub bgpq3_path: String,
    pub bgpq3_host: String,
    pub bgpq3_sources: String,

    pub peeringdb_url: String,

    /// Enrichment workers
    pub threads: usize,
}

const EMPTY_CONFIG: &str = r#"### rsgen configuration file

### directory for data used by rsgen
# data_dir = "~/.rsgen"

### cache of IRR and PeeringDB records
# cache_dir = "~/.rsgen/cache"
# cache_expiry = "12h"
### what to do when a record is expired and can't be fetched again: fail, use-stale
# stale_policy = "fail"

### template directories, one sub-directory per target (bird, openbgpd, ...)
# templates_dir = "~/.rsgen/templates"

### IRR queries
# bgpq3_path = "bgpq3"
# bgpq3_host = "rr.ntt.net"
# bgpq3_sources = "RIPE,APNIC,AFRINIC,ARIN,NTTCOM,ALTDB,BBOI,BELL,JPIRR,LEVEL3,RADB,RGNET,SAVVIS,TC"

# peeringdb_url = "https://www.peeringdb.com/api"
# threads = 4
"#;

fn default_data_dir() -> String {
    let home_dir = dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string());
    format!("{}/.rsgen", home_dir)
}

impl Default for RsgenConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            cache_dir: format!("{}/cache", data_dir),
            templates_dir: format!("{}/templates", data_dir),
            data_dir,
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            stale_policy: StalePolicy::default(),
            bgpq3_path: "bgpq3".to_string(),
            bgpq3_host: DEFAULT_BGPQ3_HOST.to_string(),
            bgpq3_sources: DEFAULT_BGPQ3_SOURCES.to_string(),
            peeringdb_url: DEFAULT_PEERINGDB_URL.to_string(),
            threads: DEFAULT_THREADS,
        }
    }
}

impl RsgenConfig {
    /// Load the configuration from `path`, or from the default location
    ///
    /// A missing file is created with every option commented out.
    pub fn new(path: &Option<String>) -> Result<RsgenConfig> {
        let mut builder = Config::builder();

        let file = match path {
            Some(p) => PathBuf::from(p),
            None => {
                let dir = default_data_dir();
                std::fs::create_dir_all(&dir)
                    .map_err(|e| anyhow!("Unable to create rsgen directory: {}", e))?;
                PathBuf::from(Self::config_file_path())
            }
        };
        if file.exists() {
            let path_str = file
                .to_str()
                .ok_or_else(|| anyhow!("Could not convert path to string"))?;
            builder = builder.add_source(
                config::File::with_name(path_str).format(config::FileFormat::Toml),
            );
        } else {
            std::fs::write(&file, EMPTY_CONFIG).map_err(|e| {
                anyhow!("Unable to create config file {}: {}", file.display(), e)
            })?;
        }

        // E.g., `RSGEN_CACHE_EXPIRY=1h rsgen build ...` shortens the cache lifetime
        builder = builder.add_source(config::Environment::with_prefix("RSGEN"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;
        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config)
    }

    fn from_map(config: &HashMap<String, String>) -> Result<RsgenConfig> {
        let defaults = RsgenConfig::default();
        let get = |key: &str, default: &str| -> String {
            config
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let data_dir = get("data_dir", &defaults.data_dir)
            .trim_end_matches('/')
            .to_string();
        let cache_dir = get("cache_dir", &format!("{}/cache", data_dir));
        let templates_dir = get("templates_dir", &format!("{}/templates", data_dir));

        let cache_expiry = match config.get("cache_expiry") {
            Some(s) => humantime::parse_duration(s)
                .map_err(|e| anyhow!("Invalid cache_expiry '{}': {}", s, e))?,
            None => defaults.cache_expiry,
        };
        let stale_policy = match config.get("stale_policy") {
            Some(s) => s
                .parse::<StalePolicy>()
                .map_err(|e| anyhow!("Invalid stale_policy: {}", e))?,
            None => defaults.stale_policy,
        };
        let threads = match config.get("threads") {
            Some(s) => match s.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(anyhow!("Invalid threads '{}': expected a positive number", s)),
            },
            None => defaults.threads,
        };

        Ok(RsgenConfig {
            cache_dir,
            templates_dir,
            data_dir,
            cache_expiry,
            stale_policy,
            bgpq3_path: get("bgpq3_path", &defaults.bgpq3_path),
            bgpq3_host: get("bgpq3_host", &defaults.bgpq3_host),
            bgpq3_sources: get("bgpq3_sources", &defaults.bgpq3_sources),
            peeringdb_url: get("peeringdb_url", &defaults.peeringdb_url),
            threads,
        })
    }

    /// Template directory of one target
    pub fn template_dir(&self, target: TargetProfile) -> PathBuf {
        Path::new(&self.templates_dir).join(target.name())
    }

    /// Build arguments seeded with these settings
    pub fn build_args(&self, target: TargetProfile) -> BuildArgs {
        BuildArgs::new()
            .with_template_dir(self.template_dir(target))
            .with_cache_dir(&self.cache_dir)
            .with_cache_expiry(self.cache_expiry)
            .with_stale_policy(self.stale_policy)
            .with_bgpq3(&self.bgpq3_path, &self.bgpq3_host, &self.bgpq3_sources)
            .with_peeringdb_url(&self.peeringdb_url)
            .with_threads(self.threads)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Data Directory:     {}", self.data_dir),
            format!("Cache Directory:    {}", self.cache_dir),
            format!(
                "Cache Expiry:       {}",
                humantime::format_duration(self.cache_expiry)
            ),
            format!("Stale Policy:       {}", self.stale_policy),
            format!("Templates:          {}", self.templates_dir),
            format!(
                "bgpq3:              {} -h {} -S {}",
                self.bgpq3_path, self.bgpq3_host, self.bgpq3_sources
            ),
            format!("PeeringDB API:      {}", self.peeringdb_url),
            format!("Threads:            {}", self.threads),
        ]
        .join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        format!("{}/rsgen.toml", default_data_dir())
    }
}
