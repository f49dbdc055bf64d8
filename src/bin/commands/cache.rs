use chrono_humanize::HumanTime;
use clap::Subcommand;
use rsgen::{CachedRecordMeta, ObjectCache, RsgenConfig};
use std::path::Path;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List the cached records
    List,

    /// Remove cached records
    Clear {
        /// Only remove the expired ones
        #[clap(long)]
        expired: bool,
    },
}

#[derive(Tabled)]
struct CacheRow {
    key: String,
    cached: String,
    status: &'static str,
}

impl CacheRow {
    fn new(meta: &CachedRecordMeta, expiry: Duration) -> Self {
        CacheRow {
            key: meta.key.clone(),
            cached: HumanTime::from(meta.cached_at).to_string(),
            status: if meta.is_fresh(expiry) {
                "fresh"
            } else {
                "expired"
            },
        }
    }
}

pub fn run(config: &RsgenConfig, commands: CacheCommands) -> bool {
    let cache = match ObjectCache::new(
        Path::new(&config.cache_dir),
        config.cache_expiry,
        config.stale_policy,
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return false;
        }
    };

    match commands {
        CacheCommands::List => match cache.list() {
            Ok(records) => {
                if records.is_empty() {
                    println!("cache is empty: {}", cache.dir().display());
                    return true;
                }
                let rows: Vec<CacheRow> = records
                    .iter()
                    .map(|m| CacheRow::new(m, cache.expiry()))
                    .collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
                true
            }
            Err(e) => {
                eprintln!("ERROR: unable to list cache records: {}", e);
                false
            }
        },
        CacheCommands::Clear { expired } => {
            let result = if expired {
                cache.clear_expired()
            } else {
                cache.clear_all()
            };
            match result {
                Ok(n) => {
                    println!("{} record(s) removed from {}", n, cache.dir().display());
                    true
                }
                Err(e) => {
                    eprintln!("ERROR: unable to clear cache: {}", e);
                    false
                }
            }
        }
    }
}
