#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! rsgen - route server configuration builder
//!
//! rsgen turns a declarative routing policy (general options, bogons, clients,
//! AS-SETs and optional ROAs, all YAML) into the configuration of a BGP route
//! server daemon. A build goes through four stages:
//!
//! 1. **validation**: every document is checked against its schema and missing
//!    options are filled with defaults or inherited from the general policy;
//! 2. **enrichment**: AS-SETs are expanded through IRR databases (bgpq3) and
//!    max-prefix limits are taken from PeeringDB, with results kept in an
//!    expiring on-disk cache;
//! 3. **compatibility check**: features the target daemon can't express are
//!    reported as issues, fatal unless listed in the ignore list;
//! 4. **rendering**: the configuration is rendered through Jinja-style templates.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table output for cache listings | `tabled`, `chrono-humanize` |
//! | `cli` | The `rsgen` binary | All above + `clap`, `tracing-subscriber` |
//!
//! ```toml
//! # Library only
//! rsgen = { version = "0.4", default-features = false }
//!
//! # Default (CLI binary)
//! rsgen = "0.4"
//! ```
//!
//! # Architecture
//!
//! - **[`policy`]**: input documents, their schemas and the validated [`ConfigTree`]
//! - **[`cache`]**: the on-disk cache of external data
//! - **[`resolvers`]**: IRR and PeeringDB clients behind the [`IrrResolver`] and
//!   [`PeeringDbResolver`] traits
//! - **[`enrich`]**: the enrichment pipeline
//! - **[`target`]**: what each daemon supports
//! - **[`render`]**: template environment and context
//! - **[`builder`]**: [`ConfigBuilder`], which drives all of the above
//! - **[`config`]**: the rsgen settings file
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rsgen::{BuildArgs, BuildInputs, ConfigBuilder, IpVersion, TargetProfile};
//!
//! let args = BuildArgs::new()
//!     .with_template_dir("templates/bird")
//!     .with_cache_dir("/var/cache/rsgen")
//!     .with_ip_ver(Some(IpVersion::V4));
//! let inputs = BuildInputs::new("general.yml", "bogons.yml", "clients.yml");
//!
//! let builder = ConfigBuilder::new(TargetProfile::Bird, args, inputs)?;
//! builder.render(&mut std::io::stdout())?;
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod policy;
pub mod render;
pub mod resolvers;
pub mod target;

// =============================================================================
// Build
// =============================================================================

pub use builder::{BuildArgs, BuildInputs, ConfigBuilder};
pub use errors::{BuildError, EnrichError, FieldError, Issue};
pub use target::{Severity, TargetProfile};

// =============================================================================
// Configuration
// =============================================================================

pub use config::RsgenConfig;
pub use policy::{ConfigTree, Input, IpVersion, IrrPrefix, IrrSet};

// =============================================================================
// External data
// =============================================================================

pub use cache::{CachedRecordMeta, ObjectCache, StalePolicy};
pub use resolvers::{Bgpq3, IrrResolver, PeeringDbApi, PeeringDbNet, PeeringDbResolver};
