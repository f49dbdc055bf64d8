//! Build orchestration
//!
//! A [`ConfigBuilder`] runs the whole pipeline for one target daemon:
//!
//! 1. argument, directory and cache checks, target preconditions;
//! 2. validation and derivation of the policy documents;
//! 3. enrichment with IRR and PeeringDB data;
//! 4. compatibility check against the target;
//! 5. template rendering.
//!
//! Steps 1 and 2 run in [`ConfigBuilder::new`], so a builder always holds a valid
//! configuration. The output is produced in memory and only written out once the
//! whole build succeeded.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsgen::{BuildArgs, BuildInputs, ConfigBuilder, IpVersion, TargetProfile};
//!
//! let args = BuildArgs::new()
//!     .with_template_dir("templates/bird")
//!     .with_cache_dir("/var/cache/rsgen")
//!     .with_ip_ver(Some(IpVersion::V4));
//! let inputs = BuildInputs::new("general.yml", "bogons.yml", "clients.yml");
//! let builder = ConfigBuilder::new(TargetProfile::Bird, args, inputs)?;
//! let config = builder.render_to_string()?;
//! ```

use crate::cache::{ObjectCache, StalePolicy, DEFAULT_CACHE_EXPIRY};
use crate::enrich::{run_pipeline, EnrichContext};
use crate::errors::{BuildError, Issue};
use crate::policy::{
    load_asns, load_bogons, load_clients, load_general, load_roas, ConfigTree, Input, IpVersion,
};
use crate::render::{common_helpers, TemplateContext, TemplateRenderer};
use crate::resolvers::{
    Bgpq3, IrrResolver, PeeringDbApi, PeeringDbResolver, DEFAULT_BGPQ3_HOST,
    DEFAULT_BGPQ3_SOURCES, DEFAULT_PEERINGDB_URL,
};
use crate::target::{classify, Severity, TargetProfile};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const DEFAULT_TEMPLATE_NAME: &str = "main.j2";
pub const DEFAULT_LOCAL_FILES_DIR: &str = "/etc/bgpd";
pub const DEFAULT_THREADS: usize = 4;

// =============================================================================
// Args
// =============================================================================

/// Options of a build
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub template_dir: Option<PathBuf>,
    pub template_name: String,
    pub cache_dir: Option<PathBuf>,
    pub cache_expiry: Duration,
    pub stale_policy: StalePolicy,
    pub bgpq3_path: PathBuf,
    pub bgpq3_host: String,
    pub bgpq3_sources: String,
    pub peeringdb_url: String,
    /// Workers used for enrichment
    pub threads: usize,
    /// Address family of the generated configuration; `None` for both
    pub ip_ver: Option<IpVersion>,
    /// Compatibility issue IDs to downgrade to warnings; `*` for all
    pub ignore_issues: Vec<String>,
    pub live_tests: bool,
    /// `.local` files to include (OpenBGPD)
    pub local_files: Vec<String>,
    pub local_files_dir: PathBuf,
}

impl Default for BuildArgs {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildArgs {
    pub fn new() -> Self {
        Self {
            template_dir: None,
            template_name: DEFAULT_TEMPLATE_NAME.to_string(),
            cache_dir: None,
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            stale_policy: StalePolicy::default(),
            bgpq3_path: PathBuf::from("bgpq3"),
            bgpq3_host: DEFAULT_BGPQ3_HOST.to_string(),
            bgpq3_sources: DEFAULT_BGPQ3_SOURCES.to_string(),
            peeringdb_url: DEFAULT_PEERINGDB_URL.to_string(),
            threads: DEFAULT_THREADS,
            ip_ver: None,
            ignore_issues: vec![],
            live_tests: false,
            local_files: vec![],
            local_files_dir: PathBuf::from(DEFAULT_LOCAL_FILES_DIR),
        }
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = Some(dir.into());
        self
    }

    pub fn with_template_name(mut self, name: &str) -> Self {
        self.template_name = name.to_string();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_cache_expiry(mut self, expiry: Duration) -> Self {
        self.cache_expiry = expiry;
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_bgpq3(mut self, path: impl Into<PathBuf>, host: &str, sources: &str) -> Self {
        self.bgpq3_path = path.into();
        self.bgpq3_host = host.to_string();
        self.bgpq3_sources = sources.to_string();
        self
    }

    pub fn with_peeringdb_url(mut self, url: &str) -> Self {
        self.peeringdb_url = url.to_string();
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_ip_ver(mut self, ip_ver: Option<IpVersion>) -> Self {
        self.ip_ver = ip_ver;
        self
    }

    pub fn with_ignore_issues(mut self, ids: Vec<String>) -> Self {
        self.ignore_issues = ids;
        self
    }

    pub fn with_live_tests(mut self, live_tests: bool) -> Self {
        self.live_tests = live_tests;
        self
    }

    pub fn with_local_files(mut self, ids: Vec<String>) -> Self {
        self.local_files = ids;
        self
    }

    pub fn with_local_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_files_dir = dir.into();
        self
    }
}

/// The policy documents of a build
#[derive(Debug, Clone)]
pub struct BuildInputs {
    pub general: Input,
    pub bogons: Input,
    pub clients: Input,
    /// Defaults to the `asns` section of the clients document
    pub asns: Option<Input>,
    pub roas: Option<Input>,
}

impl BuildInputs {
    pub fn new(general: impl Into<Input>, bogons: impl Into<Input>, clients: impl Into<Input>) -> Self {
        Self {
            general: general.into(),
            bogons: bogons.into(),
            clients: clients.into(),
            asns: None,
            roas: None,
        }
    }

    pub fn with_asns(mut self, asns: impl Into<Input>) -> Self {
        self.asns = Some(asns.into());
        self
    }

    pub fn with_roas(mut self, roas: impl Into<Input>) -> Self {
        self.roas = Some(roas.into());
        self
    }

    fn check_exist(&self) -> Result<(), BuildError> {
        for input in [&self.general, &self.bogons, &self.clients]
            .into_iter()
            .chain(self.asns.as_ref())
            .chain(self.roas.as_ref())
        {
            input.check_exists()?;
        }
        Ok(())
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct ConfigBuilder {
    target: TargetProfile,
    args: BuildArgs,
    /// Validated and derived, not yet enriched
    tree: ConfigTree,
    cache: ObjectCache,
    renderer: TemplateRenderer,
    irr: Arc<dyn IrrResolver>,
    peeringdb: Arc<dyn PeeringDbResolver>,
}

impl ConfigBuilder {
    /// Check the arguments and load the configuration
    pub fn new(
        target: TargetProfile,
        args: BuildArgs,
        inputs: BuildInputs,
    ) -> Result<Self, BuildError> {
        let template_dir = args
            .template_dir
            .clone()
            .ok_or(BuildError::MissingArgument("template_dir"))?;
        let cache_dir = args
            .cache_dir
            .clone()
            .ok_or(BuildError::MissingArgument("cache_dir"))?;
        if args.threads == 0 {
            return Err(BuildError::InvalidArgument(
                "the number of threads must be at least 1".to_string(),
            ));
        }
        if !template_dir.is_dir() {
            return Err(BuildError::MissingDir(template_dir));
        }
        let template_path = template_dir.join(&args.template_name);
        if !template_path.is_file() {
            return Err(BuildError::MissingFile(template_path));
        }
        if !cache_dir.is_dir() {
            return Err(BuildError::MissingDir(cache_dir));
        }
        inputs.check_exist()?;

        let cache = ObjectCache::new(&cache_dir, args.cache_expiry, args.stale_policy)?;
        cache.check_writable()?;

        target.preconditions(&args)?;

        let mut helpers = common_helpers(args.ip_ver);
        helpers.extend(target.template_helpers(&args));
        let renderer = TemplateRenderer::new(&template_dir, helpers)?;
        renderer.check_template(&args.template_name)?;

        let general = load_general(&inputs.general)?;
        let bogons = load_bogons(&inputs.bogons)?;
        let asns = load_asns(inputs.asns.as_ref().unwrap_or(&inputs.clients))?;
        let clients = load_clients(&inputs.clients, &general)?;
        let roas = inputs.roas.as_ref().map(load_roas).transpose()?;
        let tree = ConfigTree::derive(general, bogons, asns, clients, roas);
        info!(
            "{} configuration loaded: {} clients, {} bogons",
            target,
            tree.clients.clients.len(),
            tree.bogons.bogons.len()
        );

        let irr = Arc::new(Bgpq3::new(
            args.bgpq3_path.clone(),
            &args.bgpq3_host,
            &args.bgpq3_sources,
        ));
        let peeringdb = Arc::new(PeeringDbApi::new(&args.peeringdb_url));

        Ok(Self {
            target,
            args,
            tree,
            cache,
            renderer,
            irr,
            peeringdb,
        })
    }

    pub fn with_irr_resolver(mut self, resolver: Arc<dyn IrrResolver>) -> Self {
        self.irr = resolver;
        self
    }

    pub fn with_peeringdb_resolver(mut self, resolver: Arc<dyn PeeringDbResolver>) -> Self {
        self.peeringdb = resolver;
        self
    }

    pub fn target(&self) -> TargetProfile {
        self.target
    }

    /// The validated configuration, before enrichment
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// A copy of the configuration completed with external data
    pub fn enrich(&self) -> Result<ConfigTree, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.args.threads)
            .build()
            .map_err(|e| BuildError::InvalidArgument(format!("can't start workers: {}", e)))?;

        let mut tree = self.tree.clone();
        let ctx = EnrichContext {
            cache: &self.cache,
            irr: self.irr.as_ref(),
            peeringdb: self.peeringdb.as_ref(),
            pool: &pool,
            ip_ver: self.args.ip_ver,
        };

        let start = Instant::now();
        info!("started processing configuration for {}", self.target);
        run_pipeline(&mut tree, &ctx)?;
        info!(
            "configuration processing completed after {:.2?}",
            start.elapsed()
        );
        Ok(tree)
    }

    /// Check the enriched configuration against the target
    ///
    /// Issues in the ignore list are logged and returned; any other issue fails
    /// the build.
    pub fn check_compatibility(&self, tree: &ConfigTree) -> Result<Vec<Issue>, BuildError> {
        let mut warnings = vec![];
        let mut fatal = vec![];
        for issue in self.target.check_compatibility(tree) {
            match classify(issue.id, &self.args.ignore_issues) {
                Severity::Warning => {
                    warn!("{} - this error has been ignored", issue);
                    warnings.push(issue);
                }
                Severity::Fatal => {
                    error!(
                        "{} - you can ignore this issue using the ignore list (--ignore-issues {})",
                        issue, issue.id
                    );
                    fatal.push(issue);
                }
            }
        }
        if fatal.is_empty() {
            Ok(warnings)
        } else {
            Err(BuildError::Compatibility(fatal))
        }
    }

    /// Run enrichment, the compatibility check and rendering
    pub fn render_to_string(&self) -> Result<String, BuildError> {
        let tree = self.enrich()?;
        self.check_compatibility(&tree)?;

        let start = Instant::now();
        info!(
            "started template rendering for {}",
            self.args.template_name
        );
        let ctx = TemplateContext::new(&tree, self.args.ip_ver, self.args.live_tests);
        let out = self
            .renderer
            .render_to_string(&self.args.template_name, &ctx)?;
        info!("template rendering completed after {:.2?}", start.elapsed());
        Ok(out)
    }

    /// Build and write the result; nothing is written if the build fails
    pub fn render(&self, out: &mut dyn Write) -> Result<(), BuildError> {
        let rendered = self.render_to_string()?;
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
