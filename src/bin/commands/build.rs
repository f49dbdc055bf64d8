use clap::{Args, ValueEnum};
use rsgen::{BuildInputs, ConfigBuilder, IpVersion, RsgenConfig, TargetProfile};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Copy, ValueEnum)]
pub enum IpVer {
    #[value(name = "4")]
    V4,
    #[value(name = "6")]
    V6,
}

impl From<IpVer> for IpVersion {
    fn from(v: IpVer) -> Self {
        match v {
            IpVer::V4 => IpVersion::V4,
            IpVer::V6 => IpVersion::V6,
        }
    }
}

/// Arguments shared by the build commands
#[derive(Args)]
pub struct BuildCmdArgs {
    /// General configuration file
    #[clap(long, default_value = "general.yml")]
    pub general: PathBuf,

    /// Clients configuration file
    #[clap(long, default_value = "clients.yml")]
    pub clients: PathBuf,

    /// Bogons configuration file
    #[clap(long, default_value = "bogons.yml")]
    pub bogons: PathBuf,

    /// ASNs configuration file, by default the `asns` section of the clients file
    #[clap(long)]
    pub asns: Option<PathBuf>,

    /// ROAs configuration file
    #[clap(long)]
    pub roas: Option<PathBuf>,

    /// IP version of the configuration, both when omitted
    #[clap(long, value_enum)]
    pub ip_ver: Option<IpVer>,

    /// Compatibility issue IDs to ignore, `*` for all of them
    #[clap(long, value_delimiter = ',')]
    pub ignore_issues: Vec<String>,

    /// `.local` files to include (OpenBGPD)
    #[clap(long, value_delimiter = ',')]
    pub local_files: Vec<String>,

    /// Directory of the `.local` files on the route server
    #[clap(long)]
    pub local_files_dir: Option<PathBuf>,

    /// Template directory, by default `<templates_dir>/<target>` from the rsgen configuration
    #[clap(long)]
    pub template_dir: Option<PathBuf>,

    /// Main template file name
    #[clap(long)]
    pub template_file_name: Option<String>,

    /// Enable the live tests hooks of the templates
    #[clap(long)]
    pub live_tests: bool,

    /// Output file, stdout when omitted
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Run the whole build but don't write the result
    #[clap(long)]
    pub test_only: bool,
}

/// Returns false when the build failed
pub fn run(config: &RsgenConfig, target: TargetProfile, args: BuildCmdArgs) -> bool {
    match build(config, target, args) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            false
        }
    }
}

fn build(config: &RsgenConfig, target: TargetProfile, args: BuildCmdArgs) -> anyhow::Result<()> {
    let ip_ver = args.ip_ver.map(IpVersion::from);

    // the builder expects an existing cache directory, the configured one is ours
    std::fs::create_dir_all(&config.cache_dir)?;

    let mut build_args = config
        .build_args(target)
        .with_ip_ver(ip_ver)
        .with_ignore_issues(args.ignore_issues)
        .with_local_files(args.local_files)
        .with_live_tests(args.live_tests);
    if let Some(dir) = args.template_dir {
        build_args = build_args.with_template_dir(dir);
    }
    if let Some(name) = &args.template_file_name {
        build_args = build_args.with_template_name(name);
    }
    if let Some(dir) = args.local_files_dir {
        build_args = build_args.with_local_files_dir(dir);
    }

    let mut inputs = BuildInputs::new(args.general, args.bogons, args.clients);
    if let Some(asns) = args.asns {
        inputs = inputs.with_asns(asns);
    }
    if let Some(roas) = args.roas {
        inputs = inputs.with_roas(roas);
    }

    let builder = ConfigBuilder::new(target, build_args, inputs)?;

    if args.test_only {
        builder.render_to_string()?;
        info!("{} configuration built successfully, nothing written", target);
        return Ok(());
    }

    match args.output {
        Some(path) => {
            // rendered first so a failed build leaves no file behind
            let rendered = builder.render_to_string()?;
            std::fs::write(&path, rendered)?;
            info!("{} configuration written to {}", target, path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            builder.render(&mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cmd {
        #[clap(flatten)]
        args: BuildCmdArgs,
    }

    #[test]
    fn test_ip_ver_values() {
        assert!(Cmd::try_parse_from(["rsgen", "--ip-ver", "5"]).is_err());
        let cmd = Cmd::try_parse_from(["rsgen", "--ip-ver", "6"]).unwrap();
        assert!(matches!(cmd.args.ip_ver, Some(IpVer::V6)));
        let cmd = Cmd::try_parse_from(["rsgen"]).unwrap();
        assert!(cmd.args.ip_ver.is_none());
    }
}
