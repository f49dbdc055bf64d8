use clap::{Parser, Subcommand};
use rsgen::{RsgenConfig, TargetProfile};
use tracing::Level;

mod commands;

use commands::build::BuildCmdArgs;
use commands::cache::CacheCommands;
use commands::config::ConfigArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.rsgen/rsgen.toml is used
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    /// Only print errors
    #[clap(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a BIRD configuration
    Bird(BuildCmdArgs),

    /// Build an OpenBGPD configuration
    Openbgpd(BuildCmdArgs),

    /// Dump the variables templates are rendered with
    TemplateContext(BuildCmdArgs),

    /// Inspect or clear the IRR/PeeringDB cache
    Cache {
        #[clap(subcommand)]
        commands: CacheCommands,
    },

    /// Show the effective rsgen configuration
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match RsgenConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let ok = match cli.command {
        Commands::Bird(args) => commands::build::run(&config, TargetProfile::Bird, args),
        Commands::Openbgpd(args) => commands::build::run(&config, TargetProfile::OpenBgpd, args),
        Commands::TemplateContext(args) => {
            commands::build::run(&config, TargetProfile::TemplateContext, args)
        }
        Commands::Cache { commands } => commands::cache::run(&config, commands),
        Commands::Config(args) => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(RsgenConfig::config_file_path);
            commands::config::run(&config, &path, args)
        }
    };
    if !ok {
        std::process::exit(1);
    }
}
