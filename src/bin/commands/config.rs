use clap::Args;
use rsgen::{RsgenConfig, TargetProfile};
use std::path::Path;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also show the template directory of every target
    #[clap(short, long)]
    pub verbose: bool,
}

/// `config_path` is the file the configuration was loaded from
pub fn run(config: &RsgenConfig, config_path: &str, args: ConfigArgs) -> bool {
    println!("{}", report(config, config_path, args.verbose));
    true
}

fn report(config: &RsgenConfig, config_path: &str, verbose: bool) -> String {
    let mut lines = vec![
        format!("Config File:        {}", config_path),
        config.summary(),
    ];

    if verbose {
        lines.push(String::new());
        for target in [
            TargetProfile::Bird,
            TargetProfile::OpenBgpd,
            TargetProfile::TemplateContext,
        ] {
            let dir = config.template_dir(target);
            let status = if Path::new(&dir).is_dir() {
                "found"
            } else {
                "missing"
            };
            lines.push(format!(
                "{:<19} {} ({})",
                format!("{}:", target),
                dir.display(),
                status
            ));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_shows_loaded_file() {
        let config = RsgenConfig::default();
        let out = report(&config, "/srv/rsgen/custom.toml", false);
        assert!(out.starts_with("Config File:        /srv/rsgen/custom.toml\n"));
        assert!(!out.contains("openbgpd:"));

        let out = report(&config, "/srv/rsgen/custom.toml", true);
        assert!(out.contains("openbgpd:"));
    }
}
