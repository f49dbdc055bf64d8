//! IRR lookups through `bgpq3`

use super::IrrResolver;
use crate::policy::{IpVersion, IrrPrefix};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

pub const DEFAULT_BGPQ3_HOST: &str = "rr.ntt.net";
pub const DEFAULT_BGPQ3_SOURCES: &str =
    "RIPE,APNIC,AFRINIC,ARIN,NTTCOM,ALTDB,BBOI,BELL,JPIRR,LEVEL3,RADB,RGNET,SAVVIS,TC";

/// Runs the `bgpq3` program and parses its JSON output
#[derive(Debug, Clone)]
pub struct Bgpq3 {
    pub path: PathBuf,
    pub host: String,
    pub sources: String,
}

impl Default for Bgpq3 {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bgpq3"),
            host: DEFAULT_BGPQ3_HOST.to_string(),
            sources: DEFAULT_BGPQ3_SOURCES.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct AsnList {
    asn_list: Vec<u32>,
}

#[derive(Deserialize)]
struct PrefixList {
    prefix_list: Vec<PrefixEntry>,
}

#[derive(Deserialize)]
struct PrefixEntry {
    prefix: String,
    exact: bool,
    #[serde(rename = "greater-equal")]
    greater_equal: Option<u8>,
    #[serde(rename = "less-equal")]
    less_equal: Option<u8>,
}

impl PrefixEntry {
    fn into_prefix(self) -> Result<IrrPrefix> {
        let (addr, len) = self
            .prefix
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid prefix '{}'", self.prefix))?;
        let prefix: IpAddr = addr
            .parse()
            .with_context(|| format!("invalid prefix '{}'", self.prefix))?;
        let length: u8 = len
            .parse()
            .with_context(|| format!("invalid prefix '{}'", self.prefix))?;
        let (min_length, max_length) = if self.exact {
            (length, length)
        } else {
            let width = if prefix.is_ipv4() { 32 } else { 128 };
            (
                self.greater_equal.unwrap_or(length),
                self.less_equal.unwrap_or(width),
            )
        };
        Ok(IrrPrefix {
            prefix,
            length,
            min_length,
            max_length,
        })
    }
}

impl Bgpq3 {
    pub fn new(path: impl Into<PathBuf>, host: &str, sources: &str) -> Self {
        Self {
            path: path.into(),
            host: host.to_string(),
            sources: sources.to_string(),
        }
    }

    fn run(&self, args: &[&str], name: &str) -> Result<String> {
        debug!("running {} {} {}", self.path.display(), args.join(" "), name);
        let output = Command::new(&self.path)
            .args(["-h", &self.host, "-S", &self.sources])
            .args(args)
            .arg(name)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("can't run {}", self.path.display()))?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with {} while resolving {}: {}",
                self.path.display(),
                output.status,
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_asn_list(output: &str) -> Result<Vec<u32>> {
    let list: AsnList =
        serde_json::from_str(output).context("unexpected bgpq3 output for the ASN list")?;
    Ok(list.asn_list)
}

fn parse_prefix_list(output: &str) -> Result<Vec<IrrPrefix>> {
    let list: PrefixList =
        serde_json::from_str(output).context("unexpected bgpq3 output for the prefix list")?;
    list.prefix_list
        .into_iter()
        .map(PrefixEntry::into_prefix)
        .collect()
}

impl IrrResolver for Bgpq3 {
    fn origin_asns(&self, name: &str) -> Result<Vec<u32>> {
        let output = self.run(&["-3", "-j", "-t", "-l", "asn_list"], name)?;
        parse_asn_list(&output).with_context(|| format!("resolving origins of {}", name))
    }

    fn prefixes(&self, name: &str, ip_ver: IpVersion) -> Result<Vec<IrrPrefix>> {
        let family = match ip_ver {
            IpVersion::V4 => "-4",
            IpVersion::V6 => "-6",
        };
        let output = self.run(&["-3", "-j", "-A", family, "-l", "prefix_list"], name)?;
        parse_prefix_list(&output).with_context(|| format!("resolving prefixes of {}", name))
    }
}
