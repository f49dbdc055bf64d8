//! Target daemons
//!
//! A [`TargetProfile`] knows what the configuration generated for its daemon can
//! express. Preconditions are checked when the builder is created and always
//! abort the build. Compatibility issues are found on the enriched configuration
//! and can be downgraded to warnings through the ignore list.

mod bird;
mod openbgpd;

pub use openbgpd::LOCAL_FILES_IDS;

use crate::builder::BuildArgs;
use crate::errors::{BuildError, Issue};
use crate::policy::ConfigTree;
use crate::render::Helper;
use minijinja::{Error, ErrorKind, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetProfile {
    Bird,
    OpenBgpd,
    /// Dumps the template context instead of a daemon configuration
    TemplateContext,
}

/// How an issue affects the build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

/// An issue is downgraded to a warning when its id, or `*`, is in `ignore`
pub fn classify(issue_id: &str, ignore: &[String]) -> Severity {
    if ignore.iter().any(|i| i == "*" || i == issue_id) {
        Severity::Warning
    } else {
        Severity::Fatal
    }
}

impl TargetProfile {
    pub fn name(&self) -> &'static str {
        match self {
            TargetProfile::Bird => "bird",
            TargetProfile::OpenBgpd => "openbgpd",
            TargetProfile::TemplateContext => "template-context",
        }
    }

    /// Checks on the build arguments that can't be ignored
    pub fn preconditions(&self, args: &BuildArgs) -> Result<(), BuildError> {
        match self {
            TargetProfile::Bird => bird::preconditions(args),
            TargetProfile::OpenBgpd => openbgpd::preconditions(args),
            TargetProfile::TemplateContext => Ok(()),
        }
    }

    /// Features of the configuration the daemon can't implement
    pub fn check_compatibility(&self, tree: &ConfigTree) -> Vec<Issue> {
        match self {
            TargetProfile::Bird => bird::check_compatibility(tree),
            TargetProfile::OpenBgpd => openbgpd::check_compatibility(tree),
            TargetProfile::TemplateContext => vec![],
        }
    }

    /// Template filters and tests specific to the daemon
    pub fn template_helpers(&self, args: &BuildArgs) -> Vec<Helper> {
        match self {
            TargetProfile::Bird => vec![],
            TargetProfile::OpenBgpd => openbgpd::template_helpers(args),
            TargetProfile::TemplateContext => vec![Helper::filter("to_yaml", to_yaml)],
        }
    }
}

impl fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TargetProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bird" => Ok(TargetProfile::Bird),
            "openbgpd" => Ok(TargetProfile::OpenBgpd),
            "template-context" => Ok(TargetProfile::TemplateContext),
            _ => Err(format!("unknown target '{}'", s)),
        }
    }
}

fn to_yaml(value: Value) -> Result<Value, Error> {
    serde_yaml_ng::to_string(&value)
        .map(Value::from)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("to_yaml: {}", e)))
}

/// `a, b, c and 2 more`
pub(crate) fn short_list(items: &[String]) -> String {
    let mut out = items.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > 3 {
        out.push_str(&format!(" and {} more", items.len() - 3));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let ignore = vec!["rpki".to_string()];
        assert_eq!(classify("rpki", &ignore), Severity::Warning);
        assert_eq!(classify("add_path", &ignore), Severity::Fatal);
        assert_eq!(classify("add_path", &["*".to_string()]), Severity::Warning);
        assert_eq!(classify("rpki", &[]), Severity::Fatal);
    }

    #[test]
    fn test_short_list() {
        let items: Vec<String> = (1..=5).map(|i| format!("192.0.2.{}", i)).collect();
        assert_eq!(short_list(&items[..2]), "192.0.2.1, 192.0.2.2");
        assert_eq!(
            short_list(&items),
            "192.0.2.1, 192.0.2.2, 192.0.2.3 and 2 more"
        );
    }

    #[test]
    fn test_target_names() {
        for target in [
            TargetProfile::Bird,
            TargetProfile::OpenBgpd,
            TargetProfile::TemplateContext,
        ] {
            assert_eq!(target.name().parse::<TargetProfile>(), Ok(target));
        }
        assert!("quagga".parse::<TargetProfile>().is_err());
    }

    #[test]
    fn test_to_yaml() {
        let value = Value::from_serialize(serde_json::json!({"rs_as": 999}));
        assert_eq!(to_yaml(value).unwrap().as_str(), Some("rs_as: 999\n"));
    }
}
