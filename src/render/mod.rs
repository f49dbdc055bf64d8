//! Template rendering
//!
//! Templates are loaded from a directory and rendered with strict undefined
//! behaviour: referencing a missing variable or attribute is an error rather
//! than an empty string. Blocks are trimmed (`trim_blocks`, `lstrip_blocks`) so
//! control statements don't leave blank lines in the output, and the final
//! newline of a template is kept.

use crate::errors::BuildError;
use crate::policy::{
    AsnsConfig, Bogon, Client, ConfigTree, GeneralConfig, IpVersion, IrrSet, RoasConfig,
};
use minijinja::{path_loader, Environment, Error, ErrorKind, UndefinedBehavior, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

pub type FilterFn = Arc<dyn Fn(Value) -> Result<Value, Error> + Send + Sync>;
pub type TestFn = Arc<dyn Fn(Value) -> Result<bool, Error> + Send + Sync>;

pub enum HelperKind {
    Filter(FilterFn),
    Test(TestFn),
}

/// A named filter or test made available to templates
pub struct Helper {
    pub name: &'static str,
    pub kind: HelperKind,
}

impl Helper {
    pub fn filter<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Helper {
            name,
            kind: HelperKind::Filter(Arc::new(f)),
        }
    }

    pub fn test<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(Value) -> Result<bool, Error> + Send + Sync + 'static,
    {
        Helper {
            name,
            kind: HelperKind::Test(Arc::new(f)),
        }
    }
}

fn parse_ip(value: &Value) -> Result<IpAddr, Error> {
    value
        .as_str()
        .and_then(|s| s.parse::<IpAddr>().ok())
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("{} is not an IP address", value),
            )
        })
}

/// `ipaddr_ver` filter, `current_ipver` test and `community_is_set` filter
pub fn common_helpers(ip_ver: Option<IpVersion>) -> Vec<Helper> {
    vec![
        Helper::filter("ipaddr_ver", |value| {
            parse_ip(&value).map(|ip| Value::from(IpVersion::of(&ip).number()))
        }),
        Helper::test("current_ipver", move |value| {
            let ip = parse_ip(&value)?;
            Ok(ip_ver.map_or(true, |v| IpVersion::of(&ip) == v))
        }),
        Helper::filter("community_is_set", |value| {
            if value.is_none() || value.is_undefined() {
                return Ok(Value::from(false));
            }
            let mut set = false;
            for key in ["std", "ext", "lrg"] {
                set |= value.get_attr(key)?.is_true();
            }
            Ok(Value::from(set))
        }),
    ]
}

/// The variables templates are rendered with
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext<'a> {
    pub ip_ver: Option<u8>,
    pub cfg: &'a GeneralConfig,
    pub bogons: &'a [Bogon],
    pub clients: &'a [Client],
    pub asns: &'a AsnsConfig,
    pub as_sets: &'a BTreeMap<String, IrrSet>,
    pub roas: Option<&'a RoasConfig>,
    pub live_tests: bool,
}

impl<'a> TemplateContext<'a> {
    pub fn new(tree: &'a ConfigTree, ip_ver: Option<IpVersion>, live_tests: bool) -> Self {
        TemplateContext {
            ip_ver: ip_ver.map(IpVersion::number),
            cfg: &tree.general,
            bogons: &tree.bogons.bogons,
            clients: &tree.clients.clients,
            asns: &tree.asns,
            as_sets: &tree.as_sets,
            roas: tree.roas.as_ref(),
            live_tests,
        }
    }
}

/// A template environment rooted at one directory
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new(template_dir: &Path, helpers: Vec<Helper>) -> Result<Self, BuildError> {
        if !template_dir.is_dir() {
            return Err(BuildError::MissingDir(template_dir.to_path_buf()));
        }
        let mut env = Environment::new();
        env.set_loader(path_loader(template_dir));
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        for helper in helpers {
            match helper.kind {
                HelperKind::Filter(f) => {
                    env.add_filter(helper.name, move |value: Value| f(value));
                }
                HelperKind::Test(t) => {
                    env.add_test(helper.name, move |value: Value| t(value));
                }
            }
        }
        Ok(Self { env })
    }

    /// Whether `name` exists and parses
    pub fn check_template(&self, name: &str) -> Result<(), BuildError> {
        self.env.get_template(name)?;
        Ok(())
    }

    pub fn render_to_string(&self, name: &str, ctx: &TemplateContext) -> Result<String, BuildError> {
        let tmpl = self.env.get_template(name)?;
        Ok(tmpl.render(ctx)?)
    }

    pub fn render_to_writer<W: Write>(
        &self,
        name: &str,
        ctx: &TemplateContext,
        writer: W,
    ) -> Result<(), BuildError> {
        let tmpl = self.env.get_template(name)?;
        tmpl.render_to_write(ctx, writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::tests::tree;
    use std::fs;
    use tempfile::TempDir;

    fn renderer(templates: &[(&str, &str)], ip_ver: Option<IpVersion>) -> (TempDir, TemplateRenderer) {
        let dir = TempDir::new().unwrap();
        for (name, body) in templates {
            fs::write(dir.path().join(name), body).unwrap();
        }
        let renderer = TemplateRenderer::new(dir.path(), common_helpers(ip_ver)).unwrap();
        (dir, renderer)
    }

    fn sample() -> ConfigTree {
        tree(
            r#"
cfg:
  rs_as: 999
  router_id: 192.0.2.2
  communities:
    blackholing: {std: "65535:666"}
"#,
            r#"
clients:
  - {asn: 65501, ip: 192.0.2.11}
  - {asn: 65502, ip: "2001:db8::12"}
"#,
        )
    }

    #[test]
    fn test_render_with_helpers() {
        let (_dir, r) = renderer(
            &[(
                "main.j2",
                "{% for c in clients if c.ip is current_ipver %}\n{{ c.id }} v{{ c.ip|ipaddr_ver }}\n{% endfor %}{% for name in ['blackholing', 'roa_valid'] %}\n{{ name }}: {{ 'set' if cfg.communities[name]|community_is_set else 'unset' }}\n{% endfor %}",
            )],
            Some(IpVersion::V4),
        );
        let tree = sample();
        let out = r
            .render_to_string("main.j2", &TemplateContext::new(&tree, Some(IpVersion::V4), false))
            .unwrap();
        assert_eq!(out, "AS65501_1 v4\nblackholing: set\nroa_valid: unset\n");
    }

    #[test]
    fn test_undefined_is_an_error() {
        let (_dir, r) = renderer(&[("main.j2", "{{ cfg.no_such_option }}\n")], None);
        let tree = sample();
        let err = r
            .render_to_string("main.j2", &TemplateContext::new(&tree, None, false))
            .unwrap_err();
        assert!(matches!(err, BuildError::Render { .. }));
    }

    #[test]
    fn test_defined_but_empty_values_render() {
        let (_dir, r) = renderer(
            &[(
                "main.j2",
                "{% if cfg.communities.roa_valid.std is none %}unset{% endif %}:{% for b in bogons %}{{ b.prefix }}{% endfor %}:{{ as_sets|length }}",
            )],
            None,
        );
        let tree = sample();
        let out = r
            .render_to_string("main.j2", &TemplateContext::new(&tree, None, false))
            .unwrap();
        assert_eq!(out, "unset::0");
    }

    #[test]
    fn test_missing_template() {
        let (_dir, r) = renderer(&[], None);
        assert!(r.check_template("main.j2").is_err());
        assert!(TemplateRenderer::new(Path::new("/nonexistent"), vec![]).is_err());
    }

    #[test]
    fn test_render_to_writer() {
        let (_dir, r) = renderer(&[("main.j2", "{{ cfg.rs_as }}")], None);
        let tree = sample();
        let mut out = vec![];
        r.render_to_writer("main.j2", &TemplateContext::new(&tree, None, false), &mut out)
            .unwrap();
        assert_eq!(out, b"999");
    }
}
