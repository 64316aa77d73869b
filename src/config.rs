//! Static project configuration.
//!
//! The configuration is read once from `min.config.json` merged over the
//! `minConfig` key of `package.json`, interpolated (`{{src}}`, `{{dest}}`,
//! ...) and then consulted read-only by the resolver and the compilers.

use std::collections::BTreeMap;
use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::request::RequestType;

/// Name of the project configuration file.
pub const CONFIG_FILENAME: &str = "min.config.json";

/// Name of the IDE project file which is mirrored verbatim into dest.
pub const PROJECT_FILENAME: &str = "project.config.json";

static RE_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").expect("valid regex"));

/// Source and destination folders inside a component package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    pub src: String,
    pub dest: String,
    /// Entry file name of a package referenced by its bare name.
    pub default: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmConfig {
    /// Scope of the project's own component packages, e.g. `@b1`.
    pub scope: String,
    /// Name of the package store folder.
    pub src: String,
    /// Destination of packages and npm modules, relative to the project.
    pub dest: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub px2rpx: bool,
    pub rem2rpx: bool,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            px2rpx: true,
            rem2rpx: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute project root.
    pub cwd: Utf8PathBuf,
    pub prefix: String,
    /// Prefix with a trailing dash, e.g. `bee-`.
    pub prefix_str: String,
    pub src: Utf8PathBuf,
    pub dest: Utf8PathBuf,
    pub pages: Utf8PathBuf,
    pub packages: Utf8PathBuf,
    pub package: PackageConfig,
    pub home_page: String,
    pub layout_placeholder: String,
    pub npm: NpmConfig,
    /// Alias name to a path relative to the project root.
    pub alias: BTreeMap<String, Utf8PathBuf>,
    pub unit: UnitConfig,
    /// Project wide style variables prepended to preprocessed styles.
    pub style: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomConfig {
    prefix: Option<String>,
    src: Option<String>,
    dest: Option<String>,
    pages: Option<String>,
    packages: Option<String>,
    package: Option<CustomPackage>,
    home_page: Option<String>,
    layout: Option<CustomLayout>,
    npm: Option<CustomNpm>,
    alias: Option<BTreeMap<String, String>>,
    unit: Option<UnitConfig>,
    style: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomPackage {
    src: Option<String>,
    dest: Option<String>,
    default: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomLayout {
    placeholder: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomNpm {
    scope: Option<String>,
    src: Option<String>,
    dest: Option<String>,
}

impl Config {
    /// Default configuration rooted at `cwd`.
    pub fn new(cwd: impl Into<Utf8PathBuf>) -> Self {
        Self::from_custom(cwd.into(), CustomConfig::default())
            .expect("default configuration only uses known variables")
    }

    /// Reads `package.json` and `min.config.json` from `cwd`.
    pub fn load(cwd: impl Into<Utf8PathBuf>) -> Result<Self, ConfigError> {
        let cwd = cwd.into();

        let mut merged = Value::Object(Default::default());
        let pkg_path = cwd.join("package.json");
        if pkg_path.is_file() {
            let pkg = read_json(&pkg_path)?;
            if let Some(min) = pkg.get("minConfig") {
                merge_json(&mut merged, min.clone());
            }
        }
        let file_path = cwd.join(CONFIG_FILENAME);
        if file_path.is_file() {
            merge_json(&mut merged, read_json(&file_path)?);
        }

        let custom = serde_json::from_value(merged).map_err(|e| ConfigError::Json(file_path, e))?;
        Self::from_custom(cwd, custom)
    }

    fn from_custom(cwd: Utf8PathBuf, custom: CustomConfig) -> Result<Self, ConfigError> {
        let mut vars = BTreeMap::new();

        let prefix = custom.prefix.unwrap_or_else(|| "bee".into());
        let prefix_str = if prefix.ends_with('-') {
            prefix.clone()
        } else {
            format!("{prefix}-")
        };
        vars.insert("prefix", prefix.clone());

        let src = interpolate(&custom.src.unwrap_or_else(|| "src".into()), &vars)?;
        vars.insert("src", src.clone());
        let dest = interpolate(&custom.dest.unwrap_or_else(|| "dist".into()), &vars)?;
        vars.insert("dest", dest.clone());
        let pages = interpolate(&custom.pages.unwrap_or_else(|| "{{src}}/pages".into()), &vars)?;
        vars.insert("pages", pages.clone());
        let packages = interpolate(
            &custom.packages.unwrap_or_else(|| "{{src}}/packages".into()),
            &vars,
        )?;
        vars.insert("packages", packages.clone());

        let package = custom.package.unwrap_or_default();
        let package = PackageConfig {
            src: interpolate(&package.src.unwrap_or_else(|| "src".into()), &vars)?,
            dest: interpolate(&package.dest.unwrap_or_else(|| "dist".into()), &vars)?,
            default: package.default.unwrap_or_else(|| "index".into()),
        };

        let npm = custom.npm.unwrap_or_default();
        let npm = NpmConfig {
            scope: npm.scope.unwrap_or_else(|| "@b1".into()),
            src: npm.src.unwrap_or_else(|| "node_modules".into()),
            dest: interpolate(
                &npm.dest.unwrap_or_else(|| "{{dest}}/{{packages}}".into()),
                &vars,
            )?
            .into(),
        };

        let mut alias = BTreeMap::new();
        for (name, target) in [
            ("common", "{{src}}/common"),
            ("layout", "{{src}}/common/layout"),
            ("assets", "{{src}}/common/assets"),
            ("components", "{{src}}/common/components"),
            ("pages", "{{pages}}"),
        ] {
            alias.insert(name.to_string(), interpolate(target, &vars)?.into());
        }
        for (name, target) in custom.alias.unwrap_or_default() {
            alias.insert(name, interpolate(&target, &vars)?.into());
        }
        alias.insert(npm.scope.clone(), packages.clone().into());

        let style = custom
            .style
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s)),
                Value::Number(n) => Some((key, n.to_string())),
                Value::Bool(b) => Some((key, b.to_string())),
                _ => {
                    tracing::warn!("ignoring non-scalar style variable '{}'", key);
                    None
                }
            })
            .collect();

        Ok(Self {
            cwd,
            prefix,
            prefix_str,
            src: src.into(),
            dest: dest.into(),
            pages: pages.into(),
            packages: packages.into(),
            package,
            home_page: custom.home_page.unwrap_or_else(|| "pages/home/index".into()),
            layout_placeholder: custom
                .layout
                .and_then(|layout| layout.placeholder)
                .unwrap_or_else(|| "<page></page>".into()),
            npm,
            alias,
            unit: custom.unit.unwrap_or_default(),
            style,
        })
    }

    pub fn src_dir(&self) -> Utf8PathBuf {
        self.cwd.join(&self.src)
    }

    pub fn dest_dir(&self) -> Utf8PathBuf {
        self.cwd.join(&self.dest)
    }

    pub fn pages_dir(&self) -> Utf8PathBuf {
        self.cwd.join(&self.pages)
    }

    pub fn packages_dir(&self) -> Utf8PathBuf {
        self.cwd.join(&self.packages)
    }

    pub fn npm_dir(&self) -> Utf8PathBuf {
        self.cwd.join(&self.npm.src)
    }

    /// Path relative to the project root, or the path itself when it lies
    /// outside of it.
    pub fn relative<'a>(&self, path: &'a Utf8Path) -> &'a Utf8Path {
        path.strip_prefix(&self.cwd).unwrap_or(path)
    }

    /// Name of the runtime constructor a single-file source is wrapped in.
    pub fn constructor(&self, request_type: RequestType) -> Option<&'static str> {
        match request_type {
            RequestType::Component => Some("Component"),
            RequestType::Page => Some("Page"),
            RequestType::App => Some("App"),
            _ => None,
        }
    }
}

fn read_json(path: &Utf8Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Json(path.to_owned(), e))
}

/// Recursively merges `over` into `base`, objects key by key.
pub(crate) fn merge_json(base: &mut Value, over: Value) {
    match (base, over) {
        (Value::Object(base), Value::Object(over)) => {
            for (key, value) in over {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, over) => *base = over,
    }
}

fn interpolate(input: &str, vars: &BTreeMap<&str, String>) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in RE_VARIABLE.captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = vars
            .get(name.as_str())
            .ok_or_else(|| ConfigError::UnknownVariable(name.as_str().into()))?;
        out.push_str(&input[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}
