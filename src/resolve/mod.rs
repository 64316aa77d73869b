//! Resolution of textual references into [`Request`]s.
//!
//! The algorithm follows Node's: a reference is looked up in a list of
//! directories computed from its shape (alias, relative, bare), and in each
//! directory the exact file, the file with a known extension, a package
//! `main` and finally an `index` file are probed in that order.

pub mod path;

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::config::Config;
use crate::error::ResolveError;
use crate::request::{Request, RequestOptions, RequestType, dotted_ext};

use self::path::{normalize_path, src_to_dest_relative};

/// Resolver with per-session memoisation of probed paths.
#[derive(Debug)]
pub struct Resolver {
    config: Arc<Config>,
    /// `request \0 lookup paths` to the file found for them.
    path_cache: HashMap<String, Utf8PathBuf>,
    /// Package directory to its `main` field.
    main_cache: HashMap<Utf8PathBuf, Option<String>>,
}

/// A reference after its extension and classification were matched.
struct Matched {
    path: String,
    request_type: RequestType,
    exts: Vec<String>,
}

impl Resolver {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            path_cache: HashMap::new(),
            main_cache: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drops all memoised lookups.
    pub fn clear(&mut self) {
        self.path_cache.clear();
        self.main_cache.clear();
    }

    /// Resolves a reference.
    ///
    /// Returns `Ok(None)` when no file matches, which the caller treats as a
    /// missing dependency. Errors are contract violations of the caller.
    pub fn resolve(&mut self, options: &RequestOptions) -> Result<Option<Request>, ResolveError> {
        let config = self.config.clone();
        let mut request = options.request.clone();
        let mut parent = options.parent.clone();

        if request.is_empty() {
            let Some(p) = parent.take().filter(|_| options.is_main) else {
                return Err(ResolveError::EmptyRequest(options.parent.clone()));
            };
            request = format!("./{}", p.file_name().unwrap_or_default());
            parent = p.parent().map(Utf8Path::to_path_buf);
        } else if Utf8Path::new(&request).is_absolute() {
            if !options.is_main {
                return Err(ResolveError::AbsoluteRequest(request));
            }
            let abs = Utf8PathBuf::from(&request);
            request = format!("./{}", abs.file_name().unwrap_or_default());
            parent = abs.parent().map(Utf8Path::to_path_buf);
        }

        let matched = self.match_request(&request, options.request_type)?;

        let parent_dir = parent.as_deref().map(|p| {
            let p = if p.is_absolute() {
                p.to_path_buf()
            } else {
                config.cwd.join(p)
            };
            if p.is_dir() {
                p
            } else {
                p.parent().map(Utf8Path::to_path_buf).unwrap_or(p)
            }
        });

        let paths = self.lookup_paths(&matched, parent_dir.as_deref());
        let Some(src) = self.find_path(&matched, &paths) else {
            return Ok(None);
        };

        let src_relative = config.relative(&src).to_path_buf();
        let ext = dotted_ext(&src);
        let is_relative = matched.path.starts_with('.');
        let in_store = src_relative
            .components()
            .next()
            .is_some_and(|c| c.as_str() == config.npm.src);
        let is_third_npm = (in_store && ext != ".wxc") || (is_relative && options.is_third_npm);

        let dest_relative = src_to_dest_relative(&config, &src_relative, options.is_publish);
        let dest = config.cwd.join(&dest_relative);

        Ok(Some(Request {
            request: options.request.clone(),
            request_type: matched.request_type,
            src,
            src_relative,
            ext,
            dest,
            dest_relative,
            is_third_npm,
            is_publish: options.is_publish,
        }))
    }

    /// Strips `?query#hash`, then agrees extension and classification.
    fn match_request(&self, request: &str, request_type: Option<RequestType>) -> Result<Matched, ResolveError> {
        let path = match request.find(['?', '#']) {
            Some(i) => &request[..i],
            None => request,
        };

        let ext = dotted_ext(path);
        let ext_type = RequestType::from_ext(&ext);

        let (request_type, exts) = match (ext_type, request_type) {
            (None, None) => return Err(ResolveError::MissingType(request.into())),
            (None, Some(ty)) => (ty, ty.exts().into_iter().map(String::from).collect()),
            (Some(found), Some(expected)) if found != expected && !expected.exts().contains(&ext.as_str()) => {
                return Err(ResolveError::TypeMismatch {
                    request: request.into(),
                    ext,
                    expected,
                    found,
                });
            }
            (Some(found), expected) => (expected.unwrap_or(found), Vec::new()),
        };

        Ok(Matched {
            path: path.to_string(),
            request_type,
            exts,
        })
    }

    fn lookup_paths(&self, matched: &Matched, parent: Option<&Utf8Path>) -> Vec<Utf8PathBuf> {
        let config = &self.config;
        let first = first_segment(&matched.path);

        if config.alias.contains_key(first) {
            let mut paths = vec![config.cwd.clone()];
            if first == config.npm.scope {
                paths.extend(self.npm_paths(parent.unwrap_or(&config.cwd)));
            }
            return paths;
        }

        let base = parent.map(Utf8Path::to_path_buf).unwrap_or_else(|| config.src_dir());
        if matched.path.starts_with('.') {
            return vec![base];
        }

        let has_ext = !dotted_ext(&matched.path).is_empty();
        if !matched.path.starts_with('@') && has_ext && base.join(&matched.path).is_file() {
            return vec![base];
        }

        let mut paths = vec![config.packages_dir()];
        paths.extend(self.npm_paths(parent.unwrap_or(&config.cwd)));
        paths
    }

    /// Every ancestor `node_modules` from `from` upwards, innermost first,
    /// ending with the project's own store.
    fn npm_paths(&self, from: &Utf8Path) -> Vec<Utf8PathBuf> {
        let config = &self.config;
        let root = config.npm_dir();
        let mut paths = vec![];

        let Ok(rel) = from.strip_prefix(&config.cwd) else {
            return vec![root];
        };
        if !(rel.starts_with(&config.npm.src) || rel.starts_with(&config.packages)) {
            return vec![root];
        }

        let mut lookup = Utf8PathBuf::new();
        for seg in rel.components() {
            let seg = seg.as_str();
            lookup.push(seg);
            if seg == config.npm.src || seg.starts_with('@') || lookup == config.src || lookup == config.packages {
                continue;
            }
            paths.push(config.cwd.join(&lookup).join(&config.npm.src));
        }

        paths.reverse();
        paths.push(root);
        paths
    }

    fn find_path(&mut self, matched: &Matched, paths: &[Utf8PathBuf]) -> Option<Utf8PathBuf> {
        let request_type = format!("{:?}", matched.request_type);
        let exts = matched.exts.join(",");
        let key = [matched.path.as_str(), &request_type, &exts]
            .into_iter()
            .chain(paths.iter().map(|p| p.as_str()))
            .collect::<Vec<_>>()
            .join("\0");

        if let Some(hit) = self.path_cache.get(&key) {
            if hit.is_file() {
                return Some(hit.clone());
            }
            self.path_cache.remove(&key);
        }

        let trailing_slash = matched.path.ends_with('/');
        for cur in paths {
            if !cur.is_dir() {
                continue;
            }

            let mut request = matched.path.clone();
            if self.is_package_request(matched) {
                request = self.reshape_package_request(&request);
            }
            if *cur == self.config.cwd {
                request = self.substitute_alias(&request);
            }
            if cur.starts_with(self.config.npm_dir()) {
                request = self.browser_field(cur, &request);
            }

            let base = normalize_path(&cur.join(&request));
            let found = if trailing_slash {
                self.try_package(&base, &matched.exts)
                    .or_else(|| try_extensions(&base.join("index"), &matched.exts))
            } else if base.is_file() {
                Some(base.clone())
            } else {
                try_extensions(&base, &matched.exts)
                    .or_else(|| base.is_dir().then(|| self.try_package(&base, &matched.exts)).flatten())
                    .or_else(|| base.is_dir().then(|| try_extensions(&base.join("index"), &matched.exts)).flatten())
            };

            if let Some(found) = found {
                self.path_cache.insert(key, found.clone());
                return Some(found);
            }
        }

        None
    }

    /// Bare component references that are reshaped into package layout.
    fn is_package_request(&self, matched: &Matched) -> bool {
        let config = &self.config;
        if matched.request_type != RequestType::Component || matched.path.starts_with('.') {
            return false;
        }
        let first = first_segment(&matched.path);
        let src_root = first_segment(config.src.as_str());
        let packages_root = first_segment(config.packages.as_str());
        if first == src_root || first == packages_root {
            return false;
        }
        !(config.alias.contains_key(first) && first != config.npm.scope)
    }

    /// `@scope/name` to `@scope/name/<src>/<default>`, and
    /// `@scope/name/x` to `@scope/name/<src>/x`.
    fn reshape_package_request(&self, request: &str) -> String {
        let config = &self.config;
        let mut segs: Vec<&str> = request.split('/').filter(|s| !s.is_empty()).collect();

        let scoped = segs.first() == Some(&config.npm.scope.as_str());
        if scoped {
            segs.remove(0);
        }
        match segs.len() {
            0 => return request.to_string(),
            1 => {
                segs.push(&config.package.src);
                segs.push(&config.package.default);
            }
            _ if segs[1] != config.package.src => segs.insert(1, &config.package.src),
            _ => {}
        }
        if scoped {
            segs.insert(0, &config.npm.scope);
        }
        segs.join("/")
    }

    fn substitute_alias(&self, request: &str) -> String {
        let first = first_segment(request);
        match self.config.alias.get(first) {
            Some(target) => format!("{}{}", target, &request[first.len()..]),
            None => request.to_string(),
        }
    }

    /// Applies the `browser` map of an npm package to a request inside it.
    fn browser_field(&self, store: &Utf8Path, request: &str) -> String {
        let (name, subpath) = parse_package_specifier(request);
        let Some(subpath) = subpath else {
            return request.to_string();
        };

        let pkg_json = store.join(name).join("package.json");
        let Ok(text) = fs::read_to_string(&pkg_json) else {
            return request.to_string();
        };
        let Ok(pkg) = serde_json::from_str::<Value>(&text) else {
            tracing::warn!("invalid package.json: {}", pkg_json);
            return request.to_string();
        };
        let Some(Value::Object(browser)) = pkg.get("browser") else {
            return request.to_string();
        };

        let key = format!("./{subpath}");
        let mapped = [key.clone(), format!("{key}.js")]
            .iter()
            .find_map(|key| browser.get(key).and_then(Value::as_str));

        match mapped {
            Some(target) => format!("{}/{}", name, target.trim_start_matches("./")),
            None => request.to_string(),
        }
    }

    /// Reads the `main` field of a package directory, memoised.
    fn package_main(&mut self, dir: &Utf8Path) -> Option<String> {
        if let Some(main) = self.main_cache.get(dir) {
            return main.clone();
        }

        let main = fs::read_to_string(dir.join("package.json"))
            .ok()
            .and_then(|text| match serde_json::from_str::<Value>(&text) {
                Ok(pkg) => pkg.get("main").and_then(Value::as_str).map(String::from),
                Err(e) => {
                    tracing::warn!("{}", ResolveError::PackageJson(dir.join("package.json"), e));
                    None
                }
            });

        self.main_cache.insert(dir.to_path_buf(), main.clone());
        main
    }

    fn try_package(&mut self, dir: &Utf8Path, exts: &[String]) -> Option<Utf8PathBuf> {
        let main = self.package_main(dir)?;
        let base = normalize_path(&dir.join(main));
        if base.is_file() {
            return Some(base);
        }
        try_extensions(&base, exts).or_else(|| try_extensions(&base.join("index"), exts))
    }
}

fn try_extensions(base: &Utf8Path, exts: &[String]) -> Option<Utf8PathBuf> {
    exts.iter()
        .map(|ext| Utf8PathBuf::from(format!("{base}{ext}")))
        .find(|path| path.is_file())
}

fn first_segment(request: &str) -> &str {
    request.split('/').next().unwrap_or_default()
}

/// Splits `@scope/name/sub` into `("@scope/name", Some("sub"))`.
pub fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let split = if specifier.starts_with('@') {
        specifier.match_indices('/').nth(1).map(|(i, _)| i)
    } else {
        specifier.find('/')
    };

    match split {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}
