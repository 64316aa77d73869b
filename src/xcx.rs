//! The build orchestrator: full builds, publish builds, incremental passes
//! and the classification of watch events.

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use petgraph::graph::NodeIndex;
use serde_json::Value;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::{CONFIG_FILENAME, Config, PROJECT_FILENAME};
use crate::error::BuildError;
use crate::global::AppGlobal;
use crate::graph::{NodeOptions, Visitor, XcxNode, traverse};
use crate::io::{self, PROGRESS_STYLE, as_overhead};
use crate::request::{RequestOptions, RequestType};
use crate::session::BuildSession;

#[derive(Debug, Clone, Default)]
pub struct XcxOptions {
    /// Empty the destination directory before a full build.
    pub clear: bool,
    /// Pages to build, e.g. `pages/home/index`. Building an explicit list
    /// turns on debug mode for the app manifest.
    pub pages: Option<Vec<String>>,
}

/// A file system change, with the path relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Add(Utf8PathBuf),
    Change(Utf8PathBuf),
    Unlink(Utf8PathBuf),
}

#[derive(Debug)]
pub struct Xcx {
    session: BuildSession,
    options: XcxOptions,
}

impl Xcx {
    pub fn new(config: Config, options: XcxOptions) -> Self {
        let mut session = BuildSession::new(Arc::new(config));
        session.app.debug = options.pages.as_ref().is_some_and(|p| !p.is_empty());
        Self { session, options }
    }

    /// Reads the configuration of the project at `cwd`.
    pub fn load(cwd: impl Into<Utf8PathBuf>, options: XcxOptions) -> Result<Self, BuildError> {
        Ok(Self::new(Config::load(cwd)?, options))
    }

    pub fn config(&self) -> &Config {
        self.session.config()
    }

    pub fn session(&self) -> &BuildSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut BuildSession {
        &mut self.session
    }

    /// Drops every cached node and reloads the app globals, emptying the
    /// destination directory first when configured to.
    pub fn clear(&mut self) -> Result<(), BuildError> {
        if self.options.clear {
            io::clear_dir(&self.session.config.dest_dir())?;
        }
        let config = self.session.config.clone();
        self.session.reset(config)
    }

    /// Full build of the app, its pages and the tab bar icons.
    pub fn compile(&mut self) -> Result<(), BuildError> {
        let s = Instant::now();

        self.clear()?;
        self.copy_project_config()?;
        self.compile_app()?;
        self.compile_pages()?;
        self.copy_tab_bar_icons()?;

        tracing::info!("finished build {}", as_overhead(s));
        Ok(())
    }

    fn compile_app(&mut self) -> Result<(), BuildError> {
        let src_dir = self.session.config.src_dir();

        let entries = if src_dir.join("app.wxa").is_file() {
            vec![
                RequestOptions::new("./app.wxa")
                    .with_type(RequestType::App)
                    .with_parent(src_dir)
                    .main(),
            ]
        } else {
            ["app.js", "app.wxss"]
                .into_iter()
                .filter(|name| src_dir.join(name).is_file())
                .map(|name| RequestOptions::new(format!("./{name}")).with_parent(src_dir.clone()).main())
                .collect()
        };

        self.build_entries(entries.into_iter().map(NodeOptions::new).collect())
    }

    /// The explicit page list or the app manifest pages, plus the tab bar
    /// pages. Falls back to every page file.
    fn compile_pages(&mut self) -> Result<(), BuildError> {
        let config = self.session.config.clone();
        let app = &self.session.app;

        let mut pages = self.options.pages.clone().unwrap_or_default();
        if pages.is_empty() {
            pages = app.pages();
        }

        let entries: Vec<_> = if !pages.is_empty() {
            let tab_pages = app
                .tab_bar_list()
                .iter()
                .filter_map(|item| item.get("pagePath").and_then(Value::as_str).map(str::to_string))
                .collect::<Vec<_>>();

            let mut files: Vec<String> = vec![];
            for page in pages.iter().chain(&tab_pages) {
                let file = format!("./{page}.wxp");
                if !files.contains(&file) {
                    files.push(file);
                }
            }
            files
                .into_iter()
                .map(|file| RequestOptions::new(file).with_parent(config.src_dir()).main())
                .collect()
        } else {
            let pages_dir = config.pages_dir();
            glob_entries(&pages_dir, "**/*.wxp")?
                .into_iter()
                .map(|file| RequestOptions::new(file).with_parent(pages_dir.clone()).main())
                .collect()
        };

        self.build_entries(entries.into_iter().map(NodeOptions::new).collect())
    }

    fn copy_tab_bar_icons(&self) -> Result<(), BuildError> {
        let config = &self.session.config;
        for icon in self.session.app.tab_bar_icons() {
            let from = config.src_dir().join(&icon);
            if !from.is_file() {
                return Err(BuildError::MissingFile(config.relative(&from).to_path_buf()));
            }
            let to = config.dest_dir().join(&icon);
            io::copy(&from, &to)?;
            tracing::info!("copy {}", config.relative(&to));
        }
        Ok(())
    }

    fn copy_project_config(&self) -> Result<(), BuildError> {
        let config = &self.session.config;
        let from = config.cwd.join(PROJECT_FILENAME);
        if !from.is_file() {
            return Ok(());
        }
        io::copy(&from, &config.dest_dir().join(PROJECT_FILENAME))?;
        tracing::info!("copy {}", PROJECT_FILENAME);
        Ok(())
    }

    fn delete_project_config(&self) -> Result<(), BuildError> {
        let dest = self.session.config.dest_dir().join(PROJECT_FILENAME);
        if !dest.is_file() {
            return Ok(());
        }
        io::remove(&dest)?;
        tracing::info!("delete {}", PROJECT_FILENAME);
        Ok(())
    }

    /// Builds component packages for publishing, without the dest root
    /// rewrite. All packages are built when `names` is empty. Every named
    /// package `dest` folder is emptied first when clearing.
    pub fn compile_packages(&mut self, names: &[String]) -> Result<(), BuildError> {
        let config = self.session.config.clone();
        let packages_dir = config.packages_dir();

        if self.options.clear {
            for name in names {
                io::clear_dir(&packages_dir.join(name).join(&config.package.dest))?;
            }
        }

        let mut files = vec![];
        if names.is_empty() {
            files = glob_entries(&packages_dir, &format!("**/{}/*.wxc", config.package.src))?;
        }
        for name in names {
            files.extend(glob_entries(&packages_dir, &format!("{name}/{}/*.wxc", config.package.src))?);
        }

        let entries = files
            .into_iter()
            .map(|file| {
                NodeOptions::new(
                    RequestOptions::new(file)
                        .with_parent(packages_dir.clone())
                        .main()
                        .publish(true),
                )
            })
            .collect();
        self.build_entries(entries)
    }

    /// Builds the component packages installed as npm dependencies.
    ///
    /// A dependency is a component package when its `package.json` sets
    /// `minConfig.component` or `config.min.component`; `minConfig.entry`
    /// lists its entry files, otherwise the package itself is the entry.
    pub fn build_npm_components(&mut self) -> Result<(), BuildError> {
        let config = self.session.config.clone();
        let manifest = read_package_json(&config.cwd.join("package.json"))?;

        let mut requests = vec![];
        for key in ["dependencies", "devDependencies"] {
            let Some(deps) = manifest.get(key).and_then(Value::as_object) else {
                continue;
            };
            for name in deps.keys() {
                let path = config.npm_dir().join(name).join("package.json");
                let Ok(pkg) = read_package_json(&path) else {
                    tracing::warn!("couldn't read {}", config.relative(&path));
                    continue;
                };

                let min_config = pkg.get("minConfig");
                let is_component = min_config
                    .and_then(|c| c.get("component"))
                    .or_else(|| pkg.pointer("/config/min/component"))
                    .is_some_and(|v| v.as_bool().unwrap_or(!v.is_null()));
                if !is_component {
                    continue;
                }

                match min_config.and_then(|c| c.get("entry")).and_then(Value::as_array) {
                    Some(entries) => requests.extend(
                        entries
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|entry| format!("{name}/{}", entry.trim_start_matches("./"))),
                    ),
                    None => requests.push(name.clone()),
                }
            }
        }

        let entries = requests
            .into_iter()
            .map(|request| {
                NodeOptions::new(
                    RequestOptions::new(request)
                        .with_type(RequestType::Component)
                        .with_parent(config.cwd.clone())
                        .main(),
                )
            })
            .collect();
        self.build_entries(entries)
    }

    /// Rebuilds every pending file: the ones touched by watch events and
    /// the ones still missing a reference.
    pub fn next(&mut self) -> Result<(), BuildError> {
        let pending = self.session.pending.get();
        if pending.is_empty() {
            return Ok(());
        }

        let cwd = self.session.config.cwd.clone();
        let entries = pending
            .into_iter()
            .map(|path| {
                let mut options = RequestOptions::new(format!("./{path}")).with_parent(cwd.clone()).main();
                // A known file keeps how it was first reached.
                if let Some(node) = self.session.lookup(&cwd.join(&path)).and_then(|i| self.session.node(i)) {
                    options = options
                        .with_type(node.request.request_type)
                        .third_npm(node.request.is_third_npm)
                        .publish(node.request.is_publish);
                }
                NodeOptions::new(options).force()
            })
            .collect();

        let result = self.build_entries(entries);
        self.session.pending.reset();
        result
    }

    /// Applies one watch event and runs the incremental pass it calls for.
    pub fn handle_event(&mut self, event: WatchEvent) -> Result<(), BuildError> {
        let app_entry = self.session.config.src.join("app.wxa");
        let is_config = |path: &Utf8Path| path.as_str() == CONFIG_FILENAME;
        let is_project = |path: &Utf8Path| path.as_str() == PROJECT_FILENAME;

        match event {
            WatchEvent::Add(path) if is_project(&path) => self.copy_project_config(),
            WatchEvent::Add(path) => {
                self.session.watch_new_file(&path);
                self.next()
            }
            WatchEvent::Change(path) if is_project(&path) => self.copy_project_config(),
            WatchEvent::Change(path) if path == app_entry || is_config(&path) => self.reload(),
            WatchEvent::Change(path) => {
                self.session.watch_change_file(&path);
                self.next()
            }
            WatchEvent::Unlink(path) if is_project(&path) => self.delete_project_config(),
            WatchEvent::Unlink(path) if path == app_entry || is_config(&path) => self.reload(),
            WatchEvent::Unlink(path) => {
                self.session.watch_delete_file(&path)?;
                self.next()
            }
        }
    }

    /// Full build followed by incremental rebuilds on every change.
    #[cfg(feature = "live")]
    pub fn watch(&mut self) -> anyhow::Result<()> {
        crate::watch::watch(self)
    }

    /// Reads the configuration again and runs a full build.
    fn reload(&mut self) -> Result<(), BuildError> {
        let config = Config::load(self.session.config.cwd.clone())?;
        self.session.config = Arc::new(config);
        self.compile()
    }

    /// Creates the nodes of `entries` and compiles everything reachable.
    fn build_entries(&mut self, entries: Vec<NodeOptions>) -> Result<(), BuildError> {
        let roots = self.session.create_entries(entries)?;
        self.build(&roots)
    }

    fn build(&mut self, roots: &[NodeIndex]) -> Result<(), BuildError> {
        if roots.is_empty() {
            return Ok(());
        }

        let span = tracing::info_span!("compile");
        span.pb_set_style(&PROGRESS_STYLE);
        span.pb_set_length(self.session.graph.node_count() as u64);
        let _enter = span.enter();

        let session = &mut self.session;
        let mut visitor = BuildVisitor {
            app: &mut session.app,
            config: &session.config,
            span: &span,
        };
        traverse(&mut session.graph, roots, &session.config, &mut visitor)
    }
}

/// Compiles nodes on enter and persists the app manifest once the pages
/// are known.
struct BuildVisitor<'a> {
    app: &'a mut AppGlobal,
    config: &'a Config,
    span: &'a Span,
}

impl Visitor for BuildVisitor<'_> {
    fn enter(&mut self, node: &mut XcxNode) -> Result<(), BuildError> {
        self.span.pb_inc(1);
        if node.compiled {
            return Ok(());
        }
        self.span.pb_set_message(node.request.src_relative.as_str());
        node.compile()
            .map_err(|e| BuildError::Compile(node.request.src_relative.clone(), e))
    }

    fn pages(&mut self, pages: &[String]) -> Result<(), BuildError> {
        self.app.save_app_config(pages, self.config)?;
        Ok(())
    }
}

/// Files matching `pattern` below `dir`, as `./`-prefixed references.
fn glob_entries(dir: &Utf8Path, pattern: &str) -> Result<Vec<String>, BuildError> {
    let mut out = vec![];
    for path in glob::glob(dir.join(pattern).as_str())? {
        let path = Utf8PathBuf::try_from(path?)?;
        if let Ok(rel) = path.strip_prefix(dir) {
            out.push(format!("./{}", rel.as_str().replace('\\', "/")));
        }
    }
    out.sort();
    Ok(out)
}

fn read_package_json(path: &Utf8Path) -> Result<Value, BuildError> {
    if !path.is_file() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Project;

    fn xcx(project: &Project, options: XcxOptions) -> Xcx {
        Xcx::new(project.config.clone(), options)
    }

    fn app_project() -> Project {
        let project = Project::new();
        project.write("project.config.json", r#"{"appid":"x"}"#);
        project.write(
            "src/app.wxa",
            r#"<template><view class="app"><page></page></view></template>
<script>
export default {
  config: {
    pages: ['pages/home/index'],
    usingComponents: { card: 'components/card' }
  }
}
</script>"#,
        );
        project.write(
            "src/pages/home/index.wxp",
            r#"<template><card title="hi"/></template>
<style>.a { width: 10px; }</style>
<script>
import util from '../../common/util'
export default { data: { a: 1 } }
</script>"#,
        );
        project.write("src/common/util.js", "module.exports = {}");
        project.write("src/common/components/card.wxc", "<template><view/></template>");
        project
    }

    #[test]
    fn test_full_build() {
        let project = app_project();
        let mut xcx = xcx(&project, XcxOptions::default());
        xcx.compile().unwrap();

        let root = project.root();
        for out in [
            "dist/project.config.json",
            "dist/app.js",
            "dist/app.json",
            "dist/pages/home/index.js",
            "dist/pages/home/index.json",
            "dist/pages/home/index.wxml",
            "dist/pages/home/index.wxss",
            "dist/common/util.js",
            "dist/common/components/card.wxml",
        ] {
            assert!(root.join(out).is_file(), "missing {out}");
        }
        assert!(!root.join("dist/app.wxml").exists());

        let wxml = project.read("dist/pages/home/index.wxml");
        assert!(wxml.contains(r#"<view class="app">"#));
        assert!(wxml.contains(r#"_pid="{{_pid}}""#));

        let page: Value = serde_json::from_str(&project.read("dist/pages/home/index.json")).unwrap();
        assert_eq!(
            page["usingComponents"]["card"],
            "../../common/components/card"
        );

        let app: Value = serde_json::from_str(&project.read("dist/app.json")).unwrap();
        assert_eq!(app["pages"], serde_json::json!(["pages/home/index"]));
        assert!(app.get("usingComponents").is_none());

        assert!(project.read("dist/pages/home/index.js").contains("../../common/util.js"));
        assert!(project.read("dist/pages/home/index.wxss").contains("10rpx"));
    }

    #[test]
    fn test_native_app_and_page_glob() {
        let project = Project::new();
        project.write("src/app.js", "App({})");
        project.write("src/app.wxss", "page { margin: 0; }");
        project.write("src/pages/a/index.wxp", "<template><view/></template>");
        project.write("src/pages/b/index.wxp", "<template><text/></template>");

        let mut xcx = xcx(&project, XcxOptions::default());
        xcx.compile().unwrap();

        assert!(project.root().join("dist/app.js").is_file());
        assert!(project.root().join("dist/app.wxss").is_file());
        let app: Value = serde_json::from_str(&project.read("dist/app.json")).unwrap();
        let pages = app["pages"].as_array().unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages.contains(&Value::from("pages/a/index")));
    }

    #[test]
    fn test_missing_tab_icon() {
        let project = Project::new();
        project.write(
            "src/app.wxa",
            r#"<script>
export default {
  config: {
    pages: ['pages/home/index'],
    tabBar: { list: [{ pagePath: 'pages/home/index', iconPath: 'assets/home.png' }] }
  }
}
</script>"#,
        );
        project.write("src/pages/home/index.wxp", "<template><view/></template>");

        let mut xcx = xcx(&project, XcxOptions::default());
        let err = xcx.compile().unwrap_err();
        assert!(matches!(err, BuildError::MissingFile(path) if path == "src/assets/home.png"));

        project.write("src/assets/home.png", "png");
        xcx.compile().unwrap();
        assert!(project.root().join("dist/assets/home.png").is_file());
    }

    #[test]
    fn test_watch_events() {
        let project = app_project();
        let mut xcx = xcx(&project, XcxOptions::default());
        xcx.compile().unwrap();

        project.write("src/pages/about/index.wxp", "<template><view/></template>");
        xcx.handle_event(WatchEvent::Add("src/pages/about/index.wxp".into())).unwrap();
        assert!(project.root().join("dist/pages/about/index.wxml").is_file());
        let app: Value = serde_json::from_str(&project.read("dist/app.json")).unwrap();
        assert_eq!(app["pages"], serde_json::json!(["pages/home/index", "pages/about/index"]));

        project.write("src/common/util.js", "module.exports = { changed: true }");
        xcx.handle_event(WatchEvent::Change("src/common/util.js".into())).unwrap();
        assert!(project.read("dist/common/util.js").contains("changed"));

        std::fs::remove_file(project.root().join("src/common/util.js")).unwrap();
        xcx.handle_event(WatchEvent::Unlink("src/common/util.js".into())).unwrap();
        assert!(!project.root().join("dist/common/util.js").exists());
        assert!(xcx.session().pending().has_lack(Utf8Path::new("src/pages/home/index.wxp")));

        project.write("src/common/util.js", "module.exports = {}");
        xcx.handle_event(WatchEvent::Add("src/common/util.js".into())).unwrap();
        assert!(project.root().join("dist/common/util.js").is_file());
        assert!(xcx.session().pending().is_empty());

        xcx.handle_event(WatchEvent::Unlink(PROJECT_FILENAME.into())).unwrap();
        assert!(!project.root().join("dist/project.config.json").exists());
    }

    #[test]
    fn test_incremental_pass_keeps_request_flags() {
        let project = Project::new();
        project.write("src/common/a.js", "import l from 'lodash'");
        let lodash = project.write("node_modules/lodash/index.js", "module.exports = 1");
        let button = project.write("src/packages/bee-button/src/index.wxc", "<template><view/></template>");

        let mut xcx = xcx(&project, XcxOptions::default());
        xcx.compile_packages(&["bee-button".to_string()]).unwrap();
        let entry = RequestOptions::new("./src/common/a.js")
            .with_parent(project.root().to_path_buf())
            .main();
        xcx.build_entries(vec![NodeOptions::new(entry)]).unwrap();

        let flags = |xcx: &Xcx, src: &Utf8Path| {
            let index = xcx.session().lookup(src).unwrap();
            let request = &xcx.session().node(index).unwrap().request;
            (request.is_third_npm, request.is_publish, request.dest_relative.clone())
        };
        let npm = flags(&xcx, lodash.as_path());
        let publish = flags(&xcx, button.as_path());
        assert!(npm.0);
        assert!(publish.1);

        project.write("node_modules/lodash/index.js", "module.exports = 2");
        xcx.handle_event(WatchEvent::Change("node_modules/lodash/index.js".into())).unwrap();
        assert_eq!(flags(&xcx, lodash.as_path()), npm);

        project.write("src/packages/bee-button/src/index.wxc", "<template><text/></template>");
        xcx.handle_event(WatchEvent::Change("src/packages/bee-button/src/index.wxc".into()))
            .unwrap();
        assert_eq!(flags(&xcx, button.as_path()), publish);
        assert!(project.root().join(&publish.2).with_extension("wxml").is_file());
    }

    #[test]
    fn test_compile_packages() {
        let project = Project::new();
        project.write("src/packages/bee-button/src/index.wxc", "<template><view/></template>");
        project.write("src/packages/bee-icon/src/index.wxc", "<template><view/></template>");

        let mut xcx = xcx(&project, XcxOptions::default());
        xcx.compile_packages(&["bee-button".to_string()]).unwrap();

        assert_eq!(xcx.session().len(), 1);
        let node = xcx.session().node(NodeIndex::new(0)).unwrap();
        assert!(node.request.is_publish);
        assert!(node.request.dest_relative.ends_with("bee-button/dist/index.wxc"));
        assert!(node.request.dest_with_ext(".wxml").is_file());
    }

    #[test]
    fn test_build_npm_components() {
        let project = Project::new();
        project.write(
            "package.json",
            r#"{"dependencies": {"bee-tag": "1.0.0", "lodash": "4.0.0"}}"#,
        );
        project.write(
            "node_modules/bee-tag/package.json",
            r#"{"name": "bee-tag", "minConfig": {"component": true}}"#,
        );
        project.write("node_modules/bee-tag/src/index.wxc", "<template><view/></template>");
        project.write("node_modules/lodash/package.json", r#"{"name": "lodash"}"#);

        let mut xcx = xcx(&project, XcxOptions::default());
        xcx.build_npm_components().unwrap();

        assert_eq!(xcx.session().len(), 1);
        let node = xcx.session().node(NodeIndex::new(0)).unwrap();
        assert_eq!(node.request.src_relative, "node_modules/bee-tag/src/index.wxc");
        assert!(node.compiled);
    }
}
