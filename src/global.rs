//! Project-wide state read from the app source: the page layout, the global
//! components and the app manifest.

use std::fs;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::compiler::{CompileContext, ScriptCompiler, StylePipeline};
use crate::config::Config;
use crate::error::BuildError;
use crate::file::split_sections;
use crate::io;
use crate::markdown::Markdown;
use crate::request::{RequestOptions, RequestType};
use crate::resolve::Resolver;

const DEV_ICON: &str = "assets/tab/dev.png";
const DEV_ICON_SELECTED: &str = "assets/tab/dev_hl.png";

#[derive(Debug, Clone, Default)]
pub struct AppGlobal {
    /// The app template, used as the layout of every page.
    pub template: String,
    /// Components available to every page.
    pub using_components: Map<String, Value>,
    /// The app `config` object, `usingComponents` excluded.
    pub config: Map<String, Value>,
    /// Put the first compiled page first and add a tab for it.
    pub debug: bool,
    /// Pages already written to the manifest.
    pages: Vec<String>,
}

impl AppGlobal {
    /// Reads `app.wxa` from the source root. A project without one gets an
    /// empty global state.
    pub fn load(
        config: &Config,
        resolver: &mut Resolver,
        markdown: &dyn Markdown,
        styles: &Arc<StylePipeline>,
    ) -> Result<Self, BuildError> {
        let options = RequestOptions::new("./app.wxa")
            .with_type(RequestType::App)
            .with_parent(config.src_dir())
            .main();
        let Some(request) = resolver.resolve(&options)? else {
            return Ok(Self::default());
        };

        let source = fs::read_to_string(&request.src)?;
        let src_relative = request.src_relative.clone();
        let compile_err = |e| BuildError::Compile(src_relative.clone(), e);
        let sections = split_sections(&source, &request).map_err(compile_err)?;

        let empty = Self::default();
        let ctx = CompileContext {
            config,
            app: &empty,
            markdown,
            styles,
        };
        let code = sections.script.map(|s| s.code).unwrap_or_default();
        let script = ScriptCompiler::new(code, request, &ctx).map_err(compile_err)?;

        Ok(Self {
            template: sections.template.map(|s| s.code).unwrap_or_default(),
            using_components: script.using_components().clone(),
            config: script.config().clone(),
            debug: false,
            pages: Vec::new(),
        })
    }

    /// `pages` of the app config, e.g. `pages/home/index`.
    pub fn pages(&self) -> Vec<String> {
        self.config
            .get("pages")
            .and_then(Value::as_array)
            .map(|pages| pages.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn tab_bar_list(&self) -> Vec<Value> {
        self.config
            .get("tabBar")
            .and_then(|t| t.get("list"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Icon paths of the tab bar, relative to the source root.
    pub fn tab_bar_icons(&self) -> Vec<String> {
        self.tab_bar_list()
            .iter()
            .flat_map(|item| {
                ["iconPath", "selectedIconPath"]
                    .into_iter()
                    .filter_map(|key| item.get(key).and_then(Value::as_str).map(str::to_string))
            })
            .collect()
    }

    pub fn known_pages(&self) -> &[String] {
        &self.pages
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Merges `pages` into the manifest and writes `<dest>/app.json`.
    /// Returns `false` when no new page was added and nothing was written.
    pub fn save_app_config(&mut self, pages: &[String], config: &Config) -> Result<bool, BuildError> {
        let known = self.pages.len();
        for page in pages {
            if !self.pages.contains(page) {
                self.pages.push(page.clone());
            }
        }
        if self.pages.len() == known {
            return Ok(false);
        }

        let mut pages = self.pages.clone();
        let mut tab_list = self.tab_bar_list();

        let home = if self.debug {
            let home = pages[0].clone();
            let has_tab = tab_list
                .iter()
                .any(|t| t.get("pagePath").and_then(Value::as_str) == Some(home.as_str()));
            if !tab_list.is_empty() && !has_tab {
                tab_list.insert(0, dev_tab(&home));
                copy_dev_icons(config)?;
            }
            home
        } else if let Some(first) = tab_list
            .first()
            .and_then(|t| t.get("pagePath"))
            .and_then(Value::as_str)
        {
            first.to_string()
        } else {
            config.home_page.clone()
        };

        match pages.iter().position(|p| *p == home) {
            Some(i) => {
                let home = pages.remove(i);
                pages.insert(0, home);
            }
            None => tracing::error!("home page '{}' not found", home),
        }

        let mut app_config = self.config.clone();
        if !tab_list.is_empty()
            && let Some(Value::Object(tab_bar)) = app_config.get_mut("tabBar")
        {
            tab_bar.insert("list".into(), Value::Array(tab_list));
        }
        app_config.insert("pages".into(), json!(pages));
        app_config.remove("usingComponents");
        self.pages = pages;

        let path = config.dest_dir().join("app.json");
        io::write(&path, serde_json::to_string_pretty(&app_config)?)?;
        tracing::info!("generate {}", config.relative(&path));
        Ok(true)
    }
}

fn dev_tab(page: &str) -> Value {
    let segs: Vec<&str> = page.split('/').collect();
    let name = segs.len().checked_sub(2).map(|i| segs[i]).unwrap_or(page);
    json!({
        "pagePath": page,
        "iconPath": DEV_ICON,
        "selectedIconPath": DEV_ICON_SELECTED,
        "text": format!("<{name}/>"),
    })
}

fn copy_dev_icons(config: &Config) -> Result<(), BuildError> {
    for icon in [DEV_ICON, DEV_ICON_SELECTED] {
        let from = config.src_dir().join(icon);
        if from.is_file() {
            io::copy(&from, &config.dest_dir().join(icon))?;
        } else {
            tracing::warn!("missing dev tab icon {}", config.relative(&from));
        }
    }
    Ok(())
}
