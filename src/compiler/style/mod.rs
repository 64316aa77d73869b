//! Style compiler for `wxss`, `scss` and `pcss` sources.

pub mod parser;
pub mod plugin;
pub mod unit;

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use camino::Utf8PathBuf;
use regex::Regex;

use crate::compiler::{Compile, CompileContext, answer};
use crate::config::UnitConfig;
use crate::depend::{Depend, DependHandle, UseRequest};
use crate::error::CompileError;
use crate::request::{CompileType, Request, RequestType, dotted_ext, replace_ext};
use crate::resolve::path::relative_reference;

use self::parser::{CssNode, Sheet};

pub use self::plugin::{Nesting, StylePipeline, StylePlugin, Variables};

static RE_FONT_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"format\(['"][a-z-]+['"]\),"#).expect("valid regex"));

static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*['"]?([^'")]*)['"]?\s*\)"#).expect("valid regex"));

static RE_REMOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(https?:)?//").expect("valid regex"));

#[derive(Debug)]
pub struct StyleCompiler {
    request: Request,
    compile_type: Option<CompileType>,
    /// Raw source, only kept for the Sass dialect.
    source: String,
    sheet: Sheet,
    depends: Vec<Depend>,
    unit: UnitConfig,
    variables: BTreeMap<String, String>,
    pipeline: Arc<StylePipeline>,
    load_path: Utf8PathBuf,
}

impl StyleCompiler {
    /// `compile_type` overrides the dialect implied by the file extension,
    /// see the `lang` attribute of single-file sections.
    pub fn new(
        source: String,
        request: Request,
        compile_type: Option<CompileType>,
        ctx: &CompileContext,
    ) -> Result<Self, CompileError> {
        let compile_type = compile_type.or_else(|| request.compile_type());

        let sheet = match compile_type {
            Some(CompileType::Sass) => Sheet::default(),
            _ => Sheet::parse(&source).map_err(|e| CompileError::syntax(&request.src, e.offset, e.message))?,
        };

        let load_path = request
            .src
            .parent()
            .map(Into::into)
            .unwrap_or_else(|| ctx.config.src_dir());

        let mut this = Self {
            request,
            compile_type,
            source,
            sheet,
            depends: Vec::new(),
            unit: ctx.config.unit,
            variables: ctx.config.style.clone(),
            pipeline: Arc::clone(ctx.styles),
            load_path,
        };
        if compile_type != Some(CompileType::Sass) {
            this.collect_depends();
        }
        Ok(this)
    }

    fn collect_depends(&mut self) {
        for id in self.sheet.walk() {
            match self.sheet.node(id) {
                CssNode::AtRule {
                    name,
                    params,
                    children: None,
                } if name == "import" => {
                    let request = import_request(params);
                    if !request.is_empty() && !RE_REMOTE.is_match(&request) {
                        self.depends
                            .push(Depend::new(request, RequestType::Style, DependHandle::AtRule(id)));
                    }
                }
                CssNode::Decl { prop, value } if prop == "src" && value.contains("url") => {
                    for part in RE_FONT_FORMAT.split(value) {
                        let Some(url) = RE_URL.captures(part).and_then(|c| c.get(1)) else {
                            continue;
                        };
                        let url = url.as_str();
                        if is_local_font(url) {
                            self.depends
                                .push(Depend::new(url, RequestType::IconFont, DependHandle::Declaration(id)));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Global style variables as a preprocessor prelude.
    fn prelude(&self) -> String {
        self.variables
            .iter()
            .map(|(key, value)| {
                if RE_REMOTE.is_match(value) {
                    format!("${key}: '{value}';\n")
                } else {
                    format!("${key}: {value};\n")
                }
            })
            .collect()
    }

    #[cfg(feature = "grass")]
    fn compile_sass(&self) -> Result<String, CompileError> {
        let source = format!("{}{}", self.prelude(), self.source);
        let options = grass::Options::default().load_path(self.load_path.as_std_path());
        Ok(grass::from_string(source, &options)?)
    }

    #[cfg(not(feature = "grass"))]
    fn compile_sass(&self) -> Result<String, CompileError> {
        Err(CompileError::Unsupported(self.request.src.clone()))
    }

    fn reparse(&self, source: &str) -> Result<Sheet, CompileError> {
        Sheet::parse(source).map_err(|e| CompileError::syntax(&self.request.src, e.offset, e.message))
    }
}

fn import_request(params: &str) -> String {
    let params = params.trim();
    let inner = RE_URL
        .captures(params)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(params);
    inner.trim_matches(|c| c == '\'' || c == '"').to_string()
}

fn is_local_font(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    !url.contains(";base64")
        && !url.starts_with("data:")
        && !RE_REMOTE.is_match(url)
        && RequestType::IconFont.exts().contains(&dotted_ext(path).as_str())
}

impl Compile for StyleCompiler {
    fn request(&self) -> &Request {
        &self.request
    }

    fn dest_ext(&self) -> &str {
        ".wxss"
    }

    fn depends(&self) -> &[Depend] {
        &self.depends
    }

    fn rewrite_depends(&mut self, uses: &[UseRequest]) {
        let dest = self.dest();
        for depend in &self.depends {
            let Some(used) = answer(depend, uses) else {
                continue;
            };
            let rel = relative_reference(&dest, &replace_ext(&used.target.dest, ""));

            let id = match depend.handle {
                DependHandle::AtRule(id) | DependHandle::Declaration(id) => id,
                _ => continue,
            };

            match self.sheet.node_mut(id) {
                CssNode::AtRule { params, .. } => {
                    *params = format!("'{rel}.wxss'");
                }
                CssNode::Decl { value, .. } => {
                    let suffix = depend
                        .request
                        .find(['?', '#'])
                        .map(|i| &depend.request[i..])
                        .unwrap_or_default();
                    let target = format!("{rel}{}{suffix}", used.target.ext);
                    *value = value.replace(&depend.request, &target);
                }
                _ => {}
            }
        }
    }

    fn generate(&self) -> Result<String, CompileError> {
        let mut sheet = match self.compile_type {
            Some(CompileType::Sass) => self.reparse(&self.compile_sass()?)?,
            Some(CompileType::Pcss) => {
                let source = format!("{}{}", self.prelude(), self.sheet.to_css());
                let mut sheet = self.reparse(&source)?;
                self.pipeline.run(&mut sheet)?;
                sheet
            }
            None => self.sheet.clone(),
        };
        unit::convert_sheet(&mut sheet, self.unit);
        Ok(sheet.to_css())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Project, request_for};

    fn compile(project: &Project, rel: &str, source: &str, lang: Option<CompileType>) -> StyleCompiler {
        let request = request_for(&project.config, rel);
        StyleCompiler::new(source.to_string(), request, lang, &project.ctx()).unwrap()
    }

    #[test]
    fn test_unit_conversion() {
        let project = Project::new();
        let style = compile(&project, "src/common/a.wxss", ".a { width: 10px; margin: 1rem 2em; }", None);
        assert_eq!(
            style.generate().unwrap(),
            ".a {\n  width: 10rpx;\n  margin: 100rpx 2em;\n}\n"
        );
    }

    #[test]
    fn test_import_rewrite() {
        let project = Project::new();
        let mut style = compile(
            &project,
            "src/pages/home/index.wxss",
            "@import \"../../common/base\";\n@import 'https://cdn/x.css';\n.a { color: red; }",
            None,
        );
        assert_eq!(style.depends().len(), 1);
        assert_eq!(style.depends()[0].request, "../../common/base");

        let uses = vec![project.use_request("../../common/base", RequestType::Style, "src/common/base.wxss")];
        style.rewrite_depends(&uses);
        assert!(style.generate().unwrap().starts_with("@import '../../common/base.wxss';\n"));
    }

    #[test]
    fn test_iconfont_urls() {
        let project = Project::new();
        let mut style = compile(
            &project,
            "src/common/icon.wxss",
            "@font-face { font-family: i; src: url('./i.eot?t=1#iefix') format('embedded-opentype'), url(data:font/woff;base64,AAA) format('woff'), url(\"./i.ttf?t=1\") format('truetype'), url('https://x/i.svg') format('svg'); }",
            None,
        );

        let found: Vec<_> = style.depends().iter().map(|d| d.request.as_str()).collect();
        assert_eq!(found, vec!["./i.eot?t=1#iefix", "./i.ttf?t=1"]);

        let uses = vec![
            project.use_request("./i.eot?t=1#iefix", RequestType::IconFont, "src/common/i.eot"),
            project.use_request("./i.ttf?t=1", RequestType::IconFont, "src/common/i.ttf"),
        ];
        style.rewrite_depends(&uses);
        let out = style.generate().unwrap();
        assert!(out.contains("url('./i.eot?t=1#iefix') format('embedded-opentype')"));
        assert!(out.contains("url(\"./i.ttf?t=1\")"));
        assert!(out.contains("https://x/i.svg"));
    }

    #[test]
    fn test_iconfont_urls_across_directories() {
        let project = Project::new();
        let mut style = compile(
            &project,
            "src/components/icon/icon.wxss",
            "@font-face { src: url('../../fonts/x.ttf?#iefix') format('truetype'), url(\"assets/fonts/y.woff\") format('woff'); }",
            None,
        );

        let uses = vec![
            project.use_request("../../fonts/x.ttf?#iefix", RequestType::IconFont, "src/fonts/x.ttf"),
            project.use_request("assets/fonts/y.woff", RequestType::IconFont, "src/assets/fonts/y.woff"),
        ];
        style.rewrite_depends(&uses);
        let out = style.generate().unwrap();
        assert!(out.contains("url('../../fonts/x.ttf?#iefix') format('truetype')"));
        assert!(out.contains("url(\"../../assets/fonts/y.woff\") format('woff')"));
        assert!(!out.contains("\"assets/"));
    }

    #[test]
    fn test_pcss_pipeline() {
        let mut project = Project::new();
        project.config.style.insert("main".into(), "#f00".into());
        let style = compile(
            &project,
            "src/components/a.pcss",
            ".a { color: $main; .b { top: 1px; } }",
            None,
        );
        assert_eq!(
            style.generate().unwrap(),
            ".a {\n  color: #f00;\n}\n.a .b {\n  top: 1rpx;\n}\n"
        );
    }

    #[cfg(feature = "grass")]
    #[test]
    fn test_sass() {
        let mut project = Project::new();
        project.config.style.insert("size".into(), "2px".into());
        let style = compile(
            &project,
            "src/components/a.wxc",
            ".a { .b { width: $size; } }",
            Some(CompileType::Sass),
        );
        assert!(style.depends().is_empty());
        let out = style.generate().unwrap();
        assert!(out.contains(".a .b {"));
        assert!(out.contains("width: 2rpx;"));
    }
}
