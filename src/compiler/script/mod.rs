//! Script compiler.
//!
//! Finds `import`/`require` references, wraps the default export of
//! single-file sources into their runtime constructor, and lifts the static
//! `config` object out of the code into a sibling JSON file.

pub mod literal;

use std::collections::HashMap;
use std::fs;
use std::ops::Range;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, AssignmentTarget, CallExpression, ExportAllDeclaration, ExportDefaultDeclarationKind,
    ExportNamedDeclaration, Expression, ImportDeclaration, ObjectExpression, ObjectPropertyKind, Program,
    Statement, StringLiteral,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use serde_json::{Map, Value};

use crate::compiler::{Compile, CompileContext, Edits, answer, camel_case};
use crate::depend::{Depend, DependHandle, UseRequest};
use crate::error::CompileError;
use crate::io;
use crate::request::{Request, RequestType, dotted_ext, replace_ext};
use crate::resolve::path::relative_reference;

use self::literal::LiteralError;

#[derive(Debug)]
pub struct ScriptCompiler {
    request: Request,
    source: String,
    /// Spans of the referenced string literals, quotes included.
    literals: Vec<Range<usize>>,
    depends: Vec<Depend>,
    /// Structural edits decided at parse time.
    edits: Edits,
    /// Literal index to its rewritten value.
    rewrites: HashMap<usize, String>,
    /// The evaluated `config` property, without `usingComponents`.
    config: Map<String, Value>,
    using_components: Map<String, Value>,
}

/// What is left of the default export object once the AST is gone.
#[derive(Debug)]
struct ExportObject {
    span: Range<usize>,
    config: Option<ConfigProp>,
    /// Offset of the `{` of `data`, when it is an object literal.
    data: Option<usize>,
}

#[derive(Debug)]
struct ConfigProp {
    /// The property with its separating comma.
    removal: Range<usize>,
    value: Result<Option<Value>, LiteralError>,
}

impl ScriptCompiler {
    pub fn new(source: String, request: Request, ctx: &CompileContext) -> Result<Self, CompileError> {
        let (references, export) = {
            let allocator = Allocator::default();
            let parsed = Parser::new(&allocator, &source, SourceType::mjs()).parse();
            if let Some(error) = parsed.errors.first() {
                return Err(CompileError::parse(&request.src, error.to_string()));
            }

            let mut references = References::default();
            references.visit_program(&parsed.program);
            let export = match request.is_sfc() {
                true => export_object(&parsed.program).map(|object| ExportObject::new(object, &source)),
                false => None,
            };
            (references.found, export)
        };

        let mut this = Self {
            request,
            source,
            literals: Vec::with_capacity(references.len()),
            depends: Vec::new(),
            edits: Edits::default(),
            rewrites: HashMap::new(),
            config: Map::new(),
            using_components: Map::new(),
        };

        for (idx, (span, request)) in references.into_iter().enumerate() {
            let path = request.split(['?', '#']).next().unwrap_or_default();
            let request_type = match dotted_ext(path).as_str() {
                ".json" => RequestType::Json,
                ".wxs" => RequestType::Wxs,
                _ => RequestType::Script,
            };
            this.literals.push(span);
            this.depends
                .push(Depend::new(request, request_type, DependHandle::Literal(idx)));
        }

        if this.request.is_wxp() {
            this.using_components = ctx.app.using_components.clone();
        }
        if let Some(export) = export {
            this.visit_export(export, ctx);
        }
        if this.request.is_wxp() || this.request.is_wxc() {
            this.add_component_depends();
        }

        Ok(this)
    }

    /// The evaluated `config` object, `usingComponents` excluded.
    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Alias to component reference, rewritten once resolved.
    pub fn using_components(&self) -> &Map<String, Value> {
        &self.using_components
    }

    fn visit_export(&mut self, export: ExportObject, ctx: &CompileContext) {
        if !self.request.is_third_npm
            && let Some(name) = ctx.config.constructor(self.request.request_type)
        {
            self.edits.insert(export.span.start, format!("{name}("));
            self.edits.insert(export.span.end, ")");
        }

        // `data` may refer to demos declared in `config`, whatever the order.
        if let Some(config) = export.config {
            self.visit_config(config);
        }
        if !self.request.is_third_npm
            && let Some(open) = export.data
        {
            self.visit_data(open, ctx);
        }
    }

    fn visit_config(&mut self, prop: ConfigProp) {
        let mut config = match prop.value {
            Ok(Some(Value::Object(config))) => config,
            Ok(_) => {
                tracing::warn!("{}: `config` is not an object literal", self.request.src_relative);
                return;
            }
            Err(e) => {
                tracing::warn!(
                    "{}:{}: `config` is not a static literal: {}",
                    self.request.src_relative,
                    e.offset,
                    e.message
                );
                return;
            }
        };

        match config.remove("usingComponents") {
            Some(Value::Object(using)) => self.using_components.extend(using),
            Some(_) => tracing::warn!(
                "{}: `usingComponents` is not an object",
                self.request.src_relative
            ),
            None => {}
        }
        self.config = config;
        self.edits.replace(prop.removal, "");
    }

    /// Prepends rendered documentation to the `data` of a documentation
    /// page, i.e. `pages/<name>/index.wxp`.
    fn visit_data(&mut self, open: usize, ctx: &CompileContext) {
        if !self.request.is_wxp() {
            return;
        }
        let Some(code) = self.docs_code(ctx) else {
            return;
        };

        let json = Value::Object(code).to_string();
        self.edits.insert(open + 1, format!("\n    __code__: {json},"));
    }

    fn docs_code(&self, ctx: &CompileContext) -> Option<Map<String, Value>> {
        let config = ctx.config;
        let rel = self.request.src_relative.strip_prefix(&config.pages).ok()?;
        let segs: Vec<&str> = rel.iter().collect();
        let [name, "index.wxp"] = segs.as_slice() else {
            return None;
        };

        let mut code = Map::new();
        let readme = config
            .packages_dir()
            .join(format!("{}{}", config.prefix_str, name))
            .join("README.md");
        let readme = fs::read_to_string(readme)
            .map(|md| ctx.markdown.render(&md))
            .unwrap_or_default();
        code.insert("readme".into(), Value::String(readme));

        let dir = self.request.src.parent()?;
        for (alias, target) in &self.using_components {
            let (true, Some(target)) = (alias.starts_with("demo-"), target.as_str()) else {
                continue;
            };
            if let Ok(source) = fs::read_to_string(dir.join(format!("{target}.wxc"))) {
                let html = ctx.markdown.render(&format!("```html\n{}\n```", source.trim_end()));
                code.insert(camel_case(alias), Value::String(html));
            }
        }

        Some(code)
    }

    fn add_component_depends(&mut self) {
        for (alias, target) in &self.using_components {
            match target.as_str() {
                Some(target) => self.depends.push(Depend::new(
                    target,
                    RequestType::Component,
                    DependHandle::UsingKey(alias.clone()),
                )),
                None => tracing::warn!(
                    "{}: component '{}' is not a string",
                    self.request.src_relative,
                    alias
                ),
            }
        }
    }
}

impl Compile for ScriptCompiler {
    fn request(&self) -> &Request {
        &self.request
    }

    fn dest_ext(&self) -> &str {
        if self.request.ext == ".wxs" { ".wxs" } else { ".js" }
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

            match &depend.handle {
                DependHandle::Literal(idx) => {
                    let value = match depend.request_type {
                        RequestType::Json => format!("{rel}{}.js", used.target.ext),
                        RequestType::Wxs => format!("{rel}{}", used.target.ext),
                        _ => format!("{rel}.js"),
                    };
                    self.rewrites.insert(*idx, value);
                }
                DependHandle::UsingKey(alias) => {
                    self.using_components.insert(alias.clone(), Value::String(rel));
                }
                _ => {}
            }
        }
    }

    fn generate(&self) -> Result<String, CompileError> {
        let mut edits = self.edits.clone();
        for (idx, value) in &self.rewrites {
            let span = self.literals[*idx].clone();
            let q = self.source[span.clone()].chars().next().unwrap_or('\'');
            edits.replace(span, quote(value, q));
        }
        Ok(edits.apply(&self.source))
    }

    fn after_save(&self) -> Result<(), CompileError> {
        if !(self.request.is_wxp() || self.request.is_wxc()) {
            return Ok(());
        }

        let mut config = self.config.clone();
        config.insert(
            "usingComponents".into(),
            Value::Object(self.using_components.clone()),
        );
        if self.request.is_wxc() {
            config.insert("component".into(), Value::Bool(true));
        }

        let dest = self.request.dest_with_ext(".json");
        io::write(&dest, serde_json::to_string_pretty(&config)?)?;
        tracing::info!("write {}", self.request.dest_relative_with_ext(".json"));
        Ok(())
    }

    fn remove(&self) -> Result<(), CompileError> {
        io::remove(&self.dest())?;
        tracing::info!("delete {}", self.dest_relative());
        if self.request.is_wxp() || self.request.is_wxc() {
            io::remove(&self.request.dest_with_ext(".json"))?;
            tracing::info!("delete {}", self.request.dest_relative_with_ext(".json"));
        }
        Ok(())
    }
}

/// Collects `import`/`export … from` sources and `require('…')` arguments in
/// source order. Dynamic `import()` is left to the runtime.
#[derive(Default)]
struct References {
    found: Vec<(Range<usize>, String)>,
}

impl References {
    fn push(&mut self, literal: &StringLiteral) {
        self.found.push((range(literal.span), literal.value.to_string()));
    }
}

impl<'a> Visit<'a> for References {
    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        self.push(&it.source);
    }

    fn visit_export_named_declaration(&mut self, it: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &it.source {
            self.push(source);
        }
        walk::walk_export_named_declaration(self, it);
    }

    fn visit_export_all_declaration(&mut self, it: &ExportAllDeclaration<'a>) {
        self.push(&it.source);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &it.callee
            && callee.name.as_str() == "require"
            && it.arguments.len() == 1
            && let Some(Argument::StringLiteral(literal)) = it.arguments.first()
        {
            self.push(literal);
        }
        walk::walk_call_expression(self, it);
    }
}

/// The object of `export default {…}`, `module.exports = {…}` or
/// `exports.default = {…}`.
fn export_object<'p, 'a>(program: &'p Program<'a>) -> Option<&'p ObjectExpression<'a>> {
    program.body.iter().find_map(|statement| match statement {
        Statement::ExportDefaultDeclaration(decl) => match &decl.declaration {
            ExportDefaultDeclarationKind::ObjectExpression(object) => Some(&**object),
            _ => None,
        },
        Statement::ExpressionStatement(statement) => match &statement.expression {
            Expression::AssignmentExpression(assign) if is_exports(&assign.left) => match &assign.right {
                Expression::ObjectExpression(object) => Some(&**object),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    })
}

fn is_exports(target: &AssignmentTarget) -> bool {
    let AssignmentTarget::StaticMemberExpression(member) = target else {
        return false;
    };
    let Expression::Identifier(object) = &member.object else {
        return false;
    };
    matches!(
        (object.name.as_str(), member.property.name.as_str()),
        ("module", "exports") | ("exports", "default")
    )
}

impl ExportObject {
    fn new(object: &ObjectExpression, source: &str) -> Self {
        let props = &object.properties;
        let mut config = None;
        let mut data = None;

        for (i, property) in props.iter().enumerate() {
            let ObjectPropertyKind::ObjectProperty(prop) = property else {
                continue;
            };
            if prop.computed {
                continue;
            }
            match literal::property_name(&prop.key).as_deref() {
                Some("config") if config.is_none() => {
                    let value = match &prop.value {
                        Expression::ObjectExpression(_) => literal::evaluate(&prop.value),
                        _ => Ok(None),
                    };
                    config = Some(ConfigProp {
                        removal: removal_span(props, i, source),
                        value,
                    });
                }
                Some("data") if data.is_none() => {
                    if let Expression::ObjectExpression(object) = &prop.value {
                        data = Some(object.span.start as usize);
                    }
                }
                _ => {}
            }
        }

        Self {
            span: range(object.span),
            config,
            data,
        }
    }
}

/// Range removing property `i` together with one separating comma, so the
/// remaining object stays well formed.
fn removal_span(props: &[ObjectPropertyKind], i: usize, source: &str) -> Range<usize> {
    let span = range(props[i].span());
    if let Some(next) = props.get(i + 1) {
        return span.start..next.span().start as usize;
    }
    if let Some(prev) = i.checked_sub(1).and_then(|i| props.get(i)) {
        return prev.span().end as usize..span.end;
    }

    let rest = &source[span.end..];
    let trimmed = rest.trim_start();
    match trimmed.starts_with(',') {
        true => span.start..span.end + (rest.len() - trimmed.len()) + 1,
        false => span,
    }
}

fn range(span: Span) -> Range<usize> {
    span.start as usize..span.end as usize
}

/// Renders `value` as a JavaScript string literal delimited by `quote`.
fn quote(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ if ch == quote => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Project, request_for};
    use serde_json::json;

    fn compile(project: &Project, rel: &str, source: &str) -> ScriptCompiler {
        let request = request_for(&project.config, rel);
        ScriptCompiler::new(source.to_string(), request, &project.ctx()).unwrap()
    }

    #[test]
    fn test_collects_imports_and_requires() {
        let project = Project::new();
        let script = compile(
            &project,
            "src/pages/a/util.js",
            r#"
            import a from './a'
            import { b } from "./b.json";
            import './side.wxs';
            const c = require('./c');
            foo.require('./not');
            const d = import('./dynamic');
            "#,
        );

        let found: Vec<_> = script
            .depends()
            .iter()
            .map(|d| (d.request.as_str(), d.request_type))
            .collect();
        assert_eq!(
            found,
            vec![
                ("./a", RequestType::Script),
                ("./b.json", RequestType::Json),
                ("./side.wxs", RequestType::Wxs),
                ("./c", RequestType::Script),
            ]
        );
    }

    #[test]
    fn test_wraps_component_export() {
        let project = Project::new();
        let source = "export default { data: {} }";

        let component = compile(&project, "src/components/x.wxc", source);
        assert_eq!(component.generate().unwrap(), "export default Component({ data: {} })");

        let page = compile(&project, "src/pages/x/x.wxp", "module.exports = {}");
        assert_eq!(page.generate().unwrap(), "module.exports = Page({})");

        let native = compile(&project, "src/components/x.js", source);
        assert_eq!(native.generate().unwrap(), source);
    }

    #[test]
    fn test_config_is_lifted() {
        let project = Project::new();
        let component = compile(
            &project,
            "src/components/x.wxc",
            r#"export default {
  config: {
    navigationBarTitleText: 'x',
    usingComponents: { 'bee-icon': '@b1/bee-icon' }
  },
  data: {}
}"#,
        );

        assert_eq!(component.config(), json!({"navigationBarTitleText": "x"}).as_object().unwrap());
        assert_eq!(component.depends().len(), 1);
        assert_eq!(component.depends()[0].request, "@b1/bee-icon");
        assert_eq!(
            component.depends()[0].handle,
            DependHandle::UsingKey("bee-icon".into())
        );

        let out = component.generate().unwrap();
        assert!(!out.contains("config"));
        assert!(out.contains("data: {}"));
        assert!(out.starts_with("export default Component({"));
    }

    #[test]
    fn test_dynamic_config_is_kept() {
        let project = Project::new();
        let component = compile(
            &project,
            "src/components/x.wxc",
            "export default { config: { title: compute() } }",
        );
        assert!(component.config().is_empty());
        assert!(component.generate().unwrap().contains("compute()"));
    }

    #[test]
    fn test_page_inherits_global_components() {
        let mut project = Project::new();
        project
            .app
            .using_components
            .insert("bee-nav".into(), json!("@b1/bee-nav"));
        let page = compile(
            &project,
            "src/pages/x/index.wxp",
            "export default { config: { usingComponents: { 'bee-nav': './nav' } } }",
        );

        assert_eq!(page.using_components()["bee-nav"], json!("./nav"));
        assert_eq!(page.depends().len(), 1);
    }

    #[test]
    fn test_rewrite_and_save_config() {
        let project = Project::new();
        let mut component = compile(
            &project,
            "src/components/x.wxc",
            "import u from './util'\nconst d = require(\"./d.json\")\nexport default { config: { usingComponents: { icon: './icon' } } }",
        );

        let uses = vec![
            project.use_request("./util", RequestType::Script, "src/components/util.js"),
            project.use_request("./d.json", RequestType::Json, "src/components/d.json"),
            project.use_request("./icon", RequestType::Component, "src/components/icon.wxc"),
        ];
        component.rewrite_depends(&uses);

        let out = component.generate().unwrap();
        assert!(out.contains("import u from './util.js'"));
        assert!(out.contains("require(\"./d.json.js\")"));

        component.save().unwrap();
        let json: Value = serde_json::from_str(
            &fs::read_to_string(project.config.cwd.join("dist/components/x.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json, json!({"usingComponents": {"icon": "./icon"}, "component": true}));
        assert!(project.config.cwd.join("dist/components/x.js").is_file());
    }

    #[test]
    fn test_config_removal_keeps_object_valid() {
        let project = Project::new();

        let last = compile(&project, "src/components/x.wxc", "export default { data: {}, config: { a: 1 } }");
        assert_eq!(last.generate().unwrap(), "export default Component({ data: {} })");

        let only = compile(&project, "src/components/x.wxc", "export default {\n  config: { a: 1 },\n}");
        assert_eq!(only.generate().unwrap(), "export default Component({\n  \n})");
    }

    #[test]
    fn test_reexports_and_unicode() {
        let project = Project::new();
        let mut script = compile(
            &project,
            "src/components/x.wxc",
            "export { a } from './a'\nexport * from './b'\nconst title = '标题'\nexport default { data: { title } }",
        );
        let found: Vec<_> = script.depends().iter().map(|d| d.request.as_str()).collect();
        assert_eq!(found, vec!["./a", "./b"]);

        script.rewrite_depends(&[project.use_request("./a", RequestType::Script, "src/components/a.js")]);
        let out = script.generate().unwrap();
        assert!(out.contains("export { a } from './a.js'"));
        assert!(out.contains("'标题'"));
    }

    #[test]
    fn test_syntax_error() {
        let project = Project::new();
        let request = request_for(&project.config, "src/components/x.js");
        let err = ScriptCompiler::new("export default {".into(), request, &project.ctx()).unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn test_docs_are_injected() {
        let project = Project::new();
        project.write("src/packages/bee-button/README.md", "# Button");
        project.write("src/pages/button/demos/default.wxc", "<template><view/></template>");

        let page = compile(
            &project,
            "src/pages/button/index.wxp",
            "export default { config: { usingComponents: { 'demo-default': './demos/default' } }, data: { a: 1 } }",
        );

        let out = page.generate().unwrap();
        assert!(out.contains("__code__: {\"readme\":"));
        assert!(out.contains("\"demoDefault\":"));
        assert!(out.contains("a: 1"));
    }
}
