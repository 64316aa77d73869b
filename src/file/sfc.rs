use crate::compiler::template::dom::{Dom, DomNode};
use crate::compiler::{Compile, CompileContext, ScriptCompiler, StyleCompiler, TemplateCompiler};
use crate::depend::{Depend, UseRequest};
use crate::error::CompileError;
use crate::request::{CompileType, Request};

/// Inner source of one top-level section of a single-file source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub code: String,
    pub lang: Option<String>,
}

impl Section {
    pub fn compile_type(&self) -> Option<CompileType> {
        self.lang.as_deref().and_then(CompileType::from_lang)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub template: Option<Section>,
    pub style: Option<Section>,
    pub script: Option<Section>,
}

/// Splits a single-file source into its first `<template>`, `<style>` and
/// `<script>` sections.
pub fn split_sections(source: &str, request: &Request) -> Result<Sections, CompileError> {
    let dom = Dom::parse(source).map_err(|e| CompileError::syntax(&request.src, e.offset, e.message))?;

    let mut sections = Sections::default();
    for &id in &dom.root {
        let DomNode::Element { name, inner, .. } = dom.node(id) else {
            continue;
        };
        let slot = match name.as_str() {
            "template" => &mut sections.template,
            "style" => &mut sections.style,
            "script" => &mut sections.script,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(Section {
                code: source[inner.clone()].to_string(),
                lang: dom.attr(id, "lang").map(str::to_string),
            });
        }
    }
    Ok(sections)
}

/// An app, page or component source, compiled by its three sections.
#[derive(Debug)]
pub struct SfcFile {
    script: ScriptCompiler,
    template: Option<TemplateCompiler>,
    style: Option<StyleCompiler>,
}

impl SfcFile {
    pub fn new(source: &str, request: Request, ctx: &CompileContext) -> Result<Self, CompileError> {
        let sections = split_sections(source, &request)?;

        // The script goes first, the template needs its components.
        let code = sections.script.map(|s| s.code).unwrap_or_default();
        let script = ScriptCompiler::new(code, request.clone(), ctx)?;

        let template = sections
            .template
            .map(|s| TemplateCompiler::new(s.code, request.clone(), script.using_components(), ctx))
            .transpose()?;

        let style = sections
            .style
            .map(|s| {
                let compile_type = s.compile_type();
                StyleCompiler::new(s.code, request, compile_type, ctx)
            })
            .transpose()?;

        Ok(Self {
            script,
            template,
            style,
        })
    }

    pub fn script(&self) -> &ScriptCompiler {
        &self.script
    }

    fn compilers(&self) -> impl Iterator<Item = &dyn Compile> {
        let script: &dyn Compile = &self.script;
        std::iter::once(script)
            .chain(self.template.as_ref().map(|t| t as &dyn Compile))
            .chain(self.style.as_ref().map(|s| s as &dyn Compile))
    }

    pub fn depends(&self) -> Vec<Depend> {
        self.compilers()
            .flat_map(|c| c.depends().iter().cloned())
            .collect()
    }

    pub fn rewrite_depends(&mut self, uses: &[UseRequest]) {
        self.script.rewrite_depends(uses);
        if let Some(template) = &mut self.template {
            template.rewrite_depends(uses);
        }
        if let Some(style) = &mut self.style {
            style.rewrite_depends(uses);
        }
    }

    pub fn save(&self) -> Result<(), CompileError> {
        self.compilers().try_for_each(|c| c.save())
    }

    pub fn remove(&self) -> Result<(), CompileError> {
        self.compilers().try_for_each(|c| c.remove())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestType;
    use crate::testing::{Project, request_for};

    #[test]
    fn test_split_sections() {
        let project = Project::new();
        let request = request_for(&project.config, "src/components/a.wxc");
        let sections = split_sections(
            "<template><view>{{a}}</view></template>\n<style lang=\"pcss\">.a { b: c }</style>\n<script>\nexport default { a: 1 < 2 }\n</script>\n<style>.ignored {}</style>",
            &request,
        )
        .unwrap();

        assert_eq!(sections.template.unwrap().code, "<view>{{a}}</view>");
        let style = sections.style.unwrap();
        assert_eq!(style.code, ".a { b: c }");
        assert_eq!(style.compile_type(), Some(CompileType::Pcss));
        assert_eq!(sections.script.unwrap().code, "\nexport default { a: 1 < 2 }\n");
    }

    #[test]
    fn test_component_outputs() {
        let project = Project::new();
        let request = request_for(&project.config, "src/components/card.wxc");
        let mut file = SfcFile::new(
            r#"<template><image src="./a.png"/><bee-icon/></template>
<style>@import './base';
.card { width: 10px; }</style>
<script>
import util from './util'
export default {
  config: { usingComponents: { 'bee-icon': './icon' } }
}
</script>"#,
            request,
            &project.ctx(),
        )
        .unwrap();

        let depends: Vec<_> = file.depends().into_iter().map(|d| d.request_type).collect();
        assert_eq!(
            depends,
            vec![
                RequestType::Script,
                RequestType::Component,
                RequestType::Image,
                RequestType::Style,
            ]
        );

        file.rewrite_depends(&[
            project.use_request("./util", RequestType::Script, "src/components/util.js"),
            project.use_request("./icon", RequestType::Component, "src/components/icon.wxc"),
            project.use_request("./a.png", RequestType::Image, "src/components/a.png"),
            project.use_request("./base", RequestType::Style, "src/components/base.wxss"),
        ]);
        file.save().unwrap();

        assert!(project.read("dist/components/card.js").contains("import util from './util.js'"));
        assert!(project.read("dist/components/card.json").contains("\"bee-icon\": \"./icon\""));
        assert_eq!(
            project.read("dist/components/card.wxml"),
            r#"<image src="./a.png" /><bee-icon _pid="{{_pid}}" />"#
        );
        assert!(project.read("dist/components/card.wxss").contains("@import './base.wxss';"));
        assert!(project.read("dist/components/card.wxss").contains("width: 10rpx;"));

        file.remove().unwrap();
        assert!(!project.root().join("dist/components/card.js").exists());
        assert!(!project.root().join("dist/components/card.json").exists());
        assert!(!project.root().join("dist/components/card.wxss").exists());
    }
}
