//! Template compiler for `wxml` sources and template sections.

pub mod dom;

use serde_json::{Map, Value};

use crate::compiler::{Compile, CompileContext, answer, camel_case};
use crate::depend::{Depend, DependHandle, UseRequest};
use crate::error::CompileError;
use crate::request::{Request, RequestType};
use crate::resolve::path::relative_reference;

use self::dom::{Attr, Dom};

const PID_ATTR: &str = "_pid";
const PID_VALUE: &str = "{{_pid}}";

#[derive(Debug)]
pub struct TemplateCompiler {
    request: Request,
    dom: Dom,
    depends: Vec<Depend>,
    /// Custom element names, taken from the sibling script.
    components: Vec<String>,
}

impl TemplateCompiler {
    /// `using_components` lists the custom elements available to the
    /// template; page sources are wrapped into the app layout here.
    pub fn new(
        source: String,
        request: Request,
        using_components: &Map<String, Value>,
        ctx: &CompileContext,
    ) -> Result<Self, CompileError> {
        let placeholder = &ctx.config.layout_placeholder;
        let layout = &ctx.app.template;
        let source = if request.is_wxp() && !placeholder.is_empty() && layout.contains(placeholder.as_str()) {
            layout.replacen(placeholder.as_str(), &source, 1)
        } else {
            source
        };

        let dom = Dom::parse(&source).map_err(|e| CompileError::syntax(&request.src, e.offset, e.message))?;

        let mut this = Self {
            request,
            dom,
            depends: Vec::new(),
            components: using_components.keys().cloned().collect(),
        };
        this.collect_depends();
        Ok(this)
    }

    fn collect_depends(&mut self) {
        for id in self.dom.elements() {
            let request_type = match self.dom.name(id) {
                Some("import") => RequestType::Template,
                Some("image") => RequestType::Image,
                Some("wxs") => RequestType::Wxs,
                _ => continue,
            };
            let Some(src) = self.dom.attr(id, "src") else {
                continue;
            };
            if src.is_empty() || src.contains("{{") || !is_local(src) {
                continue;
            }
            self.depends
                .push(Depend::new(src, request_type, DependHandle::Element(id)));
        }
    }

    /// Marks custom elements with the page id and wires the documentation
    /// blocks of demo pages to the injected `__code__` data.
    fn decorate(&self, dom: &mut Dom) {
        let mut example_done = !self.request.is_wxp();

        for id in dom.elements() {
            let Some(name) = dom.name(id).map(str::to_string) else {
                continue;
            };

            if self.components.contains(&name) && !dom.has_attr(id, PID_ATTR) {
                dom.set_attr(id, PID_ATTR, PID_VALUE);
            }

            if !example_done && name == "example" {
                example_done = true;
                dom.append_element(
                    id,
                    "example-md",
                    vec![
                        Attr {
                            name: "content".into(),
                            value: Some("{{__code__.readme}}".into()),
                        },
                        Attr {
                            name: PID_ATTR.into(),
                            value: Some(PID_VALUE.into()),
                        },
                    ],
                );
            }

            if name.starts_with("demo-")
                && let Some(parent) = dom.parent(id)
                && dom.name(parent) == Some("example-demo")
                && !dom.has_attr(parent, "source")
            {
                dom.set_attr(parent, "source", format!("{{{{__code__.{}}}}}", camel_case(&name)));
            }
        }
    }
}

fn is_local(src: &str) -> bool {
    !(src.starts_with("http:") || src.starts_with("https:") || src.starts_with("//") || src.starts_with("data:"))
}

impl Compile for TemplateCompiler {
    fn request(&self) -> &Request {
        &self.request
    }

    fn dest_ext(&self) -> &str {
        ".wxml"
    }

    fn depends(&self) -> &[Depend] {
        &self.depends
    }

    fn rewrite_depends(&mut self, uses: &[UseRequest]) {
        let dest = self.dest();
        for depend in &self.depends {
            let (Some(used), DependHandle::Element(id)) = (answer(depend, uses), &depend.handle) else {
                continue;
            };
            let rel = relative_reference(&dest, &used.target.dest);
            self.dom.set_attr(*id, "src", rel);
        }
    }

    fn generate(&self) -> Result<String, CompileError> {
        let mut dom = self.dom.clone();
        self.decorate(&mut dom);
        Ok(dom.to_html())
    }

    /// The app template is the page layout and is never emitted.
    fn save(&self) -> Result<(), CompileError> {
        if self.request.is_wxa() {
            return Ok(());
        }
        let output = self.generate()?;
        crate::io::write(&self.dest(), output)?;
        tracing::info!("write {}", self.dest_relative());
        Ok(())
    }

    fn remove(&self) -> Result<(), CompileError> {
        if self.request.is_wxa() {
            return Ok(());
        }
        crate::io::remove(&self.dest())?;
        tracing::info!("delete {}", self.dest_relative());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Project, request_for};
    use serde_json::json;

    fn compile(project: &Project, rel: &str, source: &str, using: Value) -> TemplateCompiler {
        let request = request_for(&project.config, rel);
        let using = using.as_object().cloned().unwrap_or_default();
        TemplateCompiler::new(source.to_string(), request, &using, &project.ctx()).unwrap()
    }

    #[test]
    fn test_depends_and_rewrite() {
        let project = Project::new();
        let mut template = compile(
            &project,
            "src/components/card.wxml",
            r#"<import src="../common/tpl.wxml"/><image src="./a.png"/><image src="{{url}}"/><image src="https://x/y.png"/><wxs src="./f.wxs" module="f"/>"#,
            json!({}),
        );

        let found: Vec<_> = template
            .depends()
            .iter()
            .map(|d| (d.request.as_str(), d.request_type))
            .collect();
        assert_eq!(
            found,
            vec![
                ("../common/tpl.wxml", RequestType::Template),
                ("./a.png", RequestType::Image),
                ("./f.wxs", RequestType::Wxs),
            ]
        );

        let uses = vec![
            project.use_request("../common/tpl.wxml", RequestType::Template, "src/common/tpl.wxml"),
            project.use_request("./a.png", RequestType::Image, "src/components/a.png"),
        ];
        template.rewrite_depends(&uses);
        let out = template.generate().unwrap();
        assert!(out.contains(r#"<import src="../common/tpl.wxml" />"#));
        assert!(out.contains(r#"<image src="./a.png" />"#));
        assert!(out.contains(r#"<wxs src="./f.wxs" module="f" />"#));
    }

    #[test]
    fn test_import_without_extension() {
        let project = Project::new();
        let mut template = compile(
            &project,
            "src/components/card/card.wxml",
            r#"<import src="../tpl"/><view/>"#,
            json!({}),
        );
        assert_eq!(template.depends()[0].request, "../tpl");
        assert_eq!(template.depends()[0].request_type, RequestType::Template);

        template.rewrite_depends(&[project.use_request("../tpl", RequestType::Template, "src/components/tpl.wxml")]);
        let out = template.generate().unwrap();
        assert!(out.contains(r#"<import src="../tpl.wxml" />"#));
    }

    #[test]
    fn test_layout_wrap() {
        let mut project = Project::new();
        project.app.template = "<view class=\"layout\"><page></page></view>".into();

        let page = compile(&project, "src/pages/a/index.wxp", "<text>a</text>", json!({}));
        assert_eq!(
            page.generate().unwrap(),
            "<view class=\"layout\"><text>a</text></view>"
        );

        let component = compile(&project, "src/components/a.wxc", "<text>a</text>", json!({}));
        assert_eq!(component.generate().unwrap(), "<text>a</text>");

        project.app.template = "<view>no placeholder</view>".into();
        let page = compile(&project, "src/pages/a/index.wxp", "<text>a</text>", json!({}));
        assert_eq!(page.generate().unwrap(), "<text>a</text>");
    }

    #[test]
    fn test_component_pid_and_docs() {
        let project = Project::new();
        let page = compile(
            &project,
            "src/pages/button/index.wxp",
            "<example><example-demo><demo-default/></example-demo></example><bee-button/>",
            json!({"bee-button": "@b1/bee-button", "demo-default": "./demos/default"}),
        );

        assert_eq!(
            page.generate().unwrap(),
            concat!(
                r#"<example><example-demo source="{{__code__.demoDefault}}"><demo-default _pid="{{_pid}}" /></example-demo>"#,
                r#"<example-md content="{{__code__.readme}}" _pid="{{_pid}}"></example-md></example>"#,
                r#"<bee-button _pid="{{_pid}}" />"#
            )
        );
    }

    #[test]
    fn test_app_template_is_not_saved() {
        let project = Project::new();
        let app = compile(&project, "src/app.wxa", "<page></page>", json!({}));
        app.save().unwrap();
        assert!(!project.config.cwd.join("dist/app.wxml").exists());
    }
}
