//! The post-processing chain run over `pcss` style sheets.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::CompileError;

use super::parser::{CssNode, Sheet};

static RE_VAR_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_-]*)").expect("valid regex"));

/// One stage of the style pipeline.
pub trait StylePlugin: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, sheet: &mut Sheet) -> Result<(), CompileError>;
}

/// An ordered chain of [`StylePlugin`]s.
pub struct StylePipeline {
    plugins: Vec<Box<dyn StylePlugin>>,
}

impl StylePipeline {
    pub fn empty() -> Self {
        Self { plugins: Vec::new() }
    }

    /// Appends a stage to the end of the chain.
    pub fn push(&mut self, plugin: impl StylePlugin + 'static) -> &mut Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn run(&self, sheet: &mut Sheet) -> Result<(), CompileError> {
        for plugin in &self.plugins {
            tracing::trace!("style plugin {}", plugin.name());
            plugin.process(sheet)?;
        }
        Ok(())
    }
}

impl Default for StylePipeline {
    fn default() -> Self {
        let mut pipeline = Self::empty();
        pipeline.push(Variables).push(Nesting);
        pipeline
    }
}

impl std::fmt::Debug for StylePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}

/// Top-level `$name: value;` declarations, substituted into every value and
/// at-rule parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Variables;

impl StylePlugin for Variables {
    fn name(&self) -> &str {
        "variables"
    }

    fn process(&self, sheet: &mut Sheet) -> Result<(), CompileError> {
        let mut vars: HashMap<String, String> = HashMap::new();
        let mut root = Vec::with_capacity(sheet.root.len());

        for &id in &sheet.root {
            match sheet.node(id) {
                CssNode::Decl { prop, value } if prop.starts_with('$') => {
                    let value = substitute(value, &vars);
                    vars.insert(prop[1..].to_string(), value);
                }
                _ => root.push(id),
            }
        }
        sheet.root = root;

        if vars.is_empty() {
            return Ok(());
        }
        for id in sheet.walk() {
            match sheet.node_mut(id) {
                CssNode::Decl { value, .. } => *value = substitute(value, &vars),
                CssNode::AtRule { params, .. } => *params = substitute(params, &vars),
                _ => {}
            }
        }
        Ok(())
    }
}

fn substitute(input: &str, vars: &HashMap<String, String>) -> String {
    RE_VAR_REF
        .replace_all(input, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Unwraps nested rules into flat ones, `&` standing for the parent
/// selector. At-rules nested in a rule are hoisted and wrap a copy of it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Nesting;

impl StylePlugin for Nesting {
    fn name(&self) -> &str {
        "nesting"
    }

    fn process(&self, sheet: &mut Sheet) -> Result<(), CompileError> {
        let root = std::mem::take(&mut sheet.root);
        sheet.root = flatten(sheet, root, None);
        Ok(())
    }
}

fn is_leaf(node: &CssNode) -> bool {
    matches!(node, CssNode::Decl { .. } | CssNode::Comment(_))
        || matches!(node, CssNode::AtRule { children: None, .. })
}

fn flatten(sheet: &mut Sheet, ids: Vec<usize>, parent: Option<&str>) -> Vec<usize> {
    let mut out = Vec::with_capacity(ids.len());

    for id in ids {
        match sheet.node(id).clone() {
            CssNode::Rule { selector, children } => {
                let selector = match parent {
                    Some(parent) => join_selectors(parent, &selector),
                    None => selector,
                };
                let (own, nested): (Vec<usize>, Vec<usize>) =
                    children.into_iter().partition(|&c| is_leaf(sheet.node(c)));

                if !own.is_empty() || nested.is_empty() {
                    *sheet.node_mut(id) = CssNode::Rule {
                        selector: selector.clone(),
                        children: own,
                    };
                    out.push(id);
                }
                out.extend(flatten(sheet, nested, Some(&selector)));
            }
            CssNode::AtRule {
                name,
                params,
                children: Some(children),
            } => {
                let children = match parent {
                    Some(parent) => {
                        let (own, nested): (Vec<usize>, Vec<usize>) =
                            children.into_iter().partition(|&c| is_leaf(sheet.node(c)));
                        let mut inner = Vec::new();
                        if !own.is_empty() {
                            inner.push(sheet.push(CssNode::Rule {
                                selector: parent.to_string(),
                                children: own,
                            }));
                        }
                        inner.extend(flatten(sheet, nested, Some(parent)));
                        inner
                    }
                    None => flatten(sheet, children, None),
                };
                *sheet.node_mut(id) = CssNode::AtRule {
                    name,
                    params,
                    children: Some(children),
                };
                out.push(id);
            }
            _ => out.push(id),
        }
    }

    out
}

fn join_selectors(parent: &str, child: &str) -> String {
    let mut out = Vec::new();
    for p in parent.split(',').map(str::trim) {
        for c in child.split(',').map(str::trim) {
            if c.contains('&') {
                out.push(c.replace('&', p));
            } else {
                out.push(format!("{p} {c}"));
            }
        }
    }
    out.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        let mut sheet = Sheet::parse(source).unwrap();
        StylePipeline::default().run(&mut sheet).unwrap();
        sheet.to_css()
    }

    #[test]
    fn test_variables() {
        let out = run("$color: red;\n$border: 1px solid $color;\n.a { border: $border; color: $other; }");
        assert_eq!(out, ".a {\n  border: 1px solid red;\n  color: $other;\n}\n");
    }

    #[test]
    fn test_nesting() {
        let out = run(".a, .b { color: red; &:hover { color: blue; } .c { top: 0; } }");
        assert_eq!(
            out,
            ".a, .b {\n  color: red;\n}\n.a:hover, .b:hover {\n  color: blue;\n}\n.a .c, .b .c {\n  top: 0;\n}\n"
        );
    }

    #[test]
    fn test_nested_media_is_hoisted() {
        let out = run(".a { @media (min-width: 1px) { color: red; } }");
        assert_eq!(out, "@media (min-width: 1px) {\n  .a {\n    color: red;\n  }\n}\n");
    }

    #[test]
    fn test_custom_stage() {
        struct Upper;
        impl StylePlugin for Upper {
            fn name(&self) -> &str {
                "upper"
            }
            fn process(&self, sheet: &mut Sheet) -> Result<(), CompileError> {
                sheet.map_values(|v| v.to_uppercase());
                Ok(())
            }
        }

        let mut pipeline = StylePipeline::default();
        pipeline.push(Upper);
        let mut sheet = Sheet::parse(".a { color: red; }").unwrap();
        pipeline.run(&mut sheet).unwrap();
        assert_eq!(sheet.to_css(), ".a {\n  color: RED;\n}\n");
    }
}
