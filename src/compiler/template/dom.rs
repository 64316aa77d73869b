//! A forgiving HTML-like parser for wxml and single-file sources.
//!
//! Attribute order, quoting of values and raw text are preserved, so a
//! parse followed by [`Dom::to_html`] reproduces the markup closely.

use std::ops::Range;

/// Elements whose content is raw text.
const RAW_TEXT: &[&str] = &["script", "style", "wxs"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    /// `None` for bare boolean attributes.
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Element {
        name: String,
        attrs: Vec<Attr>,
        children: Vec<usize>,
        self_closing: bool,
        /// Source span between the opening and closing tags.
        inner: Range<usize>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub message: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dom {
    nodes: Vec<DomNode>,
    parents: Vec<Option<usize>>,
    pub root: Vec<usize>,
}

impl Dom {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Parser {
            source,
            pos: 0,
            dom: Dom::default(),
            open: Vec::new(),
        }
        .run()
    }

    pub fn node(&self, id: usize) -> &DomNode {
        &self.nodes[id]
    }

    pub fn parent(&self, id: usize) -> Option<usize> {
        self.parents[id]
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        match &self.nodes[id] {
            DomNode::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn children(&self, id: usize) -> &[usize] {
        match &self.nodes[id] {
            DomNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn attr(&self, id: usize, key: &str) -> Option<&str> {
        match &self.nodes[id] {
            DomNode::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name == key)
                .and_then(|a| a.value.as_deref()),
            _ => None,
        }
    }

    pub fn has_attr(&self, id: usize, key: &str) -> bool {
        match &self.nodes[id] {
            DomNode::Element { attrs, .. } => attrs.iter().any(|a| a.name == key),
            _ => false,
        }
    }

    /// Sets an attribute, keeping its position when it already exists.
    pub fn set_attr(&mut self, id: usize, key: &str, value: impl Into<String>) {
        if let DomNode::Element { attrs, .. } = &mut self.nodes[id] {
            let value = Some(value.into());
            match attrs.iter_mut().find(|a| a.name == key) {
                Some(attr) => attr.value = value,
                None => attrs.push(Attr {
                    name: key.to_string(),
                    value,
                }),
            }
        }
    }

    /// Appends a new empty element as the last child of `parent`.
    pub fn append_element(&mut self, parent: usize, name: &str, attrs: Vec<Attr>) -> usize {
        let id = self.push(
            DomNode::Element {
                name: name.to_string(),
                attrs,
                children: Vec::new(),
                self_closing: false,
                inner: 0..0,
            },
            Some(parent),
        );
        if let DomNode::Element {
            children, self_closing, ..
        } = &mut self.nodes[parent]
        {
            children.push(id);
            *self_closing = false;
        }
        id
    }

    /// Every element in document order.
    pub fn elements(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.root.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let DomNode::Element { children, .. } = &self.nodes[id] {
                out.push(id);
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &id in &self.root {
            self.write(id, &mut out);
        }
        out
    }

    fn write(&self, id: usize, out: &mut String) {
        match &self.nodes[id] {
            DomNode::Text(text) => out.push_str(text),
            DomNode::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            DomNode::Element {
                name,
                attrs,
                children,
                self_closing,
                ..
            } => {
                out.push('<');
                out.push_str(name);
                for attr in attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    if let Some(value) = &attr.value {
                        let q = if value.contains('"') { '\'' } else { '"' };
                        out.push('=');
                        out.push(q);
                        out.push_str(value);
                        out.push(q);
                    }
                }
                if *self_closing {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for &child in children {
                    self.write(child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }

    fn push(&mut self, node: DomNode, parent: Option<usize>) -> usize {
        self.nodes.push(node);
        self.parents.push(parent);
        self.nodes.len() - 1
    }
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    dom: Dom,
    /// Currently open elements, innermost last.
    open: Vec<usize>,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.source[self.pos..]
    }

    fn error(&self, offset: usize, message: &'static str) -> ParseError {
        ParseError { offset, message }
    }

    fn attach(&mut self, node: DomNode) -> usize {
        let parent = self.open.last().copied();
        let id = self.dom.push(node, parent);
        match parent {
            Some(parent) => {
                if let DomNode::Element { children, .. } = &mut self.dom.nodes[parent] {
                    children.push(id);
                }
            }
            None => self.dom.root.push(id),
        }
        id
    }

    fn close(&mut self, id: usize, end: usize) {
        if let DomNode::Element { inner, .. } = &mut self.dom.nodes[id] {
            inner.end = end;
        }
    }

    fn run(mut self) -> Result<Dom, ParseError> {
        while self.pos < self.source.len() {
            let start = self.pos;
            if self.rest().starts_with("<!--") {
                let end = self.rest()[4..]
                    .find("-->")
                    .ok_or_else(|| self.error(start, "unclosed comment"))?;
                let text = self.rest()[4..4 + end].to_string();
                self.pos += end + 7;
                self.attach(DomNode::Comment(text));
            } else if self.rest().starts_with("</") {
                self.closing_tag()?;
            } else if self.rest().starts_with('<')
                && self.rest()[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.opening_tag()?;
            } else {
                let first = self.rest().chars().next().map_or(0, char::len_utf8);
                let len = self.rest()[first..]
                    .find('<')
                    .map_or(self.rest().len(), |i| i + first);
                let text = self.rest()[..len].to_string();
                self.pos += len;
                self.attach(DomNode::Text(text));
            }
        }

        let end = self.source.len();
        while let Some(id) = self.open.pop() {
            self.close(id, end);
        }
        Ok(self.dom)
    }

    fn closing_tag(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| self.error(start, "unclosed tag"))?;
        let name = self.rest()[2..end].trim().to_string();
        self.pos += end + 1;

        if let Some(depth) = self
            .open
            .iter()
            .rposition(|&id| self.dom.name(id) == Some(name.as_str()))
        {
            for id in self.open.split_off(depth) {
                self.close(id, start);
            }
        }
        Ok(())
    }

    fn opening_tag(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.take_while(|c| !(c.is_whitespace() || c == '>' || c == '/'));

        let mut attrs = Vec::new();
        let self_closing = loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(start, "unclosed tag"));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }

            let key = self.take_while(|c| !(c.is_whitespace() || c == '=' || c == '>' || c == '/'));
            self.skip_ws();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_ws();
                Some(self.attr_value(start)?)
            } else {
                None
            };
            attrs.push(Attr { name: key, value });
        };

        let inner_start = self.pos;
        let raw = RAW_TEXT.contains(&name.to_ascii_lowercase().as_str());
        let id = self.attach(DomNode::Element {
            name: name.clone(),
            attrs,
            children: Vec::new(),
            self_closing,
            inner: inner_start..inner_start,
        });
        if self_closing {
            return Ok(());
        }

        if raw {
            let closing = format!("</{}", name.to_ascii_lowercase());
            let len = self
                .rest()
                .to_ascii_lowercase()
                .find(&closing)
                .unwrap_or(self.rest().len());
            if len > 0 {
                let text = self.rest()[..len].to_string();
                self.pos += len;
                self.open.push(id);
                self.attach(DomNode::Text(text));
                self.open.pop();
            }
            self.close(id, self.pos);
            if self.rest().starts_with("</") {
                let end = self.rest().find('>').map_or(self.rest().len(), |i| i + 1);
                self.pos += end;
            }
            return Ok(());
        }

        self.open.push(id);
        Ok(())
    }

    fn attr_value(&mut self, tag_start: usize) -> Result<String, ParseError> {
        match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => {
                let end = self.rest()[1..]
                    .find(q)
                    .ok_or_else(|| self.error(tag_start, "unclosed attribute value"))?;
                let value = self.rest()[1..1 + end].to_string();
                self.pos += end + 2;
                Ok(value)
            }
            _ => Ok(self.take_while(|c| !(c.is_whitespace() || c == '>'))),
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> String {
        let len = self.rest().find(|c: char| !f(c)).unwrap_or(self.rest().len());
        let out = self.rest()[..len].to_string();
        self.pos += len;
        out
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.source.len() - trimmed.len();
    }
}
