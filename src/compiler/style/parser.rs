//! A small CSS parser producing an arena of rules, at-rules, declarations
//! and comments, and the matching serializer.
//!
//! The grammar is the common subset of wxss, pcss and plain CSS, including
//! nested rules. Values are kept as raw text.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssNode {
    Rule {
        selector: String,
        children: Vec<usize>,
    },
    AtRule {
        name: String,
        params: String,
        /// `None` for statements such as `@import 'x';`.
        children: Option<Vec<usize>>,
    },
    Decl {
        prop: String,
        value: String,
    },
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub message: &'static str,
}

/// A parsed style sheet. Nodes are addressed by their index in the arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    nodes: Vec<CssNode>,
    pub root: Vec<usize>,
}

impl Sheet {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut parser = Parser {
            source,
            pos: 0,
            sheet: Sheet::default(),
        };
        let root = parser.block(None)?;
        let mut sheet = parser.sheet;
        sheet.root = root;
        Ok(sheet)
    }

    pub fn push(&mut self, node: CssNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node(&self, id: usize) -> &CssNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: usize) -> &mut CssNode {
        &mut self.nodes[id]
    }

    pub fn children(&self, id: usize) -> &[usize] {
        match &self.nodes[id] {
            CssNode::Rule { children, .. } => children,
            CssNode::AtRule {
                children: Some(children),
                ..
            } => children,
            _ => &[],
        }
    }

    /// Every reachable node in document order.
    pub fn walk(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.root.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Applies `f` to the value of every reachable declaration.
    pub fn map_values(&mut self, mut f: impl FnMut(&str) -> String) {
        for id in self.walk() {
            if let CssNode::Decl { value, .. } = &mut self.nodes[id] {
                *value = f(value);
            }
        }
    }

    pub fn to_css(&self) -> String {
        let mut out = String::new();
        self.write(&self.root, 0, &mut out);
        out
    }

    fn write(&self, ids: &[usize], depth: usize, out: &mut String) {
        for &id in ids {
            let indent = "  ".repeat(depth);
            match &self.nodes[id] {
                CssNode::Rule { selector, children } => {
                    out.push_str(&format!("{indent}{selector} {{\n"));
                    self.write(children, depth + 1, out);
                    out.push_str(&format!("{indent}}}\n"));
                }
                CssNode::AtRule { name, params, children } => {
                    out.push_str(&indent);
                    out.push('@');
                    out.push_str(name);
                    if !params.is_empty() {
                        out.push(' ');
                        out.push_str(params);
                    }
                    match children {
                        Some(children) => {
                            out.push_str(" {\n");
                            self.write(children, depth + 1, out);
                            out.push_str(&format!("{indent}}}\n"));
                        }
                        None => out.push_str(";\n"),
                    }
                }
                CssNode::Decl { prop, value } => {
                    out.push_str(&format!("{indent}{prop}: {value};\n"));
                }
                CssNode::Comment(text) => {
                    out.push_str(&format!("{indent}/*{text}*/\n"));
                }
            }
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    sheet: Sheet,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, offset: usize, message: &'static str) -> ParseError {
        ParseError { offset, message }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.source.len() - trimmed.len();
    }

    /// Parses a list of statements. `open` is the offset of the `{` that
    /// opened a nested block, the top level has none.
    fn block(&mut self, open: Option<usize>) -> Result<Vec<usize>, ParseError> {
        let mut ids = Vec::new();
        loop {
            self.skip_ws();
            let start = self.pos;
            match self.peek() {
                None => {
                    return match open {
                        Some(open) => Err(self.error(open, "unclosed block")),
                        None => Ok(ids),
                    };
                }
                Some('}') => {
                    self.pos += 1;
                    return match open {
                        Some(_) => Ok(ids),
                        None => Err(self.error(start, "unexpected '}'")),
                    };
                }
                Some(';') => self.pos += 1,
                Some('/') if self.rest().starts_with("/*") => {
                    let end = self.rest()[2..]
                        .find("*/")
                        .ok_or_else(|| self.error(start, "unclosed comment"))?;
                    let text = self.rest()[2..2 + end].to_string();
                    self.pos += end + 4;
                    ids.push(self.sheet.push(CssNode::Comment(text)));
                }
                Some('@') => {
                    self.pos += 1;
                    let name_len = self
                        .rest()
                        .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
                        .unwrap_or(self.rest().len());
                    let name = self.rest()[..name_len].to_string();
                    self.pos += name_len;

                    let (params, stop) = self.prelude();
                    let children = match stop {
                        Some('{') => Some(self.block(Some(self.pos - 1))?),
                        _ => None,
                    };
                    ids.push(self.sheet.push(CssNode::AtRule {
                        name,
                        params,
                        children,
                    }));
                }
                Some(_) => {
                    let (prelude, stop) = self.prelude();
                    if stop == Some('{') {
                        let children = self.block(Some(self.pos - 1))?;
                        ids.push(self.sheet.push(CssNode::Rule {
                            selector: prelude,
                            children,
                        }));
                        continue;
                    }

                    let Some((prop, value)) = prelude.split_once(':') else {
                        return Err(self.error(start, "unknown word"));
                    };
                    ids.push(self.sheet.push(CssNode::Decl {
                        prop: prop.trim().to_string(),
                        value: value.trim().to_string(),
                    }));
                }
            }
        }
    }

    /// Reads up to the next `;`, `{` or `}` outside of strings and
    /// parentheses. `;` and `{` are consumed, `}` is left for the block.
    fn prelude(&mut self) -> (String, Option<char>) {
        let start = self.pos;
        let mut quote = None;
        let mut depth = 0usize;
        let mut escaped = false;

        for (i, ch) in self.rest().char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match (quote, ch) {
                (_, '\\') => escaped = true,
                (Some(q), _) if ch == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(ch),
                (None, '(') => depth += 1,
                (None, ')') => depth = depth.saturating_sub(1),
                (None, ';' | '{' | '}') if depth == 0 => {
                    let text = self.source[start..start + i].trim().to_string();
                    self.pos = start + i + if ch == '}' { 0 } else { 1 };
                    return (text, Some(ch));
                }
                _ => {}
            }
        }

        self.pos = self.source.len();
        (self.source[start..].trim().to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_serialize() {
        let sheet = Sheet::parse(
            "@import './base.wxss';\n/* c */\n.a, .b{color:red;background:url('x;y.png')}\n@media (max-width: 10px) { .c { margin: 0 } }",
        )
        .unwrap();

        assert_eq!(sheet.root.len(), 4);
        assert_eq!(
            sheet.node(sheet.root[0]),
            &CssNode::AtRule {
                name: "import".into(),
                params: "'./base.wxss'".into(),
                children: None,
            }
        );
        assert_eq!(
            sheet.to_css(),
            "@import './base.wxss';\n/* c */\n.a, .b {\n  color: red;\n  background: url('x;y.png');\n}\n@media (max-width: 10px) {\n  .c {\n    margin: 0;\n  }\n}\n"
        );
    }

    #[test]
    fn test_nested_rules() {
        let sheet = Sheet::parse(".a { color: red; &:hover { color: blue } .b { top: 0 } }").unwrap();
        let rule = sheet.root[0];
        assert_eq!(sheet.children(rule).len(), 3);
        assert!(matches!(
            sheet.node(sheet.children(rule)[1]),
            CssNode::Rule { selector, .. } if selector == "&:hover"
        ));
        assert_eq!(sheet.walk().len(), 6);
    }

    #[test]
    fn test_errors() {
        assert_eq!(Sheet::parse(".a { color: red").unwrap_err().message, "unclosed block");
        assert_eq!(Sheet::parse("}").unwrap_err().message, "unexpected '}'");
        assert_eq!(Sheet::parse(".a { oops }").unwrap_err().message, "unknown word");
    }
}
