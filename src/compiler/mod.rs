//! Per-format compilers.
//!
//! Each compiler parses its source once at construction, exposes the
//! references it found as [`Depend`]s, rewrites them in place once the graph
//! resolved them, and finally generates and saves its output.

pub mod script;
pub mod style;
pub mod template;

use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::config::Config;
use crate::depend::{Depend, UseRequest};
use crate::error::CompileError;
use crate::global::AppGlobal;
use crate::io;
use crate::markdown::Markdown;
use crate::request::Request;

pub use self::script::ScriptCompiler;
pub use self::style::{StyleCompiler, StylePipeline, StylePlugin};
pub use self::template::TemplateCompiler;

/// Borrowed project state a compiler may consult while it is constructed.
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    pub config: &'a Config,
    pub app: &'a AppGlobal,
    pub markdown: &'a dyn Markdown,
    pub styles: &'a Arc<StylePipeline>,
}

pub trait Compile {
    fn request(&self) -> &Request;

    /// Dotted extension of the emitted file.
    fn dest_ext(&self) -> &str;

    fn depends(&self) -> &[Depend];

    /// Points every depend answered by `uses` at the child's destination.
    fn rewrite_depends(&mut self, uses: &[UseRequest]);

    fn generate(&self) -> Result<String, CompileError>;

    fn dest(&self) -> Utf8PathBuf {
        self.request().dest_with_ext(self.dest_ext())
    }

    fn dest_relative(&self) -> Utf8PathBuf {
        self.request().dest_relative_with_ext(self.dest_ext())
    }

    fn save(&self) -> Result<(), CompileError> {
        let output = self.generate()?;
        io::write(&self.dest(), output)?;
        tracing::info!("write {}", self.dest_relative());
        self.after_save()
    }

    fn after_save(&self) -> Result<(), CompileError> {
        Ok(())
    }

    fn remove(&self) -> Result<(), CompileError> {
        io::remove(&self.dest())?;
        tracing::info!("delete {}", self.dest_relative());
        Ok(())
    }
}

/// The child that answers `depend`, if it was resolved.
pub(crate) fn answer<'u>(depend: &Depend, uses: &'u [UseRequest]) -> Option<&'u UseRequest> {
    uses.iter().find(|used| depend.is_answered_by(used))
}

/// `demo-default` to `demoDefault`.
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' || ch == ' ' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Pieces of source text to replace, applied back to front.
#[derive(Debug, Clone, Default)]
pub(crate) struct Edits(Vec<(std::ops::Range<usize>, String)>);

impl Edits {
    pub fn replace(&mut self, span: std::ops::Range<usize>, text: impl Into<String>) {
        self.0.push((span, text.into()));
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.0.push((at..at, text.into()));
    }

    pub fn extend(&mut self, other: &Edits) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Applies the edits to `source`. Overlapping edits are dropped, the
    /// one starting first wins.
    pub fn apply(mut self, source: &str) -> String {
        self.0.sort_by_key(|(span, _)| (span.start, span.end));

        let mut out = String::with_capacity(source.len());
        let mut last = 0;
        for (span, text) in self.0 {
            if span.start < last {
                tracing::debug!("dropping overlapping edit at {}", span.start);
                continue;
            }
            out.push_str(&source[last..span.start]);
            out.push_str(&text);
            last = span.end;
        }
        out.push_str(&source[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("demo-default"), "demoDefault");
        assert_eq!(camel_case("demo-with-icon"), "demoWithIcon");
        assert_eq!(camel_case("-demo"), "demo");
    }

    #[test]
    fn test_edits() {
        let mut edits = Edits::default();
        edits.insert(0, "Component(");
        edits.insert(7, ")");
        edits.replace(1..6, "a: 1");
        edits.replace(2..3, "dropped");
        assert_eq!(edits.apply("{x: 12}"), "Component({a: 1})");
    }
}
