//! The request model shared by the resolver, the compilers and the graph.

use camino::{Utf8Path, Utf8PathBuf};

/// Classification of a reference or a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestType {
    Template,
    Script,
    Style,
    Json,
    IconFont,
    Image,
    Wxs,
    App,
    Page,
    Component,
}

/// Dialect of a style or script source, chosen by extension or by the
/// `lang` attribute of a single-file section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileType {
    Sass,
    Pcss,
}

/// Known extensions with their classification and optional dialect.
pub const LANG_TYPES: &[(&str, RequestType, Option<CompileType>)] = &[
    (".wxa", RequestType::App, None),
    (".wxp", RequestType::Page, None),
    (".wxc", RequestType::Component, None),
    (".wxml", RequestType::Template, None),
    (".wxss", RequestType::Style, None),
    (".scss", RequestType::Style, Some(CompileType::Sass)),
    (".pcss", RequestType::Style, Some(CompileType::Pcss)),
    (".js", RequestType::Script, None),
    (".wxs", RequestType::Wxs, None),
    (".json", RequestType::Json, None),
    (".png", RequestType::Image, None),
    (".jpg", RequestType::Image, None),
    (".jpeg", RequestType::Image, None),
    (".gif", RequestType::Image, None),
    (".webp", RequestType::Image, None),
    (".eot", RequestType::IconFont, None),
    (".svg", RequestType::IconFont, None),
    (".svg", RequestType::Image, None),
    (".ttf", RequestType::IconFont, None),
    (".woff", RequestType::IconFont, None),
];

impl RequestType {
    /// Classification of a dotted extension, e.g. `".wxc"`.
    pub fn from_ext(ext: &str) -> Option<Self> {
        LANG_TYPES
            .iter()
            .find(|(e, ..)| *e == ext)
            .map(|(_, ty, _)| *ty)
    }

    /// Every dotted extension that may carry this classification.
    pub fn exts(self) -> Vec<&'static str> {
        LANG_TYPES
            .iter()
            .filter(|(_, ty, _)| *ty == self)
            .map(|(ext, ..)| *ext)
            .collect()
    }

    /// Single-file sources: app, page, component.
    pub fn is_sfc(self) -> bool {
        matches!(self, Self::App | Self::Page | Self::Component)
    }

    pub fn is_script(self) -> bool {
        matches!(self, Self::Script | Self::Wxs)
    }

    pub fn is_style(self) -> bool {
        matches!(self, Self::Style)
    }

    pub fn is_template(self) -> bool {
        matches!(self, Self::Template)
    }

    pub fn is_native(self) -> bool {
        self.is_script() || self.is_style() || self.is_template()
    }

    pub fn is_static(self) -> bool {
        matches!(self, Self::Json | Self::Image | Self::IconFont)
    }
}

impl CompileType {
    /// Dialect of a dotted extension, e.g. `".scss"`.
    pub fn from_ext(ext: &str) -> Option<Self> {
        LANG_TYPES
            .iter()
            .find(|(e, ..)| *e == ext)
            .and_then(|(.., compile)| *compile)
    }

    /// Dialect named by a `lang` attribute, e.g. `lang="pcss"`.
    pub fn from_lang(lang: &str) -> Option<Self> {
        Self::from_ext(&format!(".{lang}"))
    }
}

/// Dotted extension of a path, or an empty string.
pub fn dotted_ext(path: impl AsRef<Utf8Path>) -> String {
    path.as_ref()
        .extension()
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// A reference resolved to a concrete source file and destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The textual reference as written by the caller.
    pub request: String,
    pub request_type: RequestType,
    /// Absolute source path.
    pub src: Utf8PathBuf,
    /// Source path relative to the project root.
    pub src_relative: Utf8PathBuf,
    /// Dotted extension of the source file.
    pub ext: String,
    /// Absolute destination path, still carrying the source extension.
    pub dest: Utf8PathBuf,
    /// Destination path relative to the project root.
    pub dest_relative: Utf8PathBuf,
    pub is_third_npm: bool,
    pub is_publish: bool,
}

impl Request {
    pub fn is_sfc(&self) -> bool {
        self.request_type.is_sfc()
    }

    pub fn is_wxc(&self) -> bool {
        self.request_type == RequestType::Component
    }

    pub fn is_wxp(&self) -> bool {
        self.request_type == RequestType::Page
    }

    pub fn is_wxa(&self) -> bool {
        self.request_type == RequestType::App
    }

    pub fn compile_type(&self) -> Option<CompileType> {
        CompileType::from_ext(&self.ext)
    }

    /// Destination path with the extension replaced, e.g. `index.wxc` to
    /// `index.wxml`.
    pub fn dest_with_ext(&self, ext: &str) -> Utf8PathBuf {
        replace_ext(&self.dest, ext)
    }

    pub fn dest_relative_with_ext(&self, ext: &str) -> Utf8PathBuf {
        replace_ext(&self.dest_relative, ext)
    }
}

/// Replaces the dotted extension of `path` with `ext`, which may be empty.
pub fn replace_ext(path: &Utf8Path, ext: &str) -> Utf8PathBuf {
    let stem = match path.extension() {
        Some(old) => &path.as_str()[..path.as_str().len() - old.len() - 1],
        None => path.as_str(),
    };
    Utf8PathBuf::from(format!("{stem}{ext}"))
}

/// What the caller knows about a reference before resolution.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub request: String,
    pub request_type: Option<RequestType>,
    /// Absolute path of the referencing file, or of a directory for entries.
    pub parent: Option<Utf8PathBuf>,
    pub is_main: bool,
    pub is_publish: bool,
    pub is_third_npm: bool,
}

impl RequestOptions {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<Utf8PathBuf>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn main(mut self) -> Self {
        self.is_main = true;
        self
    }

    pub fn publish(mut self, is_publish: bool) -> Self {
        self.is_publish = is_publish;
        self
    }

    pub fn third_npm(mut self, is_third_npm: bool) -> Self {
        self.is_third_npm = is_third_npm;
        self
    }
}
