use crate::request::{Request, RequestType};

/// Index into the parse tree of the compiler that extracted a [`Depend`].
///
/// The owning compiler uses it to rewrite the reference in place once the
/// dependency is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependHandle {
    /// A string literal token in a script.
    Literal(usize),
    /// An element in a template DOM.
    Element(usize),
    /// An at-rule in a style sheet.
    AtRule(usize),
    /// A declaration in a style sheet.
    Declaration(usize),
    /// A key of the `usingComponents` map.
    UsingKey(String),
}

/// An extracted, not yet resolved reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depend {
    pub request: String,
    pub request_type: RequestType,
    pub handle: DependHandle,
}

impl Depend {
    pub fn new(request: impl Into<String>, request_type: RequestType, handle: DependHandle) -> Self {
        Self {
            request: request.into(),
            request_type,
            handle,
        }
    }

    /// Whether a resolved child answers this reference.
    pub fn is_answered_by(&self, used: &UseRequest) -> bool {
        self.request == used.request && self.request_type == used.request_type
    }
}

/// A dependency that was resolved to a child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseRequest {
    pub request: String,
    pub request_type: RequestType,
    pub target: Request,
}

/// A dependency that couldn't be resolved in this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LackRequest {
    pub request: String,
    pub request_type: RequestType,
}
