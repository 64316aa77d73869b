#[cfg(feature = "live")]
use std::sync::mpsc::RecvError;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::request::RequestType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read configuration file.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't parse configuration file '{0}'.\n{1}")]
    Json(Utf8PathBuf, serde_json::Error),

    #[error("Unknown configuration variable '{{{{{0}}}}}'")]
    UnknownVariable(String),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

/// Contract violations raised by the resolver. A reference that simply
/// cannot be found is not an error, see [`crate::Resolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Empty request is only allowed for main entries (parent: {0:?})")]
    EmptyRequest(Option<Utf8PathBuf>),

    #[error("Absolute request '{0}' is only allowed for main entries")]
    AbsoluteRequest(String),

    #[error("Request '{0}' has neither a known extension nor an explicit type")]
    MissingType(String),

    #[error("Request '{request}' has extension '{ext}' of type {found:?}, expected {expected:?}")]
    TypeMismatch {
        request: String,
        ext: String,
        expected: RequestType,
        found: RequestType,
    },

    #[error("Couldn't read '{0}'.\n{1}")]
    PackageJson(Utf8PathBuf, serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Couldn't read source file.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("{path}:{offset}: {message}")]
    Syntax {
        path: Utf8PathBuf,
        offset: usize,
        message: String,
    },

    #[error("{path}: {message}")]
    Parse { path: Utf8PathBuf, message: String },

    #[error("Couldn't serialize config.\n{0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "grass")]
    #[error("Couldn't compile scss.\n{0}")]
    Sass(#[from] Box<grass::Error>),

    #[error("Style dialect of '{0}' requires a feature that is not enabled")]
    Unsupported(Utf8PathBuf),

    #[error("No compiler for '{0}' of type {1:?}")]
    NoCompiler(Utf8PathBuf, RequestType),
}

impl CompileError {
    pub(crate) fn syntax(path: impl Into<Utf8PathBuf>, offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            path: path.into(),
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn parse(path: impl Into<Utf8PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Error while resolving dependency.\n{0}")]
    Resolve(#[from] ResolveError),

    #[error("Error while compiling '{0}'.\n{1}")]
    Compile(Utf8PathBuf, CompileError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Missing file '{0}'")]
    MissingFile(Utf8PathBuf),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),
}
