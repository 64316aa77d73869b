//! Fixtures shared by the unit tests.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::compiler::{CompileContext, StylePipeline};
use crate::config::Config;
use crate::depend::UseRequest;
use crate::global::AppGlobal;
use crate::markdown::Plain;
use crate::request::{Request, RequestType, dotted_ext};
use crate::resolve::path::src_to_dest_relative;

/// A throwaway project directory with a default configuration.
pub(crate) struct Project {
    _dir: TempDir,
    pub config: Config,
    pub app: AppGlobal,
    pub styles: Arc<StylePipeline>,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cwd = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        Self {
            _dir: dir,
            config: Config::new(cwd),
            app: AppGlobal::default(),
            styles: Arc::new(StylePipeline::default()),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.config.cwd
    }

    pub fn ctx(&self) -> CompileContext<'_> {
        CompileContext {
            config: &self.config,
            app: &self.app,
            markdown: &Plain,
            styles: &self.styles,
        }
    }

    /// Writes a file relative to the project root.
    pub fn write(&self, rel: &str, content: &str) -> Utf8PathBuf {
        let path = self.config.cwd.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.config.cwd.join(rel)).unwrap()
    }

    /// A resolved child, as the graph would hand it to a compiler.
    pub fn use_request(&self, request: &str, request_type: RequestType, src_rel: &str) -> UseRequest {
        UseRequest {
            request: request.to_string(),
            request_type,
            target: request_for(&self.config, src_rel),
        }
    }
}

/// A request for a project-relative source path, typed by its extension.
pub(crate) fn request_for(config: &Config, rel: &str) -> Request {
    let src_relative = Utf8PathBuf::from(rel);
    let ext = dotted_ext(&src_relative);
    let dest_relative = src_to_dest_relative(config, &src_relative, false);
    Request {
        request: format!("./{rel}"),
        request_type: RequestType::from_ext(&ext).unwrap(),
        src: config.cwd.join(&src_relative),
        src_relative,
        ext,
        dest: config.cwd.join(&dest_relative),
        dest_relative,
        is_third_npm: false,
        is_publish: false,
    }
}
