//! Per-file handlers dispatching to the format compilers.

pub mod native;
pub mod passthrough;
pub mod sfc;

use std::fs;

use crate::compiler::CompileContext;
use crate::depend::{Depend, UseRequest};
use crate::error::CompileError;
use crate::request::Request;

pub use self::native::NativeFile;
pub use self::passthrough::StaticFile;
pub use self::sfc::{Section, Sections, SfcFile, split_sections};

/// The handler of one source file, chosen by its type.
#[derive(Debug)]
pub enum WxFile {
    Sfc(Box<SfcFile>),
    Native(NativeFile),
    Static(StaticFile),
}

impl WxFile {
    pub fn new(request: Request, ctx: &CompileContext) -> Result<Self, CompileError> {
        tracing::info!("build {}", request.src_relative);

        let ty = request.request_type;
        if ty.is_static() {
            return Ok(Self::Static(StaticFile::new(request)));
        }

        let source = fs::read_to_string(&request.src)?;
        if ty.is_sfc() {
            Ok(Self::Sfc(Box::new(SfcFile::new(&source, request, ctx)?)))
        } else {
            Ok(Self::Native(NativeFile::new(source, request, ctx)?))
        }
    }

    pub fn depends(&self) -> Vec<Depend> {
        match self {
            Self::Sfc(file) => file.depends(),
            Self::Native(file) => file.depends(),
            Self::Static(_) => Vec::new(),
        }
    }

    pub fn rewrite_depends(&mut self, uses: &[UseRequest]) {
        match self {
            Self::Sfc(file) => file.rewrite_depends(uses),
            Self::Native(file) => file.rewrite_depends(uses),
            Self::Static(_) => {}
        }
    }

    pub fn save(&self) -> Result<(), CompileError> {
        match self {
            Self::Sfc(file) => file.save(),
            Self::Native(file) => file.save(),
            Self::Static(file) => file.save(),
        }
    }

    pub fn remove(&self) -> Result<(), CompileError> {
        match self {
            Self::Sfc(file) => file.remove(),
            Self::Native(file) => file.remove(),
            Self::Static(file) => file.remove(),
        }
    }
}
