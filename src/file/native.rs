use serde_json::Map;

use crate::compiler::{Compile, CompileContext, ScriptCompiler, StyleCompiler, TemplateCompiler};
use crate::depend::{Depend, UseRequest};
use crate::error::CompileError;
use crate::request::Request;

/// A plain `js`, `wxs`, `wxss`/`scss`/`pcss` or `wxml` source, compiled by
/// the one compiler its type calls for.
pub struct NativeFile {
    compiler: Box<dyn Compile>,
}

impl NativeFile {
    pub fn new(source: String, request: Request, ctx: &CompileContext) -> Result<Self, CompileError> {
        let ty = request.request_type;
        let compiler: Box<dyn Compile> = if ty.is_script() {
            Box::new(ScriptCompiler::new(source, request, ctx)?)
        } else if ty.is_style() {
            Box::new(StyleCompiler::new(source, request, None, ctx)?)
        } else if ty.is_template() {
            Box::new(TemplateCompiler::new(source, request, &Map::new(), ctx)?)
        } else {
            return Err(CompileError::NoCompiler(request.src, ty));
        };
        Ok(Self { compiler })
    }

    pub fn depends(&self) -> Vec<Depend> {
        self.compiler.depends().to_vec()
    }

    pub fn rewrite_depends(&mut self, uses: &[UseRequest]) {
        self.compiler.rewrite_depends(uses);
    }

    pub fn save(&self) -> Result<(), CompileError> {
        self.compiler.save()
    }

    pub fn remove(&self) -> Result<(), CompileError> {
        self.compiler.remove()
    }
}

impl std::fmt::Debug for NativeFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFile")
            .field("src", &self.compiler.request().src_relative)
            .finish()
    }
}
