use petgraph::graph::NodeIndex;

use crate::depend::{LackRequest, UseRequest};
use crate::error::CompileError;
use crate::file::WxFile;
use crate::request::{Request, RequestOptions};

/// How to reach a node.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub request: RequestOptions,
    /// Rebuild the node even if it is cached.
    pub force: bool,
}

impl NodeOptions {
    pub fn new(request: RequestOptions) -> Self {
        Self { request, force: false }
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// A source file in the dependency graph.
#[derive(Debug)]
pub struct XcxNode {
    pub request: Request,
    /// Resolved dependencies, in extraction order.
    pub children: Vec<NodeIndex>,
    pub file: WxFile,
    pub uses: Vec<UseRequest>,
    pub lacks: Vec<LackRequest>,
    /// Whether the outputs were written since the node was created.
    pub compiled: bool,
}

impl XcxNode {
    pub fn new(request: Request, file: WxFile) -> Self {
        Self {
            request,
            children: Vec::new(),
            file,
            uses: Vec::new(),
            lacks: Vec::new(),
            compiled: false,
        }
    }

    /// Rewrites references to the resolved children and writes the outputs.
    pub fn compile(&mut self) -> Result<(), CompileError> {
        self.file.rewrite_depends(&self.uses);
        self.file.save()?;
        self.compiled = true;
        Ok(())
    }
}
