//! The state of a build: resolver, node graph, pending queue and app globals.

use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::cache::{PendingQueue, doc_root_page};
use crate::compiler::{CompileContext, StylePipeline};
use crate::config::Config;
use crate::depend::{LackRequest, UseRequest};
use crate::error::{BuildError, CompileError};
use crate::file::WxFile;
use crate::global::AppGlobal;
use crate::graph::{Graph, NodeOptions, Visitor, XcxNode, traverse};
use crate::markdown::{self, Markdown};
use crate::request::RequestOptions;
use crate::resolve::Resolver;

pub struct BuildSession {
    pub(crate) config: Arc<Config>,
    pub(crate) resolver: Resolver,
    pub(crate) graph: Graph,
    /// Absolute source path to its node.
    cache: HashMap<Utf8PathBuf, NodeIndex>,
    pub(crate) pending: PendingQueue,
    pub(crate) app: AppGlobal,
    styles: Arc<StylePipeline>,
    markdown: Box<dyn Markdown>,
}

impl BuildSession {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            resolver: Resolver::new(config.clone()),
            config,
            graph: Graph::default(),
            cache: HashMap::new(),
            pending: PendingQueue::default(),
            app: AppGlobal::default(),
            styles: Arc::new(StylePipeline::default()),
            markdown: markdown::default_renderer(),
        }
    }

    pub fn with_styles(mut self, styles: StylePipeline) -> Self {
        self.styles = Arc::new(styles);
        self
    }

    pub fn with_markdown(mut self, markdown: impl Markdown + 'static) -> Self {
        self.markdown = Box::new(markdown);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn app(&self) -> &AppGlobal {
        &self.app
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Forgets every node, lookup and pending file, and reloads the app
    /// globals. The debug flag survives.
    pub fn reset(&mut self, config: Arc<Config>) -> Result<(), BuildError> {
        let debug = self.app.debug;
        self.config = config.clone();
        self.resolver = Resolver::new(config);
        self.graph.clear();
        self.cache.clear();
        self.pending.clear();
        self.app = AppGlobal::load(&self.config, &mut self.resolver, self.markdown.as_ref(), &self.styles)?;
        self.app.debug = debug;
        Ok(())
    }

    pub fn node(&self, index: NodeIndex) -> Option<&XcxNode> {
        self.graph.node_weight(index)
    }

    /// The node of an absolute source path.
    pub fn lookup(&self, src: &Utf8Path) -> Option<NodeIndex> {
        self.cache.get(src).copied()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Resolves `options` and builds its node along with every reachable
    /// dependency.
    ///
    /// A cached node is returned as is unless `options.force` is set, in
    /// which case it is rebuilt in place under the same index. `Ok(None)`
    /// means the reference couldn't be found.
    pub fn create_node(&mut self, options: NodeOptions) -> Result<Option<NodeIndex>, BuildError> {
        let Some(request) = self.resolver.resolve(&options.request)? else {
            if options.request.is_main {
                tracing::error!("entry not found: {}", options.request.request);
            }
            return Ok(None);
        };

        let cached = self.cache.get(&request.src).copied().filter(|&i| self.graph.contains_node(i));
        if let Some(index) = cached
            && !options.force
        {
            return Ok(Some(index));
        }

        let file = {
            let ctx = CompileContext {
                config: &self.config,
                app: &self.app,
                markdown: self.markdown.as_ref(),
                styles: &self.styles,
            };
            WxFile::new(request.clone(), &ctx).map_err(|e| BuildError::Compile(request.src_relative.clone(), e))?
        };
        let node = XcxNode::new(request.clone(), file);

        // The node is cached before its dependencies so that cycles end here.
        let index = match cached {
            Some(index) => {
                let stale: Vec<_> = self
                    .graph
                    .edges_directed(index, Direction::Outgoing)
                    .map(|e| e.id())
                    .collect();
                for edge in stale {
                    self.graph.remove_edge(edge);
                }
                self.graph[index] = node;
                index
            }
            None => {
                let index = self.graph.add_node(node);
                self.cache.insert(request.src.clone(), index);
                index
            }
        };

        let depends = self.graph[index].file.depends();
        for depend in depends {
            let child = RequestOptions::new(&depend.request)
                .with_type(depend.request_type)
                .with_parent(request.src.clone())
                .third_npm(request.is_third_npm)
                .publish(request.is_publish);

            let found = match self.create_node(NodeOptions::new(child)) {
                Ok(found) => found,
                Err(BuildError::Resolve(e)) => {
                    tracing::error!("{}: {}", request.src_relative, e);
                    None
                }
                // Kept as a lack so the parent is retried once the child compiles.
                Err(e @ BuildError::Compile(..)) => {
                    tracing::error!("{}", e);
                    None
                }
                Err(e) => return Err(e),
            };

            match found {
                Some(child) => {
                    self.graph.update_edge(index, child, ());
                    let target = self.graph[child].request.clone();
                    let node = &mut self.graph[index];
                    node.children.push(child);
                    node.uses.push(UseRequest {
                        request: depend.request,
                        request_type: depend.request_type,
                        target,
                    });
                }
                None => self.graph[index].lacks.push(LackRequest {
                    request: depend.request,
                    request_type: depend.request_type,
                }),
            }
        }

        let lacks = &self.graph[index].lacks;
        if lacks.is_empty() {
            self.pending.remove_lack(&request.src_relative);
        } else {
            for lack in lacks {
                tracing::error!("module not found: {} in {}", lack.request, request.src_relative);
            }
            self.pending.add_lack(request.src_relative.clone());
        }

        Ok(Some(index))
    }

    /// Nodes that reference `index`.
    pub fn dependants(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .collect()
    }

    /// Creates the nodes of `entries`, skipping the ones not found.
    pub fn create_entries(&mut self, entries: Vec<NodeOptions>) -> Result<Vec<NodeIndex>, BuildError> {
        let mut roots = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(index) = self.create_node(entry)? {
                roots.push(index);
            }
        }
        Ok(roots)
    }

    pub fn traverse(&mut self, roots: &[NodeIndex], visitor: &mut impl Visitor) -> Result<(), BuildError> {
        traverse(&mut self.graph, roots, &self.config, visitor)
    }

    /// Queues a new page.
    pub fn watch_new_file(&mut self, path: &Utf8Path) {
        if path.extension() == Some("wxp") {
            self.pending.add(path);
        }
    }

    /// Queues a changed file if it is part of the graph, and the
    /// documentation page it belongs to.
    pub fn watch_change_file(&mut self, path: &Utf8Path) {
        if self.cache.contains_key(&self.config.cwd.join(path)) {
            self.pending.add(path);
        }
        if let Some(page) = doc_root_page(&self.config, path) {
            self.pending.add(page);
        }
    }

    /// Drops the node of a deleted file, removes its outputs and queues the
    /// files depending on it.
    pub fn watch_delete_file(&mut self, path: &Utf8Path) -> Result<(), BuildError> {
        if let Some(index) = self.cache.remove(&self.config.cwd.join(path))
            && let Some(node) = self.graph.node_weight(index)
        {
            node.file
                .remove()
                .map_err(|e: CompileError| BuildError::Compile(path.to_path_buf(), e))?;

            for dependant in self.dependants(index) {
                let node = &mut self.graph[dependant];
                node.children.retain(|&child| child != index);
                self.pending.add(node.request.src_relative.clone());
            }
            self.graph.remove_node(index);
            self.pending.remove_lack(path);
        }

        if let Some(page) = doc_root_page(&self.config, path) {
            self.pending.add(page);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSession")
            .field("nodes", &self.graph.node_count())
            .field("pending", &self.pending)
            .finish()
    }
}
