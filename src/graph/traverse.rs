use std::collections::HashSet;

use petgraph::graph::NodeIndex;

use crate::config::Config;
use crate::error::BuildError;
use crate::request::{RequestType, replace_ext};

use super::{Graph, XcxNode};

/// Hooks called while walking the graph. Every hook defaults to a no-op.
#[allow(unused_variables)]
pub trait Visitor {
    fn start(&mut self) -> Result<(), BuildError> {
        Ok(())
    }

    fn end(&mut self) -> Result<(), BuildError> {
        Ok(())
    }

    /// Called before the node's children are visited.
    fn enter(&mut self, node: &mut XcxNode) -> Result<(), BuildError> {
        Ok(())
    }

    /// Called after the node's children were visited.
    fn exit(&mut self, node: &XcxNode) -> Result<(), BuildError> {
        Ok(())
    }

    fn app(&mut self, node: &XcxNode) -> Result<(), BuildError> {
        Ok(())
    }

    fn page(&mut self, node: &XcxNode) -> Result<(), BuildError> {
        Ok(())
    }

    fn component(&mut self, node: &XcxNode) -> Result<(), BuildError> {
        Ok(())
    }

    /// Every page reached, e.g. `pages/home/index`. Not called when empty.
    fn pages(&mut self, pages: &[String]) -> Result<(), BuildError> {
        Ok(())
    }

    /// Every component reached. Not called when empty.
    fn components(&mut self, components: &[String]) -> Result<(), BuildError> {
        Ok(())
    }
}

struct Walk<'a> {
    config: &'a Config,
    visited: HashSet<NodeIndex>,
    pages: Vec<String>,
    components: Vec<String>,
}

/// Walks the graph depth first from `roots`, entering every node at most
/// once.
pub fn traverse<V: Visitor>(
    graph: &mut Graph,
    roots: &[NodeIndex],
    config: &Config,
    visitor: &mut V,
) -> Result<(), BuildError> {
    if roots.is_empty() {
        return Ok(());
    }

    let mut walk = Walk {
        config,
        visited: HashSet::new(),
        pages: Vec::new(),
        components: Vec::new(),
    };

    visitor.start()?;
    for &root in roots {
        walk.visit(graph, root, visitor)?;
    }
    if !walk.pages.is_empty() {
        visitor.pages(&walk.pages)?;
    }
    if !walk.components.is_empty() {
        visitor.components(&walk.components)?;
    }
    visitor.end()
}

impl Walk<'_> {
    fn visit<V: Visitor>(&mut self, graph: &mut Graph, index: NodeIndex, visitor: &mut V) -> Result<(), BuildError> {
        if !graph.contains_node(index) || !self.visited.insert(index) {
            return Ok(());
        }

        visitor.enter(&mut graph[index])?;

        let node = &graph[index];
        match node.request.request_type {
            RequestType::App => visitor.app(node)?,
            RequestType::Page => {
                let id = self.id(node);
                push_unique(&mut self.pages, id);
                visitor.page(node)?;
            }
            RequestType::Component => {
                let id = self.id(node);
                push_unique(&mut self.components, id);
                visitor.component(node)?;
            }
            _ => {}
        }

        for child in node.children.clone() {
            self.visit(graph, child, visitor)?;
        }

        visitor.exit(&graph[index])
    }

    /// Destination path below the dest root without extension.
    fn id(&self, node: &XcxNode) -> String {
        let rel = &node.request.dest_relative;
        let rel = rel.strip_prefix(&self.config.dest).unwrap_or(rel);
        replace_ext(rel, "").as_str().replace('\\', "/")
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}
