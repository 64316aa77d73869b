//! The dependency graph of source files.
//!
//! Nodes are owned by a [`petgraph`] arena and addressed by index, an edge
//! goes from a file to each file it references. Incoming edges answer "who
//! depends on this file" for incremental rebuilds.

pub mod node;
pub mod traverse;

use petgraph::stable_graph::StableDiGraph;

pub use self::node::{NodeOptions, XcxNode};
pub use self::traverse::{Visitor, traverse};

pub type Graph = StableDiGraph<XcxNode, ()>;
