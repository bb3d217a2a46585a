//! Composition engine for mortise
//!
//! This crate turns a set of part definitions into live instances:
//! - Catalog: part registry with a memoizing cache of open generic closings
//! - Resolver: matches one import against the catalog's exports
//! - Graph: validates, composes and partitions parts into scoped nodes
//! - Materializer: constructs nodes on demand, single-flight per shared node
//! - Container: request exports by contract
//!
//! Construction itself is delegated to an [`Activator`]; the engine never
//! inspects instances.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activator;
pub mod catalog;
pub mod container;
pub mod graph;
pub mod lazy;
pub mod materializer;
pub mod resolver;

pub use activator::{
    ActivationError, Activator, ActivatorError, ExportValue, FactoryActivator, ImportValue,
    ImportValues, Instance,
};
pub use catalog::{Catalog, ExportMatch};
pub use container::{CompositionContainer, ContainerBuilder};
pub use graph::{
    build_graph, CompositionGraph, GraphBuilder, GraphNode, NodeExport, NodeId, NodeKey, NodeScope,
};
pub use lazy::LazyHandle;
pub use materializer::{MaterializeContext, Materializer, MaterializerMetrics};
pub use resolver::{resolve_import, Disposition, ResolutionResult, Resolver};
