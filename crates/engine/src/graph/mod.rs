//! Composition graph
//!
//! The graph is the build-time result of composing a catalog: a flat,
//! read-only list of nodes, each one a part instantiated in a particular
//! scope, with its imports already resolved to other nodes.
//!
//! ## Node partitioning
//!
//! | Part policy | Node key scope | Nodes per part |
//! |-------------|----------------|----------------|
//! | `Shared` | `Shared { boundary }` | exactly one |
//! | `NonShared` | `PerImport { importer, import }` | one per import edge |
//! | `NonShared` | `Request` | one, for direct requests |
//!
//! Nodes refer to each other by [`NodeId`] index. `importers` lists are
//! back-references kept only for diagnostics and introspection.

mod builder;
mod validate;

pub use builder::{build_graph, GraphBuilder};

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use mortise_core::{ContractIdentity, ExportDefinition, PartDefinition, PartId};

/// Index of a node within its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in [`CompositionGraph::nodes`]
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which instance of a part a node stands for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeScope {
    /// The single shared instance within a sharing scope
    Shared {
        /// Sharing scope, `None` for the root scope
        boundary: Option<String>,
    },
    /// A non-shared instance created for one import of one importing part
    PerImport {
        /// Importing part
        importer: PartId,
        /// Index into the importer's imports
        import: usize,
    },
    /// A non-shared instance created for a direct request
    Request,
}

impl NodeScope {
    /// Whether direct requests may be served from this node
    #[inline]
    pub fn is_requestable(&self) -> bool {
        !matches!(self, NodeScope::PerImport { .. })
    }
}

/// Key identifying a node: the part plus the scope it was created in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    /// Part identity
    pub part: PartId,
    /// Instantiation scope
    pub scope: NodeScope,
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            NodeScope::Shared { boundary: None } => write!(f, "{} (shared)", self.part),
            NodeScope::Shared {
                boundary: Some(boundary),
            } => write!(f, "{} (shared in '{}')", self.part, boundary),
            NodeScope::PerImport { importer, import } => {
                write!(f, "{} (for {} import #{})", self.part, importer, import)
            }
            NodeScope::Request => write!(f, "{} (per request)", self.part),
        }
    }
}

/// One export of one node: the target of a resolved edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeExport {
    /// Exporting node
    pub node: NodeId,
    /// Index into the node's part exports
    pub export: usize,
}

/// A part instantiated in a scope, with resolved imports
#[derive(Debug, Clone)]
pub struct GraphNode {
    id: NodeId,
    key: NodeKey,
    part: Arc<PartDefinition>,
    ordinal: usize,
    imports: Vec<Vec<NodeExport>>,
    importers: Vec<NodeId>,
}

impl GraphNode {
    /// Node index
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node key
    #[inline]
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// Part definition, closed if it came from an open generic
    #[inline]
    pub fn part(&self) -> &Arc<PartDefinition> {
        &self.part
    }

    /// Catalog declaration position of the part (or its open origin)
    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Whether the node holds a shared instance
    #[inline]
    pub fn is_shared(&self) -> bool {
        matches!(self.key.scope, NodeScope::Shared { .. })
    }

    /// Resolved targets of import `index`, in delivery order
    pub fn import_targets(&self, index: usize) -> &[NodeExport] {
        self.imports.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolved targets of every import, aligned with `part().imports()`
    #[inline]
    pub fn imports(&self) -> &[Vec<NodeExport>] {
        &self.imports
    }

    /// Nodes importing from this node
    #[inline]
    pub fn importers(&self) -> &[NodeId] {
        &self.importers
    }

    /// Export definition at `index`
    pub fn export(&self, index: usize) -> Option<&ExportDefinition> {
        self.part.exports().get(index)
    }
}

/// Immutable result of composing a catalog
///
/// ## Invariants
///
/// - every `NodeExport` stored in a node refers to a node of this graph
/// - no cycle consists solely of direct edges
/// - each `NodeKey` maps to exactly one node
#[derive(Debug, Clone, Default)]
pub struct CompositionGraph {
    nodes: Vec<GraphNode>,
    index: FxHashMap<NodeKey, NodeId>,
    roots: Vec<ContractIdentity>,
}

impl CompositionGraph {
    /// Every node, indexed by [`NodeId::index`]
    #[inline]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Number of nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0)
    }

    /// Node by key
    pub fn find(&self, key: &NodeKey) -> Option<&GraphNode> {
        self.index.get(key).map(|id| &self.nodes[id.0])
    }

    /// Node serving direct requests for `part`
    pub fn request_node(&self, part: &PartId) -> Option<&GraphNode> {
        self.nodes
            .iter()
            .find(|n| n.part.id() == part && n.key.scope.is_requestable())
    }

    /// Nodes importing from `id`
    pub fn importers(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(GraphNode::importers).unwrap_or(&[])
    }

    /// Root contracts the graph was built for
    #[inline]
    pub fn roots(&self) -> &[ContractIdentity] {
        &self.roots
    }

    /// Number of distinct parts composed
    pub fn part_count(&self) -> usize {
        let mut ids: Vec<&PartId> = self.nodes.iter().map(|n| n.part.id()).collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }

    /// Requestable exports matching `contract`
    ///
    /// Ordered by catalog declaration position, then export index.
    pub fn exports_matching(&self, contract: &ContractIdentity) -> Vec<NodeExport> {
        let mut found: Vec<(usize, usize, NodeId)> = Vec::new();
        for node in self.nodes.iter().filter(|n| n.key.scope.is_requestable()) {
            for (index, export) in node.part.exports().iter().enumerate() {
                if export.contract().match_request(contract, 0).is_some() {
                    found.push((node.ordinal, index, node.id));
                }
            }
        }
        found.sort();
        found
            .into_iter()
            .map(|(_, export, node)| NodeExport { node, export })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use mortise_core::{CompositionConfig, ImportDefinition, TypeShape};

    fn named(name: &str) -> TypeShape {
        TypeShape::named(name)
    }

    #[test]
    fn test_node_key_display() {
        let key = NodeKey {
            part: PartId::new(named("Db")),
            scope: NodeScope::Shared {
                boundary: Some("request".to_string()),
            },
        };
        assert_eq!(key.to_string(), "Db (shared in 'request')");
    }

    #[test]
    fn test_exports_matching_order_and_scope() {
        let catalog = Catalog::from_parts([
            PartDefinition::new(named("B"))
                .non_shared()
                .with_export(mortise_core::ExportDefinition::part(ContractIdentity::named("Svc"))),
            PartDefinition::new(named("A"))
                .with_export(mortise_core::ExportDefinition::part(ContractIdentity::named("Svc"))),
            PartDefinition::new(named("User")).export_self().with_import(
                ImportDefinition::property("All", ContractIdentity::named("Svc")).many(),
            ),
        ]);
        let graph = build_graph(&catalog, &CompositionConfig::default()).unwrap();

        let found = graph.exports_matching(&ContractIdentity::named("Svc"));
        let parts: Vec<String> = found
            .iter()
            .map(|e| graph.node(e.node).unwrap().part().id().to_string())
            .collect();
        assert_eq!(parts, ["B", "A"]);

        let b_request = graph.request_node(&PartId::new(named("B"))).unwrap();
        assert_eq!(b_request.key().scope, NodeScope::Request);
        assert_eq!(graph.part_count(), 3);
    }
}
