//! Graph construction
//!
//! Building runs four phases and aggregates the errors of all of them:
//!
//! 1. validate every catalog part structurally
//! 2. compose: resolve the imports of every reachable part (worklist)
//! 3. reject cycles made only of direct edges
//! 4. partition composed parts into scoped nodes
//!
//! No graph is returned unless every phase is clean.
//!
//! ## Extension
//!
//! [`GraphBuilder::extend`] grows an existing graph with the parts its new
//! roots reach. Parts already in the graph keep their nodes; only the new
//! parts are composed and checked for cycles. A new part can import an
//! existing one but never the reverse, so no cycle can cross the boundary.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use mortise_core::{
    BuildScope, CompositionConfig, CompositionError, CompositionErrors, ContractIdentity,
    ImportDefinition, ImportSite, MemberLocator, PartDefinition, PartId,
};

use super::validate::validate_part;
use super::{CompositionGraph, GraphNode, NodeExport, NodeId, NodeKey, NodeScope};
use crate::catalog::{Catalog, ExportMatch};
use crate::resolver::Resolver;

/// A part with every import resolved to catalog exports
struct ComposedPart {
    part: Arc<PartDefinition>,
    ordinal: usize,
    imports: Vec<Vec<ExportMatch>>,
}

/// Builder for a [`CompositionGraph`]
///
/// # Example
///
/// ```
/// use mortise_core::{CompositionConfig, PartDefinition, TypeShape};
/// use mortise_engine::{Catalog, GraphBuilder};
///
/// let catalog =
///     Catalog::from_parts([PartDefinition::new(TypeShape::named("Clock")).export_self()]);
/// let graph = GraphBuilder::new(&catalog)
///     .with_config(CompositionConfig::default())
///     .build()
///     .unwrap();
/// assert_eq!(graph.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct GraphBuilder<'a> {
    catalog: &'a Catalog,
    config: CompositionConfig,
    roots: Vec<ContractIdentity>,
}

impl<'a> GraphBuilder<'a> {
    /// Builder over `catalog` with the default configuration and no roots
    pub fn new(catalog: &'a Catalog) -> Self {
        GraphBuilder {
            catalog,
            config: CompositionConfig::default(),
            roots: Vec::new(),
        }
    }

    /// Use `config`
    pub fn with_config(mut self, config: CompositionConfig) -> Self {
        self.config = config;
        self
    }

    /// Compose whatever `contract` resolves to, even under `RootsOnly`
    ///
    /// Roots are how closings of open generic parts become directly
    /// requestable.
    pub fn with_root(mut self, contract: impl Into<ContractIdentity>) -> Self {
        self.roots.push(contract.into());
        self
    }

    /// Add several roots
    pub fn with_roots<C: Into<ContractIdentity>>(
        mut self,
        roots: impl IntoIterator<Item = C>,
    ) -> Self {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Build the graph
    ///
    /// # Errors
    ///
    /// Every diagnostic from every phase, deduplicated and ordered.
    pub fn build(self) -> Result<CompositionGraph, CompositionErrors> {
        let mut errors = Vec::new();
        for part in self.catalog.parts() {
            validate_part(part, &self.config, &mut errors);
        }

        let everything = self.config.scope == BuildScope::Everything;
        let composed = self.compose(FxHashSet::default(), everything, &mut errors);
        detect_cycles(&composed, &mut errors);

        if !errors.is_empty() {
            let errors = CompositionErrors::new(errors);
            warn!(
                target: "mortise::graph",
                errors = errors.len(),
                parts = self.catalog.len(),
                "Composition graph rejected"
            );
            return Err(errors);
        }

        let mut graph = CompositionGraph {
            roots: self.roots,
            ..CompositionGraph::default()
        };
        partition(&mut graph, &composed);
        info!(
            target: "mortise::graph",
            nodes = graph.len(),
            parts = graph.part_count(),
            roots = graph.roots().len(),
            "Composition graph built"
        );
        Ok(graph)
    }

    /// Extend `base` with the parts this builder's roots reach
    ///
    /// `base` must have been built from the same catalog. Its nodes keep
    /// their ids, so a [`Materializer`](crate::Materializer) over `base`
    /// can switch to the result without losing state. Catalog parts are
    /// not validated again.
    ///
    /// # Errors
    ///
    /// Every diagnostic of composing the new parts. `base` is unchanged.
    pub fn extend(self, base: &CompositionGraph) -> Result<CompositionGraph, CompositionErrors> {
        let seen = base.nodes.iter().map(|n| n.part.id().clone()).collect();
        let mut errors = Vec::new();
        let composed = self.compose(seen, false, &mut errors);
        detect_cycles(&composed, &mut errors);

        if !errors.is_empty() {
            let errors = CompositionErrors::new(errors);
            warn!(
                target: "mortise::graph",
                errors = errors.len(),
                roots = self.roots.len(),
                "Composition graph extension rejected"
            );
            return Err(errors);
        }

        let mut graph = base.clone();
        graph.roots.extend(self.roots);
        partition(&mut graph, &composed);
        info!(
            target: "mortise::graph",
            nodes = graph.len(),
            added = graph.len() - base.len(),
            "Composition graph extended"
        );
        Ok(graph)
    }

    /// Resolve every import of every part reachable from the roots, skipping
    /// parts in `seen`
    ///
    /// With `everything`, every closed catalog part is a starting point too.
    fn compose(
        &self,
        mut seen: FxHashSet<PartId>,
        everything: bool,
        errors: &mut Vec<CompositionError>,
    ) -> Vec<ComposedPart> {
        let resolver = Resolver::new(self.catalog, &self.config);
        let mut composed: Vec<ComposedPart> = Vec::new();
        let mut queue: VecDeque<(Arc<PartDefinition>, usize)> = VecDeque::new();

        let mut enqueue = |part: Arc<PartDefinition>, ordinal: usize, queue: &mut VecDeque<_>| {
            if seen.insert(part.id().clone()) {
                queue.push_back((part, ordinal));
            }
        };

        if everything {
            for (ordinal, part) in self.catalog.parts().iter().enumerate() {
                if !part.is_open_generic() {
                    enqueue(Arc::clone(part), ordinal, &mut queue);
                }
            }
        }

        for root in &self.roots {
            // The member is irrelevant for a request made by the host.
            let request = ImportDefinition::new(MemberLocator::Type, root.clone()).many();
            let result = resolver.resolve_import(None, &request);
            errors.extend(result.diagnostics);
            if result.exports.is_empty() {
                errors.push(CompositionError::missing_export(ImportSite::request(root.clone())));
            }
            for found in result.exports {
                enqueue(found.part, found.ordinal, &mut queue);
            }
        }

        while let Some((part, ordinal)) = queue.pop_front() {
            let mut imports = Vec::with_capacity(part.imports().len());
            for import in part.imports() {
                let result = resolver.resolve_import(Some(part.as_ref()), import);
                errors.extend(result.diagnostics);
                for found in &result.exports {
                    enqueue(Arc::clone(&found.part), found.ordinal, &mut queue);
                }
                imports.push(result.exports);
            }
            debug!(
                target: "mortise::graph",
                part = %part.id(),
                imports = imports.len(),
                "Composed part"
            );
            composed.push(ComposedPart {
                part,
                ordinal,
                imports,
            });
        }
        composed
    }
}

/// Build a graph of `catalog` under `config`, with no roots
pub fn build_graph(
    catalog: &Catalog,
    config: &CompositionConfig,
) -> Result<CompositionGraph, CompositionErrors> {
    GraphBuilder::new(catalog).with_config(config.clone()).build()
}

/// Report every strongly connected component of direct edges
fn detect_cycles(composed: &[ComposedPart], errors: &mut Vec<CompositionError>) {
    let position: FxHashMap<&PartId, usize> = composed
        .iter()
        .enumerate()
        .map(|(i, c)| (c.part.id(), i))
        .collect();

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(composed.len(), 0);
    let indices: Vec<NodeIndex> = (0..composed.len()).map(|i| graph.add_node(i)).collect();
    for (from, part) in composed.iter().enumerate() {
        for (import, targets) in part.part.imports().iter().zip(&part.imports) {
            if import.laziness().is_lazy() {
                continue;
            }
            for target in targets {
                if let Some(&to) = position.get(target.part.id()) {
                    graph.update_edge(indices[from], indices[to], ());
                }
            }
        }
    }

    for scc in tarjan_scc(&graph) {
        let cyclic = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
        if !cyclic {
            continue;
        }
        let mut members: Vec<usize> = scc.iter().map(|&ix| graph[ix]).collect();
        members.sort_unstable();
        let parts = members
            .into_iter()
            .map(|i| composed[i].part.id().clone())
            .collect();
        errors.push(CompositionError::cyclic_dependency(parts));
    }
}

/// Where a node's part and edges come from
#[derive(Clone, Copy)]
enum Wiring {
    /// A part composed in this pass, wired from its resolved imports
    Composed(usize),
    /// A part already in the graph, wired like this existing node
    Existing(NodeId),
}

/// Add scoped nodes for `composed` to `graph`
///
/// Targets outside `composed` must already have a requestable node in
/// `graph`.
fn partition(graph: &mut CompositionGraph, composed: &[ComposedPart]) {
    let by_id: FxHashMap<PartId, usize> = composed
        .iter()
        .enumerate()
        .map(|(i, c)| (c.part.id().clone(), i))
        .collect();

    // (node, composed index) pairs whose edges still need wiring
    let mut pending: VecDeque<(NodeId, usize)> = VecDeque::new();

    let intern = |graph: &mut CompositionGraph,
                  key: NodeKey,
                  source: Wiring,
                  pending: &mut VecDeque<(NodeId, usize)>| {
        if let Some(&id) = graph.index.get(&key) {
            return id;
        }
        let id = NodeId(graph.nodes.len());
        let node = match source {
            Wiring::Composed(index) => {
                pending.push_back((id, index));
                GraphNode {
                    id,
                    key: key.clone(),
                    part: Arc::clone(&composed[index].part),
                    ordinal: composed[index].ordinal,
                    imports: Vec::new(),
                    importers: Vec::new(),
                }
            }
            Wiring::Existing(template) => {
                let template = &graph.nodes[template.0];
                GraphNode {
                    id,
                    key: key.clone(),
                    part: Arc::clone(&template.part),
                    ordinal: template.ordinal,
                    imports: template.imports.clone(),
                    importers: Vec::new(),
                }
            }
        };
        for target in node.imports.iter().flatten() {
            add_importer(graph, target.node, id);
        }
        graph.nodes.push(node);
        graph.index.insert(key, id);
        id
    };

    for (index, part) in composed.iter().enumerate() {
        let key = NodeKey {
            part: part.part.id().clone(),
            scope: requestable_scope(&part.part),
        };
        intern(&mut *graph, key, Wiring::Composed(index), &mut pending);
    }

    while let Some((id, source)) = pending.pop_front() {
        let importer = &composed[source];
        let mut imports = Vec::with_capacity(importer.imports.len());
        for (import_index, targets) in importer.imports.iter().enumerate() {
            let mut resolved = Vec::with_capacity(targets.len());
            for target in targets {
                let requestable = NodeKey {
                    part: target.part.id().clone(),
                    scope: requestable_scope(&target.part),
                };
                let wiring = match by_id.get(target.part.id()) {
                    Some(&index) => Wiring::Composed(index),
                    None => match graph.index.get(&requestable) {
                        Some(&existing) => Wiring::Existing(existing),
                        None => continue,
                    },
                };
                let key = if target.part.is_shared() {
                    requestable
                } else {
                    NodeKey {
                        part: target.part.id().clone(),
                        scope: NodeScope::PerImport {
                            importer: importer.part.id().clone(),
                            import: import_index,
                        },
                    }
                };
                let node = intern(&mut *graph, key, wiring, &mut pending);
                add_importer(graph, node, id);
                resolved.push(NodeExport {
                    node,
                    export: target.export,
                });
            }
            imports.push(resolved);
        }
        graph.nodes[id.0].imports = imports;
    }
}

fn add_importer(graph: &mut CompositionGraph, node: NodeId, importer: NodeId) {
    let importers = &mut graph.nodes[node.0].importers;
    if !importers.contains(&importer) {
        importers.push(importer);
    }
}

fn requestable_scope(part: &PartDefinition) -> NodeScope {
    if part.is_shared() {
        NodeScope::Shared {
            boundary: part.sharing_boundary().map(str::to_string),
        }
    } else {
        NodeScope::Request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mortise_core::{ErrorKind, ExportDefinition, TypeShape};

    fn named(name: &str) -> TypeShape {
        TypeShape::named(name)
    }

    fn part(name: &str) -> PartDefinition {
        PartDefinition::new(named(name)).export_self()
    }

    fn needs(name: &str) -> ImportDefinition {
        ImportDefinition::property(name, named(name))
    }

    #[test]
    fn test_shared_part_has_one_node() {
        let catalog = Catalog::from_parts([
            part("Db"),
            part("A").with_import(needs("Db")),
            part("B").with_import(needs("Db")),
        ]);
        let graph = build_graph(&catalog, &CompositionConfig::default()).unwrap();
        assert_eq!(graph.len(), 3);

        let db = graph.request_node(&PartId::new(named("Db"))).unwrap();
        assert_eq!(db.importers().len(), 2);
        let a = graph.request_node(&PartId::new(named("A"))).unwrap();
        let b = graph.request_node(&PartId::new(named("B"))).unwrap();
        assert_eq!(a.import_targets(0)[0].node, db.id());
        assert_eq!(b.import_targets(0)[0].node, db.id());
    }

    #[test]
    fn test_non_shared_part_node_per_import() {
        let catalog = Catalog::from_parts([
            part("Conn").non_shared(),
            part("A").with_import(needs("Conn")),
            part("B").with_import(needs("Conn")),
        ]);
        let graph = build_graph(&catalog, &CompositionConfig::default()).unwrap();
        // Request node for Conn plus one per importing edge
        assert_eq!(graph.len(), 5);
        let a = graph.request_node(&PartId::new(named("A"))).unwrap();
        let b = graph.request_node(&PartId::new(named("B"))).unwrap();
        assert_ne!(a.import_targets(0)[0].node, b.import_targets(0)[0].node);
    }

    #[test]
    fn test_direct_cycle_rejected() {
        let catalog = Catalog::from_parts([
            part("A").with_import(needs("B")),
            part("B").with_import(needs("A")),
        ]);
        let errors = build_graph(&catalog, &CompositionConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        let cycle = errors.first().unwrap();
        assert_eq!(cycle.kind(), ErrorKind::CyclicDependency);
        assert_eq!(cycle.parts().len(), 2);
    }

    #[test]
    fn test_self_loop_rejected() {
        let catalog = Catalog::from_parts([part("Narcissus").with_import(needs("Narcissus"))]);
        let errors = build_graph(&catalog, &CompositionConfig::default()).unwrap_err();
        assert!(errors.contains_kind(ErrorKind::CyclicDependency));
    }

    #[test]
    fn test_lazy_edge_breaks_cycle() {
        let catalog = Catalog::from_parts([
            part("A").with_import(needs("B")),
            part("B").with_import(needs("A").lazy()),
        ]);
        let graph = build_graph(&catalog, &CompositionConfig::default()).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_errors_aggregated() {
        let catalog = Catalog::from_parts([
            part("A").with_import(needs("Missing")),
            part("B").with_import(needs("AlsoMissing")),
            part("C").with_import(needs("C")),
        ]);
        let errors = build_graph(&catalog, &CompositionConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 3);
        let kinds: Vec<ErrorKind> = errors.iter().map(CompositionError::kind).collect();
        assert_eq!(
            kinds,
            [ErrorKind::MissingExport, ErrorKind::MissingExport, ErrorKind::CyclicDependency]
        );
    }

    #[test]
    fn test_roots_only_scope() {
        let catalog = Catalog::from_parts([
            part("Db"),
            part("Unused").with_import(needs("Nowhere")),
            part("App").with_import(needs("Db")),
        ]);
        let config = CompositionConfig::default().with_scope(BuildScope::RootsOnly);
        let graph = GraphBuilder::new(&catalog)
            .with_config(config)
            .with_root(named("App"))
            .build()
            .unwrap();
        assert_eq!(graph.part_count(), 2);
        assert!(graph.request_node(&PartId::new(named("Unused"))).is_none());
        assert_eq!(graph.roots(), &[ContractIdentity::of_type(named("App"))]);
    }

    #[test]
    fn test_root_closes_open_part() {
        let catalog = Catalog::from_parts([PartDefinition::new(TypeShape::open("Useful", 1))
            .non_shared()
            .export_self()]);
        let root = TypeShape::generic("Useful", [named("i32")]);
        let graph = GraphBuilder::new(&catalog).with_root(root.clone()).build().unwrap();
        assert_eq!(graph.exports_matching(&ContractIdentity::of_type(root)).len(), 1);
    }

    #[test]
    fn test_extend_keeps_existing_nodes() {
        let catalog = Catalog::from_parts([
            part("Conn").non_shared(),
            part("Db"),
            part("A").with_import(needs("Conn")),
            PartDefinition::new(TypeShape::open("Wrapper", 1))
                .export_self()
                .with_import(needs("Conn"))
                .with_import(needs("Db")),
        ]);
        let base = build_graph(&catalog, &CompositionConfig::default()).unwrap();
        assert_eq!(base.len(), 4);

        let wrapper = PartId::new(TypeShape::generic("Wrapper", [named("i32")]));
        let graph = GraphBuilder::new(&catalog)
            .with_root(wrapper.shape().clone())
            .extend(&base)
            .unwrap();
        for (old, new) in base.nodes().iter().zip(graph.nodes()) {
            assert_eq!(old.key(), new.key());
        }
        // Wrapper<i32> plus its own Conn instance
        assert_eq!(graph.len(), 6);
        assert_eq!(graph.roots().len(), 1);

        let node = graph.request_node(&wrapper).unwrap();
        let conn = graph.node(node.import_targets(0)[0].node).unwrap();
        assert_eq!(
            conn.key().scope,
            NodeScope::PerImport {
                importer: wrapper.clone(),
                import: 0,
            }
        );
        let db = graph.request_node(&PartId::new(named("Db"))).unwrap();
        assert_eq!(node.import_targets(1)[0].node, db.id());
        assert!(db.importers().contains(&node.id()));
    }

    #[test]
    fn test_extend_with_nothing_new() {
        let catalog = Catalog::from_parts([part("Db")]);
        let base = build_graph(&catalog, &CompositionConfig::default()).unwrap();
        let graph = GraphBuilder::new(&catalog)
            .with_root(named("Db"))
            .extend(&base)
            .unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_missing_root_reported() {
        let catalog = Catalog::new();
        let errors = GraphBuilder::new(&catalog).with_root(named("Ghost")).build().unwrap_err();
        assert!(errors.contains_kind(ErrorKind::MissingExport));
    }

    #[test]
    fn test_invalid_member_export_fails_build() {
        let catalog = Catalog::from_parts([PartDefinition::new(TypeShape::open("Useful", 1))
            .export_self()
            .with_export(ExportDefinition::of_member(
                MemberLocator::property("Value"),
                ContractIdentity::named("Value"),
            ))]);
        let errors = build_graph(&catalog, &CompositionConfig::default()).unwrap_err();
        assert!(errors.contains_kind(ErrorKind::InvalidConfiguration));
    }
}
