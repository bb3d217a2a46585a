//! Lazy materialization of a composition graph
//!
//! Nothing is constructed until asked for. Asking for a node constructs
//! its direct dependencies first, hands lazy dependencies over as
//! unforced [`LazyHandle`]s, then calls the activator.
//!
//! ## Shared node states
//!
//! ```text
//! Uninitialized ──► Constructing { owner } ──► Materialized(instance)
//!       ▲                    │
//!       └──── failure/panic ─┘
//! ```
//!
//! Construction of a shared node is single-flight: one thread constructs,
//! the others wait on the node's condition variable. There is no global
//! lock; each node has its own mutex.
//!
//! Non-shared nodes have no state: every request constructs a new instance.
//!
//! ## Re-entrancy
//!
//! Each thread tracks the nodes it is currently constructing. Asking for a
//! node already on that path is a `CyclicDependency` error instead of a
//! deadlock or unbounded recursion.
//!
//! ## Ownership
//!
//! Cached instances may hold the [`LazyHandle`]s they were given, so a
//! handle refers to its materializer weakly. Dropping the last
//! [`Materializer`] frees every cached instance; handles that were never
//! forced then fail with `InvalidConfiguration`.
//!
//! ## Growth
//!
//! The graph can be replaced by an extension of itself
//! ([`Materializer::extend_graph`]). Existing node ids and their state are
//! kept; new nodes start `Uninitialized`.

use parking_lot::{Condvar, Mutex, RwLock};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

use mortise_core::{CompositionError, ExportDefinition, Result};

use crate::activator::{Activator, ExportValue, ImportValue, ImportValues, Instance};
use crate::graph::{CompositionGraph, GraphNode, NodeExport, NodeId};
use crate::lazy::LazyHandle;

thread_local! {
    /// Nodes under construction on this thread, keyed by materializer
    static CONSTRUCTION_PATH: RefCell<Vec<(usize, NodeId)>> = RefCell::new(Vec::new());
}

/// Cancellation token for a materialization request
///
/// Cancellation is observed only between node constructions: a
/// construction already handed to the activator runs to completion.
#[derive(Debug, Clone, Default)]
pub struct MaterializeContext {
    cancelled: Arc<AtomicBool>,
}

impl MaterializeContext {
    /// Fresh, uncancelled context
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; visible to every clone
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Materialization statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializerMetrics {
    /// Constructions handed to the activator pipeline
    pub constructions_started: u64,
    /// Constructions that produced an instance
    pub constructions_completed: u64,
    /// Constructions that failed, including failed dependencies
    pub constructions_failed: u64,
    /// Shared instances served from a materialized node
    pub cache_hits: u64,
}

impl MaterializerMetrics {
    /// Constructions started but not yet finished
    pub fn in_flight(&self) -> u64 {
        self.constructions_started
            .saturating_sub(self.constructions_completed + self.constructions_failed)
    }
}

enum NodeState {
    Uninitialized,
    Constructing { owner: ThreadId },
    Materialized(Instance),
}

struct NodeCell {
    state: Mutex<NodeState>,
    ready: Condvar,
}

impl NodeCell {
    fn new() -> Arc<NodeCell> {
        Arc::new(NodeCell {
            state: Mutex::new(NodeState::Uninitialized),
            ready: Condvar::new(),
        })
    }
}

struct Inner {
    graph: RwLock<Arc<CompositionGraph>>,
    activator: Arc<dyn Activator>,
    // Always at least as long as the graph; extended before the graph is swapped.
    cells: RwLock<Vec<Arc<NodeCell>>>,
    // Metric counters are observational only, so Relaxed ordering suffices.
    constructions_started: AtomicU64,
    constructions_completed: AtomicU64,
    constructions_failed: AtomicU64,
    cache_hits: AtomicU64,
}

/// Materializes instances from a composition graph
///
/// Cheap to clone; clones share node state.
#[derive(Clone)]
pub struct Materializer {
    inner: Arc<Inner>,
}

impl Materializer {
    /// Materializer over `graph`, constructing through `activator`
    pub fn new(graph: Arc<CompositionGraph>, activator: Arc<dyn Activator>) -> Self {
        let cells = (0..graph.len()).map(|_| NodeCell::new()).collect();
        Materializer {
            inner: Arc::new(Inner {
                graph: RwLock::new(graph),
                activator,
                cells: RwLock::new(cells),
                constructions_started: AtomicU64::new(0),
                constructions_completed: AtomicU64::new(0),
                constructions_failed: AtomicU64::new(0),
                cache_hits: AtomicU64::new(0),
            }),
        }
    }

    /// Current graph
    pub fn graph(&self) -> Arc<CompositionGraph> {
        Arc::clone(&self.inner.graph.read())
    }

    /// Replace the graph with an extension of it
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` unless every current node keeps its id and
    /// key in `graph`.
    pub fn extend_graph(&self, graph: Arc<CompositionGraph>) -> Result<()> {
        let mut cells = self.inner.cells.write();
        let current = self.graph();
        let keeps_nodes = graph.len() >= current.len()
            && current
                .nodes()
                .iter()
                .zip(graph.nodes())
                .all(|(old, new)| old.key() == new.key());
        if !keeps_nodes {
            return Err(CompositionError::invalid_configuration(
                Vec::new(),
                "a graph can only be replaced by an extension of itself",
            ));
        }
        let added = graph.len() - cells.len().min(graph.len());
        cells.extend((0..added).map(|_| NodeCell::new()));
        debug!(target: "mortise::materialize", nodes = graph.len(), added, "Graph extended");
        *self.inner.graph.write() = graph;
        Ok(())
    }

    /// Whether a shared node holds an instance
    pub fn is_materialized(&self, node: NodeId) -> bool {
        self.cell(node)
            .map_or(false, |cell| matches!(*cell.state.lock(), NodeState::Materialized(_)))
    }

    /// Current statistics
    pub fn metrics(&self) -> MaterializerMetrics {
        MaterializerMetrics {
            constructions_started: self.inner.constructions_started.load(Ordering::Relaxed),
            constructions_completed: self.inner.constructions_completed.load(Ordering::Relaxed),
            constructions_failed: self.inner.constructions_failed.load(Ordering::Relaxed),
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Instance of `node`
    pub fn get_value(&self, node: NodeId) -> Result<Instance> {
        self.get_value_with(node, &MaterializeContext::default())
    }

    /// Instance of `node`, observing `ctx`
    ///
    /// Shared nodes are constructed at most once at a time and cached on
    /// success. Non-shared nodes are constructed on every call.
    pub fn get_value_with(&self, node: NodeId, ctx: &MaterializeContext) -> Result<Instance> {
        let graph = self.graph();
        let graph_node = lookup(&graph, node)?;
        let _path =
            PathGuard::enter(self.key(), node).map_err(|cycle| cycle_error(&graph, &cycle))?;

        if !graph_node.is_shared() {
            return self.construct(graph_node, ctx);
        }

        let cell = self.cell(node).ok_or_else(|| unknown_node(node))?;
        let current = thread::current().id();
        {
            let mut state = cell.state.lock();
            loop {
                let owner = match &*state {
                    NodeState::Materialized(instance) => {
                        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(Arc::clone(instance));
                    }
                    NodeState::Constructing { owner } => Some(*owner),
                    NodeState::Uninitialized => None,
                };
                match owner {
                    Some(owner) if owner == current => {
                        return Err(cycle_error(&graph, &[node]));
                    }
                    Some(_) => cell.ready.wait(&mut state),
                    None => {
                        *state = NodeState::Constructing { owner: current };
                        break;
                    }
                }
            }
        }

        let guard = ConstructionGuard {
            cell: &cell,
            completed: false,
        };
        let instance = self.construct(graph_node, ctx)?;
        guard.complete(Arc::clone(&instance));
        Ok(instance)
    }

    /// Value of one export of a node
    pub fn get_export(&self, target: NodeExport) -> Result<Instance> {
        self.get_export_with(target, &MaterializeContext::default())
    }

    /// Value of one export of a node, observing `ctx`
    ///
    /// Whole-part exports yield the node's instance; member exports are
    /// read through the activator after the instance exists.
    pub fn get_export_with(
        &self,
        target: NodeExport,
        ctx: &MaterializeContext,
    ) -> Result<Instance> {
        let graph = self.graph();
        let node = lookup(&graph, target.node)?;
        let export = export_of(node, target.export)?;
        let instance = self.get_value_with(target.node, ctx)?;
        if export.is_part_export() {
            return Ok(instance);
        }
        self.inner
            .activator
            .export_value(node.part(), &instance, export)
            .map_err(|e| CompositionError::creation_failed(node.part().id().clone(), Arc::from(e)))
    }

    /// Unforced handle to one export of a node
    pub fn get_lazy(&self, target: NodeExport) -> Result<LazyHandle> {
        self.get_lazy_with(target, &MaterializeContext::default())
    }

    /// Unforced handle that will observe `ctx` when forced
    pub fn get_lazy_with(
        &self,
        target: NodeExport,
        ctx: &MaterializeContext,
    ) -> Result<LazyHandle> {
        let graph = self.graph();
        let node = lookup(&graph, target.node)?;
        export_of(node, target.export)?;
        Ok(LazyHandle::new(
            self.downgrade(),
            target,
            Arc::clone(node.part()),
            ctx.clone(),
        ))
    }

    /// Unforced handles to several exports, in the given order
    pub fn get_many_lazy(&self, targets: &[NodeExport]) -> Result<Vec<LazyHandle>> {
        self.get_many_lazy_with(targets, &MaterializeContext::default())
    }

    /// Unforced handles that will observe `ctx` when forced
    pub fn get_many_lazy_with(
        &self,
        targets: &[NodeExport],
        ctx: &MaterializeContext,
    ) -> Result<Vec<LazyHandle>> {
        targets
            .iter()
            .map(|&target| self.get_lazy_with(target, ctx))
            .collect()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn construct(&self, node: &GraphNode, ctx: &MaterializeContext) -> Result<Instance> {
        let part = node.part();
        if ctx.is_cancelled() {
            return Err(CompositionError::cancelled(part.id().clone()));
        }
        self.inner.constructions_started.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "mortise::materialize",
            part = %part.id(),
            node = %node.key(),
            "Constructing part"
        );

        let result = self.collect_imports(node, ctx).and_then(|values| {
            self.inner
                .activator
                .activate(part, &values)
                .map_err(|e| CompositionError::creation_failed(part.id().clone(), Arc::from(e)))
        });

        match &result {
            Ok(_) => {
                self.inner.constructions_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.inner.constructions_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "mortise::materialize",
                    part = %part.id(),
                    error = %e,
                    "Part construction failed"
                );
            }
        }
        result
    }

    fn collect_imports(&self, node: &GraphNode, ctx: &MaterializeContext) -> Result<ImportValues> {
        let imports = node.part().imports();
        let mut values = ImportValues::with_capacity(imports.len());
        for (index, import) in imports.iter().enumerate() {
            let targets = node.import_targets(index);
            let mut delivered = Vec::with_capacity(targets.len());
            for &target in targets {
                let value = if import.laziness().is_lazy() {
                    ExportValue::Lazy(self.get_lazy_with(target, ctx)?)
                } else {
                    ExportValue::Value(self.get_export_with(target, ctx)?)
                };
                delivered.push(value);
            }
            let value = if import.cardinality().is_many() {
                ImportValue::Many(delivered)
            } else {
                ImportValue::Single(delivered.into_iter().next())
            };
            values.push(import.member().clone(), value);
        }
        Ok(values)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    fn cell(&self, id: NodeId) -> Option<Arc<NodeCell>> {
        self.inner.cells.read().get(id.index()).cloned()
    }

    pub(crate) fn downgrade(&self) -> WeakMaterializer {
        WeakMaterializer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning reference to a materializer
#[derive(Clone)]
pub(crate) struct WeakMaterializer {
    inner: Weak<Inner>,
}

impl WeakMaterializer {
    /// The materializer, unless every owner has dropped it
    pub(crate) fn upgrade(&self) -> Option<Materializer> {
        self.inner.upgrade().map(|inner| Materializer { inner })
    }
}

fn unknown_node(id: NodeId) -> CompositionError {
    CompositionError::invalid_configuration(
        Vec::new(),
        format!("node {} is not part of this graph", id),
    )
}

fn lookup(graph: &CompositionGraph, id: NodeId) -> Result<&GraphNode> {
    graph.node(id).ok_or_else(|| unknown_node(id))
}

fn export_of(node: &GraphNode, index: usize) -> Result<&ExportDefinition> {
    node.export(index).ok_or_else(|| {
        CompositionError::invalid_configuration(
            vec![node.part().id().clone()],
            format!("{} has no export #{}", node.part().id(), index),
        )
    })
}

fn cycle_error(graph: &CompositionGraph, cycle: &[NodeId]) -> CompositionError {
    let parts = cycle
        .iter()
        .filter_map(|&id| graph.node(id))
        .map(|n| n.part().id().clone())
        .collect();
    CompositionError::cyclic_dependency(parts)
}

impl fmt::Debug for Materializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materializer")
            .field("nodes", &self.graph().len())
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Resets a shared node to `Uninitialized` unless construction completed
struct ConstructionGuard<'a> {
    cell: &'a NodeCell,
    completed: bool,
}

impl ConstructionGuard<'_> {
    fn complete(mut self, instance: Instance) {
        *self.cell.state.lock() = NodeState::Materialized(instance);
        self.completed = true;
        self.cell.ready.notify_all();
    }
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *self.cell.state.lock() = NodeState::Uninitialized;
            self.cell.ready.notify_all();
        }
    }
}

/// Membership of a node in this thread's construction path
struct PathGuard;

impl PathGuard {
    /// Push `node`, or return the cycle it would close
    fn enter(materializer: usize, node: NodeId) -> std::result::Result<PathGuard, Vec<NodeId>> {
        CONSTRUCTION_PATH.with(|path| {
            let mut path = path.borrow_mut();
            if let Some(start) = path.iter().position(|&entry| entry == (materializer, node)) {
                return Err(path[start..]
                    .iter()
                    .filter(|(owner, _)| *owner == materializer)
                    .map(|&(_, id)| id)
                    .collect());
            }
            path.push((materializer, node));
            Ok(PathGuard)
        })
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        CONSTRUCTION_PATH.with(|path| {
            path.borrow_mut().pop();
        });
    }
}
