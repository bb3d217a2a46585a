//! Composition container
//!
//! The facade most callers use: build a graph from a catalog once, then
//! request exports by contract. Requests go through the same
//! [`Materializer`], so shared parts are shared across every request.
//!
//! ## Composition on request
//!
//! A contract nothing in the graph reached yet, such as a closing of an
//! open generic part that no import names, is resolved against the
//! catalog on its first request. Whatever it resolves to is composed into
//! the graph and stays there. Each contract is resolved at most once.

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use mortise_core::{
    CompositionConfig, CompositionError, CompositionErrors, ContractIdentity, ImportDefinition,
    ImportSite, MemberLocator, Result,
};

use crate::activator::{Activator, Instance};
use crate::catalog::Catalog;
use crate::graph::{CompositionGraph, GraphBuilder, NodeExport};
use crate::lazy::LazyHandle;
use crate::materializer::{MaterializeContext, Materializer, MaterializerMetrics};
use crate::resolver::Resolver;

/// Builder for a [`CompositionContainer`]
pub struct ContainerBuilder<'a> {
    catalog: &'a Catalog,
    activator: Arc<dyn Activator>,
    config: CompositionConfig,
    roots: Vec<ContractIdentity>,
}

impl<'a> ContainerBuilder<'a> {
    /// Use `config` instead of the default configuration
    pub fn with_config(mut self, config: CompositionConfig) -> Self {
        self.config = config;
        self
    }

    /// Make whatever `contract` resolves to directly requestable
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

    /// Compose the catalog
    ///
    /// # Errors
    ///
    /// Every build diagnostic when the catalog cannot be composed. No
    /// container exists in that case.
    pub fn build(self) -> std::result::Result<CompositionContainer, CompositionErrors> {
        let graph = GraphBuilder::new(self.catalog)
            .with_config(self.config.clone())
            .with_roots(self.roots)
            .build()?;
        Ok(CompositionContainer {
            catalog: Arc::new(self.catalog.clone()),
            config: self.config,
            materializer: Materializer::new(Arc::new(graph), self.activator),
            settled: Arc::new(RwLock::new(FxHashSet::default())),
        })
    }
}

/// Requests exports from a composed catalog
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mortise_core::{PartDefinition, TypeShape};
/// use mortise_engine::{Catalog, CompositionContainer, FactoryActivator, Instance};
///
/// struct Clock;
/// let catalog =
///     Catalog::from_parts([PartDefinition::new(TypeShape::named("Clock")).export_self()]);
/// let activator =
///     FactoryActivator::new().register("Clock", |_, _| Ok(Arc::new(Clock) as Instance));
/// let container = CompositionContainer::new(&catalog, activator).unwrap();
///
/// let clock = container.get_exported_value(&TypeShape::named("Clock").into()).unwrap();
/// assert!(clock.downcast::<Clock>().is_ok());
/// ```
///
/// Cheap to clone; clones share the graph and every instance.
#[derive(Debug, Clone)]
pub struct CompositionContainer {
    catalog: Arc<Catalog>,
    config: CompositionConfig,
    materializer: Materializer,
    // Contracts already resolved against the catalog
    settled: Arc<RwLock<FxHashSet<ContractIdentity>>>,
}

impl CompositionContainer {
    /// Container over `catalog` with the default configuration
    pub fn new(
        catalog: &Catalog,
        activator: impl Activator + 'static,
    ) -> std::result::Result<Self, CompositionErrors> {
        Self::builder(catalog, activator).build()
    }

    /// Builder for a container over `catalog`
    pub fn builder(catalog: &Catalog, activator: impl Activator + 'static) -> ContainerBuilder<'_> {
        ContainerBuilder {
            catalog,
            activator: Arc::new(activator),
            config: CompositionConfig::default(),
            roots: Vec::new(),
        }
    }

    /// The graph composed so far
    ///
    /// Requests may extend the graph; the returned snapshot does not change.
    pub fn graph(&self) -> Arc<CompositionGraph> {
        self.materializer.graph()
    }

    /// Catalog the container composes
    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The materializer serving requests
    #[inline]
    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Materialization statistics
    pub fn metrics(&self) -> MaterializerMetrics {
        self.materializer.metrics()
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// The single export matching `contract`
    ///
    /// # Errors
    ///
    /// `MissingExport` when nothing matches, `AmbiguousExport` when more
    /// than one export does, or any materialization error.
    pub fn get_exported_value(&self, contract: &ContractIdentity) -> Result<Instance> {
        self.get_exported_value_with(contract, &MaterializeContext::default())
    }

    /// [`get_exported_value`](Self::get_exported_value), observing `ctx`
    pub fn get_exported_value_with(
        &self,
        contract: &ContractIdentity,
        ctx: &MaterializeContext,
    ) -> Result<Instance> {
        match self.single_target(contract)? {
            Some(target) => self.materializer.get_export_with(target, ctx),
            None => Err(CompositionError::missing_export(ImportSite::request(
                contract.clone(),
            ))),
        }
    }

    /// The export matching `contract`, or `None` when nothing matches
    ///
    /// # Errors
    ///
    /// `AmbiguousExport` when more than one export matches, or any
    /// materialization error.
    pub fn get_exported_value_or_default(
        &self,
        contract: &ContractIdentity,
    ) -> Result<Option<Instance>> {
        self.single_target(contract)?
            .map(|target| self.materializer.get_export(target))
            .transpose()
    }

    /// Every export matching `contract`, in catalog order
    pub fn get_exported_values(&self, contract: &ContractIdentity) -> Result<Vec<Instance>> {
        self.get_exported_values_with(contract, &MaterializeContext::default())
    }

    /// [`get_exported_values`](Self::get_exported_values), observing `ctx`
    pub fn get_exported_values_with(
        &self,
        contract: &ContractIdentity,
        ctx: &MaterializeContext,
    ) -> Result<Vec<Instance>> {
        self.targets(contract)?
            .into_iter()
            .map(|target| self.materializer.get_export_with(target, ctx))
            .collect()
    }

    /// Unforced handles to every export matching `contract`
    ///
    /// Nothing is constructed until a handle is forced. Each handle
    /// exposes the metadata of its export.
    pub fn get_exports(&self, contract: &ContractIdentity) -> Result<Vec<LazyHandle>> {
        self.materializer.get_many_lazy(&self.targets(contract)?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn targets(&self, contract: &ContractIdentity) -> Result<Vec<NodeExport>> {
        self.ensure_composed(contract)?;
        let targets = self.materializer.graph().exports_matching(contract);
        debug!(
            target: "mortise::materialize",
            %contract,
            matches = targets.len(),
            "Container request"
        );
        Ok(targets)
    }

    /// Compose whatever `contract` resolves to that the graph lacks
    fn ensure_composed(&self, contract: &ContractIdentity) -> Result<()> {
        if self.settled.read().contains(contract) {
            return Ok(());
        }
        let mut settled = self.settled.write();
        if settled.contains(contract) {
            return Ok(());
        }

        // The member is irrelevant for a request made by the host.
        let request = ImportDefinition::new(MemberLocator::Type, contract.clone()).many();
        let found = Resolver::new(&self.catalog, &self.config)
            .resolve_import(None, &request)
            .into_result()?;
        let graph = self.materializer.graph();
        if found.iter().any(|m| graph.request_node(m.part.id()).is_none()) {
            let extended = GraphBuilder::new(&self.catalog)
                .with_config(self.config.clone())
                .with_root(contract.clone())
                .extend(&graph)
                .map_err(|errors| first_error(contract, errors))?;
            self.materializer.extend_graph(Arc::new(extended))?;
        }
        settled.insert(contract.clone());
        Ok(())
    }

    fn single_target(&self, contract: &ContractIdentity) -> Result<Option<NodeExport>> {
        let targets = self.targets(contract)?;
        if targets.len() > 1 {
            let graph = self.materializer.graph();
            let candidates = targets
                .iter()
                .filter_map(|t| graph.node(t.node))
                .map(|n| n.part().id().clone())
                .collect();
            return Err(CompositionError::ambiguous_export(
                ImportSite::request(contract.clone()),
                candidates,
            ));
        }
        Ok(targets.into_iter().next())
    }
}

fn first_error(contract: &ContractIdentity, errors: CompositionErrors) -> CompositionError {
    warn!(
        target: "mortise::graph",
        %contract,
        errors = errors.len(),
        "Request could not be composed"
    );
    errors
        .into_vec()
        .into_iter()
        .next()
        .unwrap_or_else(|| CompositionError::missing_export(ImportSite::request(contract.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::FactoryActivator;
    use mortise_core::{
        ErrorKind, ExportDefinition, ImportDefinition, PartDefinition, TypeShape,
    };

    fn contract(name: &str) -> ContractIdentity {
        TypeShape::named(name).into()
    }

    fn unit(name: &str) -> FactoryActivator {
        FactoryActivator::new().register(name, |_, _| Ok(Arc::new(()) as Instance))
    }

    #[test]
    fn test_missing_and_default() {
        let catalog =
            Catalog::from_parts([PartDefinition::new(TypeShape::named("Db")).export_self()]);
        let container = CompositionContainer::new(&catalog, unit("Db")).unwrap();

        let err = container.get_exported_value(&contract("Cache")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingExport);
        assert!(container.get_exported_value_or_default(&contract("Cache")).unwrap().is_none());
        assert!(container.get_exported_value_or_default(&contract("Db")).unwrap().is_some());
    }

    #[test]
    fn test_ambiguous_request() {
        let catalog = Catalog::from_parts([
            PartDefinition::new(TypeShape::named("Disk"))
                .with_export(ExportDefinition::part(contract("Store"))),
            PartDefinition::new(TypeShape::named("Memory"))
                .with_export(ExportDefinition::part(contract("Store"))),
        ]);
        let activator = unit("Disk").register("Memory", |_, _| Ok(Arc::new(()) as Instance));
        let container = CompositionContainer::new(&catalog, activator).unwrap();

        let err = container.get_exported_value(&contract("Store")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousExport);
        assert_eq!(err.parts().len(), 2);
        assert_eq!(container.get_exported_values(&contract("Store")).unwrap().len(), 2);
    }

    #[test]
    fn test_get_exports_is_lazy() {
        let plugin = PartDefinition::new(TypeShape::named("Plugin")).with_export(
            ExportDefinition::part(contract("Plugin")).with_metadata("Name", "alpha"),
        );
        let catalog = Catalog::from_parts([plugin]);
        let container = CompositionContainer::new(&catalog, unit("Plugin")).unwrap();

        let handles = container.get_exports(&contract("Plugin")).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(container.metrics().constructions_started, 0);
        assert_eq!(
            handles[0].metadata().get("Name").and_then(|v| v.as_str()),
            Some("alpha")
        );
        handles[0].force().unwrap();
        assert_eq!(container.metrics().constructions_completed, 1);
    }

    #[test]
    fn test_invalid_catalog_has_no_container() {
        let catalog = Catalog::from_parts([PartDefinition::new(TypeShape::named("Host"))
            .export_self()
            .with_import(ImportDefinition::property("Db", TypeShape::named("Db")))]);
        let errors = CompositionContainer::new(&catalog, unit("Host")).unwrap_err();
        assert!(errors.contains_kind(ErrorKind::MissingExport));
    }
}
