//! Deferred export accessors
//!
//! A [`LazyHandle`] stands for one export of one graph node. Creating it
//! constructs nothing; the first [`force`](LazyHandle::force) materializes
//! the target and every later call returns the same value.
//!
//! A handle does not keep its materializer alive. Shared instances often
//! store the handles they were given, and the materializer caches those
//! instances; a strong reference would keep both alive forever.

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

use mortise_core::{CompositionError, ExportDefinition, Metadata, PartDefinition, Result};

use crate::activator::Instance;
use crate::graph::NodeExport;
use crate::materializer::{MaterializeContext, WeakMaterializer};

/// Deferred accessor for a single export
///
/// Clones share the cached value.
#[derive(Clone)]
pub struct LazyHandle {
    materializer: WeakMaterializer,
    target: NodeExport,
    part: Arc<PartDefinition>,
    context: MaterializeContext,
    value: Arc<OnceCell<Instance>>,
}

impl LazyHandle {
    pub(crate) fn new(
        materializer: WeakMaterializer,
        target: NodeExport,
        part: Arc<PartDefinition>,
        context: MaterializeContext,
    ) -> Self {
        LazyHandle {
            materializer,
            target,
            part,
            context,
            value: Arc::new(OnceCell::new()),
        }
    }

    /// Materialize the export, or return the value from an earlier call
    ///
    /// A failed attempt caches nothing; the next call tries again.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the container that issued the handle
    /// has been dropped and the value was never materialized, or any
    /// materialization error.
    pub fn force(&self) -> Result<Instance> {
        self.value
            .get_or_try_init(|| {
                let materializer = self.materializer.upgrade().ok_or_else(|| {
                    CompositionError::invalid_configuration(
                        vec![self.part.id().clone()],
                        format!("{} was requested after its container was dropped", self.part.id()),
                    )
                })?;
                materializer.get_export_with(self.target, &self.context)
            })
            .map(Arc::clone)
    }

    /// Whether the value has been materialized through this handle
    #[inline]
    pub fn is_forced(&self) -> bool {
        self.value.get().is_some()
    }

    /// Target node and export index
    #[inline]
    pub fn target(&self) -> NodeExport {
        self.target
    }

    /// Part declaring the export
    #[inline]
    pub fn part(&self) -> &Arc<PartDefinition> {
        &self.part
    }

    /// Export definition
    pub fn export(&self) -> &ExportDefinition {
        &self.part.exports()[self.target.export]
    }

    /// Export metadata
    pub fn metadata(&self) -> &Metadata {
        self.export().metadata()
    }
}

impl fmt::Debug for LazyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyHandle")
            .field("part", self.part.id())
            .field("target", &self.target)
            .field("forced", &self.is_forced())
            .finish()
    }
}
