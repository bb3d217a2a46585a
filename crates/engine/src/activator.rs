//! Activation interface
//!
//! The engine decides what to construct and in what order; an
//! [`Activator`] does the constructing. It receives the part definition
//! and the values resolved for each of its imports, and returns an opaque
//! [`Instance`].
//!
//! [`FactoryActivator`] is a registration-based implementation keyed by
//! generic definition name, so one factory serves every closing of an
//! open generic part.

use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

use mortise_core::{ExportDefinition, MemberLocator, Metadata, PartDefinition};

use crate::lazy::LazyHandle;

/// A constructed part or exported member value
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Failure reported by an activator
pub type ActivationError = Box<dyn std::error::Error + Send + Sync>;

/// Constructs part instances and reads member exports
pub trait Activator: Send + Sync {
    /// Construct `part` from its resolved imports
    fn activate(&self, part: &PartDefinition, imports: &ImportValues)
        -> Result<Instance, ActivationError>;

    /// Read the value of a member export from a constructed instance
    ///
    /// Only called for exports not located at the part itself.
    fn export_value(
        &self,
        part: &PartDefinition,
        instance: &Instance,
        export: &ExportDefinition,
    ) -> Result<Instance, ActivationError> {
        let _ = instance;
        Err(Box::new(ActivatorError::UnsupportedMemberExport {
            part: part.id().to_string(),
            member: export.member().to_string(),
        }))
    }
}

/// Errors raised by the bundled activators
#[derive(Debug, Error)]
pub enum ActivatorError {
    /// No factory registered for the part's definition name
    #[error("no factory registered for '{0}'")]
    NoFactory(String),

    /// The activator cannot read member exports for this part
    #[error("cannot read {member} of {part}")]
    UnsupportedMemberExport {
        /// Part identity
        part: String,
        /// Member description
        member: String,
    },

    /// An instance did not have the type a factory expected
    #[error("instance is not a {0}")]
    TypeMismatch(&'static str),
}

// =============================================================================
// Import values
// =============================================================================

/// One export delivered to an importer
#[derive(Debug, Clone)]
pub enum ExportValue {
    /// Constructed before the importer
    Value(Instance),
    /// Deferred until forced
    Lazy(LazyHandle),
}

impl ExportValue {
    /// The value, forcing a lazy handle if needed
    pub fn get(&self) -> mortise_core::Result<Instance> {
        match self {
            ExportValue::Value(instance) => Ok(Arc::clone(instance)),
            ExportValue::Lazy(handle) => handle.force(),
        }
    }

    /// The value downcast to `T`
    pub fn get_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ActivationError> {
        let instance = self.get()?;
        instance.downcast::<T>().map_err(|_| -> ActivationError {
            Box::new(ActivatorError::TypeMismatch(std::any::type_name::<T>()))
        })
    }

    /// Lazy handle, if the import is lazy
    pub fn as_lazy(&self) -> Option<&LazyHandle> {
        match self {
            ExportValue::Lazy(handle) => Some(handle),
            ExportValue::Value(_) => None,
        }
    }

    /// Export metadata, available on lazy values
    pub fn metadata(&self) -> Option<&Metadata> {
        self.as_lazy().map(LazyHandle::metadata)
    }
}

/// Everything delivered to one import
#[derive(Debug, Clone)]
pub enum ImportValue {
    /// `ExactlyOne` or `ZeroOrOne`; `None` when nothing matched
    Single(Option<ExportValue>),
    /// `ZeroOrMore`, in resolution order
    Many(Vec<ExportValue>),
}

impl ImportValue {
    /// The single value, if any
    pub fn single(&self) -> Option<&ExportValue> {
        match self {
            ImportValue::Single(value) => value.as_ref(),
            ImportValue::Many(values) => values.first(),
        }
    }

    /// All values
    pub fn many(&self) -> &[ExportValue] {
        match self {
            ImportValue::Single(Some(value)) => std::slice::from_ref(value),
            ImportValue::Single(None) => &[],
            ImportValue::Many(values) => values.as_slice(),
        }
    }

    /// Number of delivered values
    pub fn len(&self) -> usize {
        self.many().len()
    }

    /// Whether nothing was delivered
    pub fn is_empty(&self) -> bool {
        self.many().is_empty()
    }
}

/// Values for every import of a part, aligned with `part.imports()`
#[derive(Debug, Clone, Default)]
pub struct ImportValues {
    entries: Vec<(MemberLocator, ImportValue)>,
}

impl ImportValues {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        ImportValues {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, member: MemberLocator, value: ImportValue) {
        self.entries.push((member, value));
    }

    /// Value of import `index`
    pub fn get(&self, index: usize) -> Option<&ImportValue> {
        self.entries.get(index).map(|(_, value)| value)
    }

    /// Value delivered to the named property, field or method
    pub fn by_member(&self, name: &str) -> Option<&ImportValue> {
        self.entries
            .iter()
            .find(|(member, _)| member.name() == Some(name))
            .map(|(_, value)| value)
    }

    /// Value delivered to constructor parameter `index`
    pub fn parameter(&self, index: usize) -> Option<&ImportValue> {
        self.entries
            .iter()
            .find(|(member, _)| *member == MemberLocator::Constructor(index))
            .map(|(_, value)| value)
    }

    /// Number of imports
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the part has no imports
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate (member, value) pairs in import order
    pub fn iter(&self) -> impl Iterator<Item = (&MemberLocator, &ImportValue)> {
        self.entries.iter().map(|(member, value)| (member, value))
    }
}

// =============================================================================
// Factory activator
// =============================================================================

type Factory =
    Box<dyn Fn(&PartDefinition, &ImportValues) -> Result<Instance, ActivationError> + Send + Sync>;
type MemberReader =
    Box<dyn Fn(&Instance, &ExportDefinition) -> Result<Instance, ActivationError> + Send + Sync>;

/// Activator dispatching on the part's generic definition name
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mortise_engine::{FactoryActivator, Instance};
///
/// struct Clock;
/// let activator = FactoryActivator::new()
///     .register("Clock", |_, _| Ok(Arc::new(Clock) as Instance));
/// assert!(activator.has_factory("Clock"));
/// ```
#[derive(Default)]
pub struct FactoryActivator {
    factories: FxHashMap<String, Factory>,
    readers: FxHashMap<String, MemberReader>,
}

impl FactoryActivator {
    /// Activator with no registrations
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for parts named `name`
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PartDefinition, &ImportValues) -> Result<Instance, ActivationError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Register how to read member exports of parts named `name`
    pub fn register_member_reader<F>(mut self, name: impl Into<String>, reader: F) -> Self
    where
        F: Fn(&Instance, &ExportDefinition) -> Result<Instance, ActivationError>
            + Send
            + Sync
            + 'static,
    {
        self.readers.insert(name.into(), Box::new(reader));
        self
    }

    /// Whether a factory is registered for `name`
    pub fn has_factory(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Activator for FactoryActivator {
    fn activate(
        &self,
        part: &PartDefinition,
        imports: &ImportValues,
    ) -> Result<Instance, ActivationError> {
        let name = part.id().definition_name();
        match self.factories.get(name) {
            Some(factory) => factory(part, imports),
            None => Err(Box::new(ActivatorError::NoFactory(name.to_string()))),
        }
    }

    fn export_value(
        &self,
        part: &PartDefinition,
        instance: &Instance,
        export: &ExportDefinition,
    ) -> Result<Instance, ActivationError> {
        match self.readers.get(part.id().definition_name()) {
            Some(reader) => reader(instance, export),
            None => Err(Box::new(ActivatorError::UnsupportedMemberExport {
                part: part.id().to_string(),
                member: export.member().to_string(),
            })),
        }
    }
}

impl std::fmt::Debug for FactoryActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("FactoryActivator")
            .field("factories", &names)
            .field("readers", &self.readers.len())
            .finish()
    }
}
