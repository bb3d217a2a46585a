//! Part definitions
//!
//! A part is the unit of composition: a type that exports values and
//! imports dependencies. Parts whose declaring type has free parameter
//! slots are *open generic*; they are never constructed directly, only
//! after being closed over concrete type arguments.
//!
//! ## Lifecycle
//!
//! ```text
//! discovery ──► PartDefinition (open or closed, immutable)
//!                    │
//!                    └─ close(args) ──► PartDefinition (closed, origin = open id)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::export::ExportDefinition;
use super::import::ImportDefinition;
use crate::contract::{ContractIdentity, TypeShape};
use crate::error::{CompositionError, Result};

/// Identity of a part: its declaring type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(TypeShape);

impl PartId {
    /// Part identity for a declaring type
    pub fn new(shape: TypeShape) -> Self {
        PartId(shape)
    }

    /// Declaring type
    #[inline]
    pub fn shape(&self) -> &TypeShape {
        &self.0
    }

    /// Generic definition name of the declaring type
    pub fn definition_name(&self) -> &str {
        self.0.definition_name().unwrap_or("")
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TypeShape> for PartId {
    fn from(shape: TypeShape) -> Self {
        PartId(shape)
    }
}

/// Whether a part yields one instance per sharing scope or one per request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationPolicy {
    /// One instance per sharing scope
    #[default]
    Shared,
    /// A fresh instance for every request
    NonShared,
}

/// Declared visibility of the part type
///
/// Never a matching criterion; activators may use it to pick a
/// construction strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    /// Publicly visible type
    #[default]
    Public,
    /// Internal or nested private type
    NonPublic,
}

/// Immutable description of a composable part
///
/// ## Invariants
///
/// - `generic_arity` is the number of free parameter slots of the declaring type
/// - a closed part has `generic_arity == 0`
/// - a part produced by closing records the open part it came from in `origin`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDefinition {
    id: PartId,
    #[serde(default)]
    creation_policy: CreationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sharing_boundary: Option<String>,
    #[serde(default)]
    visibility: Visibility,
    #[serde(default)]
    exports: Vec<ExportDefinition>,
    #[serde(default)]
    imports: Vec<ImportDefinition>,
    #[serde(default)]
    generic_arity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<PartId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    type_arguments: Vec<TypeShape>,
}

impl PartDefinition {
    /// Part declared by `shape`, `Shared`, public, with no exports or imports
    ///
    /// The generic arity is derived from the parameter slots in `shape`.
    pub fn new(shape: TypeShape) -> Self {
        let generic_arity = shape.param_count();
        PartDefinition {
            id: PartId(shape),
            creation_policy: CreationPolicy::Shared,
            sharing_boundary: None,
            visibility: Visibility::Public,
            exports: Vec::new(),
            imports: Vec::new(),
            generic_arity,
            origin: None,
            type_arguments: Vec::new(),
        }
    }

    // =========================================================================
    // Builder
    // =========================================================================

    /// Set the creation policy
    pub fn with_creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.creation_policy = policy;
        self
    }

    /// `NonShared`
    pub fn non_shared(self) -> Self {
        self.with_creation_policy(CreationPolicy::NonShared)
    }

    /// Place shared instances in the named sharing scope
    pub fn with_sharing_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.sharing_boundary = Some(boundary.into());
        self
    }

    /// Mark the declaring type non-public
    pub fn non_public(mut self) -> Self {
        self.visibility = Visibility::NonPublic;
        self
    }

    /// Add an export
    pub fn with_export(mut self, export: ExportDefinition) -> Self {
        self.exports.push(export);
        self
    }

    /// Export the whole part under its own type contract
    pub fn export_self(self) -> Self {
        let contract = ContractIdentity::of_type(self.id.shape().clone());
        self.with_export(ExportDefinition::part(contract))
    }

    /// Add an import
    pub fn with_import(mut self, import: ImportDefinition) -> Self {
        self.imports.push(import);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Part identity
    #[inline]
    pub fn id(&self) -> &PartId {
        &self.id
    }

    /// Creation policy
    #[inline]
    pub fn creation_policy(&self) -> CreationPolicy {
        self.creation_policy
    }

    /// Whether instances are shared within a scope
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.creation_policy == CreationPolicy::Shared
    }

    /// Sharing scope name, `None` for the root scope
    #[inline]
    pub fn sharing_boundary(&self) -> Option<&str> {
        self.sharing_boundary.as_deref()
    }

    /// Visibility of the declaring type
    #[inline]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Exports, in declaration order
    #[inline]
    pub fn exports(&self) -> &[ExportDefinition] {
        &self.exports
    }

    /// Imports, in declaration order
    #[inline]
    pub fn imports(&self) -> &[ImportDefinition] {
        &self.imports
    }

    /// Number of free type parameters
    #[inline]
    pub fn generic_arity(&self) -> usize {
        self.generic_arity
    }

    /// Whether the part is an open generic
    #[inline]
    pub fn is_open_generic(&self) -> bool {
        self.generic_arity > 0
    }

    /// Open part this one was closed from
    #[inline]
    pub fn origin(&self) -> Option<&PartId> {
        self.origin.as_ref()
    }

    /// Type arguments this part was closed over
    #[inline]
    pub fn type_arguments(&self) -> &[TypeShape] {
        &self.type_arguments
    }

    // =========================================================================
    // Closing
    // =========================================================================

    /// Close an open generic part over concrete type arguments
    ///
    /// Every export and import contract has its parameter slots substituted.
    /// Closing a non-generic part with no arguments returns a copy.
    ///
    /// # Errors
    ///
    /// - `GenericArityMismatch` if `args.len()` differs from the free-parameter count
    /// - `InvalidConfiguration` if an argument is itself open
    pub fn close(&self, args: &[TypeShape]) -> Result<PartDefinition> {
        if args.len() != self.generic_arity {
            return Err(CompositionError::arity_mismatch(
                self.id.clone(),
                self.generic_arity,
                args.len(),
            ));
        }
        if self.generic_arity == 0 {
            return Ok(self.clone());
        }
        if let Some(open_arg) = args.iter().find(|a| a.is_open()) {
            return Err(CompositionError::invalid_configuration(
                vec![self.id.clone()],
                format!(
                    "cannot close {} over open type argument {}",
                    self.id, open_arg
                ),
            ));
        }

        Ok(PartDefinition {
            id: PartId(self.id.shape().substitute(args)),
            creation_policy: self.creation_policy,
            sharing_boundary: self.sharing_boundary.clone(),
            visibility: self.visibility,
            exports: self.exports.iter().map(|e| e.substitute(args)).collect(),
            imports: self.imports.iter().map(|i| i.substitute(args)).collect(),
            generic_arity: 0,
            origin: Some(self.id.clone()),
            type_arguments: args.to_vec(),
        })
    }
}

impl fmt::Display for PartDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
