//! Contract identity
//!
//! A contract is what an export provides and what an import asks for.
//! It pairs a name with an optional type shape.
//!
//! Contracts derived from a type use the generic definition name, so the
//! open export `Useful<!0>` and the closed import `Useful<i32>` share the
//! name `Useful` and are told apart (and matched) by their shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::type_shape::{Bindings, TypeShape};

/// Identity of an export or import contract
///
/// ## Matching
///
/// An export contract matches a requested contract when:
/// - the names are equal, and
/// - both shapes are absent, or the export shape unifies with the requested one
///
/// Unification infers the type arguments needed to close an open export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractIdentity {
    name: String,
    shape: Option<TypeShape>,
}

impl ContractIdentity {
    /// Contract with an explicit name and optional shape
    pub fn new(name: impl Into<String>, shape: Option<TypeShape>) -> Self {
        ContractIdentity {
            name: name.into(),
            shape,
        }
    }

    /// Name-only contract
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// Contract derived from a type shape
    pub fn of_type(shape: TypeShape) -> Self {
        let name = match shape.definition_name() {
            Some(name) => name.to_string(),
            None => shape.to_string(),
        };
        ContractIdentity {
            name,
            shape: Some(shape),
        }
    }

    /// Contract name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contract type shape, if any
    #[inline]
    pub fn shape(&self) -> Option<&TypeShape> {
        self.shape.as_ref()
    }

    /// Whether the shape has free parameter slots
    pub fn is_open(&self) -> bool {
        self.shape.as_ref().map_or(false, TypeShape::is_open)
    }

    /// Match this (export) contract against a requested one
    ///
    /// Returns the inferred bindings on success. Bindings are empty when
    /// neither contract is generic.
    pub fn match_request(&self, requested: &ContractIdentity, arity: usize) -> Option<Bindings> {
        if self.name != requested.name {
            return None;
        }
        let mut bindings = Bindings::with_arity(arity);
        match (&self.shape, &requested.shape) {
            (None, None) => Some(bindings),
            (Some(export), Some(request)) => {
                if export.unify(request, &mut bindings) {
                    Some(bindings)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Substitute parameter slots in the shape
    pub fn substitute(&self, args: &[TypeShape]) -> ContractIdentity {
        ContractIdentity {
            name: self.name.clone(),
            shape: self.shape.as_ref().map(|s| s.substitute(args)),
        }
    }
}

impl fmt::Display for ContractIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            None => write!(f, "'{}'", self.name),
            Some(shape) if shape.definition_name() == Some(self.name.as_str()) => {
                write!(f, "{}", shape)
            }
            Some(shape) => write!(f, "'{}' ({})", self.name, shape),
        }
    }
}

impl From<TypeShape> for ContractIdentity {
    fn from(shape: TypeShape) -> Self {
        ContractIdentity::of_type(shape)
    }
}
