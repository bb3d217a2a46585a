//! Import definitions
//!
//! An import states what a part needs in order to be constructed: a
//! contract, how many exports it tolerates, whether it wants them eagerly
//! or behind a lazy accessor, and optional constraints that narrow the
//! candidate set.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::member::MemberLocator;
use super::part::CreationPolicy;
use crate::contract::{ContractIdentity, TypeShape};

/// How many matching exports an import tolerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    /// Exactly one export is required
    ExactlyOne,
    /// At most one export
    ZeroOrOne,
    /// Any number of exports
    ZeroOrMore,
}

impl Cardinality {
    /// Whether more than one export is acceptable
    #[inline]
    pub const fn is_many(&self) -> bool {
        matches!(self, Cardinality::ZeroOrMore)
    }
}

/// How an import receives its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Laziness {
    /// Constructed before the importer
    Direct,
    /// Deferred accessor; nothing is constructed until it is forced
    Lazy,
    /// Deferred accessor that also exposes the export's metadata
    LazyWithMetadata,
}

impl Laziness {
    /// Whether the import is satisfied by a deferred accessor
    #[inline]
    pub const fn is_lazy(&self) -> bool {
        !matches!(self, Laziness::Direct)
    }
}

/// Which sharing scopes an import may draw exports from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportSource {
    /// Any scope
    #[default]
    Any,
    /// Only the importer's own sharing scope
    Local,
    /// Only an ancestor of the importer's sharing scope
    NonLocal,
}

/// A declaration that a part requires values satisfying a contract
///
/// ## Invariants
///
/// - `ExactlyOne` and `ZeroOrOne` imports resolve to at most one export
/// - `allow_default` only relaxes the "zero" case of `ExactlyOne`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportDefinition {
    member: MemberLocator,
    contract: ContractIdentity,
    cardinality: Cardinality,
    laziness: Laziness,
    #[serde(default)]
    allow_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    required_creation_policy: Option<CreationPolicy>,
    #[serde(default)]
    source: ImportSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required_metadata: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_by: Option<String>,
}

impl ImportDefinition {
    /// `ExactlyOne`, `Direct` import of `contract` into `member`
    pub fn new(member: MemberLocator, contract: impl Into<ContractIdentity>) -> Self {
        ImportDefinition {
            member,
            contract: contract.into(),
            cardinality: Cardinality::ExactlyOne,
            laziness: Laziness::Direct,
            allow_default: false,
            required_creation_policy: None,
            source: ImportSource::Any,
            required_metadata: Vec::new(),
            order_by: None,
        }
    }

    /// Import into a property
    pub fn property(name: impl Into<String>, contract: impl Into<ContractIdentity>) -> Self {
        Self::new(MemberLocator::property(name), contract)
    }

    /// Import into a constructor parameter
    pub fn parameter(index: usize, contract: impl Into<ContractIdentity>) -> Self {
        Self::new(MemberLocator::Constructor(index), contract)
    }

    // =========================================================================
    // Builder
    // =========================================================================

    /// Set the cardinality
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// `ZeroOrOne`
    pub fn optional(self) -> Self {
        self.with_cardinality(Cardinality::ZeroOrOne)
    }

    /// `ZeroOrMore`
    pub fn many(self) -> Self {
        self.with_cardinality(Cardinality::ZeroOrMore)
    }

    /// Set the laziness
    pub fn with_laziness(mut self, laziness: Laziness) -> Self {
        self.laziness = laziness;
        self
    }

    /// `Lazy`
    pub fn lazy(self) -> Self {
        self.with_laziness(Laziness::Lazy)
    }

    /// `LazyWithMetadata`
    pub fn lazy_with_metadata(self) -> Self {
        self.with_laziness(Laziness::LazyWithMetadata)
    }

    /// Tolerate zero exports on an `ExactlyOne` import
    pub fn allow_default(mut self) -> Self {
        self.allow_default = true;
        self
    }

    /// Only accept exports from parts with this creation policy
    pub fn require_creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.required_creation_policy = Some(policy);
        self
    }

    /// Restrict the sharing scopes exports may come from
    pub fn from_source(mut self, source: ImportSource) -> Self {
        self.source = source;
        self
    }

    /// Only accept exports carrying this metadata key
    pub fn require_metadata(mut self, key: impl Into<String>) -> Self {
        self.required_metadata.push(key.into());
        self
    }

    /// Order `ZeroOrMore` results by this metadata key
    pub fn order_by(mut self, key: impl Into<String>) -> Self {
        self.order_by = Some(key.into());
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Importing member
    #[inline]
    pub fn member(&self) -> &MemberLocator {
        &self.member
    }

    /// Requested contract
    #[inline]
    pub fn contract(&self) -> &ContractIdentity {
        &self.contract
    }

    /// Cardinality
    #[inline]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Laziness
    #[inline]
    pub fn laziness(&self) -> Laziness {
        self.laziness
    }

    /// Whether zero exports are tolerated on `ExactlyOne`
    #[inline]
    pub fn allows_default(&self) -> bool {
        self.allow_default
    }

    /// Required creation policy of exporting parts
    #[inline]
    pub fn required_creation_policy(&self) -> Option<CreationPolicy> {
        self.required_creation_policy
    }

    /// Source constraint
    #[inline]
    pub fn source(&self) -> ImportSource {
        self.source
    }

    /// Metadata keys an export must carry
    #[inline]
    pub fn required_metadata(&self) -> &[String] {
        &self.required_metadata
    }

    /// Ordering metadata key
    #[inline]
    pub fn ordering_key(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub(crate) fn substitute(&self, args: &[TypeShape]) -> ImportDefinition {
        ImportDefinition {
            contract: self.contract.substitute(args),
            ..self.clone()
        }
    }
}

impl fmt::Display for ImportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?}) on {}",
            self.contract, self.cardinality, self.laziness, self.member
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let import = ImportDefinition::property("Useful", TypeShape::named("Useful"));
        assert_eq!(import.cardinality(), Cardinality::ExactlyOne);
        assert_eq!(import.laziness(), Laziness::Direct);
        assert_eq!(import.source(), ImportSource::Any);
        assert!(!import.allows_default());
        assert!(import.required_creation_policy().is_none());
    }

    #[test]
    fn test_builder_chain() {
        let import = ImportDefinition::parameter(0, TypeShape::named("Logger"))
            .many()
            .lazy_with_metadata()
            .require_metadata("name")
            .order_by("order")
            .require_creation_policy(CreationPolicy::Shared)
            .from_source(ImportSource::Local);
        assert!(import.cardinality().is_many());
        assert!(import.laziness().is_lazy());
        assert_eq!(import.required_metadata(), ["name".to_string()]);
        assert_eq!(import.ordering_key(), Some("order"));
        assert_eq!(import.required_creation_policy(), Some(CreationPolicy::Shared));
        assert_eq!(import.member(), &MemberLocator::Constructor(0));
    }

    #[test]
    fn test_substitute_closes_contract() {
        let import = ImportDefinition::property("Helper", TypeShape::open("Helper", 1)).lazy();
        let closed = import.substitute(&[TypeShape::named("i32")]);
        assert_eq!(
            closed.contract().shape().map(ToString::to_string).as_deref(),
            Some("Helper<i32>")
        );
        assert_eq!(closed.laziness(), Laziness::Lazy);
    }
}
