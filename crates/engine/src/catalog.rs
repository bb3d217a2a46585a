//! Part catalog with on-demand generic closing
//!
//! A catalog is an immutable, ordered collection of part definitions.
//! Queries match exports against requested contracts; open generic parts
//! are closed over the type arguments inferred from the request.
//!
//! ## Closing cache
//!
//! Every catalog instance owns a concurrent map from
//! `(open part id, argument tuple)` to the closed part. Closing the same
//! part over the same arguments always returns the same `Arc`, however
//! many threads race to do it.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use mortise_core::{
    CompositionError, ContractIdentity, ExportDefinition, PartDefinition, PartId, Result,
    TypeShape,
};

type ClosingKey = (PartId, Vec<TypeShape>);

/// An export of a (closed) part that matched a contract query
#[derive(Debug, Clone)]
pub struct ExportMatch {
    /// Exporting part, already closed if it came from an open generic
    pub part: Arc<PartDefinition>,
    /// Index into `part.exports()`
    pub export: usize,
    /// Declaration position of the catalog part this came from
    pub ordinal: usize,
}

impl ExportMatch {
    /// The matched export definition
    #[inline]
    pub fn definition(&self) -> &ExportDefinition {
        &self.part.exports()[self.export]
    }
}

/// Immutable collection of part definitions
///
/// ## Invariants
///
/// - parts keep their declaration order, which is the tie-break for every query
/// - the closing cache belongs to this instance only; a clone starts
///   with a copy of it, holding the same closed parts
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    parts: Vec<Arc<PartDefinition>>,
    closed: DashMap<ClosingKey, Arc<PartDefinition>>,
}

impl Catalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog over `parts`, in the given order
    pub fn from_parts(parts: impl IntoIterator<Item = PartDefinition>) -> Self {
        Catalog {
            parts: parts.into_iter().map(Arc::new).collect(),
            closed: DashMap::new(),
        }
    }

    /// New catalog holding this catalog's parts followed by `parts`
    ///
    /// `self` is unchanged. The returned catalog starts with an empty
    /// closing cache.
    pub fn add_parts(&self, parts: impl IntoIterator<Item = PartDefinition>) -> Catalog {
        let mut all = self.parts.clone();
        all.extend(parts.into_iter().map(Arc::new));
        debug!(target: "mortise::catalog", parts = all.len(), "Catalog extended");
        Catalog {
            parts: all,
            closed: DashMap::new(),
        }
    }

    /// Parts in declaration order
    #[inline]
    pub fn parts(&self) -> &[Arc<PartDefinition>] {
        &self.parts
    }

    /// Number of declared parts
    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the catalog has no parts
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of cached closings
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    /// Declared part with identity `id`
    pub fn find(&self, id: &PartId) -> Option<&Arc<PartDefinition>> {
        self.parts.iter().find(|p| p.id() == id)
    }

    // =========================================================================
    // Closing
    // =========================================================================

    /// Close `part` over `args`, returning the cached closing if there is one
    ///
    /// A non-generic part closed over no arguments is returned as-is.
    ///
    /// # Errors
    ///
    /// - `GenericArityMismatch` if `args.len()` differs from the part's arity
    /// - `InvalidConfiguration` if an argument is open
    pub fn close_part(
        &self,
        part: &Arc<PartDefinition>,
        args: &[TypeShape],
    ) -> Result<Arc<PartDefinition>> {
        if !part.is_open_generic() && args.is_empty() {
            return Ok(Arc::clone(part));
        }
        let key = (part.id().clone(), args.to_vec());
        if let Some(hit) = self.closed.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        let closed = Arc::new(part.close(args)?);
        // Racing closers all observe whichever entry landed first.
        let entry = self.closed.entry(key).or_insert_with(|| {
            debug!(
                target: "mortise::catalog",
                part = %part.id(),
                closed = %closed.id(),
                "Closed generic part"
            );
            Arc::clone(&closed)
        });
        Ok(Arc::clone(entry.value()))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every export matching `contract`, in declaration order
    ///
    /// Open generic exports are matched by unification and returned on the
    /// part closed over the inferred arguments. An open candidate whose
    /// arguments cannot all be inferred, or whose closing fails, is
    /// returned as an error entry rather than dropped.
    pub fn get_exports(&self, contract: &ContractIdentity) -> Vec<Result<ExportMatch>> {
        let mut matches = Vec::new();
        for (ordinal, part) in self.parts.iter().enumerate() {
            for (index, export) in part.exports().iter().enumerate() {
                let Some(bindings) = export.contract().match_request(contract, part.generic_arity())
                else {
                    continue;
                };
                if !part.is_open_generic() {
                    matches.push(Ok(ExportMatch {
                        part: Arc::clone(part),
                        export: index,
                        ordinal,
                    }));
                    continue;
                }
                let unbound = bindings.unbound();
                let result = match bindings.into_args() {
                    Some(args) => self.close_part(part, &args).map(|closed| ExportMatch {
                        part: closed,
                        export: index,
                        ordinal,
                    }),
                    None => Err(CompositionError::invalid_configuration(
                        vec![part.id().clone()],
                        format!(
                            "export {} of {} does not determine type parameter(s) {:?}",
                            export.contract(),
                            part.id(),
                            unbound
                        ),
                    )),
                };
                matches.push(result);
            }
        }
        matches
    }

    /// Parts with at least one export matching `contract`
    ///
    /// Open generic parts are returned closed over the inferred arguments.
    /// Deduplicated, in declaration order. Candidates that fail to close
    /// are skipped; use [`get_exports`](Self::get_exports) to see them.
    pub fn get_parts_by_contract(&self, contract: &ContractIdentity) -> Vec<Arc<PartDefinition>> {
        let mut parts: Vec<Arc<PartDefinition>> = Vec::new();
        for found in self.get_exports(contract).into_iter().flatten() {
            if !parts.iter().any(|p| Arc::ptr_eq(p, &found.part)) {
                parts.push(found.part);
            }
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mortise_core::{ErrorKind, ExportDefinition, MemberLocator};

    fn i32_shape() -> TypeShape {
        TypeShape::named("i32")
    }

    fn useful_of(arg: TypeShape) -> ContractIdentity {
        ContractIdentity::of_type(TypeShape::generic("Useful", [arg]))
    }

    fn catalog() -> Catalog {
        Catalog::from_parts([
            PartDefinition::new(TypeShape::open("Useful", 1))
                .non_shared()
                .export_self(),
            PartDefinition::new(TypeShape::named("User")).export_self(),
        ])
    }

    #[test]
    fn test_add_parts_leaves_original_unchanged() {
        let base = catalog();
        let extra = PartDefinition::new(TypeShape::named("Extra")).export_self();
        let extended = base.add_parts([extra]);
        assert_eq!(base.len(), 2);
        assert_eq!(extended.len(), 3);
        assert!(Arc::ptr_eq(&base.parts()[0], &extended.parts()[0]));
    }

    #[test]
    fn test_get_exports_closes_open_part() {
        let catalog = catalog();
        let found: Vec<_> = catalog
            .get_exports(&useful_of(i32_shape()))
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].part.id().to_string(), "Useful<i32>");
        assert_eq!(found[0].ordinal, 0);
        assert_eq!(found[0].definition().contract(), &useful_of(i32_shape()));
    }

    #[test]
    fn test_get_exports_concrete_match() {
        let catalog = catalog();
        let found = catalog.get_exports(&ContractIdentity::of_type(TypeShape::named("User")));
        assert_eq!(found.len(), 1);
        assert!(found[0].is_ok());
    }

    #[test]
    fn test_get_exports_rejects_wrong_arity() {
        let catalog = catalog();
        let request = ContractIdentity::of_type(TypeShape::generic(
            "Useful",
            [i32_shape(), i32_shape()],
        ));
        assert!(catalog.get_exports(&request).is_empty());
    }

    #[test]
    fn test_close_part_is_reference_stable() {
        let catalog = catalog();
        let open = Arc::clone(&catalog.parts()[0]);
        let a = catalog.close_part(&open, &[i32_shape()]).unwrap();
        let b = catalog.close_part(&open, &[i32_shape()]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(catalog.closed_count(), 1);

        let s = catalog.close_part(&open, &[TypeShape::named("String")]).unwrap();
        assert!(!Arc::ptr_eq(&a, &s));
        assert_eq!(catalog.closed_count(), 2);
    }

    #[test]
    fn test_close_part_arity_mismatch() {
        let pair =
            Catalog::from_parts([PartDefinition::new(TypeShape::open("Pair", 2)).export_self()]);
        let open = Arc::clone(&pair.parts()[0]);
        let err = pair.close_part(&open, &[i32_shape()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenericArityMismatch);
        assert_eq!(pair.closed_count(), 0);
    }

    #[test]
    fn test_close_non_generic_returns_same_part() {
        let catalog = catalog();
        let user = Arc::clone(&catalog.parts()[1]);
        let closed = catalog.close_part(&user, &[]).unwrap();
        assert!(Arc::ptr_eq(&user, &closed));
    }

    #[test]
    fn test_parts_by_contract_dedups() {
        let multi = Catalog::from_parts([PartDefinition::new(TypeShape::named("Multi"))
            .with_export(ExportDefinition::part(ContractIdentity::named("Service")))
            .with_export(ExportDefinition::of_member(
                MemberLocator::property("Inner"),
                ContractIdentity::named("Service"),
            ))]);
        let parts = multi.get_parts_by_contract(&ContractIdentity::named("Service"));
        assert_eq!(parts.len(), 1);
        assert_eq!(multi.get_exports(&ContractIdentity::named("Service")).len(), 2);
    }

    #[test]
    fn test_underdetermined_open_export_surfaces_error() {
        let catalog = Catalog::from_parts([PartDefinition::new(TypeShape::open("Pair", 2))
            .with_export(ExportDefinition::part(TypeShape::generic(
                "First",
                [TypeShape::param(0)],
            )))]);
        let request = ContractIdentity::of_type(TypeShape::generic("First", [i32_shape()]));
        let found = catalog.get_exports(&request);
        assert_eq!(found.len(), 1);
        let err = found[0].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert!(catalog.get_parts_by_contract(&request).is_empty());
    }
}
