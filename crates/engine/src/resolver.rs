//! Import resolution
//!
//! Resolution turns one import into the list of exports that satisfy it:
//!
//! ```text
//! catalog.get_exports(contract)
//!     │
//!     ├─ policy table      (member exports on open generic parts)
//!     ├─ creation policy   (import.required_creation_policy)
//!     ├─ source locality   (Any / Local / NonLocal)
//!     ├─ required metadata (every key present)
//!     │
//!     └─ cardinality       (ExactlyOne / ZeroOrOne / ZeroOrMore + ordering)
//! ```
//!
//! Visibility is never a filter: exports of non-public parts stay eligible.

use tracing::debug;

use mortise_core::{
    Cardinality, CompositionConfig, CompositionError, ImportDefinition, ImportSite, ImportSource,
    PartDefinition, PartId,
};

use crate::catalog::{Catalog, ExportMatch};

/// Outcome class of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Cardinality satisfied
    Resolved,
    /// A required export is missing
    Unresolved,
    /// More exports than a single-valued import tolerates
    Ambiguous,
    /// A candidate is structurally illegal
    InvalidConfiguration,
}

/// Result of resolving a single import
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    /// Exports satisfying the import, after filtering and ordering
    pub exports: Vec<ExportMatch>,
    /// Outcome class
    pub disposition: Disposition,
    /// Errors explaining a disposition other than `Resolved`
    pub diagnostics: Vec<CompositionError>,
}

impl ResolutionResult {
    /// Whether the import was satisfied
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.disposition == Disposition::Resolved
    }

    /// The exports, or the first diagnostic
    pub fn into_result(self) -> Result<Vec<ExportMatch>, CompositionError> {
        match self.diagnostics.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.exports),
        }
    }
}

/// Resolves imports against a catalog under a configuration
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    config: &'a CompositionConfig,
}

impl<'a> Resolver<'a> {
    /// Resolver over `catalog`
    pub fn new(catalog: &'a Catalog, config: &'a CompositionConfig) -> Self {
        Resolver { catalog, config }
    }

    /// Catalog being resolved against
    #[inline]
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Resolve `import`, declared on `importer`
    ///
    /// `importer` is `None` for requests made directly against a container;
    /// such requests live in the root sharing scope.
    pub fn resolve_import(
        &self,
        importer: Option<&PartDefinition>,
        import: &ImportDefinition,
    ) -> ResolutionResult {
        let site = match importer {
            Some(part) => ImportSite::on_part(
                part.id().clone(),
                import.member().clone(),
                import.contract().clone(),
            ),
            None => ImportSite::request(import.contract().clone()),
        };
        let importer_scope = importer.and_then(PartDefinition::sharing_boundary);

        let mut diagnostics = Vec::new();
        let mut exports = Vec::new();
        for candidate in self.catalog.get_exports(import.contract()) {
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(err) => {
                    diagnostics.push(err.with_import(site.clone()));
                    continue;
                }
            };
            if let Some(err) = self.check_policy(&candidate, &site) {
                diagnostics.push(err);
                continue;
            }
            if accepts(import, importer_scope, &candidate) {
                exports.push(candidate);
            }
        }

        let result = if !diagnostics.is_empty() {
            ResolutionResult {
                exports,
                disposition: Disposition::InvalidConfiguration,
                diagnostics,
            }
        } else {
            apply_cardinality(import, site, exports)
        };

        debug!(
            target: "mortise::resolver",
            contract = %import.contract(),
            importer = ?importer.map(PartDefinition::id),
            matches = result.exports.len(),
            disposition = ?result.disposition,
            "Resolved import"
        );
        result
    }

    /// Policy-table check for a candidate's export member
    fn check_policy(&self, candidate: &ExportMatch, site: &ImportSite) -> Option<CompositionError> {
        let export = candidate.definition();
        let kind = export.member().kind();
        let from_open = candidate.part.origin().is_some();
        if self.config.export_rule(kind, from_open).is_allowed() {
            return None;
        }
        let declaring = candidate
            .part
            .origin()
            .cloned()
            .unwrap_or_else(|| candidate.part.id().clone());
        let qualifier = if from_open { "open generic part " } else { "" };
        Some(
            CompositionError::invalid_configuration(
                vec![declaring.clone()],
                format!(
                    "{} on {}{} cannot be exported",
                    export.member(),
                    qualifier,
                    declaring
                ),
            )
            .with_import(site.clone()),
        )
    }
}

/// Resolve `import` as a direct request under the default configuration
pub fn resolve_import(catalog: &Catalog, import: &ImportDefinition) -> ResolutionResult {
    let config = CompositionConfig::default();
    Resolver::new(catalog, &config).resolve_import(None, import)
}

/// Creation-policy, locality and metadata filters
fn accepts(
    import: &ImportDefinition,
    importer_scope: Option<&str>,
    candidate: &ExportMatch,
) -> bool {
    if let Some(required) = import.required_creation_policy() {
        if candidate.part.creation_policy() != required {
            return false;
        }
    }

    let exporter_scope = candidate.part.sharing_boundary();
    let local = match import.source() {
        ImportSource::Any => true,
        ImportSource::Local => exporter_scope == importer_scope,
        ImportSource::NonLocal => importer_scope.is_some() && exporter_scope.is_none(),
    };
    if !local {
        return false;
    }

    let metadata = candidate.definition().metadata();
    import
        .required_metadata()
        .iter()
        .all(|key| metadata.contains_key(key))
}

fn apply_cardinality(
    import: &ImportDefinition,
    site: ImportSite,
    mut exports: Vec<ExportMatch>,
) -> ResolutionResult {
    let resolved = |exports: Vec<ExportMatch>| ResolutionResult {
        exports,
        disposition: Disposition::Resolved,
        diagnostics: Vec::new(),
    };

    match import.cardinality() {
        Cardinality::ZeroOrMore => {
            if let Some(key) = import.ordering_key() {
                exports.sort_by(|a, b| {
                    a.definition()
                        .metadata()
                        .order_by(b.definition().metadata(), key)
                });
            }
            resolved(exports)
        }
        Cardinality::ExactlyOne if exports.is_empty() && !import.allows_default() => {
            ResolutionResult {
                exports,
                disposition: Disposition::Unresolved,
                diagnostics: vec![CompositionError::missing_export(site)],
            }
        }
        Cardinality::ExactlyOne | Cardinality::ZeroOrOne if exports.len() > 1 => {
            let candidates: Vec<PartId> = exports.iter().map(|e| e.part.id().clone()).collect();
            ResolutionResult {
                exports,
                disposition: Disposition::Ambiguous,
                diagnostics: vec![CompositionError::ambiguous_export(site, candidates)],
            }
        }
        Cardinality::ExactlyOne | Cardinality::ZeroOrOne => resolved(exports),
    }
}
