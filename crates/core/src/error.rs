//! Error types for composition
//!
//! Every failure the engine reports is a [`CompositionError`] tagged with
//! an [`ErrorKind`]. Build-phase validation collects all of them into a
//! [`CompositionErrors`] list; materialization stops at the first.
//!
//! ## Error kinds
//!
//! | Kind | Raised when |
//! |------|-------------|
//! | `MissingExport` | an `ExactlyOne` request has zero matches |
//! | `AmbiguousExport` | a single-valued request has more than one match |
//! | `GenericArityMismatch` | closing with the wrong number of arguments |
//! | `InvalidConfiguration` | a structurally illegal declaration |
//! | `CyclicDependency` | a cycle of direct edges, or re-entrant construction |
//! | `CreationFailed` | the activator failed |
//! | `Cancelled` | materialization was cancelled |

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::contract::ContractIdentity;
use crate::definition::{MemberLocator, PartId};

/// Result type alias for composition operations
pub type Result<T> = std::result::Result<T, CompositionError>;

/// Error produced by an activator, shared so diagnostics stay `Clone`
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Classification of a composition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// No export satisfies a required import
    MissingExport,
    /// More than one export satisfies a single-valued import
    AmbiguousExport,
    /// Wrong number of type arguments when closing a part
    GenericArityMismatch,
    /// Structurally illegal or unsupported declaration
    InvalidConfiguration,
    /// Cycle of direct dependencies
    CyclicDependency,
    /// The activator failed to construct a part or read an export
    CreationFailed,
    /// Materialization was cancelled
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MissingExport => "missing export",
            ErrorKind::AmbiguousExport => "ambiguous export",
            ErrorKind::GenericArityMismatch => "generic arity mismatch",
            ErrorKind::InvalidConfiguration => "invalid configuration",
            ErrorKind::CyclicDependency => "cyclic dependency",
            ErrorKind::CreationFailed => "creation failed",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The import an error is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImportSite {
    /// Importing part, `None` for a request made directly on a container
    pub importer: Option<PartId>,
    /// Importing member, `None` for a direct request
    pub member: Option<MemberLocator>,
    /// Requested contract
    pub contract: ContractIdentity,
}

impl ImportSite {
    /// Import declared on a part
    pub fn on_part(importer: PartId, member: MemberLocator, contract: ContractIdentity) -> Self {
        ImportSite {
            importer: Some(importer),
            member: Some(member),
            contract,
        }
    }

    /// Request made directly against a graph or container
    pub fn request(contract: ContractIdentity) -> Self {
        ImportSite {
            importer: None,
            member: None,
            contract,
        }
    }
}

impl fmt::Display for ImportSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.importer, &self.member) {
            (Some(part), Some(member)) => write!(f, "{} on {}.{}", self.contract, part, member),
            (Some(part), None) => write!(f, "{} on {}", self.contract, part),
            _ => write!(f, "request for {}", self.contract),
        }
    }
}

/// A single composition diagnostic
///
/// ## Invariants
///
/// - `parts` lists every part implicated, in a deterministic order
/// - `cause` is set only for `CreationFailed`
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CompositionError {
    kind: ErrorKind,
    parts: Vec<PartId>,
    import: Option<ImportSite>,
    message: String,
    #[source]
    cause: Option<SharedCause>,
}

impl CompositionError {
    /// Error of `kind` with a message and no context
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompositionError {
            kind,
            parts: Vec::new(),
            import: None,
            message: message.into(),
            cause: None,
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// No export satisfies `import`
    pub fn missing_export(import: ImportSite) -> Self {
        let message = format!("no export satisfies {}", import);
        CompositionError {
            parts: import.importer.iter().cloned().collect(),
            import: Some(import),
            ..Self::new(ErrorKind::MissingExport, message)
        }
    }

    /// More than one export satisfies `import`
    ///
    /// `candidates` are the exporting parts, listed after the importer.
    pub fn ambiguous_export(import: ImportSite, candidates: Vec<PartId>) -> Self {
        let names: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        let message = format!(
            "{} exports satisfy {}: {}",
            candidates.len(),
            import,
            names.join(", ")
        );
        let mut parts: Vec<PartId> = import.importer.iter().cloned().collect();
        parts.extend(candidates);
        CompositionError {
            parts,
            import: Some(import),
            ..Self::new(ErrorKind::AmbiguousExport, message)
        }
    }

    /// Closing `part` with `actual` arguments when it has `expected` free parameters
    pub fn arity_mismatch(part: PartId, expected: usize, actual: usize) -> Self {
        let message = format!(
            "{} takes {} type argument(s), {} supplied",
            part, expected, actual
        );
        CompositionError {
            parts: vec![part],
            ..Self::new(ErrorKind::GenericArityMismatch, message)
        }
    }

    /// Structurally illegal declaration on `parts`
    pub fn invalid_configuration(parts: Vec<PartId>, message: impl Into<String>) -> Self {
        CompositionError {
            parts,
            ..Self::new(ErrorKind::InvalidConfiguration, message)
        }
    }

    /// Cycle among the parts of `cycle`, listed in the order given
    ///
    /// Build diagnostics list members in composition order; re-entrant
    /// requests list them in construction order.
    pub fn cyclic_dependency(cycle: Vec<PartId>) -> Self {
        let names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        let message = format!("direct dependency cycle among {}", names.join(", "));
        CompositionError {
            parts: cycle,
            ..Self::new(ErrorKind::CyclicDependency, message)
        }
    }

    /// The activator failed for `part`
    pub fn creation_failed(part: PartId, cause: SharedCause) -> Self {
        let message = format!("activation of {} failed: {}", part, cause);
        CompositionError {
            parts: vec![part],
            cause: Some(cause),
            ..Self::new(ErrorKind::CreationFailed, message)
        }
    }

    /// Materialization was cancelled before constructing `part`
    pub fn cancelled(part: PartId) -> Self {
        let message = format!("cancelled before constructing {}", part);
        CompositionError {
            parts: vec![part],
            ..Self::new(ErrorKind::Cancelled, message)
        }
    }

    /// Attach the import this error is about
    pub fn with_import(mut self, import: ImportSite) -> Self {
        self.import = Some(import);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Error kind
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Implicated parts
    #[inline]
    pub fn parts(&self) -> &[PartId] {
        &self.parts
    }

    /// Import the error is about
    #[inline]
    pub fn import(&self) -> Option<&ImportSite> {
        self.import.as_ref()
    }

    /// Human-readable message
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying activator error
    #[inline]
    pub fn cause(&self) -> Option<&SharedCause> {
        self.cause.as_ref()
    }

    /// Key used to deduplicate and order collected diagnostics
    fn sort_key(&self) -> (ErrorKind, &[PartId], Option<&ImportSite>, &str) {
        (self.kind, &self.parts, self.import.as_ref(), &self.message)
    }
}

impl PartialEq for CompositionError {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for CompositionError {}

// =============================================================================
// Error collections
// =============================================================================

/// Every diagnostic collected while validating or building a graph
///
/// Never empty when returned as an error. Entries are deduplicated and
/// ordered by kind, then implicated parts, then import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} composition error(s): {}", .0.len(), summarize(.0))]
pub struct CompositionErrors(Vec<CompositionError>);

fn summarize(errors: &[CompositionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CompositionErrors {
    /// Deduplicate and order `errors`
    pub fn new(mut errors: Vec<CompositionError>) -> Self {
        errors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        errors.dedup();
        CompositionErrors(errors)
    }

    /// Number of diagnostics
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no diagnostics
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate diagnostics in order
    pub fn iter(&self) -> std::slice::Iter<'_, CompositionError> {
        self.0.iter()
    }

    /// Whether any diagnostic has `kind`
    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }

    /// First diagnostic
    pub fn first(&self) -> Option<&CompositionError> {
        self.0.first()
    }

    /// Consume into the underlying list
    pub fn into_vec(self) -> Vec<CompositionError> {
        self.0
    }
}

impl From<CompositionError> for CompositionErrors {
    fn from(error: CompositionError) -> Self {
        CompositionErrors(vec![error])
    }
}

impl IntoIterator for CompositionErrors {
    type Item = CompositionError;
    type IntoIter = std::vec::IntoIter<CompositionError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CompositionErrors {
    type Item = &'a CompositionError;
    type IntoIter = std::slice::Iter<'a, CompositionError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// =============================================================================
// Configuration errors
// =============================================================================

/// Error loading or writing a composition config file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("failed to access config file '{}': {source}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for a composition config
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
