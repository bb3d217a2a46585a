//! Definition model
//!
//! Immutable records describing what parts export and import. They are
//! produced by an external discovery step (attribute scanning, manual
//! registration, generated code) and consumed as-is by the engine.
//!
//! - `part`: [`PartDefinition`], its identity, creation policy and closing
//! - `export`: [`ExportDefinition`]
//! - `import`: [`ImportDefinition`] with cardinality, laziness and constraints
//! - `member`: where on a part an export or import lives
//! - `metadata`: string-keyed export metadata

pub mod export;
pub mod import;
pub mod member;
pub mod metadata;
pub mod part;

pub use export::ExportDefinition;
pub use import::{Cardinality, ImportDefinition, ImportSource, Laziness};
pub use member::{MemberKind, MemberLocator};
pub use metadata::{Metadata, MetadataValue};
pub use part::{CreationPolicy, PartDefinition, PartId, Visibility};
