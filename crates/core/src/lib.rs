//! Core types for mortise
//!
//! This crate defines the data model the composition engine consumes:
//! - TypeShape: structural type description with parameter slots
//! - ContractIdentity: what an export provides and an import requests
//! - PartDefinition: a composable part with its exports and imports
//! - ExportDefinition / ImportDefinition: the two sides of every edge
//! - Metadata: string-keyed export metadata
//! - CompositionConfig: policy table and build scope (`mortise.toml`)
//! - CompositionError: diagnostics shared by every engine phase

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod contract;
pub mod definition;
pub mod error;

pub use config::{
    BuildScope, CompatibilityMode, CompositionConfig, ExportRule, GenericExportOverrides,
    CONFIG_FILE_NAME,
};
pub use contract::{Bindings, ContractIdentity, ShapeParseError, TypeShape};
pub use definition::{
    Cardinality, CreationPolicy, ExportDefinition, ImportDefinition, ImportSource, Laziness,
    MemberKind, MemberLocator, Metadata, MetadataValue, PartDefinition, PartId, Visibility,
};
pub use error::{
    CompositionError, CompositionErrors, ConfigError, ErrorKind, ImportSite, Result, SharedCause,
};
