//! Mortise - part composition engine
//!
//! Mortise wires an application together from declarative part
//! definitions. Each part declares the contracts it exports and the
//! contracts it imports; the engine matches imports to exports, closes
//! open generic parts on demand, rejects direct dependency cycles, and
//! constructs instances lazily.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use mortise::{Catalog, CompositionContainer, FactoryActivator, ImportDefinition, Instance,
//!     PartDefinition, TypeShape};
//!
//! struct Db;
//! struct Repo(Arc<Db>);
//!
//! let catalog = Catalog::from_parts([
//!     PartDefinition::new(TypeShape::named("Db")).export_self(),
//!     PartDefinition::new(TypeShape::named("Repo"))
//!         .export_self()
//!         .with_import(ImportDefinition::parameter(0, TypeShape::named("Db"))),
//! ]);
//!
//! let activator = FactoryActivator::new()
//!     .register("Db", |_, _| Ok(Arc::new(Db) as Instance))
//!     .register("Repo", |_, imports| {
//!         let db = imports.parameter(0).and_then(|v| v.single()).ok_or("no db")?;
//!         Ok(Arc::new(Repo(db.get_as::<Db>()?)) as Instance)
//!     });
//!
//! let container = CompositionContainer::new(&catalog, activator).unwrap();
//! let repo = container.get_exported_value(&TypeShape::named("Repo").into()).unwrap();
//! assert!(repo.downcast::<Repo>().is_ok());
//! ```
//!
//! # Architecture
//!
//! Definitions, contracts, configuration and diagnostics live in
//! `mortise-core`. Catalog, resolver, graph builder, materializer and the
//! container live in `mortise-engine`. Both are re-exported here.

pub use mortise_core::*;
pub use mortise_engine::*;
