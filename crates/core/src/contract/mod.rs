//! Contract types
//!
//! Contracts are how exports and imports find each other:
//!
//! - `type_shape`: the shape of a type, open or closed, and its unification
//! - `identity`: the (name, shape) pair that exports provide and imports request
//!
//! ## Usage
//!
//! ```
//! use mortise_core::contract::{ContractIdentity, TypeShape};
//!
//! let export = ContractIdentity::of_type(TypeShape::open("Useful", 1));
//! let import = ContractIdentity::of_type("Useful<i32>".parse().unwrap());
//! assert!(export.match_request(&import, 1).is_some());
//! ```

pub mod identity;
pub mod type_shape;

// Re-exports
pub use identity::ContractIdentity;
pub use type_shape::{Bindings, ShapeParseError, TypeShape};
