//! Rowguard Auth - Model registry and authorization query rewriting
//!
//! This crate provides:
//! - `ModelRegistry`: which entities are protected and how they relate
//! - `constraint_to_condition`: partial decisions as sea-orm filters
//! - `register_models` / `authorize_model`: the entry points tying both to a policy engine

pub mod authorize;
pub mod registry;
pub mod rewriter;

#[cfg(test)]
pub(crate) mod testing;

pub use authorize::{authorize_model, register_models};
pub use registry::{ModelInfo, ModelRegistry, RelationshipInfo};
pub use rewriter::{constraint_to_condition, json_to_value};
