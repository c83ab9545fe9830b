//! Rowguard Policy - Policy decisions for row-level authorization
//!
//! This crate provides:
//! - `PolicyEngine`: the decision client trait the rest of Rowguard talks to
//! - `Constraint`: partial decisions over resource fields
//! - `Actor`: who is asking
//! - `RulePolicy`: a YAML rule engine implementing `PolicyEngine`

pub mod actor;
pub mod constraint;
pub mod engine;
pub mod rules;

pub use actor::Actor;
pub use constraint::{Comparison, Constraint};
pub use engine::{DataFetcher, PolicyEngine, ResourceClass};
pub use rules::{Operator, RulePolicy};
