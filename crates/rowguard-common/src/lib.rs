//! Rowguard Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Rowguard components:
//! - Error types and error codes
//! - Action name constants
//! - Identifier validation

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{ErrorCode, RowguardError};
pub use utils::is_valid_identifier;

/// Action used when no action is configured
pub const DEFAULT_ACTION: &str = "read";

/// Rule key that applies to every action
pub const ACTION_WILDCARD: &str = "*";

/// Well-known action names
pub const ACTION_READ: &str = "read";
pub const ACTION_UPDATE: &str = "update";
pub const ACTION_DELETE: &str = "delete";
