//! Error types and error codes for Rowguard
//!
//! This module defines:
//! - `RowguardError`: Library-specific error enum
//! - `ErrorCode`: Structured error codes for callers that surface errors to clients

use serde::{Deserialize, Serialize};

/// Library-specific error types
///
/// Fallible functions across the workspace return `anyhow::Result<T>` and build
/// one of these variants, so callers can `downcast_ref::<RowguardError>()`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RowguardError {
    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    #[error("model '{0}' is not registered")]
    ModelNotRegistered(String),

    #[error("class '{0}' is not registered with the policy engine")]
    UnregisteredClass(String),

    #[error("unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    #[error("unknown relationship '{relation}' on model '{model}'")]
    UnknownRelationship { model: String, relation: String },

    #[error("unsupported relationship '{relation}' on model '{model}': {reason}")]
    UnsupportedRelationship {
        model: String,
        relation: String,
        reason: String,
    },

    #[error("unsupported value for field '{field}': {reason}")]
    UnsupportedValue { field: String, reason: String },

    #[error("policy error: {0}")]
    PolicyParse(String),

    #[error("invalid policy file '{0}': expected a .yaml or .yml file")]
    InvalidPolicyFile(String),

    #[error("policy file '{0}' is already loaded")]
    DuplicatePolicyFile(String),

    #[error("no session provider installed, call set_get_session first")]
    NoSessionProvider,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl RowguardError {
    /// Stable error code for this error
    pub fn code(&self) -> ErrorCode<'static> {
        match self {
            RowguardError::DuplicateModel(_) => DUPLICATE_MODEL,
            RowguardError::ModelNotRegistered(_) => MODEL_NOT_REGISTERED,
            RowguardError::UnregisteredClass(_) => UNREGISTERED_CLASS,
            RowguardError::UnknownField { .. } => UNKNOWN_FIELD,
            RowguardError::UnknownRelationship { .. } => UNKNOWN_RELATIONSHIP,
            RowguardError::UnsupportedRelationship { .. } => UNSUPPORTED_RELATIONSHIP,
            RowguardError::UnsupportedValue { .. } => UNSUPPORTED_VALUE,
            RowguardError::PolicyParse(_) => POLICY_PARSE_ERROR,
            RowguardError::InvalidPolicyFile(_) => INVALID_POLICY_FILE,
            RowguardError::DuplicatePolicyFile(_) => DUPLICATE_POLICY_FILE,
            RowguardError::NoSessionProvider => NO_SESSION_PROVIDER,
            RowguardError::AccessDenied(_) => ACCESS_DENIED,
            RowguardError::ConfigError(_) => CONFIG_ERROR,
        }
    }
}

/// Error code structure
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

// Registry errors
pub const DUPLICATE_MODEL: ErrorCode<'static> = ErrorCode {
    code: 10001,
    message: "duplicate model",
};

pub const MODEL_NOT_REGISTERED: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "model not registered",
};

// Rewriter errors
pub const UNKNOWN_FIELD: ErrorCode<'static> = ErrorCode {
    code: 20001,
    message: "unknown field",
};

pub const UNKNOWN_RELATIONSHIP: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "unknown relationship",
};

pub const UNSUPPORTED_RELATIONSHIP: ErrorCode<'static> = ErrorCode {
    code: 20003,
    message: "unsupported relationship",
};

pub const UNSUPPORTED_VALUE: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "unsupported value",
};

// Policy errors
pub const UNREGISTERED_CLASS: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "unregistered class",
};

pub const POLICY_PARSE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30002,
    message: "policy parse error",
};

pub const INVALID_POLICY_FILE: ErrorCode<'static> = ErrorCode {
    code: 30003,
    message: "invalid policy file",
};

pub const DUPLICATE_POLICY_FILE: ErrorCode<'static> = ErrorCode {
    code: 30004,
    message: "duplicate policy file",
};

// Session errors
pub const NO_SESSION_PROVIDER: ErrorCode<'static> = ErrorCode {
    code: 40001,
    message: "no session provider",
};

pub const ACCESS_DENIED: ErrorCode<'static> = ErrorCode {
    code: 40002,
    message: "access denied",
};

pub const CONFIG_ERROR: ErrorCode<'static> = ErrorCode {
    code: 50001,
    message: "configuration error",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rowguard_error_display() {
        let err = RowguardError::DuplicateModel("posts".to_string());
        assert_eq!(format!("{}", err), "model 'posts' is already registered");

        let err = RowguardError::UnknownField {
            model: "posts".to_string(),
            field: "secret".to_string(),
        };
        assert_eq!(format!("{}", err), "unknown field 'secret' on model 'posts'");

        let err = RowguardError::InvalidPolicyFile("rules.txt".to_string());
        assert_eq!(
            format!("{}", err),
            "invalid policy file 'rules.txt': expected a .yaml or .yml file"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RowguardError::ModelNotRegistered("x".to_string()).code(),
            MODEL_NOT_REGISTERED
        );
        assert_eq!(RowguardError::NoSessionProvider.code().code, 40001);
        assert_eq!(
            RowguardError::PolicyParse("bad".to_string()).code().message,
            "policy parse error"
        );
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = RowguardError::UnregisteredClass("users".to_string()).into();
        assert_eq!(
            err.downcast_ref::<RowguardError>(),
            Some(&RowguardError::UnregisteredClass("users".to_string()))
        );
    }
}
