//! Error types for the analytics layer
//!
//! Two levels:
//! - `BackendError`: what the storage backend reports. Provisioning calls
//!   recover its "already exists" form locally.
//! - `AnalyticsError`: everything surfaced to callers. Input validation
//!   errors carry the offending field and value.

use thiserror::Error;

/// Error reported by a storage backend primitive
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Key, filter or rule already exists
    AlreadyExists(String),
    /// Key does not exist
    NotFound(String),
    /// Primitive not available on this backend
    Unsupported(String),
    /// Anything else, passed through unchanged
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::AlreadyExists(msg) => write!(f, "already exists: {}", msg),
            BackendError::NotFound(key) => write!(f, "key not found: {}", key),
            BackendError::Unsupported(path) => write!(f, "unsupported primitive: {}", path),
            BackendError::Other(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl BackendError {
    /// Message fragments real backends use for "already exists" replies
    const ALREADY_EXISTS_PATTERNS: [&'static str; 5] = [
        "key already exists",
        "item exists",
        "already exists",
        "duplicate",
        "the destination key already has a src rule",
    ];

    /// True for any reply meaning the resource is already provisioned
    pub fn is_already_exists(&self) -> bool {
        match self {
            BackendError::AlreadyExists(_) => true,
            BackendError::Other(msg) => {
                let lower = msg.to_ascii_lowercase();
                Self::ALREADY_EXISTS_PATTERNS
                    .iter()
                    .any(|pattern| lower.contains(pattern))
            }
            _ => false,
        }
    }
}

/// Errors surfaced by stores, queries and builders
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("backend client is missing required method '{path}'")]
    ContractViolation { path: String },

    #[error("invalid {field} '{value}': {reason}")]
    InvalidIdentifier {
        field: String,
        value: String,
        reason: String,
    },

    #[error("unknown dimension '{dimension}' for metric '{metric}' (known: {known})")]
    UnknownDimension {
        metric: String,
        dimension: String,
        known: String,
    },

    #[error("invalid value '{value}' for dimension '{dimension}' of metric '{metric}'")]
    InvalidDimensionValue {
        metric: String,
        dimension: String,
        value: String,
    },

    #[error("missing value for dimension '{dimension}' of metric '{metric}'")]
    MissingDimension { metric: String, dimension: String },

    #[error("compaction already exists for '{source_key}': {key}")]
    CompactionAlreadyExists { source_key: String, key: String },

    #[error("previous period is undefined: {0}")]
    UndefinedPreviousPeriod(String),

    #[error("invalid bloom config: error_rate={error_rate}, capacity={capacity}")]
    InvalidBloomConfig { error_rate: f64, capacity: u64 },

    #[error("invalid measure '{measure}': {reason}")]
    InvalidMeasure { measure: String, reason: String },

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("metric '{metric}' is not a {expected} metric")]
    MetricKindMismatch { metric: String, expected: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AnalyticsError>;

impl AnalyticsError {
    pub(crate) fn invalid_identifier(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AnalyticsError::InvalidIdentifier {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_variants() {
        assert!(BackendError::AlreadyExists("k".into()).is_already_exists());
        assert!(BackendError::Other("ERR TSDB: key already exists".into()).is_already_exists());
        assert!(BackendError::Other("ERR item exists".into()).is_already_exists());
        assert!(BackendError::Other(
            "ERR TSDB: the destination key already has a src rule".into()
        )
        .is_already_exists());
        assert!(!BackendError::Other("WRONGTYPE".into()).is_already_exists());
        assert!(!BackendError::NotFound("k".into()).is_already_exists());
    }

    #[test]
    fn test_contract_violation_names_path() {
        let err = AnalyticsError::ContractViolation {
            path: "ts.range".into(),
        };
        assert!(err.to_string().contains("'ts.range'"));
    }

    #[test]
    fn test_invalid_identifier_carries_field_and_value() {
        let err = AnalyticsError::invalid_identifier("dimension value", "a=b", "contains '='");
        let msg = err.to_string();
        assert!(msg.contains("dimension value"));
        assert!(msg.contains("a=b"));
    }

    #[test]
    fn test_backend_error_converts() {
        let err: AnalyticsError = BackendError::Other("boom".into()).into();
        assert!(matches!(err, AnalyticsError::Backend(_)));
        assert_eq!(err.to_string(), "backend error: boom");
    }
}
