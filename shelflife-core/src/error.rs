//! Error types for Shelflife operations

use thiserror::Error;

/// Remote endpoint errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Endpoint unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Response body interrupted after {received} bytes: {reason}")]
    Body { received: u64, reason: String },
}

/// Payload failed structural validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Payload is not a sequence (found {found})")]
    NotASequence { found: &'static str },

    #[error("Payload sequence is empty")]
    Empty,

    #[error("No valid records in payload ({dropped} dropped)")]
    NoValidRecords { dropped: usize },

    #[error("Payload could not be decoded: {reason}")]
    Undecodable { reason: String },
}

/// Payload exceeded the configured size ceiling.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Payload of {observed} bytes exceeds the {limit} byte ceiling")]
pub struct OversizeError {
    pub limit: u64,
    pub observed: u64,
}

/// Persisted storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to read {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Failed to write {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Failed to open storage: {reason}")]
    OpenFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// A persisted cache entry failed its integrity checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("Cache entry is unparsable: {reason}")]
    Unparsable { reason: String },

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: u32, found: u32 },

    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Cache entry carries no checksum")]
    MissingChecksum,
}

/// Input validation errors for user-facing calculations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required input missing: {field}")]
    MissingInput { field: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or SHELFLIFE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all Shelflife errors.
#[derive(Debug, Clone, Error)]
pub enum ShelfError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Oversize error: {0}")]
    Oversize(#[from] OversizeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Corruption error: {0}")]
    Corruption(#[from] CorruptionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Shelflife operations.
pub type ShelfResult<T> = Result<T, ShelfError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display_status() {
        let err = TransportError::Status {
            url: "https://example.test/data.json".to_string(),
            status: 503,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("503"));
        assert!(msg.contains("data.json"));
    }

    #[test]
    fn test_oversize_error_display() {
        let err = OversizeError {
            limit: 1024,
            observed: 4096,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("4096"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn test_corruption_error_display_schema() {
        let err = CorruptionError::SchemaVersionMismatch {
            expected: 3,
            found: 1,
        };
        assert_eq!(
            format!("{}", err),
            "Schema version mismatch: expected 3, found 1"
        );
    }

    #[test]
    fn test_shelf_error_from_schema() {
        let err: ShelfError = SchemaError::Empty.into();
        assert!(matches!(err, ShelfError::Schema(SchemaError::Empty)));
        assert!(format!("{}", err).starts_with("Schema error"));
    }

    #[test]
    fn test_shelf_error_from_storage() {
        let err: ShelfError = StorageError::QuotaExceeded {
            key: "products_cache".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            ShelfError::Storage(StorageError::QuotaExceeded { .. })
        ));
    }
}
