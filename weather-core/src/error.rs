//! Error types for weather lookup operations

use std::fmt;
use thiserror::Error;

/// Which storage tier an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageTier {
    Cache,
    EventLog,
    ObjectStore,
}

impl StorageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::EventLog => "event_log",
            Self::ObjectStore => "object_store",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage tier errors.
///
/// These are always transient from the lookup's point of view: the
/// orchestrator absorbs them and falls through to the next tier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Object not found at {path}")]
    NotFound { path: String },

    #[error("Object at {path} is not a valid snapshot: {reason}")]
    Decode { path: String, reason: String },

    #[error("Encoding failed: {reason}")]
    Encode { reason: String },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("{tier} unavailable: {reason}")]
    Unavailable { tier: StorageTier, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Origin provider errors.
///
/// The only error class that crosses the orchestrator boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("Provider does not know city '{city}'")]
    CityNotFound { city: String },

    #[error("Request to provider failed: {reason}")]
    Request { reason: String },

    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from provider: {reason}")]
    InvalidResponse { reason: String },
}

impl OriginError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CityNotFound { .. } => "city_not_found",
            Self::Request { .. } => "request",
            Self::Status { .. } => "status",
            Self::InvalidResponse { .. } => "invalid_response",
        }
    }
}

/// Write-through step that follows a successful origin fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStep {
    StoreObject,
    AppendLog,
    PopulateCache,
}

impl WriteStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoreObject => "store_object",
            Self::AppendLog => "append_log",
            Self::PopulateCache => "populate_cache",
        }
    }
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write-through step failed after the snapshot was already in hand.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Write-through step {step} failed: {source}")]
pub struct PersistenceError {
    pub step: WriteStep,
    pub source: StorageError,
}

impl PersistenceError {
    pub fn new(step: WriteStep, source: StorageError) -> Self {
        Self { step, source }
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all weather lookup errors.
#[derive(Debug, Clone, Error)]
pub enum WeatherError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Origin error: {0}")]
    Origin(#[from] OriginError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for weather lookup operations.
pub type WeatherResult<T> = Result<T, WeatherError>;

// =============================================================================
// TESTS
// =============================================================================
