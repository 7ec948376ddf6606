//! Error types for syntaxcensus core.

use std::io;

use thiserror::Error;

/// Error type for syntaxcensus core operations.
#[derive(Debug, Error)]
pub enum CensusError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// YAML encoding failed.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// CSV encoding failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// The configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// The configuration is invalid; raised before any work starts.
    #[error("configuration error: {0}")]
    Config(String),
    /// A failure that must stop the whole pipeline.
    #[error("critical error: {0}")]
    Critical(String),
    /// Sample selection ended with zero valid candidates.
    #[error("no valid candidates survived validation")]
    NoCandidates,
    /// A catch-all error with a message.
    #[error("{0}")]
    Other(String),
}

impl CensusError {
    /// Whether this error belongs to the class allowed to abort a run.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical(_))
    }
}

/// Convenience result type for syntaxcensus core.
pub type Result<T> = std::result::Result<T, CensusError>;

/// Failure reported by a discovery or content collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The requested resource does not exist.
    #[error("not found")]
    NotFound,
    /// The credential was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The API quota is exhausted.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Network or server failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl SourceError {
    /// Only a rejected credential aborts a run; everything else is recovered per unit.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<SourceError> for CensusError {
    fn from(value: SourceError) -> Self {
        if value.is_critical() {
            Self::Critical(value.to_string())
        } else {
            Self::Other(value.to_string())
        }
    }
}
