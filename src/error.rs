use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IrdsError {
    #[error("transfer of {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned status {status}: {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("integrity check failed for {key}: expected {expected}, got {actual}")]
    #[diagnostic(help("the remote object changed or the download was corrupted"))]
    Integrity {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("cannot open archive {archive}: {message}")]
    CorruptArchive { archive: String, message: String },

    #[error("member {member} not found in archive {archive}")]
    MemberNotFound { archive: String, member: String },

    #[error("malformed record at {path}:{line}: {reason} (line: {raw})")]
    MalformedRecord {
        path: String,
        line: usize,
        raw: String,
        reason: String,
    },

    #[error("dataset {dataset} does not provide {capability}")]
    Capability { dataset: String, capability: String },

    #[error("unknown dataset id: {0}")]
    #[diagnostic(help("run `irds list` to see registered datasets"))]
    UnknownId(String),

    #[error("dataset id registered twice: {0}")]
    DuplicateId(String),

    #[error("download descriptor unavailable for {key}: {message}")]
    ConfigUnavailable { key: String, message: String },

    #[error("giving up on {key} after {failures} consecutive failures (last: {last})")]
    Fatal {
        key: String,
        failures: u32,
        last: String,
    },

    #[error("timed out after {waited_secs}s waiting for lock on {path}")]
    LockTimeout { path: String, waited_secs: u64 },

    #[error("resolution of {key} was cancelled")]
    Cancelled { key: String },

    #[error("resolved resource {key} is empty: {path}")]
    EmptyResource { key: String, path: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl IrdsError {
    /// Transient transport failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            IrdsError::Transport { .. } => true,
            IrdsError::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
