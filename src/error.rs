use std::io;
use std::path::PathBuf;

/// Errors surfaced by the engine.
///
/// Cancellation and "destination exists" are not errors: they come back as
/// outcome values so callers can branch on them without matching on failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("file is locked for writing: {}", .0.display())]
    Locked(PathBuf),
    #[error("write not permitted: {0}")]
    WriteNotPermitted(&'static str),
    #[error("no stream is open")]
    NotOpen,
    #[error("insertion at offset {0} is not supported")]
    InsertionUnsupported(u64),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
