//! Error types for blastpool.

use thiserror::Error;

/// Structural violations of the worker's tabular (outfmt 7) output grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected header line starting with '{expected}', got '{line}'")]
    BadHeader { expected: String, line: String },

    #[error("expected '# Query:' line, got '{0}'")]
    BadQueryLine(String),

    #[error("expected '# Database:' line, got '{0}'")]
    BadDatabaseLine(String),

    #[error("expected '# N hits found' line, got '{0}'")]
    BadHitCount(String),

    #[error("field count mismatch: expected {expected} columns, got {actual} in '{line}'")]
    FieldCountMismatch {
        expected: usize,
        actual: usize,
        line: String,
    },

    #[error("hit line is not valid UTF-8: '{0}'")]
    InvalidUtf8(String),

    #[error("field '{0}' appears more than once")]
    DuplicateField(String),

    #[error("worker output ended mid-record ({bytes} unparsed bytes)")]
    Truncated { bytes: usize },
}

/// Main error type for blastpool.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed worker output: {0}")]
    Parse(#[from] ParseError),

    #[error("Malformed query input at byte {offset}: line does not start with '{marker}'")]
    Feeder { offset: u64, marker: char },

    #[error("Use of the -{0} option is not supported")]
    UnsupportedOption(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {worker_id} (pid {pid}) {reason}")]
    WorkerExit {
        worker_id: usize,
        pid: i32,
        reason: String,
    },

    #[error("System call failed: {0}")]
    Sys(#[from] nix::errno::Errno),
}

/// Result type alias for blastpool operations.
pub type Result<T> = std::result::Result<T, Error>;
