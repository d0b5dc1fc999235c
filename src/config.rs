//! Run configuration consumed by the scheduler.

use crate::error::{Error, Result};
use crate::feeder::DEFAULT_RECORD_MARKER;
use crate::parser::DEFAULT_HEADER_PREFIX;

/// Default set of fields requested from the worker for each hit.
pub const DEFAULT_HIT_FIELDS: &[&str] = &[
    "sseqid", "pident", "length", "mismatch", "gapopen", "qstart", "qend", "sstart", "send",
    "evalue", "bitscore",
];

/// Number of workers used when none is configured.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Configuration for one scheduling run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of worker processes to spawn.
    pub workers: usize,
    /// Hit field names, passed to the worker's output format and used as keys
    /// when its output has no `# Fields:` line.
    pub fields: Vec<String>,
    /// Prefix identifying the first line of each output block.
    pub header_prefix: String,
    /// First byte of each query record.
    pub record_marker: u8,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            fields: DEFAULT_HIT_FIELDS.iter().map(|s| s.to_string()).collect(),
            header_prefix: DEFAULT_HEADER_PREFIX.to_string(),
            record_marker: DEFAULT_RECORD_MARKER,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_header_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.header_prefix = prefix.into();
        self
    }

    pub fn with_record_marker(mut self, marker: u8) -> Self {
        self.record_marker = marker;
        self
    }

    /// Reject configurations that cannot produce a parseable run.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("worker count must be positive".into()));
        }
        if self.fields.is_empty() {
            return Err(Error::Config("at least one hit field is required".into()));
        }
        if let Some(bad) = self
            .fields
            .iter()
            .find(|f| f.is_empty() || f.contains(char::is_whitespace))
        {
            return Err(Error::Config(format!("invalid field name '{}'", bad)));
        }
        if let Some((i, dup)) = self
            .fields
            .iter()
            .enumerate()
            .find(|(i, f)| self.fields[..*i].contains(*f))
        {
            return Err(Error::Config(format!(
                "field '{}' is requested more than once (position {})",
                dup,
                i + 1
            )));
        }
        if self.header_prefix.trim().is_empty() {
            return Err(Error::Config("header prefix must not be empty".into()));
        }
        if self.record_marker == b'\n' {
            return Err(Error::Config("record marker cannot be a newline".into()));
        }
        Ok(())
    }
}
