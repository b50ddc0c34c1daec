//! Structured error handling for the memory subsystem
//!
//! Every failure the subsystem can produce is categorized here with a
//! machine-readable code. Policy lives with the callers: resonance degrades
//! to an empty block, consolidation keeps the previous story, and nothing
//! escapes the public facade.

use std::fmt;

/// Subsystem error types with proper categorization
#[derive(Debug)]
pub enum MemoryError {
    /// Graph backend unreachable or returned a transport-level failure
    GraphUnavailable(String),

    /// Graph backend rejected the query text itself
    GraphSyntax(String),

    /// Completion returned empty or non-textual output
    CompletionEmpty,

    /// Completion stream surfaced an error event
    CompletionStream(String),

    /// Consolidated story exceeded the word budget and compression failed
    StoryTooLong { words: usize, limit: usize },

    /// Another process holds a fresh narrative lock
    LockHeld { age_secs: i64 },

    /// Pending log vanished while status still reports pending work
    PendingLogMissing,

    /// A historical file could not be read or parsed during bootstrap
    HistoricalIngest { file: String, reason: String },

    /// Filesystem failure on one of the memory-directory files
    Io(std::io::Error),

    /// Generic wrapper for internal errors
    Internal(anyhow::Error),
}

impl MemoryError {
    /// Get error code for log correlation
    pub fn code(&self) -> &'static str {
        match self {
            Self::GraphUnavailable(_) => "GRAPH_UNAVAILABLE",
            Self::GraphSyntax(_) => "GRAPH_SYNTAX_ERROR",
            Self::CompletionEmpty => "COMPLETION_EMPTY",
            Self::CompletionStream(_) => "COMPLETION_STREAM_ERROR",
            Self::StoryTooLong { .. } => "STORY_TOO_LONG",
            Self::LockHeld { .. } => "LOCK_HELD",
            Self::PendingLogMissing => "PENDING_LOG_MISSING",
            Self::HistoricalIngest { .. } => "HISTORICAL_INGEST_FAILURE",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::GraphUnavailable(msg) => format!("Graph backend unavailable: {msg}"),
            Self::GraphSyntax(msg) => format!("Graph rejected query: {msg}"),
            Self::CompletionEmpty => "Completion returned no text".to_string(),
            Self::CompletionStream(msg) => format!("Completion stream error: {msg}"),
            Self::StoryTooLong { words, limit } => {
                format!("Story too long: {words} words (limit: {limit})")
            }
            Self::LockHeld { age_secs } => {
                format!("Narrative lock held by another process ({age_secs}s old)")
            }
            Self::PendingLogMissing => {
                "Pending log missing while status reports pending work".to_string()
            }
            Self::HistoricalIngest { file, reason } => {
                format!("Historical ingest failed for '{file}': {reason}")
            }
            Self::Io(err) => format!("I/O error: {err}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Whether the caller may retry the operation as-is
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::GraphUnavailable(_) | Self::CompletionStream(_) | Self::LockHeld { .. }
        )
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for MemoryError {}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for MemoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.into())
    }
}

/// Type alias for Results using MemoryError
pub type Result<T> = std::result::Result<T, MemoryError>;
