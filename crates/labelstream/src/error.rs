//! Error types for label metadata streaming.
//!
//! This module defines the central `Error` enum shared by the index
//! collaborators, the response sinks and both query pipelines. Every failure is
//! terminal for the call that observed it; nothing in this crate retries.
//!
//! ## Error Cases
//! - `IndexRead`: The index failed to list names, values or postings.
//! - `Postings`: A postings iterator failed while counting one label value.
//! - `ChannelError`: The response sink could not accept a batch.
//! - `Cancelled`: The request's cancellation token fired.
//! - `InvalidMatcher`: A matcher could not be parsed or compiled.
//! - `InvalidRequest`: The request or configuration was out of bounds.
//! - `Worker`: A counting worker panicked or was aborted.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for label metadata queries.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Reading label names, label values or postings from the index failed.
    #[error("Index read error: {context}")]
    IndexRead { context: String },

    /// The postings iterator for a single `name=value` pair failed.
    #[error("Postings error for {label_name}={label_value:?}: {context}")]
    Postings {
        label_name: String,
        label_value: String,
        context: String,
    },

    /// The response sink refused a batch (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The client went away or the request deadline passed.
    #[error("Request cancelled")]
    Cancelled,

    /// A matcher was malformed or its regular expression did not compile.
    #[error("Invalid matcher: {reason}")]
    InvalidMatcher { reason: String },

    /// The request or configuration violated a constraint.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A counting worker did not complete.
    #[error("Worker error: {context}")]
    Worker { context: String },
}

impl Error {
    /// Shorthand for an [`Error::IndexRead`] with the given context.
    pub fn index_read(context: impl Into<String>) -> Self {
        Self::IndexRead {
            context: context.into(),
        }
    }

    /// Returns `true` for caller-initiated cancellation, as opposed to a
    /// server-side fault.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::InvalidMatcher {
            reason: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker {
            context: err.to_string(),
        }
    }
}
