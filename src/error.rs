//! Error types for depot.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DepotError>;

/// Errors surfaced by the depot library.
///
/// Per-command failures never show up here: malformed or refused commands
/// are answered on the wire, and connection-local I/O trouble is handled
/// inside the serving loop. What remains is the listener.
#[derive(Debug, Error)]
pub enum DepotError {
    /// The listen address could not be bound.
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The accept loop hit an error it cannot retry.
    #[error("accept: {0}")]
    Accept(#[source] io::Error),

    /// Any other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
