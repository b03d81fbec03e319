//! # Depot
//!
//! An in-memory package dependency index served over TCP.
//!
//! Clients open persistent connections and stream line-oriented commands
//! (`INDEX`, `REMOVE`, `QUERY`), one per line. The index enforces a single
//! invariant on the package graph: a package is only indexed once all of
//! its dependencies are, and is only removable once nothing depends on it.
//! Every command is answered with exactly one of `OK`, `FAIL` or `ERROR`.
//!
//! State is strictly in-memory; a restart starts empty.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use depot::{Index, Server, ServerConfig};
//!
//! let index = Arc::new(Index::new());
//! let server = Server::new(index, ServerConfig::default());
//! server.listen_and_serve().expect("server failed");
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod server;

// Re-exports for convenience
pub use config::ServerConfig;
pub use error::{DepotError, Result};
pub use index::Index;
pub use server::Server;

#[cfg(test)]
mod tests {
    use super::*;
    use server::wire::{parse_message, ERROR_RESPONSE, FAIL_RESPONSE, OK_RESPONSE};

    /// Run one wire-level command against an index, without the network:
    /// parse, dispatch, and return the token the engine would write.
    fn dispatch(index: &Index, line: &str) -> &'static [u8] {
        let message = match parse_message(line.as_bytes()) {
            Ok(message) => message,
            Err(_) => return ERROR_RESPONSE,
        };
        let verdict = match message.command.as_slice() {
            b"INDEX" => index.index(&message.package, message.dependencies),
            b"REMOVE" => index.remove(&message.package),
            b"QUERY" => index.query(&message.package),
            _ => return ERROR_RESPONSE,
        };
        if verdict {
            OK_RESPONSE
        } else {
            FAIL_RESPONSE
        }
    }

    #[test]
    fn fresh_index_remove_and_query() {
        let index = Index::new();
        assert_eq!(dispatch(&index, "REMOVE|A|\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "QUERY|A|\n"), FAIL_RESPONSE);
    }

    #[test]
    fn missing_dependency_then_success() {
        let index = Index::new();
        assert_eq!(dispatch(&index, "INDEX|A|B\n"), FAIL_RESPONSE);
        assert_eq!(dispatch(&index, "INDEX|B|\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "INDEX|A|B\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "QUERY|A|\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "QUERY|B|\n"), OK_RESPONSE);
    }

    #[test]
    fn refcount_guards_removal() {
        let index = Index::new();
        assert_eq!(dispatch(&index, "INDEX|B|\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "INDEX|A|B\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "REMOVE|B|\n"), FAIL_RESPONSE);
        assert_eq!(dispatch(&index, "REMOVE|A|\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "REMOVE|B|\n"), OK_RESPONSE);
    }

    #[test]
    fn reindex_ignores_new_deps() {
        let index = Index::new();
        assert_eq!(dispatch(&index, "INDEX|A|\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "INDEX|C|\n"), OK_RESPONSE);
        assert_eq!(dispatch(&index, "INDEX|A|C\n"), OK_RESPONSE);
        // A's deps were never changed to include C.
        assert_eq!(dispatch(&index, "REMOVE|C|\n"), OK_RESPONSE);
    }

    #[test]
    fn malformed_commands_leave_no_trace() {
        let index = Index::new();
        for line in ["\n", "||\n", "INDEX|A,B|\n", "INDEX|A|B|\n", "INDEX|A|B,\n"] {
            assert_eq!(dispatch(&index, line), ERROR_RESPONSE, "line {:?}", line);
        }
        assert_eq!(dispatch(&index, "FETCH|A|\n"), ERROR_RESPONSE);
        // None of the rejected lines touched the index.
        assert!(index.is_empty());
        assert_eq!(dispatch(&index, "QUERY|A|\n"), FAIL_RESPONSE);
    }
}
