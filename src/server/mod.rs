//! Server module — the TCP front end of the index.
//!
//! Clients hold persistent connections and stream one command per line;
//! the engine answers each with one of three fixed tokens.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            depot server                 │
//! │  - accept thread (hard connection cap)  │
//! │  - one thread per admitted connection   │
//! │  - pooled line-reader buffers           │
//! └─────────────────────────────────────────┘
//!           ▲
//!           │ COMMAND|PACKAGE|DEPS\n
//!           ▼                 OK / FAIL / ERROR
//! ┌─────────────────────────────────────────┐
//! │            shared Index                 │
//! │  - readers/writer lock                  │
//! │  - dependency sets + refcounts          │
//! └─────────────────────────────────────────┘
//! ```

pub mod engine;
mod reader_pool;
pub mod wire;

pub use engine::Server;
pub use wire::{parse_message, Message, ParseError};
