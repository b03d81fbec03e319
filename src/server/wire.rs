//! Wire format — one framed command and the three response tokens.
//!
//! A command is a single newline-terminated line of exactly three
//! pipe-separated fields:
//!
//! ```text
//! COMMAND|PACKAGE|DEP1,DEP2,...,DEPn\n
//! ```
//!
//! The characters `|`, `,` and `\n` are reserved by the format and the
//! protocol defines no escaping, so names cannot contain them. There is no
//! encoding difference between "no dependencies" and "one empty-named
//! dependency", so the empty name cannot appear on the wire either.
//!
//! The parser runs in one forward pass over the raw bytes and copies only
//! the individual fields out (they outlive the read buffer); the
//! dependency set is its sole allocation, sized up front from the comma
//! count. Splitting on `,`/`|` by hand instead of through a generic split
//! utility keeps this on the hot path without intermediate vectors.
//!
//! The command field is not validated here: any pipe-free byte string
//! parses, and dispatch decides what is a known command. It may even
//! contain commas — only field 2 reserves the comma.

use std::collections::HashSet;

use thiserror::Error;

use crate::index::Name;

/// Reply for a command the index accepted.
pub const OK_RESPONSE: &[u8] = b"OK\n";
/// Reply for a command the index refused.
pub const FAIL_RESPONSE: &[u8] = b"FAIL\n";
/// Reply for a malformed, unknown, or oversize command.
pub const ERROR_RESPONSE: &[u8] = b"ERROR\n";

/// Why a frame failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message must end in newline")]
    MissingNewline,
    #[error("too few pipes")]
    TooFewPipes,
    #[error("package names may not include the reserved character ','")]
    CommaInName,
    #[error("package names may not include the reserved character '|'")]
    PipeInName,
    #[error("package name may not be empty")]
    EmptyName,
}

/// One parsed command.
#[derive(Debug, PartialEq, Eq)]
pub struct Message {
    pub command: Name,
    pub package: Name,
    /// Distinct dependency names; duplicates on the wire collapse here.
    pub dependencies: HashSet<Name>,
}

/// Parse one frame, terminator included.
pub fn parse_message(b: &[u8]) -> Result<Message, ParseError> {
    if b.last() != Some(&b'\n') {
        return Err(ParseError::MissingNewline);
    }

    // Field 1: scan to the first pipe.
    let mut i = 0;
    loop {
        match b[i] {
            b'\n' => return Err(ParseError::TooFewPipes),
            b'|' => break,
            _ => i += 1,
        }
    }
    let first_pipe = i;
    i += 1;

    // Field 2: scan to the second pipe; commas are reserved here.
    loop {
        match b[i] {
            b'\n' => return Err(ParseError::TooFewPipes),
            b',' => return Err(ParseError::CommaInName),
            b'|' => break,
            _ => i += 1,
        }
    }
    let second_pipe = i;
    if first_pipe + 1 == second_pipe {
        return Err(ParseError::EmptyName);
    }
    i += 1;

    let mut message = Message {
        command: b[..first_pipe].to_vec(),
        package: b[first_pipe + 1..second_pipe].to_vec(),
        dependencies: HashSet::new(),
    };

    if b[i] == b'\n' {
        return Ok(message);
    }

    // Field 3, first leg: a stray pipe rejects the whole frame, and the
    // comma count sizes the set so it allocates exactly once.
    let mut commas = 0;
    loop {
        match b[i] {
            b'|' => return Err(ParseError::PipeInName),
            b'\n' => break,
            b',' => {
                commas += 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    let newline = i;
    message.dependencies = HashSet::with_capacity(commas + 1);

    // Field 3, second leg: split on commas. An empty segment means an
    // empty dependency name, which the format cannot express.
    let mut dep_start = second_pipe + 1;
    for j in second_pipe + 1..=newline {
        if b[j] == b',' || b[j] == b'\n' {
            if dep_start == j {
                return Err(ParseError::EmptyName);
            }
            message.dependencies.insert(b[dep_start..j].to_vec());
            dep_start = j + 1;
        }
    }
    Ok(message)
}
