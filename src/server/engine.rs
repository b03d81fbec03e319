//! The TCP serving engine.
//!
//! One accept thread admits connections under a hard cap; each admitted
//! connection gets its own thread running a strict request/response loop
//! against the shared index. All deadlines are socket deadlines: a read
//! that outlives `conn_read_timeout` is how a dead client is detected,
//! since the protocol has no heartbeat.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{DepotError, Result};
use crate::index::Index;

use super::reader_pool::{FrameError, LineReader, ReaderPool};
use super::wire::{parse_message, ERROR_RESPONSE, FAIL_RESPONSE, OK_RESPONSE};

/// Consecutive transient read errors tolerated on one connection before
/// it is treated as dead.
const MAX_TRANSIENT_READS: u32 = 3;

/// The connection-serving engine.
///
/// Owns nothing but configuration and a handle to the shared [`Index`];
/// the listener is bound in [`Server::listen_and_serve`] or handed in via
/// [`Server::serve`].
pub struct Server {
    index: Arc<Index>,
    config: ServerConfig,
}

impl Server {
    pub fn new(index: Arc<Index>, config: ServerConfig) -> Self {
        Self { index, config }
    }

    /// Bind the configured address and serve until a fatal listener error.
    pub fn listen_and_serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.addr).map_err(|source| DepotError::Bind {
            addr: self.config.addr.clone(),
            source,
        })?;
        self.serve(listener)
    }

    /// Serve connections from an already-bound listener.
    ///
    /// Returns only on a fatal accept error. Transient accept errors are
    /// retried after `accept_delay`.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            addr = %self.config.addr,
            max_conns = self.config.max_conns,
            max_message_size = self.config.max_message_size,
            "serving package index"
        );
        let gate = Arc::new(ConnGate::new(self.config.max_conns));
        let pool = Arc::new(ReaderPool::new(self.config.max_message_size));

        loop {
            let (conn, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, delay = ?self.config.accept_delay, "transient accept error, retrying");
                    thread::sleep(self.config.accept_delay);
                    continue;
                }
                Err(e) => return Err(DepotError::Accept(e)),
            };

            // The slot is taken on the accept thread, so the cap is exact.
            // Past the cap the socket is dropped with no bytes written;
            // the client sees a reset.
            let Some(slot) = gate.acquire() else {
                warn!(peer = %peer, max_conns = self.config.max_conns, "connection limit reached, dropping");
                drop(conn);
                continue;
            };

            let index = Arc::clone(&self.index);
            let config = self.config.clone();
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut reader = pool.get();
                serve_conn(conn, peer, &index, &config, &mut reader);
                pool.put(reader);
                drop(slot);
            });
        }
    }
}

/// Request/response loop for one admitted connection.
///
/// Responses are written before the next command is read, so commands on
/// one connection are strictly serialized. Errors local to one command
/// are answered with `ERROR` and the connection survives; only EOF, an
/// expired read deadline, or persistent transient failure end it.
fn serve_conn(
    mut conn: TcpStream,
    peer: SocketAddr,
    index: &Index,
    config: &ServerConfig,
    reader: &mut LineReader,
) {
    debug!(peer = %peer, "client connected");
    let mut transient_reads = 0u32;
    loop {
        if let Err(e) = conn.set_read_timeout(Some(config.conn_read_timeout)) {
            warn!(peer = %peer, error = %e, "cannot arm read deadline, closing");
            return;
        }

        let frame = match reader.read_frame(&mut conn) {
            Ok(frame) => {
                transient_reads = 0;
                frame
            }
            Err(FrameError::Eof) => {
                debug!(peer = %peer, "client closed connection");
                return;
            }
            Err(FrameError::Oversize) => {
                debug!(peer = %peer, max_message_size = config.max_message_size, "oversize command");
                respond(&mut conn, ERROR_RESPONSE, config.conn_write_timeout);
                continue;
            }
            Err(FrameError::Io(e)) if is_timeout(&e) => {
                debug!(peer = %peer, "read deadline expired, reaping dead client");
                return;
            }
            Err(FrameError::Io(e)) if is_transient(&e) => {
                transient_reads += 1;
                if transient_reads >= MAX_TRANSIENT_READS {
                    warn!(peer = %peer, error = %e, "persistent transient read errors, closing");
                    return;
                }
                warn!(error = %e, delay = ?config.conn_read_delay, "transient read error, retrying");
                thread::sleep(config.conn_read_delay);
                continue;
            }
            Err(FrameError::Io(e)) => {
                warn!(peer = %peer, error = %e, "read failed");
                respond(&mut conn, ERROR_RESPONSE, config.conn_write_timeout);
                continue;
            }
        };

        let message = match parse_message(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!(peer = %peer, error = %e, "malformed command");
                respond(&mut conn, ERROR_RESPONSE, config.conn_write_timeout);
                continue;
            }
        };

        let verdict = match message.command.as_slice() {
            b"INDEX" => index.index(&message.package, message.dependencies),
            b"REMOVE" => index.remove(&message.package),
            b"QUERY" => index.query(&message.package),
            _ => {
                debug!(peer = %peer, "unknown command");
                respond(&mut conn, ERROR_RESPONSE, config.conn_write_timeout);
                continue;
            }
        };
        let token = if verdict { OK_RESPONSE } else { FAIL_RESPONSE };
        respond(&mut conn, token, config.conn_write_timeout);
    }
}

/// Write one response token under a write deadline.
///
/// If the deadline cannot be armed the write is skipped rather than risk
/// blocking forever; a failed write is only logged. Either way the
/// connection stays up, and the next read is what notices a broken peer.
fn respond(conn: &mut TcpStream, token: &[u8], write_timeout: Duration) {
    if let Err(e) = conn.set_write_timeout(Some(write_timeout)) {
        warn!(error = %e, "cannot arm write deadline, skipping response");
        return;
    }
    if let Err(e) = conn.write_all(token) {
        warn!(error = %e, "response write failed");
    }
}

/// Hard cap on in-flight connections.
struct ConnGate {
    active: AtomicUsize,
    limit: usize,
}

impl ConnGate {
    fn new(limit: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            limit,
        }
    }

    /// Claim a slot, or `None` at the cap. The slot frees itself on drop.
    fn acquire(self: &Arc<Self>) -> Option<ConnSlot> {
        let mut active = self.active.load(Ordering::Relaxed);
        loop {
            if active >= self.limit {
                return None;
            }
            match self.active.compare_exchange_weak(
                active,
                active + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(ConnSlot {
                        gate: Arc::clone(self),
                    })
                }
                Err(observed) => active = observed,
            }
        }
    }
}

/// RAII slot in the connection gate.
struct ConnSlot {
    gate: Arc<ConnGate>,
}

impl Drop for ConnSlot {
    fn drop(&mut self) {
        self.gate.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Errors the network stack reports for conditions that clear on their
/// own: interrupted syscalls and resets/aborts surfaced by the accept
/// queue or an in-flight read.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

/// A fired socket deadline surfaces as `WouldBlock` on Unix and
/// `TimedOut` elsewhere.
fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
