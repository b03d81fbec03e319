//! Server configuration.

use std::time::Duration;

/// Tunable knobs for the serving engine.
///
/// Every field is exposed as a flag on `depot serve`; the defaults here are
/// the ones the flags advertise.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address to listen on.
    pub addr: String,

    /// Maximum number of concurrent connections. Connections past the cap
    /// are closed at accept time with no bytes written, which bounds the
    /// memory a client swarm can pin.
    pub max_conns: usize,

    /// Maximum size of one command in bytes, including the trailing
    /// newline. An oversize command is answered with `ERROR` and the
    /// stream resynchronizes at the next newline.
    pub max_message_size: usize,

    /// Close the connection if the client sends nothing for this long.
    ///
    /// The protocol has no heartbeat, so the read deadline is the only
    /// dead-client detection the server has.
    pub conn_read_timeout: Duration,

    /// Give up on a response write the client does not accept within this.
    pub conn_write_timeout: Duration,

    /// Sleep before retrying accept after a transient network error.
    pub accept_delay: Duration,

    /// Sleep before retrying a read after a transient network error.
    pub conn_read_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            max_conns: 300,
            max_message_size: 2048,
            conn_read_timeout: Duration::from_secs(30),
            conn_write_timeout: Duration::from_secs(5),
            accept_delay: Duration::from_secs(1),
            conn_read_delay: Duration::from_secs(1),
        }
    }
}
