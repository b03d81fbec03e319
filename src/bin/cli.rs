//! Depot CLI - package dependency index server.
//!
//! Usage:
//!   depot serve                  # Serve with the default configuration
//!   depot serve --addr :9090     # Override any knob via flags

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use depot::{Index, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "In-memory package dependency index served over TCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the index server (foreground)
    Serve {
        /// TCP address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Maximum number of concurrent connections
        #[arg(long, default_value_t = 300)]
        max_conns: usize,

        /// Maximum command size in bytes, including the trailing newline
        #[arg(long, default_value_t = 2048)]
        max_message_size: usize,

        /// Close a connection after this many seconds without a command
        #[arg(long, default_value_t = 30)]
        read_timeout_secs: u64,

        /// Give up on a response write after this many seconds
        #[arg(long, default_value_t = 5)]
        write_timeout_secs: u64,

        /// Milliseconds to wait before retrying accept after a transient error
        #[arg(long, default_value_t = 1000)]
        accept_delay_ms: u64,

        /// Milliseconds to wait before retrying a read after a transient error
        #[arg(long, default_value_t = 1000)]
        read_delay_ms: u64,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            addr,
            max_conns,
            max_message_size,
            read_timeout_secs,
            write_timeout_secs,
            accept_delay_ms,
            read_delay_ms,
            verbose,
        } => {
            setup_tracing(verbose);

            let config = ServerConfig {
                addr,
                max_conns,
                max_message_size,
                conn_read_timeout: Duration::from_secs(read_timeout_secs),
                conn_write_timeout: Duration::from_secs(write_timeout_secs),
                accept_delay: Duration::from_millis(accept_delay_ms),
                conn_read_delay: Duration::from_millis(read_delay_ms),
            };

            info!(version = env!("CARGO_PKG_VERSION"), "starting depot");
            let index = Arc::new(Index::new());
            let server = Server::new(index, config);
            server.listen_and_serve()?;
            Ok(())
        }
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("depot=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
