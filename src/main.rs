mod completion;
mod config;
mod io;
mod logging;
mod lsp;
mod server;
mod watchdog;
mod workspace;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use completion::{BackendContext, BigramBackend};
use io::StreamTransport;
use logging::{LogConfig, init_logging};
use server::{LanguageServer, ServerOptions};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Pause after a failed accept so descriptor exhaustion does not spin
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// CLI arguments for the natural language completion server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serve over TCP instead of stdin/stdout
    #[arg(long)]
    tcp: bool,

    /// Address to bind in TCP mode
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind in TCP mode
    #[arg(long, default_value_t = 2087)]
    port: u16,

    /// Exit when the editor process that started the server goes away
    #[arg(long)]
    check_parent_process: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log level (overrides RUST_LOG env var and -v)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides NATLS_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

/// Accept TCP clients one at a time, each with a fresh server
///
/// Only a failure to bind ends the listener; accept errors are logged and
/// the loop keeps serving.
async fn serve_tcp(
    host: &str,
    port: u16,
    options: ServerOptions,
    backend: Arc<BackendContext>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!("Serving on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        info!("Client connected from {}", peer);

        let (reader, writer) = stream.into_split();
        let server = LanguageServer::new(options.clone(), backend.clone());
        let code = server.serve(StreamTransport::new(reader, writer)).await;

        info!("Client {} disconnected (status {})", peer, code);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging with configuration from env vars and CLI args
    let log_config = LogConfig::from_env().with_overrides(
        args.log_level.clone(),
        args.verbose,
        args.log_file.clone(),
        args.log_json,
    );

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let backend = match BigramBackend::new() {
        Ok(backend) => Arc::new(BackendContext::new(Arc::new(backend))),
        Err(e) => {
            error!("Failed to create completion backend: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using completion backend '{}'", backend.backend_name());

    let options = ServerOptions {
        check_parent_process: args.check_parent_process,
    };

    let code = if args.tcp {
        match serve_tcp(&args.host, args.port, options, backend).await {
            Ok(()) => 0,
            Err(e) => {
                error!("TCP server failed: {}", e);
                1
            }
        }
    } else {
        info!("Serving on stdio");
        LanguageServer::new(options, backend)
            .serve(StreamTransport::stdio())
            .await
    };

    std::process::exit(code);
}
