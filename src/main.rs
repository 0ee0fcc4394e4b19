use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mnemos::config::{Config, Transport};
use mnemos::context::CoreContext;
use mnemos::transport;

#[derive(Parser)]
#[command(name = "mnemosd")]
#[command(about = "Orchestration core for the consciousness subsystem", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start serving tool calls (default). Transport is resolved from
    /// `TRANSPORT`, falling back to stdin-is-a-pipe auto-detection.
    Serve,
    /// Load and validate configuration, then exit without serving.
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    init_tracing(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::CheckConfig => {
            tracing::info!(?config.transport, %config.sse_port, "configuration is valid");
            ExitCode::SUCCESS
        }
        Commands::Serve => ExitCode::from(run(config).await as u8),
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(config.log_level.as_filter_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Builds the composition root and dispatches to the resolved transport,
/// returning the process exit code (spec §6: 0 clean shutdown, 1 fatal
/// init failure).
async fn run(config: Config) -> i32 {
    let context = match CoreContext::build(&config) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize core context");
            return 1;
        }
    };

    match config.transport.resolve() {
        Transport::Stdio => transport::serve_stdio(context.dispatcher).await,
        Transport::Sse => {
            let addr = SocketAddr::from(([0, 0, 0, 0], config.sse_port));
            transport::serve_sse(context.dispatcher, addr).await
        }
    }
}
