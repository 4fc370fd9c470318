//! presto - AI-powered multi-industry demo dashboard backend.
//!
//! Relays text and voice chat to a hosted LLM service over WebSockets and
//! switches the dashboard's industry mode on the "Presto" trigger phrase.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use presto::config::{get_config_path, get_data_dir, load_config, save_config, Config};
use presto::context::AppContext;
use presto::modes::ModeStore;
use presto::providers::OpenAiCompatProvider;
use presto::server::Gateway;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "presto", about = "Presto-Change-O demo dashboard backend", version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway.
    Serve {
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port.
        #[arg(short, long)]
        port: Option<u16>,
        /// Path to a config file (default: ~/.presto/config.json).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Write a default configuration file.
    Onboard,
    /// Show the effective configuration.
    Status,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "presto=debug,info" } else { "presto=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            config,
            verbose,
        } => {
            init_tracing(verbose);

            let mut config = load_config(config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Onboard => {
            init_tracing(false);
            let path = get_config_path();
            if path.exists() {
                println!("Config already exists at {}", path.display());
            } else {
                save_config(&Config::default(), None);
                println!("Wrote default config to {}", path.display());
                println!("Set llm.apiKey before starting the gateway.");
            }
            Ok(())
        }
        Commands::Status => {
            init_tracing(false);
            let config = load_config(None);
            println!("presto {}", VERSION);
            println!("  config:   {}", get_config_path().display());
            println!("  server:   {}:{}", config.server.host, config.server.port);
            println!("  model:    {} @ {}", config.llm.model, config.llm.api_base);
            println!(
                "  realtime: {}",
                config.realtime.resolve_url(&config.llm.api_base)
            );
            println!(
                "  api key:  {}",
                if config.llm.api_key.is_empty() { "NOT SET" } else { "set" }
            );
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("presto backend starting (v{})", VERSION);

    let snapshot_path = get_data_dir().join("modes.json");
    let store = Arc::new(ModeStore::new(Some(snapshot_path)));
    let provider = Arc::new(OpenAiCompatProvider::new(&config.llm));
    let ctx = Arc::new(AppContext::new(config, store, provider));

    let gateway = Arc::new(Gateway::new(ctx));
    let shutdown_handle = gateway.clone();

    tokio::select! {
        result = gateway.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            shutdown_handle.stop();
            Ok(())
        }
    }
}
