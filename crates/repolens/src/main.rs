use clap::{Parser, Subcommand};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use lens_ai::{GeminiBackend, GeminiConfig};
use lens_core::bundle::SourceBundler;
use lens_core::prompt::PromptLibrary;
use lens_core::store::JsonTaskStore;
use lens_core::AnalysisPipeline;
use lens_events::EventBus;
use lens_serve::socket::SocketRegistry;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repolens")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve,
    /// Print the OpenAPI document and exit.
    Openapi,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve => serve().await,
        Command::Openapi => {
            println!("{}", lens_serve::openapi::generate_spec());
        }
    }
}

async fn serve() {
    let port = std::env::var("REPOLENS_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3002);
    let data_dir = std::env::var("REPOLENS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".repolens"));
    let prompts_dir = std::env::var("REPOLENS_PROMPTS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("prompts"));

    let config = match GeminiConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let event_bus = EventBus::new(1024);
    let bundler = SourceBundler::new(data_dir.join("sourcecodes"));
    let pipeline = Arc::new(AnalysisPipeline::new(
        bundler.clone(),
        PromptLibrary::new(prompts_dir),
        Arc::new(JsonTaskStore::new(data_dir.join("tasks"))),
        Arc::new(GeminiBackend::new(config)),
        event_bus.clone(),
    ));

    let state = lens_serve::AppState {
        bundler,
        pipeline,
        event_bus,
        sockets: SocketRegistry::new(),
    };

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    tracing::info!(port, data_dir = %data_dir.display(), "starting repolens");
    if let Err(err) = lens_serve::serve(state, addr).await {
        eprintln!("serve error: {err}");
    }
}
