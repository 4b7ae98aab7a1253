//! HTTP/2 echo server.
//!
//! Requests with a body get the body back; bodyless requests get a JSON
//! summary of what was received. First Ctrl-C sends GOAWAY to every peer,
//! the second (or the grace period running out) stops the server.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use sbi_h2_server::{
    start, HandlerError, Request, Response, Server, ServerConfig, StatusCode, StreamHandle,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sbi-h2-echo")]
#[command(about = "HTTP/2 echo server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(short, long)]
    listen: Option<String>,

    /// Seconds to wait after GOAWAY before closing sessions
    #[arg(long, default_value_t = 5)]
    grace_secs: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sbi_h2_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(config, Duration::from_secs(cli.grace_secs)))
}

async fn run(config: ServerConfig, grace: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let handle = start(Server::new(config), echo).await?;
    info!(addr = %handle.local_addr(), "Echo server started, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, waiting up to {:?} for in-flight requests", grace);
    handle.graceful_shutdown();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Second interrupt, stopping now"),
        _ = tokio::time::sleep(grace) => {}
    }
    handle.stop();
    Ok(())
}

fn echo(server: &mut Server, request: Request, stream: StreamHandle) -> Result<(), HandlerError> {
    let response = if request.body().is_empty() {
        let summary = serde_json::json!({
            "method": request.method(),
            "path": request.path(),
            "params": request.params.iter().map(|(k, v)| [k, v]).collect::<Vec<_>>(),
            "headers": request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                .collect::<serde_json::Map<_, _>>(),
        });
        Response::new(StatusCode::Ok)
            .with_header("content-type", "application/json")
            .with_body(summary.to_string())
    } else {
        let content_type = request
            .headers
            .get("content-type")
            .unwrap_or("application/octet-stream")
            .to_string();
        Response::new(StatusCode::Ok)
            .with_header("content-type", content_type)
            .with_body(request.into_body())
    };

    server
        .send_and_free(stream, response)
        .map_err(|e| HandlerError::new(e.to_string()))
}
