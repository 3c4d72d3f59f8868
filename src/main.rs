use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use birdcall::config::BirdcallConfig;
use birdcall::resource::Verb;
use birdcall::scheduler::{ApiResponse, RequestOptions, RequestParams, RATE_LIMIT_STATUS_PATH};
use birdcall::Client;

/// Rate-limited command line client for the Twitter REST API.
#[derive(Debug, Parser)]
#[command(name = "birdcall", version)]
struct Cli {
    /// Configuration file (YAML); BIRDCALL_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// GET a resource and print the JSON response
    Get {
        /// Relative URL, e.g. search/tweets
        url: String,
        /// Query parameter as key=value, may be repeated
        #[arg(short, long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,
    },
    /// POST a body and print the JSON response
    Post {
        url: String,
        /// Raw request body
        #[arg(short, long)]
        data: String,
        /// Content type of the body, form encoding by default
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Fetch the current rate limits and print the table
    Limits,
    /// Open a streaming endpoint and copy its body to stdout
    Stream {
        url: String,
        /// Send as POST with this form body
        #[arg(short, long)]
        data: Option<String>,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {}", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("birdcall=info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting birdcall");

    let mut config =
        BirdcallConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    // Only app-only requests can be signed from the command line
    config.application_only = true;
    config.scheduler.refresh_jobs = false;

    let client = Client::builder(config)
        .build()
        .await
        .context("Failed to start client")?;

    let result = run(&client, cli.command).await;
    client.shutdown().await;
    result
}

async fn run(client: &Client, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Get { url, params } => {
            let params = params
                .into_iter()
                .fold(RequestParams::new(), |p, (k, v)| p.query(k, v));
            let response = send(client, Verb::Get, &url, params).await?;
            print_json(&response.data)?;
        }
        Command::Post {
            url,
            data,
            content_type,
        } => {
            let mut params = RequestParams::new().content(data);
            if let Some(content_type) = content_type {
                params = params.content_type(content_type);
            }
            let response = send(client, Verb::Post, &url, params).await?;
            print_json(&response.data)?;
        }
        Command::Limits => {
            let response =
                send(client, Verb::Get, RATE_LIMIT_STATUS_PATH, RequestParams::new()).await?;
            let stored = client.rest().table().bulk_observe(&response.data);
            info!(stored = stored, "Rate limits fetched");

            let limits: std::collections::BTreeMap<_, _> = client
                .rest()
                .rate_limits()
                .into_iter()
                .map(|(id, entry)| (id.to_string(), entry))
                .collect();
            print_json(&serde_json::to_value(limits)?)?;
        }
        Command::Stream { url, data } => {
            let (verb, params) = match data {
                Some(data) => (Verb::Post, RequestParams::new().content(data)),
                None => (Verb::Get, RequestParams::new()),
            };
            let mut body = client
                .stream()
                .raw(verb, &url, params, RequestOptions::default())?;
            let mut stdout = tokio::io::stdout();

            let copy = async {
                while let Some(chunk) = body.next().await {
                    stdout.write_all(&chunk?).await?;
                    stdout.flush().await?;
                }
                anyhow::Ok(())
            };

            tokio::select! {
                result = copy => result?,
                _ = shutdown_signal() => {}
            }
        }
    }
    Ok(())
}

/// Queue a request and make sure it goes out without waiting for a drain tick.
async fn send(
    client: &Client,
    verb: Verb,
    url: &str,
    params: RequestParams,
) -> anyhow::Result<ApiResponse> {
    let scheduler = client.rest();
    let handle = scheduler.request(verb, url, params, RequestOptions::default())?;
    scheduler.drain_now(None);
    Ok(handle.await?)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, closing stream");
        }
        _ = terminate => {
            info!("Received SIGTERM, closing stream");
        }
    }
}
