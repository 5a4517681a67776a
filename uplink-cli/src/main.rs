//! Diagnostic client: send requests through the gateway and inspect breaker state.

#![allow(clippy::print_stdout, reason = "CLI tool outputs to stdout")]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use uplink_core::{
    init_metrics, init_tracing, load_config, Gateway, HttpMethod, RequestDescriptor,
    StaticTokenProvider,
};

/// Parses a `key=value` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <config_dir>/uplink/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sends a request through the gateway and prints the envelope
    Request {
        /// Path relative to the configured base URL (e.g., /users/42)
        path: String,
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: HttpMethod,
        /// Query parameter, repeatable
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Request header, repeatable
        #[arg(short = 'H', long = "header", value_parser = parse_key_val)]
        headers: Vec<(String, String)>,
        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
        /// Serve from and store into the response cache
        #[arg(long)]
        cache: bool,
        /// Apply the retry policy
        #[arg(long)]
        retry: bool,
        /// Per-attempt timeout override
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Breaker key override
        #[arg(long)]
        service: Option<String>,
        /// Send the same request this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Bearer token
        #[arg(long, env = "UPLINK_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Prints the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { Level::DEBUG } else { Level::INFO });
    init_metrics();

    let config = load_config(cli.config.as_deref()).context("loading configuration failed")?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        },
        Commands::Request {
            path,
            method,
            params,
            headers,
            body,
            cache,
            retry,
            timeout_ms,
            service,
            repeat,
            token,
        } => {
            let credentials = Arc::new(StaticTokenProvider::new(token));
            let gateway = Gateway::new(config, credentials).context("building gateway failed")?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling in-flight request");
                    on_interrupt.cancel();
                }
            });

            let mut descriptor = RequestDescriptor::new(method, path).cancel_token(cancel);
            for (key, value) in params {
                descriptor = descriptor.param(key, value);
            }
            for (name, value) in headers {
                descriptor = descriptor.header(name, value);
            }
            if let Some(body) = body {
                let value: serde_json::Value =
                    serde_json::from_str(&body).context("--body is not valid JSON")?;
                descriptor = descriptor.body(value);
            }
            if let Some(timeout_ms) = timeout_ms {
                descriptor = descriptor.timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(service) = service {
                descriptor = descriptor.service(service);
            }
            descriptor.cache = cache;
            descriptor.retry = retry;

            let mut failures = 0_u32;
            for round in 1..=repeat {
                match gateway.request::<serde_json::Value>(descriptor.clone()).await {
                    Ok(envelope) => {
                        println!("{}", serde_json::to_string_pretty(&envelope)?);
                    },
                    Err(error) => {
                        failures += 1;
                        info!(round, "Request failed: {error}");
                        println!("{}", serde_json::to_string_pretty(&error)?);
                    },
                }
            }

            println!("{}", serde_json::to_string_pretty(&gateway.all_breaker_stats())?);

            if failures > 0 {
                anyhow::bail!("{failures} of {repeat} requests failed");
            }
        },
    }

    Ok(())
}
