// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # VEY Provider Node
//!
//! Entry point for the `vey-node` binary.
//!
//! - `init`    - create the data directory and generate provider secrets
//! - `run`     - open the database and serve the API and metrics
//! - `status`  - query a running node's `/status`
//! - `version` - print build version information

mod api;
mod auth;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal;

use vey_protocol::storage::VeyDB;
use vey_protocol::zkp::ShippingProver;
use vey_protocol::AddressProvider;

use cli::{Commands, VeyNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VeyNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(NodeConfig::from_args(&args)?).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

async fn run_node(config: NodeConfig) -> Result<()> {
    logging::init_logging(&config.log_level, config.log_format);
    tracing::info!(
        api = %config.api_addr,
        metrics = %config.metrics_addr,
        data_dir = %config.data_dir.display(),
        "starting vey-node"
    );

    // --- Secrets and policies ---
    let secrets = config::load_secrets(&config.data_dir)?;
    let policies = config::load_policies(&config.policies_path)?;
    if policies.is_empty() {
        tracing::warn!(
            path = %config.policies_path.display(),
            "no access-control policies loaded; every resolution will be denied"
        );
    } else {
        tracing::info!(count = policies.len(), "access-control policies loaded");
    }
    let requesters = auth::RequesterDirectory::new(config::load_requesters(&config.requesters_path)?);
    if requesters.is_empty() {
        tracing::warn!(
            path = %config.requesters_path.display(),
            "no requesters configured; resolve, track and revoke will be refused"
        );
    } else {
        tracing::info!(count = requesters.len(), "requesters loaded");
    }

    // --- Persistent storage ---
    let db_path = config.db_path();
    let db = VeyDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Proving key ---
    // First start runs the Groth16 setup; keep it off the async workers.
    let setup_db = db.clone();
    let prover = tokio::task::spawn_blocking(move || ShippingProver::load_or_setup(&setup_db))
        .await
        .context("proving key task panicked")?
        .context("failed to load or generate the proving key")?;
    tracing::info!(
        circuit = %prover.circuit().id,
        params_hash = %prover.circuit().params_hash,
        "shipping circuit ready"
    );

    let provider = AddressProvider::new(db.clone(), secrets, Arc::new(prover));
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics
        .revocation_list_version
        .set(provider.revocations().version()? as i64);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            vey_protocol::config::PROTOCOL_VERSION,
        ),
        provider: Arc::new(provider),
        policies: Arc::new(policies),
        requesters: Arc::new(requesters),
        metrics: Arc::clone(&node_metrics),
        started_at: chrono::Utc::now(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", config.api_addr))?;
    tracing::info!("API server listening on {}", config.api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", config.metrics_addr))?;
    tracing::info!("metrics server listening on {}", config.metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router).with_graceful_shutdown(shutdown_signal()) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
    }

    db.flush().context("failed to flush database on shutdown")?;
    tracing::info!("vey-node stopped");
    Ok(())
}

fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("vey_node=info", LogFormat::Pretty);
    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let secrets = config::write_secrets(data_dir, args.force)?;
    let issuer = vey_protocol::credential::CredentialIssuer::new(secrets.issuer.clone());

    println!("Node initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Issuer DID     : {}", issuer.did());
    println!("  Registry key   : {}", secrets.registry.public_key().to_hex());
    println!("The proving key is generated on first `vey-node run`.");
    Ok(())
}

/// GET `<api_url>/status` and print the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let (host, port) = split_http_url(&args.api_url)?;
    let addr = format!("{host}:{port}");
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;

    let request = format!("GET /status HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);
    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow!("malformed HTTP response from {addr}"))?;
    let status_line = head.lines().next().unwrap_or_default();
    if !status_line.contains(" 200 ") {
        return Err(anyhow!("{addr} answered `{status_line}`"));
    }
    println!("{body}");
    Ok(())
}

/// `(host, port)` of a plain `http://host[:port]` base URL.
fn split_http_url(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow!("only http:// URLs are supported: {url}"))?;
    let authority = rest.split('/').next().unwrap_or(rest);
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("bad port in {url}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), 80)),
    }
}

fn print_version() {
    println!("vey-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {}", vey_protocol::config::PROTOCOL_VERSION);
    println!("circuit  {}", vey_protocol::config::SHIPPING_CIRCUIT_ID);
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM. Only Ctrl+C off Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
