//! kcmapper - export Keycloak realms into a Neo4j graph.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kc_graph_mapper::neo4j::Neo4jClient;
use kc_graph_mapper::pipeline::ExportPipeline;
use kc_graph_mapper::source::credentials::build_http_client;
use kc_graph_mapper::source::{KeycloakClient, OidcTokenProvider};
use kc_graph_mapper::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kcmapper")]
#[command(about = "Export Keycloak realm configuration into a Neo4j graph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export realms into the graph
    Export {
        /// Path to the YAML config file (default: ./config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Delete previously exported data before loading
        #[arg(long)]
        clean: bool,

        /// Realm to export (repeatable; default: all realms)
        #[arg(short, long = "realm")]
        realms: Vec<String>,

        /// Number of realms exported concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Records per write transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Global deadline for the whole run, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Log filter (e.g. "debug", "info,kc_graph_mapper=trace"); overrides RUST_LOG
        #[arg(long)]
        log_level: Option<String>,

        /// Also write logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}

fn init_tracing(log_level: Option<&str>, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{}'", level))?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,kc_graph_mapper=debug".into()),
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            config,
            clean,
            realms,
            workers,
            batch_size,
            timeout_secs,
            log_level,
            log_file,
        } => {
            init_tracing(log_level.as_deref(), log_file.as_ref())?;

            let mut config = Config::from_yaml_and_env(config.as_deref())?;
            if clean {
                config.clean = true;
            }
            if !realms.is_empty() {
                config.realms = realms;
            }
            if let Some(workers) = workers {
                config.workers = workers.max(1);
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size.max(1);
            }
            if let Some(secs) = timeout_secs {
                config.timeout = Some(Duration::from_secs(secs));
            }
            run_export(config).await
        }
    }
}

async fn run_export(config: Config) -> Result<ExitCode> {
    let mode = config.auth_mode()?;
    tracing::info!(
        url = %config.keycloak_url,
        auth_realm = %config.auth_realm,
        client_id = %config.client_id,
        auth_mode = mode.name(),
        "Connecting to Keycloak"
    );

    let http = build_http_client(&mode, config.request_timeout)?;
    let credentials = Arc::new(OidcTokenProvider::new(
        &config.keycloak_url,
        &config.auth_realm,
        &config.client_id,
        mode,
        http.clone(),
    )
    .with_retry(config.retry.clone()));
    let source = Arc::new(
        KeycloakClient::new(&config.keycloak_url, credentials, http)
            .with_retry(config.retry.clone())
            .with_page_size(config.page_size),
    );

    let store = Arc::new(
        Neo4jClient::new(
            &config.neo4j_uri,
            &config.neo4j_user,
            &config.neo4j_password,
            &config.neo4j_database,
            config.neo4j_max_connections,
        )
        .await?,
    );
    tracing::info!(uri = %config.neo4j_uri, database = %config.neo4j_database, "Connected to Neo4j");

    let pipeline = ExportPipeline::new(source, store, config.export_options(), config.batch_size);
    let summary = pipeline.run().await;

    println!("{}", summary);

    Ok(if summary.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
