//! docrest server binary.
//!
//! # Usage
//!
//! ```bash
//! # With a configuration file
//! docrest --config docrest.yaml
//!
//! # With environment variables only
//! DOCREST_STORAGE__BACKEND=memory docrest
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use clap::Parser;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docrest_api::http::{create_router, AppState};
use docrest_api::{Authenticator, OidcAuthenticator};
use docrest_server::config::LoggingSettings;
use docrest_server::{DocumentService, ServerConfig};
use docrest_storage::{MemoryRepository, PostgresConfig, PostgresRepository, Repository};

/// docrest - a document-oriented REST backend with rule-based authorization.
#[derive(Parser, Debug)]
#[command(name = "docrest")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML, TOML or JSON).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting docrest server");

    let repository: Arc<dyn Repository> = match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            Arc::new(MemoryRepository::new())
        }
        "postgres" => {
            let database_url = config.storage.database_url.clone().ok_or_else(|| {
                anyhow::anyhow!("storage.database_url is required for the postgres backend")
            })?;

            info!("Connecting to PostgreSQL database");
            let pg_config = PostgresConfig {
                database_url,
                max_connections: config.storage.pool_size,
                min_connections: 1,
                connect_timeout_secs: config.storage.connection_timeout_secs,
            };
            let repository = PostgresRepository::from_config(&pg_config).await?;
            info!("PostgreSQL connection established");
            Arc::new(repository)
        }
        other => anyhow::bail!("Unknown storage backend: {other}"),
    };

    repository.init().await?;

    let authenticator: Option<Arc<dyn Authenticator>> = match config.auth.issuer() {
        Some(issuer) => {
            info!(%issuer, "Discovering OpenID Connect provider");
            Some(Arc::new(OidcAuthenticator::discover(issuer).await?))
        }
        None => {
            info!("Authentication disabled; all callers are anonymous");
            None
        }
    };

    info!(rules = config.rules.len(), "Loaded access rules");
    let service = Arc::new(DocumentService::new(repository, config.rules.clone()));

    let mut state = AppState::new(service);
    if let Some(authenticator) = authenticator {
        state = state.with_authenticator(authenticator);
    }

    let router = create_router(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = Args::try_parse_from(["docrest"]).unwrap();
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["docrest", "--config", "docrest.yaml"]).unwrap();
        assert_eq!(args.config, Some("docrest.yaml".to_string()));

        let args = Args::try_parse_from(["docrest", "-c", "test.yaml"]).unwrap();
        assert_eq!(args.config, Some("test.yaml".to_string()));
    }
}
