//! dbadmin server
//!
//! HTTP back end of the administration console: browses and edits a MySQL
//! schema, runs read-only ad-hoc queries, exports/imports tables, and manages
//! keys on a Redis node or cluster.

mod error;
mod handlers;
mod storage;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use clap::Parser;
use dbadmin_core::{
    AppConfig, ConfigHandle, CorsConfig, KeyValueStore, LoggingConfig, SchemaGateway, UserStore,
    DEFAULT_CONFIG_PATH,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use storage::MySqlGateway;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub users: Arc<dyn UserStore>,
    pub schema: Arc<dyn SchemaGateway>,
    pub cache: Arc<dyn KeyValueStore>,
}

#[derive(Debug, Parser)]
#[command(name = "dbadmin-server", version, about = "Database and cache administration console")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "DBADMIN_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Do not reload the configuration file when it changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log crashes
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    let args = Args::parse();

    let config = match ConfigHandle::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "[FATAL] Failed to load configuration from {}: {}",
                args.config.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.snapshot().logging) {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting dbadmin server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config.path().display());

    if let Err(e) = run_server(config, !args.no_watch).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if logging.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run_server(config: ConfigHandle, watch: bool) -> Result<()> {
    let snapshot: Arc<AppConfig> = config.snapshot();

    if watch {
        config
            .watch()
            .context("Failed to watch configuration file")?;
    }

    info!("Connecting to {}...", snapshot.database.redacted_dsn());
    let gateway = Arc::new(
        MySqlGateway::connect(&snapshot.database)
            .await
            .context("Failed to initialize database")?,
    );

    info!("Connecting to cache ({} mode)...", snapshot.redis.mode);
    let cache = storage::cache::connect(&snapshot.redis)
        .await
        .context("Failed to initialize cache")?;
    info!("Cache connection established");

    let state = AppState {
        config: config.clone(),
        users: gateway.clone(),
        schema: gateway,
        cache,
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes())
        .layer(cors_layer(&snapshot.server.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], snapshot.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(handlers::users::list).post(handlers::users::create),
        )
        .route(
            "/users/:id",
            get(handlers::users::get)
                .put(handlers::users::update)
                .delete(handlers::users::delete),
        )
        .route(
            "/tables",
            get(handlers::tables::list).post(handlers::tables::create),
        )
        .route("/tables/query", post(handlers::tables::query))
        .route("/tables/import", post(handlers::tables::import))
        .route(
            "/tables/:name",
            get(handlers::tables::detail)
                .put(handlers::tables::alter)
                .delete(handlers::tables::drop),
        )
        .route("/tables/:name/data", get(handlers::tables::data))
        .route("/tables/:name/export", get(handlers::tables::export))
        .route(
            "/redis/keys",
            get(handlers::redis::list).post(handlers::redis::set),
        )
        .route(
            "/redis/keys/:key",
            get(handlers::redis::get).delete(handlers::redis::delete),
        )
}

/// CORS restricted to the configured allow-lists, credentials allowed.
/// Entries that do not parse are skipped.
/// Parse configured values, logging and skipping the ones that don't parse.
fn parse_entries<T: FromStr>(kind: &str, values: &[String], normalize: fn(&str) -> String) -> Vec<T> {
    values
        .iter()
        .filter_map(|raw| match normalize(raw).parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS {}: {:?}", kind, raw);
                None
            }
        })
        .collect()
}

fn cors_origins(cors: &CorsConfig) -> Vec<HeaderValue> {
    parse_entries("origin", &cors.allowed_origins, str::to_string)
}

fn cors_methods(cors: &CorsConfig) -> Vec<Method> {
    parse_entries("method", &cors.allowed_methods, str::to_uppercase)
}

fn cors_headers(cors: &CorsConfig) -> Vec<HeaderName> {
    parse_entries("header", &cors.allowed_headers, str::to_lowercase)
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(cors_origins(cors))
        .allow_methods(cors_methods(cors))
        .allow_headers(cors_headers(cors))
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_lists_skip_invalid_entries() {
        let cors = CorsConfig {
            allowed_origins: vec!["http://localhost:5173".to_string(), "\n".to_string()],
            allowed_methods: vec!["get".to_string(), "NOT A METHOD".to_string()],
            allowed_headers: vec!["Content-Type".to_string(), "bad header".to_string()],
        };

        assert_eq!(cors_origins(&cors), vec![HeaderValue::from_static("http://localhost:5173")]);
        assert_eq!(cors_methods(&cors), vec![Method::GET]);
        assert_eq!(cors_headers(&cors), vec![HeaderName::from_static("content-type")]);
    }

    #[test]
    fn test_cors_lists_empty_config() {
        let cors = CorsConfig {
            allowed_origins: vec![],
            allowed_methods: vec![],
            allowed_headers: vec![],
        };
        assert!(cors_origins(&cors).is_empty());
        assert!(cors_methods(&cors).is_empty());
        assert!(cors_headers(&cors).is_empty());
    }

    #[test]
    fn test_args_default_config_path() {
        let args = Args::parse_from(["dbadmin-server"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!args.no_watch);
    }
}
