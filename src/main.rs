//! Storefront server.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ axum + tower-http ──▶ routing::Router ──▶ middleware ──▶ action
//!                     (trace, timeout,       (first match,       (trim)        (closure or
//!                      body limit, id)        404 / 405)                        controller)
//!                                                                                  │
//!     Client Response                                                              ▼
//!     ◀────────────── http::Response ◀──────────────────────────── db::Model / QueryBuilder
//!                                                                      │
//!                                                                      ▼
//!                                                                   SQLite
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use storefront::config::{load_config, AppConfig};
use storefront::observability::{logging, metrics};
use storefront::{app, Cache, Database, HttpServer};

#[derive(Parser)]
#[command(name = "storefront")]
#[command(about = "Storefront catalog server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Print the route table
    Routes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("storefront v{} starting", env!("CARGO_PKG_VERSION"));

    let db = Database::connect(&config.database)?;
    app::migrate(&db)?;
    let cache = Cache::new(Duration::from_secs(config.cache.default_ttl_secs));
    let router = app::build(db, cache)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Routes => {
            for route in router.routes() {
                let methods: Vec<&str> = route.allowed_methods().iter().map(|m| m.as_str()).collect();
                println!(
                    "{:<12} {:<32} {:<20} {}",
                    methods.join("|"),
                    route.template(),
                    route.route_name().unwrap_or("-"),
                    route.action().describe()
                );
            }
            Ok(())
        }
        Commands::Serve => {
            tracing::info!(
                bind_address = %config.listener.bind_address,
                request_timeout_secs = config.timeouts.request_secs,
                routes = router.routes().len(),
                "Configuration loaded"
            );

            if config.observability.metrics_enabled {
                match config.observability.metrics_address.parse() {
                    Ok(addr) => {
                        metrics::init_metrics(addr);
                    }
                    Err(_) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            HttpServer::new(&config, router).run(listener).await?;

            tracing::info!("Shutdown complete");
            Ok(())
        }
    }
}
