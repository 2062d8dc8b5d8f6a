#[macro_use]
extern crate tracing;

mod config;
mod controller;
mod error;
mod models;
mod repository;
mod routes;
mod storage;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::{Endpoint, EndpointExt, Route, Server};
use poem_openapi::OpenApiService;

use crate::config::{Environment, RuntimeConfig};
use crate::controller::ImageController;
use crate::routes::ImageApi;
use crate::storage::PathResolver;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct ServerConfig {
    #[clap(long, default_value = "127.0.0.1", env = "HOST")]
    /// The binding host address of the server.
    host: String,

    #[clap(long, default_value = "8000", env = "PORT")]
    port: u16,

    #[clap(long, env = "EXTERNAL_HOST")]
    /// The external host the server can be reached at.
    ///
    /// Used in the OpenAPI document's server list.
    external_host: Option<String>,

    #[clap(long, env = "CONFIG_FILE")]
    /// The path to the YAML config file.
    config_file: PathBuf,

    #[clap(long, env = "DOCS_URL", default_value = "/docs")]
    /// The path the API docs are served at.
    docs_url: String,

    #[clap(long)]
    /// Don't serve the API docs or the OpenAPI document.
    disable_docs: bool,

    #[clap(long, default_value = "info", env = "LOG_LEVEL")]
    /// The log level filter, e.g. `debug`, `info`, `warn`.
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: ServerConfig = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    if let Err(e) = run_server(args).await {
        error!("Failed to start server due to error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn run_server(args: ServerConfig) -> Result<()> {
    let cfg = RuntimeConfig::from_file(&args.config_file).await?;
    info!(
        "Loaded config from {:?}, environment={:?}",
        &args.config_file, cfg.environment
    );

    let environment = cfg.environment;
    let controller = build_controller(cfg).await?;

    let bind = format!("{}:{}", args.host, args.port);
    let addr: SocketAddr = bind.parse()?;
    let external = args
        .external_host
        .clone()
        .unwrap_or_else(|| format!("http://{}", addr));

    let app = build_app(controller, environment, &args, &external);

    info!("Cloakvision is now serving on http://{}", addr);
    Server::new(TcpListener::bind(addr)).run(app).await?;

    Ok(())
}

async fn build_controller(cfg: RuntimeConfig) -> Result<Arc<ImageController>> {
    let repository = cfg.database.connect().await?;
    let blob_store = cfg.blob_storage.connect()?;

    if cfg.blob_storage.container_name.is_none() {
        warn!("No blob container configured, images with relative paths can't be served.");
    }

    let resolver = PathResolver::new(
        blob_store,
        cfg.blob_storage.sas_lifetime(),
        cfg.blob_storage.clock_skew(),
    );

    Ok(Arc::new(ImageController::new(
        repository,
        resolver,
        cfg.blob_storage.container_name,
        cfg.max_concurrency,
    )))
}

fn build_app(
    controller: Arc<ImageController>,
    environment: Environment,
    args: &ServerConfig,
    external: &str,
) -> impl Endpoint {
    let api_service = OpenApiService::new(
        ImageApi::new(controller, environment),
        "Cloakvision API",
        env!("CARGO_PKG_VERSION"),
    )
    .description("Image metadata with blob paths resolved into signed URLs.")
    .server(format!("{}/v1", external));

    let mut app = Route::new();

    if !args.disable_docs {
        let ui = api_service.redoc();
        let spec = api_service.spec();

        app = app.nest(&args.docs_url, ui).at(
            "/spec",
            poem::endpoint::make_sync(move |_| spec.clone()),
        );
    }

    app.nest("/v1", api_service).with(Tracing)
}
