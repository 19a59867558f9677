use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod directory;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod store;
mod utils;
mod workflow;

use config::{Config, StoreBackend};
use db::init_db;

use crate::auth::jwt::{IdentityProvider, JwtIdentityProvider};
use crate::directory::{Directory, MemoryDirectory, MySqlDirectory};
use crate::docs::ApiDoc;
use crate::store::{LeaveStore, MemoryLeaveStore, MySqlLeaveStore};
use crate::utils::clock::SystemClock;
use crate::workflow::{LeaveQueries, LeaveWorkflow};
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Leave approval service"
}

async fn collaborators(config: &Config) -> anyhow::Result<(Arc<dyn LeaveStore>, Arc<dyn Directory>)> {
    match config.store_backend {
        StoreBackend::Mysql => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when STORE_BACKEND=mysql")?;
            let pool = init_db(url).await.context("Failed to connect to database")?;
            Ok((
                Arc::new(MySqlLeaveStore::new(pool.clone())),
                Arc::new(MySqlDirectory::new(pool)),
            ))
        }
        StoreBackend::Memory => {
            let directory = match &config.directory_seed {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read directory seed {}", path))?;
                    MemoryDirectory::from_json(&raw)?
                }
                None => {
                    warn!("STORE_BACKEND=memory without DIRECTORY_SEED; every submission will fail");
                    MemoryDirectory::new()
                }
            };
            Ok((Arc::new(MemoryLeaveStore::new()), Arc::new(directory)))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(backend = ?config.store_backend, "Server starting...");

    let (store, directory) = collaborators(&config).await?;

    let identity: Arc<dyn IdentityProvider> =
        Arc::new(JwtIdentityProvider::new(config.jwt_secret.clone()));
    let identity = Data::from(identity);
    let workflow = Data::new(LeaveWorkflow::new(
        store.clone(),
        directory,
        Arc::new(SystemClock),
        &config.workflow,
    ));
    let queries = Data::new(LeaveQueries::new(store, config.workflow.max_page_size));

    let protected_limiter = routes::build_limiter(config.rate_protected_per_min)?;

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(identity.clone())
            .app_data(workflow.clone())
            .app_data(queries.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config, protected_limiter.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
