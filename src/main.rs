mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, Method};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    db::{db::{DBClient, Store}, memory::MemoryStore},
    service::{
        application_service::ApplicationService,
        badge_service::BadgeService,
        job_lifecycle::JobLifecycleService,
        trust_service::TrustService,
        verification_service::VerificationService,
    },
    utils::clock::{Clock, SystemClock},
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn Store>,
    // Services
    pub job_lifecycle: Arc<JobLifecycleService>,
    pub badge_service: Arc<BadgeService>,
    pub trust_service: Arc<TrustService>,
    pub application_service: Arc<ApplicationService>,
    pub verification_service: Arc<VerificationService>,
}

impl AppState {
    pub fn new(db_client: Arc<dyn Store>, clock: Arc<dyn Clock>, config: Config) -> Self {
        let job_lifecycle = Arc::new(JobLifecycleService::new(db_client.clone(), clock.clone()));
        let badge_service = Arc::new(BadgeService::new(db_client.clone(), clock.clone()));
        let trust_service = Arc::new(TrustService::new(
            db_client.clone(),
            badge_service.clone(),
            clock.clone(),
        ));

        let application_service = Arc::new(ApplicationService::new(
            db_client.clone(),
            job_lifecycle.clone(),
            clock.clone(),
        ));

        let verification_service = Arc::new(VerificationService::new(
            db_client.clone(),
            job_lifecycle.clone(),
            trust_service.clone(),
            clock,
        ));

        Self {
            env: config,
            db_client,
            job_lifecycle,
            badge_service,
            trust_service,
            application_service,
            verification_service,
        }
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    if let Some(database_url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .min_connections(config.db_min_connections)
            .connect(database_url)
            .await
            .context("failed to connect to the database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        tracing::info!(
            max_connections = config.db_max_connections,
            min_connections = config.db_min_connections,
            "connection to the database is successful"
        );
        let store: Arc<dyn Store> = Arc::new(DBClient::new(pool));
        return Ok(store);
    }

    tracing::warn!("DATABASE_URL not set; running on the in-memory store, nothing is persisted");

    let store = match &config.seed_file {
        Some(path) => {
            let store = MemoryStore::from_seed_file(path)?;
            tracing::info!(seed_file = %path, "in-memory store seeded");
            store
        }
        None => MemoryStore::new(),
    };

    let store: Arc<dyn Store> = Arc::new(store);
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let db_client = connect_store(&config).await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT]);

    let app_state = Arc::new(AppState::new(db_client, Arc::new(SystemClock), config.clone()));

    let app = create_router(app_state).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;

    tracing::info!("server is running on http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
