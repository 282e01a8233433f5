mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::{net::SocketAddr, sync::Arc};

use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use db::{DBClient, MemoryStore, ReferralStore};
use dotenv::dotenv;
use routes::create_router;
use service::{
    admin_service::AdminService,
    job_system::{DemoJobSystem, JobSystem, ServiceTitanClient},
    lookup_service::LookupService,
    referral_service::ReferralService,
    reward_service::{DemoRewardIssuer, RewardIssuer, TangoClient},
    sms_service::{ChiirpClient, DemoNotifier, Notifier, SmsService},
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn ReferralStore>,
    pub referral_service: ReferralService,
    pub lookup_service: LookupService,
    pub admin_service: AdminService,
}

impl AppState {
    /// Demo mode swaps every outbound provider for its canned stand-in.
    pub fn new(env: Config, db_client: Arc<dyn ReferralStore>) -> Self {
        let (job_system, notifier, issuer): (Arc<dyn JobSystem>, Arc<dyn Notifier>, Arc<dyn RewardIssuer>) =
            if env.demo_mode {
                (Arc::new(DemoJobSystem), Arc::new(DemoNotifier), Arc::new(DemoRewardIssuer))
            } else {
                (
                    Arc::new(ServiceTitanClient::new(env.service_titan.clone())),
                    Arc::new(ChiirpClient::new(env.chiirp.clone())),
                    Arc::new(TangoClient::new(env.tango.clone())),
                )
            };

        Self::with_clients(env, db_client, job_system, notifier, issuer)
    }

    pub fn with_clients(
        env: Config,
        db_client: Arc<dyn ReferralStore>,
        job_system: Arc<dyn JobSystem>,
        notifier: Arc<dyn Notifier>,
        issuer: Arc<dyn RewardIssuer>,
    ) -> Self {
        let sms = SmsService::new(notifier, db_client.clone(), &env);
        let referral_service = ReferralService::new(db_client.clone(), issuer, sms, env.clone());
        let lookup_service = LookupService::new(db_client.clone(), job_system, referral_service.clone());
        let admin_service = AdminService::new(db_client.clone());

        Self {
            env,
            db_client,
            referral_service,
            lookup_service,
            admin_service,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::DEBUG))
        .init();

    let db_client: Arc<dyn ReferralStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = match PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    tracing::info!("Connection to the database is successful");
                    pool
                }
                Err(err) => {
                    tracing::error!("Failed to connect to the database: {:?}", err);
                    std::process::exit(1);
                }
            };

            if let Err(err) = sqlx::migrate!("./migrations").run(&pool).await {
                tracing::error!("Failed to run migrations: {:?}", err);
                std::process::exit(1);
            }

            Arc::new(DBClient::new(pool))
        }
        None => {
            tracing::warn!("DEMO_MODE without DATABASE_URL: using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    if config.demo_mode {
        tracing::warn!("Demo mode: job system, SMS and gift card calls are simulated");
    }

    let mut allowed_origins = Vec::new();
    match config.site_url.parse::<HeaderValue>() {
        Ok(origin) => allowed_origins.push(origin),
        Err(err) => tracing::warn!("SITE_URL is not a valid origin: {}", err),
    }

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST]);

    let app_state = AppState::new(config.clone(), db_client);
    let app = create_router(Arc::new(app_state)).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await {
        tracing::error!("Server error: {}", err);
    }
}
