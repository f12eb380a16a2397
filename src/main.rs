use std::{process, sync::Arc};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use civic_storage::{
    adapters::{
        cache::RedisMetadataCache,
        controllers::storage_controller::StorageController,
        middleware::validate_storage_secret,
        repositories::{
            EnvCredentialManager, InMemoryOperationRepository, InMemoryStorageFileRepository,
            PgCredentialManager, PgOperationRepository, PgStorageFileRepository,
        },
        state::{AdminSecret, AppState},
    },
    application::{
        repositories::{
            credential_repository::CredentialManager, file_repository::StorageFileRepository,
            operation_repository::OperationRepository,
        },
        services::{
            config_manager::StorageConfigManager, metadata_cache::MetadataCache,
            CloudUuidStorageService, StorageDependencies,
        },
    },
    services::DefaultBackendFactory,
};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

async fn hello_world() -> &'static str {
    "civic-storage"
}

fn fail(message: impl std::fmt::Display) -> ! {
    tracing::error!("{}", message);
    process::exit(1)
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Initialize AWS SDK crypto provider (required for aws-sdk-s3)
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let port = match std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
    {
        Ok(port) => port,
        Err(e) => fail(format!("PORT must be a valid u16: {}", e)),
    };

    let config = match StorageConfigManager::load_from_env().await {
        Ok(config) => config,
        Err(e) => fail(e),
    };

    // Configure CORS
    let cors = if let Ok(allowed_origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
        let mut origins: Vec<axum::http::HeaderValue> = Vec::new();
        for origin in allowed_origins.split(',') {
            match origin.trim().parse() {
                Ok(origin) => origins.push(origin),
                Err(_) => fail(format!("Invalid CORS origin: {}", origin)),
            }
        }
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        // Allow all origins if not specified (only for development)
        CorsLayer::permissive()
    };

    // Metadata and credentials live in PostgreSQL when DATABASE_URL is set
    let (files, operations, credentials): (
        Arc<dyn StorageFileRepository>,
        Arc<dyn OperationRepository>,
        Arc<dyn CredentialManager>,
    ) = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            tracing::info!("Connecting to PostgreSQL...");
            let pool = match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(&database_url)
                .await
            {
                Ok(pool) => pool,
                Err(e) => fail(format!(
                    "Failed to connect to PostgreSQL database. Check DATABASE_URL and network connectivity: {}",
                    e
                )),
            };
            tracing::info!("Database connection established");
            (
                Arc::new(PgStorageFileRepository::new(pool.clone())) as Arc<dyn StorageFileRepository>,
                Arc::new(PgOperationRepository::new(pool.clone())) as Arc<dyn OperationRepository>,
                Arc::new(PgCredentialManager::new(pool)) as Arc<dyn CredentialManager>,
            )
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, keeping file metadata in memory");
            (
                Arc::new(InMemoryStorageFileRepository::new()) as Arc<dyn StorageFileRepository>,
                Arc::new(InMemoryOperationRepository::new()) as Arc<dyn OperationRepository>,
                Arc::new(EnvCredentialManager::from_env()) as Arc<dyn CredentialManager>,
            )
        }
    };

    let cache: Option<Arc<dyn MetadataCache>> = match &config.cache.redis_url {
        Some(redis_url) if config.cache.enabled => {
            let redis_client = match redis::Client::open(redis_url.as_str()) {
                Ok(client) => client,
                Err(e) => fail(format!("Failed to create Redis client: {}", e)),
            };
            match redis::aio::ConnectionManager::new(redis_client).await {
                Ok(manager) => {
                    tracing::info!("Using Redis metadata cache");
                    Some(Arc::new(RedisMetadataCache::new(manager, config.cache.ttl_secs))
                        as Arc<dyn MetadataCache>)
                }
                Err(e) => fail(format!("Failed to connect to Redis: {}", e)),
            }
        }
        _ => None,
    };

    let storage_service = match CloudUuidStorageService::new(
        config,
        StorageDependencies {
            files,
            operations,
            credentials,
            backends: Arc::new(DefaultBackendFactory),
            cache,
        },
    ) {
        Ok(service) => Arc::new(service),
        Err(e) => fail(e),
    };

    if let Err(e) = storage_service.initialize().await {
        fail(format!("Failed to initialize storage: {}", e));
    }
    let _cleanup_task = storage_service.start_background_tasks();

    let admin_secret = std::env::var("STORAGE_ADMIN_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
        .map(Arc::<str>::from);
    if admin_secret.is_none() {
        tracing::warn!("STORAGE_ADMIN_SECRET not set, maintenance routes are disabled");
    }

    let app_state = AppState {
        storage_service,
        admin_secret: AdminSecret(admin_secret),
    };

    // Protected routes that require X-Storage-Secret header
    let protected_routes = Router::new()
        .route("/api/v1/storage/cleanup", post(StorageController::run_cleanup))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            validate_storage_secret,
        ));

    let public_routes = Router::new()
        .route("/", get(hello_world))
        .route("/api/v1/health", get(StorageController::health_check))
        .route("/api/v1/storage/metrics", get(StorageController::get_metrics))
        .route("/api/v1/storage/usage", get(StorageController::get_usage));

    let router = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(cors)
        .with_state(app_state);

    // Start the server
    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await {
        Ok(listener) => listener,
        Err(e) => fail(format!("Failed to bind to port {}: {}", port, e)),
    };

    tracing::info!("Server listening on 0.0.0.0:{}", port);

    if let Err(e) = axum::serve(listener, router).await {
        fail(format!("Server error: {}", e));
    }
}
