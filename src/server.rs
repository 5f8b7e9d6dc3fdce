//! # Server Configuration
//!
//! Server setup for the signal migration service: router, shared state,
//! OpenAPI docs, and the startup sequence that wires the orchestrator to the
//! home platform and kicks off the resume scan.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::jobs::{JobOrchestrator, OrchestratorSettings};
use crate::platform::http::HttpPlatformResolver;
use crate::repositories::JobRepository;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<JobOrchestrator>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/migrationjob", post(handlers::jobs::create_migration_job))
        .route(
            "/migrationjob/{id}/retry",
            post(handlers::jobs::retry_migration_job),
        )
        .route("/migrationjob/{id}", get(handlers::jobs::get_migration_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);

    let resolver = Arc::new(HttpPlatformResolver::from_config(&config));
    let home = resolver.home_platform()?;
    let orchestrator = Arc::new(JobOrchestrator::new(
        JobRepository::new(home),
        resolver,
        OrchestratorSettings::from(config.as_ref()),
    ));

    if config.resume_jobs_on_startup {
        let resuming = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            resuming.resume_incomplete_jobs().await;
        });
    }

    let state = AppState {
        config: Arc::clone(&config),
        orchestrator,
    };
    let app = create_app(state);

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on: {}", addr);
    println!("Running in profile: {}", config.profile);

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::jobs::create_migration_job,
        crate::handlers::jobs::retry_migration_job,
        crate::handlers::jobs::get_migration_job,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::MigrationJobConfig,
            crate::models::PlatformConnection,
            crate::models::ExternalIdMappingAdvice,
            crate::models::DeviceSignalMigrationReport,
            crate::models::SignalType,
            crate::models::JobStatus,
            crate::handlers::jobs::JobCreatedResponse,
            crate::handlers::jobs::JobInfo,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Signal Migration API",
        description = "API for migrating device signals between platform tenants",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
