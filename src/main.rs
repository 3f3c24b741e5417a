use axum::{http::HeaderValue, Router};
use pitchdeck_leads_api::analysis::AnalysisOrchestrator;
use pitchdeck_leads_api::analysis_client::{analysis_client_from_config, AnalysisService};
use pitchdeck_leads_api::config::Config;
use pitchdeck_leads_api::db::Database;
use pitchdeck_leads_api::db_storage::{LeadStore, PgLeadStore};
use pitchdeck_leads_api::handlers::{self, AppState};
use pitchdeck_leads_api::material_store::{LocalMaterialStore, MaterialStore};
use pitchdeck_leads_api::notifier::notifier_from_config;
use pitchdeck_leads_api::scoring::LeadScoringEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection and schema.
/// - Analysis, material and notification collaborators.
/// - HTTP routes and middleware (CORS, Rate Limiting, Body Limit).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitchdeck_leads_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");
    db.migrate().await?;

    let store: Arc<dyn LeadStore> = Arc::new(PgLeadStore::new(db.pool.clone()));
    let materials: Arc<dyn MaterialStore> = Arc::new(LocalMaterialStore::new(&config.upload_dir));
    tracing::info!("Material storage at {}", config.upload_dir);

    let analysis: Arc<dyn AnalysisService> = Arc::new(analysis_client_from_config(&config)?);
    tracing::info!(
        "✓ Analysis client initialized: {} (timeout {}s)",
        config.analysis_service_url,
        config.analysis_timeout_secs
    );

    let notifier = notifier_from_config(&config)?;

    let orchestrator = AnalysisOrchestrator::new(
        store.clone(),
        analysis,
        materials.clone(),
        notifier.clone(),
        Duration::from_secs(config.analysis_claim_ttl_secs),
    );
    tracing::info!(
        "Analysis claim cache initialized ({}s TTL)",
        config.analysis_claim_ttl_secs
    );

    let max_body_bytes =
        usize::try_from(config.max_file_size_bytes())?.saturating_add(MULTIPART_OVERHEAD_BYTES);

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        store,
        materials,
        notifier,
        scoring: LeadScoringEngine::default(),
        orchestrator,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes(max_body_bytes).layer(
        ServiceBuilder::new()
            // Request size limit: upload limit plus multipart overhead
            .layer(RequestBodyLimitLayer::new(max_body_bytes))
            // Rate limiting: 10 req/sec per IP, burst of 20
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health checks bypass rate limiting
    let app = Router::new()
        .merge(handlers::health_routes())
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
