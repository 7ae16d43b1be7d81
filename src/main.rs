use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use cin_lookup_api::admin_handlers::{self, MAX_UPLOAD_BYTES};
use cin_lookup_api::config::Config;
use cin_lookup_api::db::Database;
use cin_lookup_api::email_client::EmailClient;
use cin_lookup_api::gateway_client::RazorpayClient;
use cin_lookup_api::handlers::{self, AppState};
use cin_lookup_api::reconciliation::spawn_reconciliation_task;
use cin_lookup_api::{auth, webhook_handler};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database (running migrations),
/// the company cache, the gateway and email clients, the reconciliation
/// task, and the HTTP routes with their middleware, then serves.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cin_lookup_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Company rows by CIN (5 minute TTL); admin writes invalidate entries
    let company_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();
    tracing::info!("Company cache initialized");

    let gateway = RazorpayClient::new(
        config.razorpay_base_url.clone(),
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    )?;
    tracing::info!("✓ Razorpay client initialized: {}", config.razorpay_base_url);

    let email = EmailClient::new(
        config.email_base_url.clone(),
        config.email_api_key.clone(),
        config.email_from.clone(),
    )?;
    tracing::info!("✓ Email client initialized: {}", config.email_base_url);

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        gateway: gateway.clone(),
        email: email.clone(),
        company_cache,
    });

    if config.reconcile_interval_secs > 0 {
        spawn_reconciliation_task(
            app_state.unlock_store(),
            gateway,
            email,
            Duration::from_secs(config.reconcile_interval_secs),
        );
        tracing::info!(
            "Order reconciliation every {}s",
            config.reconcile_interval_secs
        );
    } else {
        tracing::warn!("RECONCILE_INTERVAL_SECS=0; order reconciliation disabled");
    }

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // Search
        .route("/api/v1/companies", get(handlers::search_companies))
        .route("/api/v1/companies/:cin", get(handlers::get_company))
        .route("/api/v1/directors", get(handlers::search_directors))
        .route("/api/v1/directors/:din", get(handlers::get_director))
        // Unlock flow
        .route("/api/v1/unlock/orders", post(handlers::create_unlock_order))
        .route(
            "/api/v1/unlock/orders/:order_id/dismiss",
            post(handlers::dismiss_unlock_order),
        )
        .route("/api/v1/unlock/verify", post(handlers::verify_unlock_payment))
        .route("/api/v1/unlocks", get(handlers::list_unlocks))
        .route("/api/v1/reports", post(handlers::report_data_change))
        // Accounts
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/me", get(auth::me))
        // Admin
        .route(
            "/api/v1/admin/records/:id",
            get(admin_handlers::get_record)
                .patch(admin_handlers::update_record)
                .delete(admin_handlers::delete_record),
        )
        .route(
            "/api/v1/admin/imports",
            get(admin_handlers::list_imports).post(admin_handlers::upload_import),
        )
        // Payment gateway webhook
        .route(
            "/api/v1/webhooks/payments",
            post(webhook_handler::payment_webhook),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 10MB max payload (CSV uploads)
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
