use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod alerts;
mod auth;
mod config;
mod content;
mod dispatch;
mod error;
mod extract;
mod inbound;
mod middleware;
mod pages;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;
mod transport;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Check-in Engagement API",
        version = "0.1.0",
        description = "Operator endpoints for scheduling and dispatching patient check-ins and reviewing red-flag alerts."
    ),
    paths(
        routes::health::health_check,
        routes::checkins::dispatch,
        routes::checkins::enqueue,
        routes::checkins::retry_queue_item,
        routes::checkins::erase_assessment_checkins,
        routes::alerts::list_alerts,
        routes::alerts::dismiss_alert,
    ),
    components(schemas(
        HealthResponse,
        checkin_core::error::ApiError,
        checkin_core::checkins::Channel,
        checkin_core::checkins::QueueStatus,
        checkin_core::checkins::QueueItem,
        checkin_core::checkins::DispatchSummary,
        checkin_core::checkins::Alert,
        checkin_core::checkins::AlertPayload,
        routes::checkins::EnqueueRequest,
        routes::checkins::EnqueueResponse,
        routes::alerts::AlertListResponse,
        store::ErasureCounts,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match config::AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(config = ?config, "configuration loaded");

    // Database connection
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn store::CheckInStore> = Arc::new(store::PgStore::new(pool));
    let transport: Arc<dyn transport::Transport> = Arc::new(transport::ChannelTransport::new(
        config.resend.clone(),
        config.twilio.clone(),
    ));
    let app_state = state::AppState::new(store, transport, &config)
        .expect("token secret was validated by config");

    // Router with per-endpoint rate limiting
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::reply::reply_router().layer(middleware::rate_limit::reply_layer()))
        .merge(routes::reply::note_router().layer(middleware::rate_limit::note_layer()))
        .merge(routes::sms::router().layer(middleware::rate_limit::webhook_layer()))
        .merge(routes::checkins::router().layer(middleware::rate_limit::operator_layer()))
        .merge(routes::alerts::router().layer(middleware::rate_limit::operator_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(config.require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(axum::middleware::from_fn(middleware::security_headers::apply)),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Check-in API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
