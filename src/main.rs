use std::sync::{Arc, Mutex};

use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use appointments::config::AppConfig;
use appointments::db;
use appointments::handlers;
use appointments::services::notifications::webhook::WebhookNotifier;
use appointments::services::notifications::{LogNotifier, Notifier};
use appointments::services::payments::paypal::PaypalProvider;
use appointments::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.paypal_client_id.is_empty() || config.paypal_client_secret.is_empty() {
        tracing::warn!("PAYPAL_CLIENT_ID/PAYPAL_CLIENT_SECRET not set, payment calls will fail");
    }
    let payments = PaypalProvider::new(
        config.paypal_api_base.clone(),
        config.paypal_client_id.clone(),
        config.paypal_client_secret.clone(),
        config.provider_timeout,
    );

    let notifier: Arc<dyn Notifier> = if config.notify_webhook_url.is_empty() {
        tracing::info!("no NOTIFY_WEBHOOK_URL set, notifications are only logged");
        Arc::new(LogNotifier)
    } else {
        tracing::info!("delivering notifications to {}", config.notify_webhook_url);
        Arc::new(WebhookNotifier::new(config.notify_webhook_url.clone()))
    };

    if config.payment_webhook_secret.is_empty() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, payment webhooks are not authenticated");
    }

    let (events_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        payments: Box::new(payments),
        notifier,
        events_tx,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/bookings", post(handlers::bookings::submit_booking))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/events",
            get(handlers::bookings::get_booking_events),
        )
        .route(
            "/api/bookings/:id/conflicts",
            get(handlers::bookings::get_conflicts),
        )
        .route(
            "/api/bookings/:id/transition",
            post(handlers::bookings::transition_booking),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/orders",
            post(handlers::payments::create_order),
        )
        .route(
            "/api/payments/capture",
            post(handlers::payments::capture_payment),
        )
        .route("/webhook/payments", post(handlers::payments::payment_webhook))
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route("/api/admin/services", put(handlers::admin::upsert_service))
        .route("/api/events", get(handlers::events::events_stream))
        .route(
            "/calendar/:booking_id",
            get(handlers::calendar::download_ics),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
