use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use dotenv::dotenv;
use sokopay::api::payments::{self, PaymentsState};
use sokopay::api::webhooks::{self, CallbackState};
use sokopay::config::{AppConfig, LogFormat, LoggingConfig};
use sokopay::database;
use sokopay::database::callbacks::PgCallbackStore;
use sokopay::database::orders::PgOrderStore;
use sokopay::database::payment_attempts::PgPaymentAttemptStore;
use sokopay::health::{self, HealthState};
use sokopay::payments::gateway::{MpesaGateway, PaymentGateway};
use sokopay::services::correlator::CallbackCorrelator;
use sokopay::services::initiator::PaymentInitiator;
use sokopay::services::status::StatusPoller;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "starting sokopay payment service"
    );

    let pool = database::init_pool_from_config(&config.database)
        .await
        .context("database pool initialization failed")?;

    // A missing gateway configuration is not fatal at startup: the initiate
    // and status endpoints report it per request.
    let gateway: Option<Arc<dyn PaymentGateway>> = match MpesaGateway::from_env() {
        Ok(gateway) => Some(Arc::new(gateway)),
        Err(err) => {
            warn!(error = %err, "M-Pesa gateway not configured");
            None
        }
    };

    let attempts = Arc::new(PgPaymentAttemptStore::new(pool.clone()));
    let orders = Arc::new(PgOrderStore::new(pool.clone()));
    let callbacks = Arc::new(PgCallbackStore::new(pool.clone()));

    let payments_state = PaymentsState {
        initiator: Arc::new(PaymentInitiator::new(
            gateway.clone(),
            attempts.clone(),
            orders.clone(),
        )),
        poller: Arc::new(StatusPoller::new(gateway)),
        attempts: attempts.clone(),
    };
    let callback_state = CallbackState {
        correlator: Arc::new(CallbackCorrelator::new(attempts, orders, callbacks)),
    };

    let health_routes = Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(HealthState { pool });

    let payment_routes = Router::new()
        .route("/api/payments/mpesa/initiate", post(payments::initiate_payment))
        .route("/api/payments/mpesa/status", get(payments::query_status))
        .route("/api/payments/mpesa/attempts/{id}", get(payments::get_attempt))
        .with_state(payments_state);

    // The callback path shares nothing with the initiate path: a hung
    // gateway call must never delay the webhook acknowledgement.
    let callback_routes = Router::new()
        .route("/api/payments/mpesa/callback", post(webhooks::handle_callback))
        .with_state(callback_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(payment_routes)
        .merge(callback_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        );

    let addr = SocketAddr::new(
        config.server.host.parse().context("invalid SERVER_HOST")?,
        config.server.port,
    );
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind server address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}
