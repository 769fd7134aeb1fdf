//! Vipps Gateway server.
//!
//! Serves the provider webhook endpoint and runs the expiry sweeper.
//! Hosts embedding the library drive payments through the command handlers
//! directly; this binary covers the inbound half.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use vipps_gateway::adapters::circuit_breaker::InMemoryCircuitBreaker;
use vipps_gateway::adapters::dns::SystemHostResolver;
use vipps_gateway::adapters::http::{webhook_router, WebhookAppState};
use vipps_gateway::adapters::memory::{InMemoryEventStore, InMemoryTransactionRepository};
use vipps_gateway::adapters::notify::TracingNotifier;
use vipps_gateway::adapters::postgres::{self, PostgresEventStore, PostgresTransactionRepository};
use vipps_gateway::adapters::rate_limiter::{InMemoryRateLimiter, RateLimitConfig, WindowLimit};
use vipps_gateway::adapters::vipps::{
    RetryPolicy, SystemInfo, VippsClient, VippsConfig as ClientConfig,
};
use vipps_gateway::application::{
    ExpireStaleHandler, ExpirySweeper, ExpirySweeperConfig, HandleWebhookHandler,
    SideEffectRunner, TransactionLocks, WebhookValidator, WebhookValidatorConfig,
};
use vipps_gateway::config::{AppConfig, ServerConfig};
use vipps_gateway::ports::{
    CircuitBreakerConfig, EventStore, RateLimiter, TransactionRepository,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        provider = %config.vipps.environment,
        "Starting vipps-gateway"
    );

    // Storage
    let (transactions, events) = open_storage(&config).await?;

    // Outbound
    let limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::new(RateLimitConfig {
        upstream: WindowLimit::new(
            config.resilience.rate_limit_requests,
            config.resilience.rate_limit_window_secs,
        ),
        webhook_peer: WindowLimit::new(
            config.webhook.peer_rate_limit_requests,
            config.webhook.peer_rate_limit_window_secs,
        ),
    }));
    let gateway = Arc::new(build_client(&config, limiter.clone())?);
    tracing::info!(host = %gateway.host(), "Provider client ready");

    // Application
    let locks = Arc::new(TransactionLocks::new());
    let effects = Arc::new(SideEffectRunner::new(
        gateway.clone(),
        transactions.clone(),
        Arc::new(TracingNotifier),
    ));

    let validator_config = WebhookValidatorConfig::for_environment(config.vipps.environment)
        .with_header_names(config.webhook.headers.clone())
        .with_tolerance_secs(config.webhook.timestamp_tolerance_secs)
        .with_enforced_source_check(config.webhook.enforce_source_check);
    let validator = WebhookValidator::new(
        transactions.clone(),
        events,
        Arc::new(SystemHostResolver::new()),
        validator_config,
    )
    .with_peer_limiter(limiter);

    let webhook_handler = Arc::new(HandleWebhookHandler::new(
        Arc::new(validator),
        transactions.clone(),
        locks.clone(),
        effects.clone(),
    ));

    // Expiry sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(
        Arc::new(ExpireStaleHandler::new(transactions, locks, effects)),
        ExpirySweeperConfig::default().with_interval(config.payment.sweep_interval()),
    );
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    // HTTP
    let state = WebhookAppState::new(webhook_handler)
        .with_trust_forwarded_for(config.webhook.trust_forwarded_for);
    let app = webhook_router().with_state(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(config.server.request_timeout()))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::warn!(error = %e, "Expiry sweeper task failed");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// EnvFilter from `RUST_LOG`, falling back to the configured directive.
/// JSON output in production.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn open_storage(
    config: &AppConfig,
) -> Result<(Arc<dyn TransactionRepository>, Arc<dyn EventStore>), Box<dyn Error>> {
    match config.database.url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => {
            let pool = postgres::connect(url, config.database.max_connections).await?;
            tracing::info!("Using PostgreSQL storage");
            let transactions: Arc<dyn TransactionRepository> =
                Arc::new(PostgresTransactionRepository::new(pool.clone()));
            let events: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool));
            Ok((transactions, events))
        }
        None => {
            tracing::warn!("No database configured, transactions are kept in memory");
            let transactions: Arc<dyn TransactionRepository> =
                Arc::new(InMemoryTransactionRepository::new());
            let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
            Ok((transactions, events))
        }
    }
}

fn build_client(
    config: &AppConfig,
    limiter: Arc<dyn RateLimiter>,
) -> Result<VippsClient, Box<dyn Error>> {
    let vipps = &config.vipps;
    let resilience = &config.resilience;

    let client_config = ClientConfig::new(
        vipps.client_id.clone(),
        vipps.client_secret.expose_secret().clone(),
        vipps.subscription_key.expose_secret().clone(),
        vipps.merchant_serial_number.clone(),
    )
    .with_base_url(vipps.api_base_url())
    .with_system_info(SystemInfo {
        name: vipps.system_name.clone(),
        version: vipps.system_version.clone(),
        plugin_name: vipps.plugin_name.clone(),
        plugin_version: vipps.plugin_version.clone(),
    })
    .with_request_timeout(resilience.request_timeout())
    .with_retry_policy(RetryPolicy {
        max_attempts: resilience.max_attempts,
        base_delay: resilience.backoff_base(),
        max_delay: resilience.backoff_max(),
    })
    .with_token_refresh_margin(resilience.token_refresh_margin());

    let breaker = InMemoryCircuitBreaker::new(
        "vipps-api",
        CircuitBreakerConfig {
            failure_threshold: resilience.breaker_failure_threshold,
            recovery_timeout: resilience.breaker_cooldown(),
            max_recovery_timeout: resilience.breaker_max_cooldown(),
            // A trial call may need a token request before the call itself.
            trial_timeout: resilience.request_timeout().saturating_mul(2),
            ..CircuitBreakerConfig::default()
        },
    );

    Ok(VippsClient::new(client_config, limiter, Arc::new(breaker))?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
