//! Process entry point: loads configuration, wires every component, starts
//! the HTTP server and background loops, and installs graceful shutdown
//! (spec §6 Signals).

use std::sync::Arc;

use order_control_plane::bus::{ChannelBus, EventBus, RetryingBus};
use order_control_plane::circuit::{CircuitBreakerConfig, CircuitBreakerRegistry};
use order_control_plane::config::{Config, StorageBackend};
#[cfg(feature = "amqp")]
use order_control_plane::config::BusBackend;
use order_control_plane::discovery::{ServiceDiscovery, StaticServiceDiscovery};
use order_control_plane::gateway::{self, AppState};
use order_control_plane::outbox::OutboxRelay;
use order_control_plane::router::RequestRouter;
use order_control_plane::saga::{order_processing_definition, SagaCoordinator};
use order_control_plane::storage::mock::MockStorage;
use order_control_plane::storage::TransactionalStorage;
use order_control_plane::telemetry::{self, Metrics};

#[cfg(feature = "amqp")]
use order_control_plane::bus::AmqpBus;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use order_control_plane::storage::SqlStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(std::env::args().nth(1).as_deref())?;
    telemetry::init_tracing(config.server.json_logs);

    match config.storage.backend {
        StorageBackend::Memory => run(Arc::new(MockStorage::new()), config).await,
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            let url = config.storage.database_url.as_deref().expect("database_url is required for the postgres backend");
            let pool = sqlx::pool::PoolOptions::<sqlx::Postgres>::new()
                .max_connections(config.storage.max_connections)
                .min_connections(config.storage.min_connections)
                .acquire_timeout(std::time::Duration::from_secs(config.storage.connect_timeout_secs))
                .connect(url)
                .await?;
            let storage = SqlStorage::<order_control_plane::storage::sql::postgres::Postgres>::new(pool);
            storage.init_schema().await?;
            run(Arc::new(storage), config).await
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => Err("this build was not compiled with the postgres feature".into()),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => {
            let url = config.storage.database_url.as_deref().expect("database_url is required for the sqlite backend");
            let pool = sqlx::pool::PoolOptions::<sqlx::Sqlite>::new()
                .max_connections(config.storage.max_connections)
                .min_connections(config.storage.min_connections)
                .acquire_timeout(std::time::Duration::from_secs(config.storage.connect_timeout_secs))
                .connect(url)
                .await?;
            let storage = SqlStorage::<order_control_plane::storage::sql::sqlite::Sqlite>::new(pool);
            storage.init_schema().await?;
            run(Arc::new(storage), config).await
        }
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => Err("this build was not compiled with the sqlite feature".into()),
    }
}

/// Wire every component against a concrete storage backend and run until a
/// shutdown signal arrives.
async fn run<T: TransactionalStorage + 'static>(storage: Arc<T>, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new());

    let circuits = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: config.circuit_breaker.failure_threshold,
        success_threshold: config.circuit_breaker.success_threshold,
        cooldown: std::time::Duration::from_secs(config.circuit_breaker.cooldown_secs),
    }));

    let discovery = Arc::new(StaticServiceDiscovery::new(config.discovery.services.clone()));
    let prober = discovery.spawn_prober();

    let router = Arc::new(RequestRouter::new(
        discovery.clone() as Arc<dyn ServiceDiscovery>,
        circuits.clone(),
        metrics.clone(),
        config.router.cache_max_entries,
    ));

    let coordinator = Arc::new(SagaCoordinator::new(storage.clone(), order_processing_definition(router)));

    let (bus, dlq_bus) = build_bus(&config).await?;
    let relay = Arc::new(OutboxRelay::new(storage.clone(), bus.clone(), dlq_bus.clone(), config.outbox.clone(), metrics.clone()));
    let poll_handle = relay.spawn_poll_loop();
    let sweep_handle = relay.spawn_retry_sweep_loop();
    let cleanup_handle = relay.spawn_cleanup_loop();

    let config = Arc::new(config.server.clone());
    let state = AppState {
        storage,
        coordinator,
        discovery: discovery.clone() as Arc<dyn ServiceDiscovery>,
        circuits,
        metrics,
        config: config.clone(),
    };

    let app = gateway::build_router(state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(host = %config.host, port = config.port, "order control plane listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("HTTP listener stopped, draining background loops");
    prober.abort();
    poll_handle.abort();
    sweep_handle.abort();
    cleanup_handle.abort();
    relay.cleanup_once().await.ok();

    Ok(())
}

#[cfg(not(feature = "amqp"))]
async fn build_bus(_config: &Config) -> Result<(Arc<RetryingBus<ChannelBus>>, Arc<RetryingBus<ChannelBus>>), Box<dyn std::error::Error>> {
    let bus = Arc::new(RetryingBus::new(ChannelBus::new(), 3));
    Ok((bus.clone(), bus))
}

#[cfg(feature = "amqp")]
async fn build_bus(config: &Config) -> Result<BusHandles, Box<dyn std::error::Error>> {
    match config.bus.backend {
        BusBackend::Channel => {
            let bus = Arc::new(RetryingBus::new(AnyBus::Channel(ChannelBus::new()), 3));
            Ok((bus.clone(), bus))
        }
        BusBackend::Amqp => {
            let uri = config.bus.amqp_uri.as_deref().expect("amqp_uri is required for the amqp bus backend");
            let bus = Arc::new(RetryingBus::new(AnyBus::Amqp(AmqpBus::connect(uri, &config.bus.exchange).await?), 3));
            let dlq_bus = Arc::new(RetryingBus::new(AnyBus::Amqp(AmqpBus::connect(uri, &config.bus.dlq_exchange).await?), 3));
            Ok((bus, dlq_bus))
        }
    }
}

#[cfg(feature = "amqp")]
type BusHandles = (Arc<RetryingBus<AnyBus>>, Arc<RetryingBus<AnyBus>>);

/// Runtime choice between bus backends, needed because `OutboxRelay<T, B>`
/// is monomorphic in `B` but the backend is a config-time decision.
#[cfg(feature = "amqp")]
enum AnyBus {
    Channel(ChannelBus),
    Amqp(AmqpBus),
}

#[cfg(feature = "amqp")]
#[async_trait::async_trait]
impl EventBus for AnyBus {
    async fn publish(&self, topic: &str, message: &order_control_plane::bus::BusMessage) -> order_control_plane::bus::Result<()> {
        match self {
            AnyBus::Channel(b) => b.publish(topic, message).await,
            AnyBus::Amqp(b) => b.publish(topic, message).await,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, stopping new work");
}
