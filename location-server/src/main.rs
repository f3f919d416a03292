use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::{Result, WrapErr};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use location_capture::config::{Config, StoreBackend};
use location_capture::router;
use location_core::store::{EventLog, HistoryStore, MemoryStore, PgStore};
use location_core::time::SystemTime;
use location_janitor::app_context::AppContext;
use location_janitor::janitor::Janitor;

type Stores = (Arc<dyn EventLog>, Arc<dyn HistoryStore>);

async fn stores(config: &Config) -> Result<Stores> {
    match config.store_backend {
        StoreBackend::Memory => {
            info!(capacity = config.raw_log_capacity, "using in-memory store");
            let store = Arc::new(MemoryStore::new(config.raw_log_capacity));
            let events: Arc<dyn EventLog> = store.clone();
            let histories: Arc<dyn HistoryStore> = store;
            Ok((events, histories))
        }
        StoreBackend::Postgres => {
            info!(capacity = config.raw_log_capacity, "using postgres store");
            let store = PgStore::new(
                &config.database_url,
                config.raw_log_capacity,
                config.max_pg_connections,
            )
            .await
            .wrap_err("failed to connect to postgres")?;
            store
                .run_migrations()
                .await
                .wrap_err("failed to run migrations")?;
            let store = Arc::new(store);
            let events: Arc<dyn EventLog> = store.clone();
            let histories: Arc<dyn HistoryStore> = store;
            Ok((events, histories))
        }
    }
}

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down gracefully...");
}

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", bind))?;

    info!("listening on {}", bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let (events, histories) = stores(&config)
        .await
        .expect("failed to set up location store");

    let context = Arc::new(AppContext::new(
        Janitor::new(
            events.clone(),
            histories.clone(),
            config.history_page_size,
        ),
        config.consolidation_interval.0,
    ));

    let app = router::router(
        SystemTime {},
        events,
        histories,
        config.staleness_window.as_millis_i64(),
        &config.test_vehicle_id,
        config.export_prometheus,
    )
    .merge(location_janitor::http::app(context.clone()));

    let janitor_loop = tokio::spawn(async move { context.cleanup_loop().await });
    let http_server = listen(app, config.bind());

    tokio::select! {
        res = janitor_loop => {
            error!("consolidation loop exited");
            if let Err(e) = res {
                error!("consolidation loop failed with: {}", e)
            }
        }
        res = http_server => {
            if let Err(e) = res {
                error!("server failed with: {}", e)
            }
        }
    }

    info!("exiting");
}
