use std::sync::Arc;

use daytrader_agent::broker::{BrokerAdapter, PaperBroker};
use daytrader_agent::config::Config;
use daytrader_agent::http::{build_router, AppContext};
use daytrader_agent::scheduler::Scheduler;
use daytrader_agent::signals::SignalParams;
use daytrader_agent::store::{InMemoryStore, Store};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Arc::new(Config::from_env());

    // Stdout logging is always on; LOG_DIR additionally fans out to a
    // non-blocking, daily-rolled file appender. The guard must outlive main
    // or buffered log lines on the worker thread are dropped on exit.
    let _file_appender_guard = match &config.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "daytrader.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
                .with_writer(non_blocking)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())).init();
            None
        }
    };

    info!(app = %config.app_name, dry_run = config.dry_run, "starting up");

    let broker: Arc<dyn BrokerAdapter> = Arc::new(PaperBroker::new(600.0, 15.0));
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let signal_params = SignalParams::default();

    let scheduler = Arc::new(Scheduler::new(broker.clone(), store.clone(), config.clone(), signal_params));
    let ctx = Arc::new(AppContext::new(store, broker, config.clone(), scheduler.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run(shutdown_rx).await }
    });

    let router = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(&config.http_bind_addr).await?;
    info!(addr = %config.http_bind_addr, "http surface listening");

    let server = axum::serve(listener, router);
    tokio::select! {
        result = server => {
            if let Err(err) = result {
                tracing::error!(%err, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    scheduler_task.abort();
    Ok(())
}
