pub mod handlers;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;

use crate::broker::BrokerAdapter;
use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::store::Store;

pub use ws::WsEvent;

/// Shared handle every axum handler receives via `State`.
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub broker: Arc<dyn BrokerAdapter>,
    pub config: Arc<Config>,
    pub scheduler: Arc<Scheduler>,
    pub events_tx: broadcast::Sender<WsEvent>,
}

impl AppContext {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn BrokerAdapter>, config: Arc<Config>, scheduler: Arc<Scheduler>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self { store, broker, config, scheduler, events_tx }
    }
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/webhook", post(handlers::webhook))
        .route("/alerts", get(handlers::list_alerts))
        .route("/trades", get(handlers::list_trades))
        .route("/trades/:id", get(handlers::get_trade))
        .route("/trades/:id/events", get(handlers::trade_events))
        .route("/trades/:id/close", post(handlers::close_trade))
        .route("/trades/:id/cancel", post(handlers::cancel_trade))
        .route("/daily-summary/:date", get(handlers::daily_summary))
        .route("/backtest/run", post(handlers::run_backtest))
        .route("/backtest/optimize", post(handlers::optimize_backtest))
        .route("/ws", get(ws::ws_handler))
        .with_state(ctx)
}
