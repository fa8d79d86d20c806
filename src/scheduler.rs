use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::admission::{AdmissionController, AdmissionRejection};
use crate::broker::BrokerAdapter;
use crate::config::Config;
use crate::domain::{Alert, AlertAction, DailySummary, TradeStatus};
use crate::entry::EntryManager;
use crate::error::Result;
use crate::exit_engine::ExitEngine;
use crate::selector::OptionSelector;
use crate::signals::{generate_signals, SignalParams};
use crate::store::Store;

/// Owns the four cooperative polling loops. A single `run()` future drives
/// all of them via `tokio::select!` against their own interval timers, so
/// there is no cross-loop shared mutable state beyond the store/broker both
/// already synchronize internally.
pub struct Scheduler {
    broker: Arc<dyn BrokerAdapter>,
    store: Arc<dyn Store>,
    config: Arc<Config>,
    signal_params: SignalParams,
}

impl Scheduler {
    pub fn new(broker: Arc<dyn BrokerAdapter>, store: Arc<dyn Store>, config: Arc<Config>, signal_params: SignalParams) -> Self {
        Self { broker, store, config, signal_params }
    }

    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut entry_poll = tokio::time::interval(Duration::from_secs(self.config.order_poll_interval_seconds));
        let mut exit_poll = tokio::time::interval(Duration::from_secs(self.config.exit_check_interval_seconds));
        let mut strategy_poll = tokio::time::interval(Duration::from_secs(self.config.orb_poll_interval_seconds));
        let mut cleanup_poll = tokio::time::interval(Duration::from_secs(60));

        let mut last_cleanup_date: Option<NaiveDate> = None;

        info!(app = %self.config.app_name, "scheduler starting");

        loop {
            tokio::select! {
                _ = entry_poll.tick() => {
                    if let Err(err) = self.poll_entries().await {
                        warn!(%err, "entry-fill poll failed");
                    }
                }
                _ = exit_poll.tick() => {
                    if let Err(err) = self.poll_exits().await {
                        warn!(%err, "exit-eval poll failed");
                    }
                }
                _ = strategy_poll.tick() => {
                    if let Err(err) = self.poll_strategy().await {
                        warn!(%err, "strategy poll failed");
                    }
                }
                _ = cleanup_poll.tick() => {
                    let today = Utc::now().date_naive();
                    if last_cleanup_date != Some(today) && crate::exchange_time::exchange_hour(Utc::now()) >= self.config.force_exit_hour {
                        if let Err(err) = self.run_session_cleanup(today).await {
                            warn!(%err, "session cleanup failed");
                        } else {
                            last_cleanup_date = Some(today);
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn poll_entries(&self) -> Result<()> {
        let pending = self.store.trades_with_status(&[TradeStatus::Pending]).await?;
        let manager = EntryManager::new(self.broker.as_ref(), self.store.as_ref(), self.config.as_ref());
        for mut trade in pending {
            manager.poll_entry_fill(&mut trade).await?;
        }
        Ok(())
    }

    async fn poll_exits(&self) -> Result<()> {
        let engine = ExitEngine::new(self.broker.as_ref(), self.store.as_ref(), self.config.as_ref());
        let open = self.store.trades_with_status(&[TradeStatus::Filled, TradeStatus::StopLossPlaced]).await?;
        for mut trade in open {
            engine.evaluate(&mut trade).await?;
        }

        let exiting = self.store.trades_with_status(&[TradeStatus::Exiting]).await?;
        for mut trade in exiting {
            engine.poll_exit_fill(&mut trade).await?;
        }
        Ok(())
    }

    async fn poll_strategy(&self) -> Result<()> {
        for ticker in &self.config.supported_tickers {
            let now = Utc::now();
            let start = now - chrono::Duration::hours(6);
            let bars = self.broker.get_price_history(ticker, 5, start, now).await?;
            if bars.is_empty() {
                continue;
            }

            let signals = generate_signals(&bars, &self.signal_params, None, None, None);
            let Some(signal) = signals.last() else { continue };

            let action = match signal.direction {
                crate::domain::TradeDirection::Call => AlertAction::BuyCall,
                crate::domain::TradeDirection::Put => AlertAction::BuyPut,
            };
            let alert = Alert::new(ticker.clone(), action, Some(signal.underlying_price), "strategy_poller".into(), signal.reason.clone());
            self.process_alert(alert).await?;
        }
        Ok(())
    }

    /// Shared path between the strategy poller and the HTTP webhook handler:
    /// admit, then (for entries) select a contract and submit the order.
    pub async fn process_alert(&self, mut alert: Alert) -> Result<()> {
        let stored = self.store.insert_alert(alert.clone()).await?;
        alert.id = stored.id;

        let controller = AdmissionController::new(self.config.as_ref(), self.store.as_ref(), self.broker.as_ref());
        match controller.admit(&alert, None).await? {
            Ok(()) => {}
            Err(rejection) => {
                alert.reject(rejection.reason());
                self.store.update_alert(alert).await?;
                return Ok(());
            }
        }

        match alert.action {
            AlertAction::Close => {
                let active = self.store.active_trade(None).await?;
                if let Some(mut trade) = active {
                    let engine = ExitEngine::new(self.broker.as_ref(), self.store.as_ref(), self.config.as_ref());
                    engine.evaluate(&mut trade).await?;
                }
                alert.status = crate::domain::AlertStatus::Processed;
                self.store.update_alert(alert).await?;
            }
            AlertAction::BuyCall | AlertAction::BuyPut => {
                let direction = alert.direction.expect("BuyCall/BuyPut always carry a direction");
                let selector = OptionSelector::new(self.broker.as_ref(), self.config.as_ref());
                let contract = selector.select_contract(&alert.ticker, direction).await?;

                let manager = EntryManager::new(self.broker.as_ref(), self.store.as_ref(), self.config.as_ref());
                let trade = manager.submit_entry(&alert, &contract, self.config.default_quantity).await?;

                alert.trade_id = Some(trade.id);
                alert.status = crate::domain::AlertStatus::Processed;
                self.store.update_alert(alert).await?;
            }
        }
        Ok(())
    }

    async fn run_session_cleanup(&self, date: NaiveDate) -> Result<()> {
        let trades = self.store.recently_closed_trades(date).await?;
        if trades.is_empty() {
            return Ok(());
        }

        let wins = trades.iter().filter(|t| t.pnl_dollars.unwrap_or(0.0) > 0.0).count() as i64;
        let losses = trades.iter().filter(|t| t.pnl_dollars.unwrap_or(0.0) <= 0.0).count() as i64;
        let total_pnl = trades.iter().filter_map(|t| t.pnl_dollars).sum();
        let largest_win = trades.iter().filter_map(|t| t.pnl_dollars).fold(0.0f64, f64::max);
        let largest_loss = trades.iter().filter_map(|t| t.pnl_dollars).fold(0.0f64, f64::min);
        let avg_hold = {
            let holds: Vec<f64> = trades
                .iter()
                .filter_map(|t| Some((t.exit_filled_at? - t.entry_filled_at?).num_minutes() as f64))
                .collect();
            if holds.is_empty() { None } else { Some(holds.iter().sum::<f64>() / holds.len() as f64) }
        };

        let summary = DailySummary {
            trade_date: Some(date),
            total_trades: trades.len() as i64,
            winning_trades: wins,
            losing_trades: losses,
            total_pnl,
            largest_win,
            largest_loss,
            win_rate: if trades.is_empty() { 0.0 } else { wins as f64 / trades.len() as f64 * 100.0 },
            avg_hold_time_minutes: avg_hold,
        };

        self.store.upsert_daily_summary(date, summary).await?;
        info!(%date, trades = trades.len(), total_pnl, "session cleanup computed daily summary");
        Ok(())
    }
}
