use chrono::{NaiveTime, Utc};

use crate::broker::{BrokerAdapter, OrderRequest};
use crate::config::Config;
use crate::domain::{ExitReason, PriceSnapshot, Trade, TradeEvent, TradeEventKind, TradeStatus};
use crate::error::Result;
use crate::store::Store;

fn session_cutoff(config: &Config) -> NaiveTime {
    NaiveTime::from_hms_opt(config.force_exit_hour, config.force_exit_minute, 0).unwrap()
}

/// Outcome of one exit-ladder tick, for callers that want to observe what
/// happened without re-reading the trade.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitAction {
    None,
    FullExit { reason: ExitReason, order_id: String },
    ScaleOut { tier: i64, quantity: i64, order_id: String },
    BreakevenMoved,
}

/// Runs the per-tick exit ladder from the priority table: time cutoff, max
/// hold, app-managed stop, breakeven promotion (non-returning), tiered
/// scale-out, profit target, trailing stop — first match wins.
pub struct ExitEngine<'a> {
    broker: &'a dyn BrokerAdapter,
    store: &'a dyn Store,
    config: &'a Config,
}

impl<'a> ExitEngine<'a> {
    pub fn new(broker: &'a dyn BrokerAdapter, store: &'a dyn Store, config: &'a Config) -> Self {
        Self { broker, store, config }
    }

    pub async fn evaluate(&self, trade: &mut Trade) -> Result<ExitAction> {
        if !trade.status.is_exit_eligible() {
            return Ok(ExitAction::None);
        }

        let quote = self.broker.get_quote(&trade.option_symbol).await?;
        let mid = quote.mid();

        trade.highest_price_seen = Some(trade.highest_price_seen.unwrap_or(mid).max(mid));
        let now = Utc::now();
        self.store
            .insert_snapshot(PriceSnapshot { id: 0, trade_id: trade.id, timestamp: now, price: mid, highest_price_seen: trade.highest_price_seen.unwrap() })
            .await?;

        let entry_price = trade.entry_price.unwrap_or(mid);
        let gain_pct = if entry_price > 0.0 { (mid - entry_price) / entry_price * 100.0 } else { 0.0 };

        // Rule 1: session cutoff (checked in exchange-local time, not UTC).
        if crate::exchange_time::to_exchange_time(now) >= session_cutoff(self.config) {
            return self.full_exit(trade, ExitReason::TimeBased).await;
        }

        // Rule 2: max hold.
        if let Some(filled_at) = trade.entry_filled_at {
            if now - filled_at >= chrono::Duration::minutes(self.config.max_hold_minutes) {
                return self.full_exit(trade, ExitReason::MaxHoldTime).await;
            }
        }

        // Rule 3: app-managed stop (no broker stop order currently working).
        if trade.stop_loss_order_id.is_none() {
            if let Some(stop) = trade.stop_loss_price {
                if mid <= stop {
                    return self.full_exit(trade, ExitReason::StopLoss).await;
                }
            }
        }

        // Rule 3b: breakeven promotion (non-returning).
        let breakeven_action = self.maybe_promote_breakeven(trade, entry_price).await?;

        // Rule 4a/4b: tiered scale-out.
        let remaining = trade.remaining_quantity();
        if trade.scale_out_count == 0
            && gain_pct >= self.config.scale_out_tier_1_percent
            && self.config.scale_out_enabled
            && trade.entry_quantity >= 2
            && remaining > 1
        {
            return self.scale_out(trade, 1, self.config.scale_out_tier_1_qty, mid, entry_price).await;
        }
        if trade.scale_out_count == 1 && gain_pct >= self.config.scale_out_tier_2_percent && remaining > 1 {
            return self.scale_out(trade, 2, self.config.scale_out_tier_2_qty, mid, entry_price).await;
        }

        // Rule 4c: plain profit target (scale-out disabled or single-lot).
        if (!self.config.scale_out_enabled || trade.entry_quantity == 1) && !trade.scaled_out && gain_pct >= self.config.profit_target_percent {
            return self.full_exit(trade, ExitReason::ProfitTarget).await;
        }

        // Rule 5: trailing stop.
        let hwm = trade.highest_price_seen.unwrap_or(mid);
        if hwm > entry_price {
            let trail_pct = if trade.scaled_out { self.config.trailing_stop_after_scale_out_percent } else { self.config.trailing_stop_percent };
            if mid <= hwm * (1.0 - trail_pct / 100.0) {
                return self.full_exit(trade, ExitReason::TrailingStop).await;
            }
        }

        if let Some(action) = breakeven_action {
            return Ok(action);
        }

        trade.updated_at = now;
        self.store.update_trade(trade.clone()).await?;
        Ok(ExitAction::None)
    }

    async fn maybe_promote_breakeven(&self, trade: &mut Trade, entry_price: f64) -> Result<Option<ExitAction>> {
        if trade.breakeven_stop_applied {
            return Ok(None);
        }
        let trigger = entry_price * (1.0 + self.config.breakeven_trigger_percent / 100.0);
        if trade.highest_price_seen.unwrap_or(0.0) < trigger {
            return Ok(None);
        }

        if let Some(existing_stop) = trade.stop_loss_order_id.take() {
            self.broker.cancel_order(&existing_stop).await.ok();
            self.store.insert_event(TradeEvent::new(trade.id, TradeEventKind::StopLossCancelled, "cancelled for breakeven promotion")).await?;
        }

        let remaining = trade.remaining_quantity();
        let order_id = self.broker.place_order(OrderRequest::stop_sell(trade.option_symbol.clone(), remaining, entry_price)).await?;
        trade.stop_loss_order_id = Some(order_id);
        trade.stop_loss_price = Some(entry_price);
        trade.breakeven_stop_applied = true;
        trade.status = TradeStatus::StopLossPlaced;
        self.store
            .insert_event(TradeEvent::new(trade.id, TradeEventKind::BreakevenStopMoved, format!("stop moved to breakeven @ {entry_price:.2}")))
            .await?;
        Ok(Some(ExitAction::BreakevenMoved))
    }

    async fn scale_out(&self, trade: &mut Trade, tier: i64, tier_qty: i64, mid: f64, entry_price: f64) -> Result<ExitAction> {
        let remaining = trade.remaining_quantity();
        let sell_qty = tier_qty.min(remaining - 1).max(1);

        let order_id = self.broker.place_order(OrderRequest::market_sell(trade.option_symbol.clone(), sell_qty)).await?;
        let report = self.broker.get_order_status(&order_id).await?;
        let fill_price = report.fill_price().unwrap_or(mid);

        let prior_scaled_qty = trade.scaled_out_quantity;
        let prior_scaled_price = trade.scaled_out_price.unwrap_or(fill_price);
        let new_total = prior_scaled_qty + sell_qty;
        trade.scaled_out_price = Some((prior_scaled_price * prior_scaled_qty as f64 + fill_price * sell_qty as f64) / new_total as f64);
        trade.scaled_out_quantity = new_total;
        trade.scaled_out = true;
        trade.scale_out_count = tier;

        self.store
            .insert_event(TradeEvent::new(trade.id, TradeEventKind::ScaleOut, format!("tier {tier}: sold {sell_qty} @ {fill_price:.2}")))
            .await?;

        if !trade.breakeven_stop_applied {
            self.maybe_promote_breakeven(trade, entry_price).await?;
        } else if let Some(existing_stop) = trade.stop_loss_order_id.take() {
            self.broker.cancel_order(&existing_stop).await.ok();
            let remaining_after = trade.remaining_quantity();
            let stop_price = trade.stop_loss_price.unwrap_or(entry_price);
            let new_order = self.broker.place_order(OrderRequest::stop_sell(trade.option_symbol.clone(), remaining_after, stop_price)).await?;
            trade.stop_loss_order_id = Some(new_order);
        }

        trade.updated_at = Utc::now();
        self.store.update_trade(trade.clone()).await?;
        Ok(ExitAction::ScaleOut { tier, quantity: sell_qty, order_id })
    }

    async fn full_exit(&self, trade: &mut Trade, reason: ExitReason) -> Result<ExitAction> {
        let remaining = trade.remaining_quantity();
        let order_id = self.broker.place_order(OrderRequest::market_sell(trade.option_symbol.clone(), remaining)).await?;

        trade.exit_order_id = Some(order_id.clone());
        trade.exit_reason = Some(reason);
        trade.status = TradeStatus::Exiting;
        trade.updated_at = Utc::now();
        self.store.update_trade(trade.clone()).await?;
        self.store
            .insert_event(TradeEvent::new(trade.id, TradeEventKind::ExitTriggered, format!("exit triggered: {reason:?}")))
            .await?;
        self.store.insert_event(TradeEvent::new(trade.id, TradeEventKind::ExitOrderPlaced, format!("market sell {remaining}"))).await?;
        Ok(ExitAction::FullExit { reason, order_id })
    }

    /// Polls an EXITING trade's exit order; on fill, computes PnL and closes it.
    pub async fn poll_exit_fill(&self, trade: &mut Trade) -> Result<bool> {
        if trade.status != TradeStatus::Exiting {
            return Ok(false);
        }
        let order_id = trade.exit_order_id.clone().expect("exiting trade always has an exit order id");
        let report = self.broker.get_order_status(&order_id).await?;
        if report.status != crate::broker::OrderStatus::Filled {
            return Ok(false);
        }

        let fill_price = report.fill_price().unwrap_or(0.0);
        let (pnl_dollars, pnl_percent) = trade.compute_pnl(fill_price);
        trade.exit_price = Some(fill_price);
        trade.exit_filled_at = Some(Utc::now());
        trade.pnl_dollars = Some(pnl_dollars);
        trade.pnl_percent = Some(pnl_percent);
        trade.status = TradeStatus::Closed;
        trade.updated_at = Utc::now();
        self.store.update_trade(trade.clone()).await?;
        self.store
            .insert_event(TradeEvent::new(trade.id, TradeEventKind::ExitFilled, format!("closed @ {fill_price:.2}, pnl ${pnl_dollars:.2}")))
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::store::InMemoryStore;

    fn sample_trade() -> Trade {
        Trade {
            id: 0,
            trade_date: Utc::now().date_naive(),
            direction: crate::domain::TradeDirection::Call,
            option_symbol: "SPY_Call_600".into(),
            strike_price: 600.0,
            expiration_date: Utc::now().date_naive(),
            entry_order_id: None,
            entry_price: Some(1.0),
            entry_quantity: 4,
            entry_filled_at: Some(Utc::now()),
            alert_option_price: None,
            entry_is_fallback: false,
            stop_loss_order_id: Some("stop-1".into()),
            stop_loss_price: Some(0.84),
            trailing_stop_price: None,
            highest_price_seen: Some(1.0),
            breakeven_stop_applied: false,
            scaled_out: false,
            scaled_out_quantity: 0,
            scaled_out_price: None,
            scaled_out_order_id: None,
            scale_out_count: 0,
            exit_order_id: None,
            exit_price: None,
            exit_filled_at: None,
            exit_reason: None,
            pnl_dollars: None,
            pnl_percent: None,
            status: TradeStatus::StopLossPlaced,
            source: "tradingview".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn profit_target_triggers_full_exit_when_scale_out_disabled() {
        let broker = PaperBroker::new(600.0, 15.0);
        let store = InMemoryStore::new();
        let mut config = Config::from_env();
        config.scale_out_enabled = false;
        config.profit_target_percent = 0.01;
        let engine = ExitEngine::new(&broker, &store, &config);

        let mut trade = sample_trade();
        trade.entry_price = Some(0.01);
        let action = engine.evaluate(&mut trade).await.unwrap();
        match action {
            ExitAction::FullExit { reason, .. } => assert_eq!(reason, ExitReason::ProfitTarget),
            other => panic!("expected full exit, got {other:?}"),
        }
        assert_eq!(trade.status, TradeStatus::Exiting);
    }

    #[tokio::test]
    async fn non_eligible_status_is_a_no_op() {
        let broker = PaperBroker::new(600.0, 15.0);
        let store = InMemoryStore::new();
        let config = Config::from_env();
        let engine = ExitEngine::new(&broker, &store, &config);
        let mut trade = sample_trade();
        trade.status = TradeStatus::Pending;
        let action = engine.evaluate(&mut trade).await.unwrap();
        assert_eq!(action, ExitAction::None);
    }
}
