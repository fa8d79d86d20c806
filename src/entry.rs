use chrono::Utc;

use crate::broker::{BrokerAdapter, OrderRequest, OrderStatus};
use crate::config::Config;
use crate::domain::{Alert, Trade, TradeEvent, TradeEventKind, TradeStatus};
use crate::error::Result;
use crate::selector::SelectedContract;
use crate::store::Store;

/// Places the entry limit order, then (via repeated `poll_entry_fill` calls
/// from the scheduler) waits for a fill or a timeout cancellation, and arms
/// the stop-loss the moment an entry fills.
pub struct EntryManager<'a> {
    broker: &'a dyn BrokerAdapter,
    store: &'a dyn Store,
    config: &'a Config,
}

impl<'a> EntryManager<'a> {
    pub fn new(broker: &'a dyn BrokerAdapter, store: &'a dyn Store, config: &'a Config) -> Self {
        Self { broker, store, config }
    }

    /// Submits the entry limit order below the ask by `entry_limit_below_percent`
    /// and creates the PENDING trade row.
    pub async fn submit_entry(&self, alert: &Alert, contract: &SelectedContract, quantity: i64) -> Result<Trade> {
        let limit_price = contract.ask * (1.0 - self.config.entry_limit_below_percent / 100.0);
        let order_id = self
            .broker
            .place_order(OrderRequest::limit_buy(contract.option_symbol.clone(), quantity, limit_price))
            .await?;

        let now = Utc::now();
        let trade = Trade {
            id: 0,
            trade_date: now.date_naive(),
            direction: alert.direction.expect("entry alert always carries a direction"),
            option_symbol: contract.option_symbol.clone(),
            strike_price: contract.strike,
            expiration_date: now.date_naive(),
            entry_order_id: Some(order_id),
            entry_price: None,
            entry_quantity: quantity,
            entry_filled_at: None,
            alert_option_price: Some(contract.mid),
            entry_is_fallback: false,
            stop_loss_order_id: None,
            stop_loss_price: None,
            trailing_stop_price: None,
            highest_price_seen: None,
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
            status: TradeStatus::Pending,
            source: alert.source.clone(),
            created_at: now,
            updated_at: now,
        };

        let trade = self.store.insert_trade(trade).await?;
        self.store
            .insert_event(TradeEvent::new(trade.id, TradeEventKind::EntryOrderPlaced, format!("limit buy {quantity} @ {limit_price:.2}")))
            .await?;
        Ok(trade)
    }

    /// One polling step for a PENDING trade. Returns `true` if the trade's
    /// status changed (filled, cancelled, or timed out) and was persisted.
    pub async fn poll_entry_fill(&self, trade: &mut Trade) -> Result<bool> {
        if trade.status != TradeStatus::Pending {
            return Ok(false);
        }
        let order_id = trade.entry_order_id.clone().expect("pending trade always has an entry order id");
        let report = self.broker.get_order_status(&order_id).await?;

        match report.status {
            OrderStatus::Filled => {
                let fill_price = report.fill_price().unwrap_or(trade.alert_option_price.unwrap_or(0.0));
                trade.entry_price = Some(fill_price);
                trade.entry_filled_at = Some(Utc::now());
                trade.highest_price_seen = Some(fill_price);
                trade.status = TradeStatus::Filled;
                trade.updated_at = Utc::now();
                self.store.update_trade(trade.clone()).await?;
                self.store
                    .insert_event(TradeEvent::new(trade.id, TradeEventKind::EntryFilled, format!("filled @ {fill_price:.2}")))
                    .await?;

                self.arm_stop_loss(trade).await?;
                Ok(true)
            }
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired => {
                trade.status = TradeStatus::Cancelled;
                trade.updated_at = Utc::now();
                self.store.update_trade(trade.clone()).await?;
                self.store
                    .insert_event(TradeEvent::new(trade.id, TradeEventKind::EntryCancelled, "entry order cancelled by broker"))
                    .await?;
                Ok(true)
            }
            OrderStatus::Working => {
                let timeout = chrono::Duration::milliseconds((self.config.entry_limit_timeout_minutes * 60_000.0) as i64);
                if Utc::now() - trade.created_at >= timeout {
                    self.broker.cancel_order(&order_id).await?;
                    trade.status = TradeStatus::Cancelled;
                    trade.updated_at = Utc::now();
                    self.store.update_trade(trade.clone()).await?;
                    self.store
                        .insert_event(TradeEvent::new(trade.id, TradeEventKind::EntryLimitTimeout, "entry limit timed out, cancelled"))
                        .await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn arm_stop_loss(&self, trade: &mut Trade) -> Result<()> {
        let entry_price = trade.entry_price.expect("stop-loss is armed only after a fill");
        let stop_price = entry_price * (1.0 - self.config.stop_loss_percent / 100.0);
        let order_id = self
            .broker
            .place_order(OrderRequest::stop_sell(trade.option_symbol.clone(), trade.entry_quantity, stop_price))
            .await?;

        trade.stop_loss_order_id = Some(order_id);
        trade.stop_loss_price = Some(stop_price);
        trade.status = TradeStatus::StopLossPlaced;
        trade.updated_at = Utc::now();
        self.store.update_trade(trade.clone()).await?;
        self.store
            .insert_event(TradeEvent::new(trade.id, TradeEventKind::StopLossPlaced, format!("stop @ {stop_price:.2}")))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::domain::{AlertAction, TradeDirection};
    use crate::store::InMemoryStore;

    fn contract() -> SelectedContract {
        SelectedContract { option_symbol: "SPY260302C00600000".into(), strike: 600.0, bid: 1.40, ask: 1.50, mid: 1.45, delta: 0.42 }
    }

    #[tokio::test]
    async fn entry_fills_and_arms_stop_loss() {
        let broker = PaperBroker::new(600.0, 15.0);
        let store = InMemoryStore::new();
        let config = Config::from_env();
        let manager = EntryManager::new(&broker, &store, &config);

        let alert = Alert::new("SPY".into(), AlertAction::BuyCall, Some(600.0), "tradingview".into(), "{}".into());
        let mut trade = manager.submit_entry(&alert, &contract(), 2).await.unwrap();
        assert_eq!(trade.status, TradeStatus::Pending);

        let changed = manager.poll_entry_fill(&mut trade).await.unwrap();
        assert!(changed);
        assert_eq!(trade.status, TradeStatus::StopLossPlaced);
        assert!(trade.stop_loss_price.unwrap() < trade.entry_price.unwrap());
        assert_eq!(trade.direction, TradeDirection::Call);
    }
}
