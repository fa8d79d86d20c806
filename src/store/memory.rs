use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::domain::{Alert, DailySummary, Id, PriceSnapshot, Trade, TradeDirection, TradeEvent, TradeStatus};
use crate::error::Result;

use super::Store;

#[derive(Default)]
struct Tables {
    alerts: HashMap<Id, Alert>,
    trades: HashMap<Id, Trade>,
    events: HashMap<Id, TradeEvent>,
    snapshots: HashMap<Id, PriceSnapshot>,
    daily_summaries: HashMap<NaiveDate, DailySummary>,
}

/// In-process repository backed by `RwLock<HashMap<...>>`, satisfying the
/// same index requirements (`(trade_id, timestamp)`, `trade_date`) a SQL
/// table would via linear scans over small per-process working sets.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    next_alert_id: AtomicI64,
    next_trade_id: AtomicI64,
    next_event_id: AtomicI64,
    next_snapshot_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            next_alert_id: AtomicI64::new(1),
            next_trade_id: AtomicI64::new(1),
            next_event_id: AtomicI64::new(1),
            next_snapshot_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_alert(&self, mut alert: Alert) -> Result<Alert> {
        alert.id = self.next_alert_id.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        tables.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    async fn update_alert(&self, alert: Alert) -> Result<()> {
        self.tables.write().await.alerts.insert(alert.id, alert);
        Ok(())
    }

    async fn get_alert(&self, id: Id) -> Result<Option<Alert>> {
        Ok(self.tables.read().await.alerts.get(&id).cloned())
    }

    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut alerts: Vec<Alert> = tables.alerts.values().filter(|a| a.received_at >= since).cloned().collect();
        alerts.sort_by_key(|a| a.received_at);
        Ok(alerts)
    }

    async fn insert_trade(&self, mut trade: Trade) -> Result<Trade> {
        trade.id = self.next_trade_id.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        tables.trades.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn update_trade(&self, trade: Trade) -> Result<()> {
        self.tables.write().await.trades.insert(trade.id, trade);
        Ok(())
    }

    async fn get_trade(&self, id: Id) -> Result<Option<Trade>> {
        Ok(self.tables.read().await.trades.get(&id).cloned())
    }

    async fn trades_on_date(&self, date: NaiveDate) -> Result<Vec<Trade>> {
        let tables = self.tables.read().await;
        let mut trades: Vec<Trade> = tables.trades.values().filter(|t| t.trade_date == date).cloned().collect();
        trades.sort_by_key(|t| t.id);
        Ok(trades)
    }

    async fn active_trade(&self, direction: Option<TradeDirection>) -> Result<Option<Trade>> {
        let tables = self.tables.read().await;
        let mut candidates: Vec<&Trade> = tables
            .trades
            .values()
            .filter(|t| t.status.is_active() && direction.map(|d| d == t.direction).unwrap_or(true))
            .collect();
        candidates.sort_by_key(|t| t.id);
        Ok(candidates.last().map(|t| (*t).clone()))
    }

    async fn trades_with_status(&self, statuses: &[TradeStatus]) -> Result<Vec<Trade>> {
        let tables = self.tables.read().await;
        let mut trades: Vec<Trade> = tables.trades.values().filter(|t| statuses.contains(&t.status)).cloned().collect();
        trades.sort_by_key(|t| t.id);
        Ok(trades)
    }

    async fn recently_created_trades(&self, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        let tables = self.tables.read().await;
        let trades: Vec<Trade> = tables
            .trades
            .values()
            .filter(|t| t.created_at >= since && t.status != TradeStatus::Cancelled)
            .cloned()
            .collect();
        Ok(trades)
    }

    async fn recently_closed_trades(&self, date: NaiveDate) -> Result<Vec<Trade>> {
        let tables = self.tables.read().await;
        let mut trades: Vec<Trade> = tables
            .trades
            .values()
            .filter(|t| t.trade_date == date && t.status == TradeStatus::Closed)
            .cloned()
            .collect();
        trades.sort_by_key(|t| std::cmp::Reverse(t.exit_filled_at.unwrap_or(t.created_at)));
        Ok(trades)
    }

    async fn insert_event(&self, mut event: TradeEvent) -> Result<TradeEvent> {
        event.id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn events_for_trade(&self, trade_id: Id) -> Result<Vec<TradeEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<TradeEvent> = tables.events.values().filter(|e| e.trade_id == trade_id).cloned().collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn insert_snapshot(&self, mut snapshot: PriceSnapshot) -> Result<PriceSnapshot> {
        snapshot.id = self.next_snapshot_id.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        tables.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    async fn snapshots_for_trade(&self, trade_id: Id) -> Result<Vec<PriceSnapshot>> {
        let tables = self.tables.read().await;
        let mut snapshots: Vec<PriceSnapshot> = tables.snapshots.values().filter(|s| s.trade_id == trade_id).cloned().collect();
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }

    async fn upsert_daily_summary(&self, date: NaiveDate, summary: DailySummary) -> Result<()> {
        self.tables.write().await.daily_summaries.insert(date, summary);
        Ok(())
    }

    async fn get_daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>> {
        Ok(self.tables.read().await.daily_summaries.get(&date).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertAction, TradeStatus};

    fn sample_trade(direction: TradeDirection, status: TradeStatus) -> Trade {
        Trade {
            id: 0,
            trade_date: Utc::now().date_naive(),
            direction,
            option_symbol: "SPY_Call_600".into(),
            strike_price: 600.0,
            expiration_date: Utc::now().date_naive(),
            entry_order_id: None,
            entry_price: Some(1.5),
            entry_quantity: 2,
            entry_filled_at: Some(Utc::now()),
            alert_option_price: None,
            entry_is_fallback: false,
            stop_loss_order_id: None,
            stop_loss_price: None,
            trailing_stop_price: None,
            highest_price_seen: Some(1.5),
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
            status,
            source: "tradingview".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_monotonic_ids() {
        let store = InMemoryStore::new();
        let a = store.insert_trade(sample_trade(TradeDirection::Call, TradeStatus::Filled)).await.unwrap();
        let b = store.insert_trade(sample_trade(TradeDirection::Put, TradeStatus::Filled)).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn active_trade_filters_by_direction() {
        let store = InMemoryStore::new();
        store.insert_trade(sample_trade(TradeDirection::Call, TradeStatus::StopLossPlaced)).await.unwrap();
        let active_put = store.active_trade(Some(TradeDirection::Put)).await.unwrap();
        let active_call = store.active_trade(Some(TradeDirection::Call)).await.unwrap();
        assert!(active_put.is_none());
        assert!(active_call.is_some());
    }

    #[tokio::test]
    async fn alert_round_trips_rejection_reason() {
        let store = InMemoryStore::new();
        let mut alert = store
            .insert_alert(Alert::new("SPY".into(), AlertAction::BuyCall, Some(600.0), "tradingview".into(), "{}".into()))
            .await
            .unwrap();
        alert.reject("Duplicate alert");
        store.update_alert(alert.clone()).await.unwrap();
        let reloaded = store.get_alert(alert.id).await.unwrap().unwrap();
        assert_eq!(reloaded.rejection_reason.as_deref(), Some("Duplicate alert"));
    }
}
