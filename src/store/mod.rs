pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{Alert, DailySummary, Id, PriceSnapshot, Trade, TradeDirection, TradeEvent, TradeStatus};
use crate::error::Result;

pub use memory::InMemoryStore;

/// Repository boundary for every persisted entity. The shipped
/// `InMemoryStore` satisfies this with in-process maps and auxiliary indices;
/// a SQL-backed implementation would satisfy the same contract.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_alert(&self, alert: Alert) -> Result<Alert>;
    async fn update_alert(&self, alert: Alert) -> Result<()>;
    async fn get_alert(&self, id: Id) -> Result<Option<Alert>>;
    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>>;

    async fn insert_trade(&self, trade: Trade) -> Result<Trade>;
    async fn update_trade(&self, trade: Trade) -> Result<()>;
    async fn get_trade(&self, id: Id) -> Result<Option<Trade>>;
    async fn trades_on_date(&self, date: NaiveDate) -> Result<Vec<Trade>>;
    async fn active_trade(&self, direction: Option<TradeDirection>) -> Result<Option<Trade>>;
    async fn trades_with_status(&self, statuses: &[TradeStatus]) -> Result<Vec<Trade>>;
    async fn recently_created_trades(&self, since: DateTime<Utc>) -> Result<Vec<Trade>>;
    async fn recently_closed_trades(&self, date: NaiveDate) -> Result<Vec<Trade>>;

    async fn insert_event(&self, event: TradeEvent) -> Result<TradeEvent>;
    async fn events_for_trade(&self, trade_id: Id) -> Result<Vec<TradeEvent>>;

    async fn insert_snapshot(&self, snapshot: PriceSnapshot) -> Result<PriceSnapshot>;
    async fn snapshots_for_trade(&self, trade_id: Id) -> Result<Vec<PriceSnapshot>>;

    async fn upsert_daily_summary(&self, date: NaiveDate, summary: DailySummary) -> Result<()>;
    async fn get_daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>>;
}
