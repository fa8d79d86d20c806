use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::trade::TradeDirection;
use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeEventKind {
    AlertReceived,
    ContractSelected,
    EntryOrderPlaced,
    EntryFilled,
    EntryCancelled,
    StopLossPlaced,
    StopLossCancelled,
    ExitTriggered,
    ExitOrderPlaced,
    ExitFilled,
    StopLossHit,
    CloseSignal,
    ManualClose,
    ScaleOut,
    BreakevenStopMoved,
    EntryLimitTimeout,
}

/// Append-only audit entry for a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub id: Id,
    pub trade_id: Id,
    pub timestamp: DateTime<Utc>,
    pub kind: TradeEventKind,
    pub message: String,
    pub details: Option<Value>,
}

impl TradeEvent {
    pub fn new(trade_id: Id, kind: TradeEventKind, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            trade_id,
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Append-only tick-level record of an open trade's observed mid and high-water mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: Id,
    pub trade_id: Id,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub highest_price_seen: f64,
}

/// One row per trading day, computed at session close.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailySummary {
    pub trade_date: Option<NaiveDate>,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub total_pnl: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub win_rate: f64,
    pub avg_hold_time_minutes: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    pub id: Id,
    pub snapshot_date: NaiveDate,
    pub snapshot_time: DateTime<Utc>,
    pub underlying_symbol: String,
    pub underlying_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChainContract {
    pub id: Id,
    pub snapshot_id: Id,
    pub option_symbol: String,
    pub contract_type: TradeDirection,
    pub strike_price: f64,
    pub expiration_date: NaiveDate,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub delta: Option<f64>,
    pub open_interest: Option<i64>,
    pub volume: Option<i64>,
}
