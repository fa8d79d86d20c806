use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeDirection {
    Call,
    Put,
}

impl TradeDirection {
    pub fn opposite(&self) -> Self {
        match self {
            TradeDirection::Call => TradeDirection::Put,
            TradeDirection::Put => TradeDirection::Call,
        }
    }
}

/// See the trade state-machine diagram: FILLED and STOP_LOSS_PLACED oscillate
/// as the stop is cancelled and re-placed; EXITING is entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Init,
    Pending,
    Filled,
    StopLossPlaced,
    Exiting,
    Closed,
    Cancelled,
    Error,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Closed | TradeStatus::Cancelled | TradeStatus::Error)
    }

    /// Statuses the exit engine is allowed to evaluate.
    pub fn is_exit_eligible(&self) -> bool {
        matches!(self, TradeStatus::Filled | TradeStatus::StopLossPlaced)
    }

    /// Statuses that count as "an open position" for admission purposes.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TradeStatus::Filled | TradeStatus::StopLossPlaced | TradeStatus::Exiting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    ProfitTarget,
    MaxHoldTime,
    TimeBased,
    Manual,
    Signal,
    Expiry,
}

/// One position lifecycle, from entry-limit submission through final exit fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Id,
    pub trade_date: NaiveDate,
    pub direction: TradeDirection,
    pub option_symbol: String,
    pub strike_price: f64,
    pub expiration_date: NaiveDate,

    // Entry
    pub entry_order_id: Option<String>,
    pub entry_price: Option<f64>,
    pub entry_quantity: i64,
    pub entry_filled_at: Option<DateTime<Utc>>,
    pub alert_option_price: Option<f64>,
    pub entry_is_fallback: bool,

    // Stop-loss
    pub stop_loss_order_id: Option<String>,
    pub stop_loss_price: Option<f64>,

    // Trailing stop / high-water mark
    pub trailing_stop_price: Option<f64>,
    pub highest_price_seen: Option<f64>,

    // Breakeven
    pub breakeven_stop_applied: bool,

    // Scale-out
    pub scaled_out: bool,
    pub scaled_out_quantity: i64,
    pub scaled_out_price: Option<f64>,
    pub scaled_out_order_id: Option<String>,
    pub scale_out_count: i64,

    // Exit
    pub exit_order_id: Option<String>,
    pub exit_price: Option<f64>,
    pub exit_filled_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,

    // PnL
    pub pnl_dollars: Option<f64>,
    pub pnl_percent: Option<f64>,

    pub status: TradeStatus,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Contracts still held and unprotected-by-scale-out, i.e. the quantity any
    /// further stop / exit order must cover.
    pub fn remaining_quantity(&self) -> i64 {
        self.entry_quantity - self.scaled_out_quantity
    }

    pub fn gain_percent(&self, mid: f64) -> Option<f64> {
        self.entry_price
            .filter(|p| *p > 0.0)
            .map(|entry| (mid - entry) / entry * 100.0)
    }

    /// Quantity-weighted realized PnL: remaining contracts at the final exit
    /// price plus each scale-out tranche at its own average fill.
    pub fn compute_pnl(&self, exit_price: f64) -> (f64, f64) {
        let remaining = self.remaining_quantity();
        let remaining_pnl = (exit_price - self.entry_price.unwrap_or(0.0)) * remaining as f64 * 100.0;
        let scale_out_pnl = if self.scaled_out {
            (self.scaled_out_price.unwrap_or(0.0) - self.entry_price.unwrap_or(0.0))
                * self.scaled_out_quantity as f64
                * 100.0
        } else {
            0.0
        };
        let pnl_dollars = remaining_pnl + scale_out_pnl;
        let basis = self.entry_price.unwrap_or(0.0) * self.entry_quantity as f64 * 100.0;
        let pnl_percent = if basis.abs() > f64::EPSILON { pnl_dollars / basis * 100.0 } else { 0.0 };
        (pnl_dollars, pnl_percent)
    }
}
