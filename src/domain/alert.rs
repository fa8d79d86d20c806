use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::TradeDirection;
use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Received,
    Accepted,
    Rejected,
    Processed,
    Error,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Rejected | AlertStatus::Processed | AlertStatus::Error)
    }
}

/// Action requested by an inbound signal. `Close` carries no direction of its own;
/// it asks the admission controller to flatten whatever is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertAction {
    BuyCall,
    BuyPut,
    Close,
}

impl AlertAction {
    pub fn direction(&self) -> Option<TradeDirection> {
        match self {
            AlertAction::BuyCall => Some(TradeDirection::Call),
            AlertAction::BuyPut => Some(TradeDirection::Put),
            AlertAction::Close => None,
        }
    }
}

/// One inbound signal event, immutable once `status` reaches a terminal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Id,
    pub received_at: DateTime<Utc>,
    pub raw_payload: String,
    pub ticker: String,
    pub action: AlertAction,
    pub direction: Option<TradeDirection>,
    pub signal_price: Option<f64>,
    pub source: String,
    pub status: AlertStatus,
    pub rejection_reason: Option<String>,
    pub trade_id: Option<Id>,
}

impl Alert {
    pub fn new(ticker: String, action: AlertAction, signal_price: Option<f64>, source: String, raw_payload: String) -> Self {
        Self {
            id: 0,
            received_at: Utc::now(),
            raw_payload,
            ticker,
            direction: action.direction(),
            action,
            signal_price,
            source,
            status: AlertStatus::Received,
            rejection_reason: None,
            trade_id: None,
        }
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.status = AlertStatus::Rejected;
        self.rejection_reason = Some(reason.into());
    }
}
