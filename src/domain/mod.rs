pub mod alert;
pub mod event;
pub mod trade;

pub use alert::{Alert, AlertStatus};
pub use event::{DailySummary, OptionChainContract, OptionChainSnapshot, PriceSnapshot, TradeEvent, TradeEventKind};
pub use trade::{ExitReason, Trade, TradeDirection, TradeStatus};

pub type Id = i64;
