pub mod paper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TradeDirection;
use crate::error::Result;

pub use paper::PaperBroker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Working,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    BuyToOpen,
    SellToClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Stop,
}

/// Wire-level order payload: session=NORMAL, duration=DAY, strategy=SINGLE are
/// implicit constants of the single-leg orders this system places.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub option_symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: i64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
}

impl OrderRequest {
    pub fn limit_buy(option_symbol: impl Into<String>, quantity: i64, price: f64) -> Self {
        Self {
            option_symbol: option_symbol.into(),
            side: OrderSide::BuyToOpen,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
        }
    }

    pub fn market_sell(option_symbol: impl Into<String>, quantity: i64) -> Self {
        Self {
            option_symbol: option_symbol.into(),
            side: OrderSide::SellToClose,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
        }
    }

    pub fn limit_sell(option_symbol: impl Into<String>, quantity: i64, price: f64) -> Self {
        Self {
            option_symbol: option_symbol.into(),
            side: OrderSide::SellToClose,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
        }
    }

    pub fn stop_sell(option_symbol: impl Into<String>, quantity: i64, stop_price: f64) -> Self {
        Self {
            option_symbol: option_symbol.into(),
            side: OrderSide::SellToClose,
            order_type: OrderType::Stop,
            quantity,
            price: None,
            stop_price: Some(stop_price),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub status: OrderStatus,
    pub fills: Vec<OrderFill>,
}

impl OrderStatusReport {
    pub fn fill_price(&self) -> Option<f64> {
        self.fills.first().map(|f| f.price)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
}

impl Quote {
    /// Bid/ask midpoint; falls back to last when either side is non-positive.
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainContract {
    pub option_symbol: String,
    pub strike: f64,
    pub bid: f64,
    pub ask: f64,
    pub delta: f64,
    pub open_interest: Option<i64>,
    pub volume: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying_price: f64,
    pub expiration: chrono::NaiveDate,
    pub contracts: Vec<ChainContract>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Abstract brokerage boundary: order lifecycle, quotes, option chain, and
/// historical bars. A real brokerage client and the shipped paper adapter both
/// satisfy this trait identically from the caller's point of view.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn get_option_chain(
        &self,
        symbol: &str,
        direction: TradeDirection,
        strike_count: usize,
    ) -> Result<OptionChain>;

    async fn get_quote(&self, symbol: &str) -> Result<Quote>;

    async fn get_price_history(
        &self,
        symbol: &str,
        frequency_minutes: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    async fn place_order(&self, order: OrderRequest) -> Result<String>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;
}
