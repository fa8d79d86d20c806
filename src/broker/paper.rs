use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::TradeDirection;
use crate::error::{Result, TradingError};
use crate::pricing::black_scholes;

use super::{Bar, BrokerAdapter, ChainContract, OptionChain, OrderFill, OrderRequest, OrderStatus, OrderStatusReport, OrderType, Quote};

#[derive(Debug, Clone)]
struct TrackedOrder {
    request: OrderRequest,
    status: OrderStatus,
    fill_price: Option<f64>,
}

/// Fills every order immediately at its requested price (limit/stop orders)
/// or at a synthetic mid (market orders), the way the teacher's executor
/// tracks fake orders under `dry_run` instead of calling out to a real venue.
pub struct PaperBroker {
    underlying_price: f64,
    vix: f64,
    orders: Arc<RwLock<HashMap<String, TrackedOrder>>>,
}

impl PaperBroker {
    pub fn new(underlying_price: f64, vix: f64) -> Self {
        Self {
            underlying_price,
            vix,
            orders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn set_underlying_price(&mut self, price: f64) {
        self.underlying_price = price;
    }

    fn synth_quote(&self, strike: f64, direction: TradeDirection) -> Quote {
        let price = black_scholes(self.underlying_price, strike, 6.5 / (24.0 * 252.0), self.vix / 100.0, direction);
        let half_spread = (price.price * 0.04).max(0.01);
        Quote {
            bid: (price.price - half_spread).max(0.01),
            ask: price.price + half_spread,
            last: price.price,
        }
    }

    fn parse_strike_from_symbol(symbol: &str) -> f64 {
        symbol
            .split('_')
            .last()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(self_underlying_fallback())
    }
}

fn self_underlying_fallback() -> f64 {
    0.0
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn get_option_chain(&self, symbol: &str, direction: TradeDirection, strike_count: usize) -> Result<OptionChain> {
        let atm = (self.underlying_price).round();
        let mut contracts = Vec::with_capacity(strike_count * 2 + 1);
        let half = strike_count as i64 / 2;
        for offset in -half..=half {
            let strike = atm + offset as f64;
            if strike <= 0.0 {
                continue;
            }
            let quote = self.synth_quote(strike, direction);
            let price = black_scholes(self.underlying_price, strike, 6.5 / (24.0 * 252.0), self.vix / 100.0, direction);
            contracts.push(ChainContract {
                option_symbol: format!("{symbol}_{direction:?}_{strike}"),
                strike,
                bid: quote.bid,
                ask: quote.ask,
                delta: price.delta,
                open_interest: Some(500),
                volume: Some(100),
            });
        }
        Ok(OptionChain {
            underlying_price: self.underlying_price,
            expiration: Utc::now().date_naive(),
            contracts,
        })
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let strike = Self::parse_strike_from_symbol(symbol);
        let direction = if symbol.contains("Put") { TradeDirection::Put } else { TradeDirection::Call };
        if strike <= 0.0 {
            return Ok(Quote { bid: self.underlying_price, ask: self.underlying_price, last: self.underlying_price });
        }
        Ok(self.synth_quote(strike, direction))
    }

    async fn get_price_history(&self, _symbol: &str, _frequency_minutes: i64, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<Bar>> {
        Ok(Vec::new())
    }

    async fn place_order(&self, order: OrderRequest) -> Result<String> {
        let order_id = format!("paper-{}", Uuid::new_v4());
        let fill_price = match order.order_type {
            OrderType::Market => order.price.unwrap_or(self.underlying_price),
            OrderType::Limit => order.price.ok_or_else(|| TradingError::Broker("limit order missing price".into()))?,
            OrderType::Stop => order.stop_price.ok_or_else(|| TradingError::Broker("stop order missing stop_price".into()))?,
        };
        self.orders.write().await.insert(
            order_id.clone(),
            TrackedOrder { request: order, status: OrderStatus::Filled, fill_price: Some(fill_price) },
        );
        Ok(order_id)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport> {
        let orders = self.orders.read().await;
        let tracked = orders.get(order_id).ok_or_else(|| TradingError::Broker(format!("unknown order {order_id}")))?;
        let fills = match tracked.fill_price {
            Some(price) => vec![OrderFill { price, quantity: tracked.request.quantity }],
            None => Vec::new(),
        };
        Ok(OrderStatusReport { status: tracked.status, fills })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut orders = self.orders.write().await;
        if let Some(tracked) = orders.get_mut(order_id) {
            tracked.status = OrderStatus::Canceled;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limit_order_fills_at_its_price() {
        let broker = PaperBroker::new(600.0, 15.0);
        let order_id = broker.place_order(OrderRequest::limit_buy("SPY_Call_601", 2, 1.47)).await.unwrap();
        let status = broker.get_order_status(&order_id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Filled);
        assert_eq!(status.fill_price(), Some(1.47));
    }

    #[tokio::test]
    async fn cancel_marks_order_canceled() {
        let broker = PaperBroker::new(600.0, 15.0);
        let order_id = broker.place_order(OrderRequest::stop_sell("SPY_Call_601", 2, 1.30)).await.unwrap();
        broker.cancel_order(&order_id).await.unwrap();
        let status = broker.get_order_status(&order_id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn option_chain_centers_on_underlying() {
        let broker = PaperBroker::new(600.0, 15.0);
        let chain = broker.get_option_chain("SPY", TradeDirection::Call, 10).await.unwrap();
        assert!(!chain.contracts.is_empty());
        assert!(chain.contracts.iter().any(|c| (c.strike - 600.0).abs() < 1e-9));
    }
}
