use chrono::{DateTime, NaiveTime, Utc};

use crate::broker::{BrokerAdapter, OrderRequest};
use crate::config::Config;
use crate::domain::{Alert, AlertAction, ExitReason, TradeEvent, TradeEventKind, TradeStatus};
use crate::error::Result;
use crate::store::Store;

/// Sources whose closed trades count toward the consecutive-loss pause.
/// Manual/test-driven closes (e.g. the HTTP `/trades/{id}/close` action)
/// never trip it.
const SIGNAL_SOURCES: [&str; 2] = ["tradingview", "strategy_poller"];

const MORNING_START: (u32, u32) = (9, 45);
const MORNING_END: (u32, u32) = (11, 15);
const AFTERNOON_START: (u32, u32) = (12, 45);
const AFTERNOON_END: (u32, u32) = (14, 50);

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn in_trading_window(now: DateTime<Utc>, afternoon_enabled: bool) -> bool {
    let t = crate::exchange_time::to_exchange_time(now);
    let morning = t >= time(MORNING_START.0, MORNING_START.1) && t <= time(MORNING_END.0, MORNING_END.1);
    let afternoon = afternoon_enabled && t >= time(AFTERNOON_START.0, AFTERNOON_START.1) && t <= time(AFTERNOON_END.0, AFTERNOON_END.1);
    morning || afternoon
}

/// Why an alert was turned away. Every variant maps to an `Alert::reject`
/// reason string recorded against the rejected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionRejection {
    UnsupportedTicker,
    DuplicateWithinWindow,
    OutsideTradingWindow,
    DailyTradeLimitReached,
    DailyLossLimitReached,
    ConsecutiveLossPause,
    Cooldown,
    SignalDebounce,
    VolatilityFloor,
    DuplicateDirection,
}

impl AdmissionRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionRejection::UnsupportedTicker => "unsupported ticker",
            AdmissionRejection::DuplicateWithinWindow => "duplicate alert within dedup window",
            AdmissionRejection::OutsideTradingWindow => "outside trading window",
            AdmissionRejection::DailyTradeLimitReached => "daily trade limit reached",
            AdmissionRejection::DailyLossLimitReached => "daily loss limit reached",
            AdmissionRejection::ConsecutiveLossPause => "paused after consecutive losses",
            AdmissionRejection::Cooldown => "trade cooldown active",
            AdmissionRejection::SignalDebounce => "signal debounce active",
            AdmissionRejection::VolatilityFloor => "price range below volatility floor",
            AdmissionRejection::DuplicateDirection => "position already open in this direction",
        }
    }
}

/// Gate in front of `process_alert`. The HTTP boundary has already checked the
/// webhook secret (step 1 of the combined ordering); every step below runs in
/// strict order and the first failing check wins.
pub struct AdmissionController<'a> {
    config: &'a Config,
    store: &'a dyn Store,
    broker: &'a dyn BrokerAdapter,
}

impl<'a> AdmissionController<'a> {
    pub fn new(config: &'a Config, store: &'a dyn Store, broker: &'a dyn BrokerAdapter) -> Self {
        Self { config, store, broker }
    }

    pub async fn admit(&self, alert: &Alert, price_range: Option<f64>) -> Result<std::result::Result<(), AdmissionRejection>> {
        if !self.config.supported_tickers.iter().any(|t| t == &alert.ticker) {
            return Ok(Err(AdmissionRejection::UnsupportedTicker));
        }

        if alert.action != AlertAction::Close {
            let window_start = alert.received_at - chrono::Duration::seconds(self.config.dedup_window_seconds);
            let recent = self.store.alerts_since(window_start).await?;
            let duplicate = recent.iter().any(|a| {
                a.id != alert.id
                    && a.ticker == alert.ticker
                    && a.direction == alert.direction
                    && a.status != crate::domain::AlertStatus::Rejected
            });
            if duplicate {
                return Ok(Err(AdmissionRejection::DuplicateWithinWindow));
            }
        }

        if alert.action != AlertAction::Close && !in_trading_window(alert.received_at, self.config.afternoon_window_enabled) {
            return Ok(Err(AdmissionRejection::OutsideTradingWindow));
        }

        if alert.action == AlertAction::Close {
            return Ok(Ok(()));
        }

        let today = alert.received_at.date_naive();
        let todays_trades = self.store.trades_on_date(today).await?;
        let non_cancelled: Vec<_> = todays_trades.iter().filter(|t| t.status != TradeStatus::Cancelled).collect();

        if non_cancelled.len() as u32 >= self.config.max_daily_trades {
            return Ok(Err(AdmissionRejection::DailyTradeLimitReached));
        }

        let net_pnl: f64 = non_cancelled
            .iter()
            .filter(|t| t.status == TradeStatus::Closed)
            .filter_map(|t| t.pnl_dollars)
            .sum();
        if net_pnl <= -self.config.max_daily_loss {
            return Ok(Err(AdmissionRejection::DailyLossLimitReached));
        }

        let mut closed_today: Vec<_> = non_cancelled.iter().filter(|t| t.status == TradeStatus::Closed).cloned().collect();
        closed_today.sort_by_key(|t| t.exit_filled_at);

        let signal_sourced_closed: Vec<_> = closed_today.iter().filter(|t| SIGNAL_SOURCES.contains(&t.source.as_str())).collect();
        let consecutive_losses = signal_sourced_closed
            .iter()
            .rev()
            .take_while(|t| t.pnl_dollars.map(|p| p < 0.0).unwrap_or(false))
            .count();
        if consecutive_losses as u32 >= self.config.max_consecutive_losses {
            return Ok(Err(AdmissionRejection::ConsecutiveLossPause));
        }

        if let Some(last) = closed_today.last() {
            if let Some(closed_at) = last.exit_filled_at {
                let cooldown_until = closed_at + chrono::Duration::minutes(self.config.trade_cooldown_minutes);
                if alert.received_at < cooldown_until {
                    return Ok(Err(AdmissionRejection::Cooldown));
                }
            }
        }

        let debounce_start = alert.received_at - chrono::Duration::minutes(self.config.signal_debounce_minutes);
        let recent_created = self.store.recently_created_trades(debounce_start).await?;
        if recent_created.iter().any(|t| t.direction == alert.direction.unwrap()) {
            return Ok(Err(AdmissionRejection::SignalDebounce));
        }

        if let Some(range) = price_range {
            if range < self.config.min_price_range {
                return Ok(Err(AdmissionRejection::VolatilityFloor));
            }
        }

        let active = self.store.trades_with_status(&[TradeStatus::Filled, TradeStatus::StopLossPlaced, TradeStatus::Exiting]).await?;
        let requested_direction = alert.direction.unwrap();
        if active.iter().any(|t| t.direction == requested_direction) {
            return Ok(Err(AdmissionRejection::DuplicateDirection));
        }
        if let Some(opposing) = active.into_iter().find(|t| t.direction == requested_direction.opposite()) {
            self.close_on_reverse_signal(opposing).await?;
        }

        Ok(Ok(()))
    }

    /// Step 10: an opposite-direction signal force-closes the active trade
    /// instead of being rejected — the new entry is still admitted.
    async fn close_on_reverse_signal(&self, mut opposing: crate::domain::Trade) -> Result<()> {
        let order_id = self
            .broker
            .place_order(OrderRequest::market_sell(opposing.option_symbol.clone(), opposing.remaining_quantity()))
            .await?;
        opposing.exit_order_id = Some(order_id);
        opposing.exit_reason = Some(ExitReason::Signal);
        opposing.status = TradeStatus::Exiting;
        opposing.updated_at = Utc::now();
        self.store.update_trade(opposing.clone()).await?;
        self.store
            .insert_event(TradeEvent::new(opposing.id, TradeEventKind::CloseSignal, "reverse signal: closing opposite-direction trade"))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::domain::{Trade, TradeDirection};
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    fn trading_hour_alert(action: AlertAction) -> Alert {
        let mut alert = Alert::new("SPY".into(), action, Some(600.0), "tradingview".into(), "{}".into());
        alert.received_at = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        alert
    }

    fn open_trade(direction: TradeDirection) -> Trade {
        let now = Utc::now();
        Trade {
            id: 0,
            trade_date: now.date_naive(),
            direction,
            option_symbol: "SPY_Opt_600".into(),
            strike_price: 600.0,
            expiration_date: now.date_naive(),
            entry_order_id: None,
            entry_price: Some(1.5),
            entry_quantity: 1,
            entry_filled_at: Some(now),
            alert_option_price: None,
            entry_is_fallback: false,
            stop_loss_order_id: Some("stop-1".into()),
            stop_loss_price: Some(1.2),
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
            status: TradeStatus::StopLossPlaced,
            source: "tradingview".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn closed_trade(source: &str, pnl_dollars: f64, exit_filled_at: DateTime<Utc>) -> Trade {
        Trade {
            trade_date: exit_filled_at.date_naive(),
            status: TradeStatus::Closed,
            source: source.to_string(),
            entry_filled_at: Some(exit_filled_at - chrono::Duration::minutes(5)),
            exit_filled_at: Some(exit_filled_at),
            exit_price: Some(1.0),
            pnl_dollars: Some(pnl_dollars),
            pnl_percent: Some(0.0),
            stop_loss_order_id: None,
            stop_loss_price: None,
            created_at: exit_filled_at - chrono::Duration::minutes(5),
            updated_at: exit_filled_at,
            ..open_trade(TradeDirection::Call)
        }
    }

    #[tokio::test]
    async fn rejects_unsupported_ticker() {
        let config = Config::from_env();
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        let controller = AdmissionController::new(&config, &store, &broker);
        let mut alert = trading_hour_alert(AlertAction::BuyCall);
        alert.ticker = "QQQ".into();
        let result = controller.admit(&alert, Some(1.0)).await.unwrap();
        assert_eq!(result, Err(AdmissionRejection::UnsupportedTicker));
    }

    #[tokio::test]
    async fn rejects_outside_trading_window() {
        let config = Config::from_env();
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        let controller = AdmissionController::new(&config, &store, &broker);
        let mut alert = trading_hour_alert(AlertAction::BuyCall);
        alert.received_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let result = controller.admit(&alert, Some(1.0)).await.unwrap();
        assert_eq!(result, Err(AdmissionRejection::OutsideTradingWindow));
    }

    #[tokio::test]
    async fn close_bypasses_trading_window() {
        let config = Config::from_env();
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        let controller = AdmissionController::new(&config, &store, &broker);
        let mut alert = trading_hour_alert(AlertAction::Close);
        alert.received_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let result = controller.admit(&alert, None).await.unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn admits_clean_alert() {
        let config = Config::from_env();
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        let controller = AdmissionController::new(&config, &store, &broker);
        let alert = trading_hour_alert(AlertAction::BuyCall);
        let result = controller.admit(&alert, Some(1.0)).await.unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn reverse_signal_closes_opposite_trade_and_admits_new_one() {
        let config = Config::from_env();
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        let existing = store.insert_trade(open_trade(TradeDirection::Call)).await.unwrap();

        let controller = AdmissionController::new(&config, &store, &broker);
        let alert = trading_hour_alert(AlertAction::BuyPut);
        let result = controller.admit(&alert, Some(1.0)).await.unwrap();
        assert_eq!(result, Ok(()));

        let reloaded = store.get_trade(existing.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TradeStatus::Exiting);
        assert_eq!(reloaded.exit_reason, Some(ExitReason::Signal));
    }

    #[tokio::test]
    async fn duplicate_direction_is_rejected_not_closed() {
        let config = Config::from_env();
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        store.insert_trade(open_trade(TradeDirection::Call)).await.unwrap();

        let controller = AdmissionController::new(&config, &store, &broker);
        let alert = trading_hour_alert(AlertAction::BuyCall);
        let result = controller.admit(&alert, Some(1.0)).await.unwrap();
        assert_eq!(result, Err(AdmissionRejection::DuplicateDirection));
    }

    #[tokio::test]
    async fn daily_loss_cap_nets_wins_against_losses() {
        let mut config = Config::from_env();
        config.max_daily_loss = 500.0;
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        store.insert_trade(closed_trade("tradingview", 600.0, base)).await.unwrap();
        store.insert_trade(closed_trade("tradingview", -300.0, base + chrono::Duration::minutes(20))).await.unwrap();
        store.insert_trade(closed_trade("tradingview", -300.0, base + chrono::Duration::minutes(40))).await.unwrap();

        let controller = AdmissionController::new(&config, &store, &broker);
        let alert = trading_hour_alert(AlertAction::BuyCall);
        let result = controller.admit(&alert, Some(1.0)).await.unwrap();
        assert_eq!(result, Ok(()), "net pnl of 0 should not trip the −500 daily loss cap");
    }

    #[tokio::test]
    async fn consecutive_loss_pause_ignores_non_signal_sources() {
        let mut config = Config::from_env();
        config.max_consecutive_losses = 2;
        let store = InMemoryStore::new();
        let broker = PaperBroker::new(600.0, 15.0);
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        store.insert_trade(closed_trade("tradingview", -50.0, base)).await.unwrap();
        store.insert_trade(closed_trade("manual", -50.0, base + chrono::Duration::minutes(20))).await.unwrap();

        let controller = AdmissionController::new(&config, &store, &broker);
        let alert = trading_hour_alert(AlertAction::BuyCall);
        let result = controller.admit(&alert, Some(1.0)).await.unwrap();
        assert_eq!(result, Ok(()), "a manually-closed loss must not count toward the consecutive-loss pause");
    }
}
