use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::backtest::{self, BacktestParams, BacktestResult, DaySlice, Objective, ParamRange, SearchSpace, Trial};
use crate::broker::Bar;
use crate::domain::{Alert, AlertAction, ExitReason, Id, Trade, TradeEvent};
use crate::error::TradingError;
use crate::exit_engine::ExitEngine;

use super::AppContext;

pub struct ApiError(TradingError);

impl From<TradingError> for ApiError {
    fn from(err: TradingError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TradingError::Admission(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TradingError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub secret: String,
    pub ticker: String,
    pub action: WebhookAction,
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize, Copy, Clone)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    BuyCall,
    BuyPut,
    Close,
}

impl From<WebhookAction> for AlertAction {
    fn from(a: WebhookAction) -> Self {
        match a {
            WebhookAction::BuyCall => AlertAction::BuyCall,
            WebhookAction::BuyPut => AlertAction::BuyPut,
            WebhookAction::Close => AlertAction::Close,
        }
    }
}

/// Byte-for-byte, constant-time secret comparison: the spec requires a
/// timing-safe compare at this boundary rather than `==`, which short-circuits
/// on the first mismatched byte and leaks length/prefix information.
fn secrets_match(given: &str, expected: &str) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given.bytes().zip(expected.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// The webhook secret check is the admission controller's step 1, run here
/// at the HTTP boundary before an `Alert` row is even constructed.
pub async fn webhook(State(ctx): State<Arc<AppContext>>, body: String) -> ApiResult<impl IntoResponse> {
    let payload: WebhookPayload = serde_json::from_str(&body).map_err(|e| TradingError::Admission(format!("invalid payload: {e}")))?;

    if !secrets_match(&payload.secret, &ctx.config.webhook_secret) {
        return Err(TradingError::Admission("webhook secret mismatch".into()).into());
    }

    let alert = Alert::new(payload.ticker.clone(), payload.action.into(), payload.price, "tradingview".into(), body);
    ctx.scheduler.process_alert(alert).await?;
    Ok(Json(serde_json::json!({ "accepted": true })))
}

pub async fn list_alerts(State(ctx): State<Arc<AppContext>>) -> ApiResult<Json<Vec<Alert>>> {
    let since = Utc::now() - chrono::Duration::days(1);
    Ok(Json(ctx.store.alerts_since(since).await?))
}

pub async fn list_trades(State(ctx): State<Arc<AppContext>>) -> ApiResult<Json<Vec<Trade>>> {
    Ok(Json(ctx.store.trades_on_date(Utc::now().date_naive()).await?))
}

pub async fn get_trade(State(ctx): State<Arc<AppContext>>, Path(id): Path<Id>) -> ApiResult<Json<Option<Trade>>> {
    Ok(Json(ctx.store.get_trade(id).await?))
}

pub async fn trade_events(State(ctx): State<Arc<AppContext>>, Path(id): Path<Id>) -> ApiResult<Json<Vec<TradeEvent>>> {
    Ok(Json(ctx.store.events_for_trade(id).await?))
}

pub async fn close_trade(State(ctx): State<Arc<AppContext>>, Path(id): Path<Id>) -> ApiResult<impl IntoResponse> {
    let Some(mut trade) = ctx.store.get_trade(id).await? else {
        return Err(TradingError::Store(format!("no such trade {id}")).into());
    };
    let engine = ExitEngine::new(ctx.broker.as_ref(), ctx.store.as_ref(), ctx.config.as_ref());
    engine.evaluate(&mut trade).await?;
    Ok(Json(trade))
}

pub async fn cancel_trade(State(ctx): State<Arc<AppContext>>, Path(id): Path<Id>) -> ApiResult<impl IntoResponse> {
    let Some(mut trade) = ctx.store.get_trade(id).await? else {
        return Err(TradingError::Store(format!("no such trade {id}")).into());
    };
    if let Some(order_id) = trade.entry_order_id.clone() {
        ctx.broker.cancel_order(&order_id).await.ok();
    }
    trade.status = crate::domain::TradeStatus::Cancelled;
    trade.exit_reason = Some(ExitReason::Manual);
    ctx.store.update_trade(trade.clone()).await?;
    Ok(Json(trade))
}

pub async fn daily_summary(State(ctx): State<Arc<AppContext>>, Path(date): Path<NaiveDate>) -> ApiResult<impl IntoResponse> {
    Ok(Json(ctx.store.get_daily_summary(date).await?))
}

#[derive(Debug, Deserialize)]
pub struct BacktestRunRequest {
    pub ticker: String,
    pub start: chrono::DateTime<Utc>,
    pub end: chrono::DateTime<Utc>,
    #[serde(default)]
    pub strategy: Option<crate::signals::StrategyKind>,
}

#[derive(Debug, Serialize)]
pub struct BacktestRunResponse {
    pub result: BacktestResultDto,
}

#[derive(Debug, Serialize)]
pub struct BacktestResultDto {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
}

impl From<&BacktestResult> for BacktestResultDto {
    fn from(r: &BacktestResult) -> Self {
        Self {
            total_trades: r.summary.total_trades,
            win_rate: r.summary.win_rate,
            total_pnl: r.summary.total_pnl,
            profit_factor: r.summary.profit_factor,
            max_drawdown: r.summary.max_drawdown,
        }
    }
}

fn group_bars_by_day(bars: Vec<Bar>) -> Vec<Vec<Bar>> {
    let mut days: Vec<Vec<Bar>> = Vec::new();
    for bar in bars {
        match days.last_mut() {
            Some(day) if day.last().map(|b| b.timestamp.date_naive()) == Some(bar.timestamp.date_naive()) => day.push(bar),
            _ => days.push(vec![bar]),
        }
    }
    days
}

pub async fn run_backtest(State(ctx): State<Arc<AppContext>>, Json(req): Json<BacktestRunRequest>) -> ApiResult<Json<BacktestRunResponse>> {
    let bars = ctx.broker.get_price_history(&req.ticker, 5, req.start, req.end).await?;

    let mut params = BacktestParams::default();
    if let Some(strategy) = req.strategy {
        params.signal.strategy = strategy;
    }

    // The bar walk is CPU-bound and can cover weeks of history; run it on the
    // blocking pool so it never stalls the reactor the webhook/poll loops share.
    let result = tokio::task::spawn_blocking(move || {
        let days = group_bars_by_day(bars);
        let slices: Vec<DaySlice> = days
            .iter()
            .map(|day| DaySlice { date: day[0].timestamp.date_naive(), bars: day.as_slice(), prev_high: None, prev_low: None, prev_close: None })
            .collect();
        backtest::run_backtest(&slices, &params)
    })
    .await
    .map_err(|e| TradingError::Config(format!("backtest task panicked: {e}")))?;

    Ok(Json(BacktestRunResponse { result: BacktestResultDto::from(&result) }))
}

#[derive(Debug, Deserialize)]
pub struct BacktestOptimizeRequest {
    pub ticker: String,
    pub start: chrono::DateTime<Utc>,
    pub end: chrono::DateTime<Utc>,
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub stop_loss_percent_range: Option<(f64, f64)>,
    pub profit_target_percent_range: Option<(f64, f64)>,
}

fn default_trials() -> usize {
    50
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct TrialDto {
    pub stop_loss_percent: f64,
    pub profit_target_percent: f64,
    pub trailing_stop_percent: f64,
    pub summary: BacktestResultDtoSummary,
}

#[derive(Debug, Serialize)]
pub struct BacktestResultDtoSummary {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
}

impl From<&Trial> for TrialDto {
    fn from(t: &Trial) -> Self {
        Self {
            stop_loss_percent: t.params.stop_loss_percent,
            profit_target_percent: t.params.profit_target_percent,
            trailing_stop_percent: t.params.trailing_stop_percent,
            summary: BacktestResultDtoSummary {
                total_trades: t.summary.total_trades,
                win_rate: t.summary.win_rate,
                total_pnl: t.summary.total_pnl,
                profit_factor: t.summary.profit_factor,
            },
        }
    }
}

pub async fn optimize_backtest(State(ctx): State<Arc<AppContext>>, Json(req): Json<BacktestOptimizeRequest>) -> ApiResult<Json<Vec<TrialDto>>> {
    let bars = ctx.broker.get_price_history(&req.ticker, 5, req.start, req.end).await?;

    // A grid/random search over trials is the most CPU-heavy endpoint in the
    // surface; keep it off the async reactor the same way run_backtest does.
    let trials = tokio::task::spawn_blocking(move || {
        let days = group_bars_by_day(bars);
        let slices: Vec<DaySlice> = days
            .iter()
            .map(|day| DaySlice { date: day[0].timestamp.date_naive(), bars: day.as_slice(), prev_high: None, prev_low: None, prev_close: None })
            .collect();

        let base = BacktestParams::default();
        let space = SearchSpace {
            stop_loss_percent: req.stop_loss_percent_range.map(|(a, b)| ParamRange::new(a, b)),
            profit_target_percent: req.profit_target_percent_range.map(|(a, b)| ParamRange::new(a, b)),
            ..Default::default()
        };

        let mut rng = rand::thread_rng();
        backtest::optimize(&slices, &base, &space, req.trials, req.top_k, Objective::TotalPnl, &mut rng)
    })
    .await
    .map_err(|e| TradingError::Config(format!("optimize task panicked: {e}")))?;

    Ok(Json(trials.iter().map(TrialDto::from).collect()))
}
