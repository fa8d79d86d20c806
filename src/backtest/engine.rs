use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::broker::Bar;
use crate::domain::{ExitReason, TradeDirection};
use crate::pricing::black_scholes::{estimate_option_price_at, select_strike_for_delta};
use crate::pricing::spread::estimate_spread_pct;
use crate::signals::{generate_signals, Signal, SignalParams};

#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub signal: SignalParams,
    pub strike_interval: f64,
    pub delta_target: f64,
    pub entry_limit_below_percent: f64,
    pub stop_loss_percent: f64,
    pub profit_target_percent: f64,
    pub trailing_stop_percent: f64,
    pub trailing_stop_after_scale_out_percent: f64,
    pub breakeven_trigger_percent: f64,
    pub scale_out_enabled: bool,
    pub scale_out_tier_1_percent: f64,
    pub scale_out_tier_1_qty: i64,
    pub scale_out_tier_2_percent: f64,
    pub scale_out_tier_2_qty: i64,
    pub max_hold_minutes: i64,
    pub force_exit_hour: u32,
    pub force_exit_minute: u32,
    pub max_daily_trades: u32,
    pub max_daily_loss: f64,
    pub max_consecutive_losses: u32,
    pub cooldown_minutes: i64,
    pub min_minutes_to_close_for_entry: i64,
    pub default_quantity: i64,
    pub vix: f64,
    pub is_0dte: bool,
}

impl Default for BacktestParams {
    fn default() -> Self {
        Self {
            signal: SignalParams::default(),
            strike_interval: 1.0,
            delta_target: 0.4,
            entry_limit_below_percent: 5.0,
            stop_loss_percent: 16.0,
            profit_target_percent: 40.0,
            trailing_stop_percent: 20.0,
            trailing_stop_after_scale_out_percent: 10.0,
            breakeven_trigger_percent: 10.0,
            scale_out_enabled: true,
            scale_out_tier_1_percent: 20.0,
            scale_out_tier_1_qty: 10,
            scale_out_tier_2_percent: 40.0,
            scale_out_tier_2_qty: 8,
            max_hold_minutes: 90,
            force_exit_hour: 15,
            force_exit_minute: 30,
            max_daily_trades: 10,
            max_daily_loss: 500.0,
            max_consecutive_losses: 3,
            cooldown_minutes: 5,
            min_minutes_to_close_for_entry: 30,
            default_quantity: 2,
            vix: 15.0,
            is_0dte: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedTrade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub direction: TradeDirection,
    pub strike: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: i64,
    pub exit_reason: ExitReason,
    pub pnl_dollars: f64,
    pub pnl_percent: f64,
}

#[derive(Debug, Clone)]
pub struct DailyResult {
    pub date: NaiveDate,
    pub trades: Vec<SimulatedTrade>,
    pub pnl: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BacktestSummary {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub avg_hold_minutes: f64,
    pub exit_reason_counts: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub daily: Vec<DailyResult>,
    pub summary: BacktestSummary,
}

/// One trading day's bars plus the prior day's OHLC for pivots (None on the
/// first day of a range).
pub struct DaySlice<'a> {
    pub date: NaiveDate,
    pub bars: &'a [Bar],
    pub prev_high: Option<f64>,
    pub prev_low: Option<f64>,
    pub prev_close: Option<f64>,
}

/// Deterministic bar-driven walk reusing the live signal engine and
/// option-pricer, applying the same exit ladder as the live exit engine but
/// against synthetic Black-Scholes prices instead of broker quotes.
pub fn run_backtest(days: &[DaySlice], params: &BacktestParams) -> BacktestResult {
    let mut daily_results = Vec::with_capacity(days.len());

    for day in days {
        let signals = generate_signals(day.bars, &params.signal, day.prev_high, day.prev_low, day.prev_close);
        let trades = walk_day(day.bars, &signals, params);
        let pnl = trades.iter().map(|t| t.pnl_dollars).sum();
        daily_results.push(DailyResult { date: day.date, trades, pnl });
    }

    let summary = summarize(&daily_results);
    BacktestResult { daily: daily_results, summary }
}

fn minutes_to_close(bars: &[Bar], bar_idx: usize, force_hour: u32, force_minute: u32) -> i64 {
    let close_time = bars[bar_idx].timestamp.date_naive().and_hms_opt(force_hour, force_minute, 0).unwrap();
    let close_dt = DateTime::<Utc>::from_naive_utc_and_offset(close_time, Utc);
    (close_dt - bars[bar_idx].timestamp).num_minutes().max(0)
}

fn walk_day(bars: &[Bar], signals: &[Signal], params: &BacktestParams) -> Vec<SimulatedTrade> {
    let mut trades = Vec::new();
    let mut trades_today = 0u32;
    let mut realized_loss_today = 0.0f64;
    let mut consecutive_losses = 0u32;
    let mut cooldown_until: Option<DateTime<Utc>> = None;

    let bar_index_at = |timestamp: DateTime<Utc>| bars.iter().position(|b| b.timestamp >= timestamp);

    for signal in signals {
        if trades_today >= params.max_daily_trades {
            continue;
        }
        if -realized_loss_today >= params.max_daily_loss {
            continue;
        }
        if consecutive_losses >= params.max_consecutive_losses {
            continue;
        }
        if let Some(until) = cooldown_until {
            if signal.timestamp < until {
                continue;
            }
        }

        let Some(entry_idx) = bar_index_at(signal.timestamp) else { continue };
        let mtc = minutes_to_close(bars, entry_idx, params.force_exit_hour, params.force_exit_minute);
        if mtc < params.min_minutes_to_close_for_entry {
            continue;
        }

        let (strike, priced) = select_strike_for_delta(
            signal.underlying_price,
            params.delta_target,
            mtc as f64,
            params.vix,
            signal.direction,
            params.strike_interval,
        );
        let spread_pct = estimate_spread_pct(priced.delta, mtc, params.vix, priced.price.max(0.01), params.is_0dte, 1.0);
        let entry_price = priced.price * (1.0 - params.entry_limit_below_percent / 100.0) * (1.0 + spread_pct / 2.0);
        if entry_price <= 0.0 {
            continue;
        }

        let sim = simulate_exit(bars, entry_idx, strike, entry_price, signal.direction, params);
        trades_today += 1;
        if sim.pnl_dollars < 0.0 {
            realized_loss_today += sim.pnl_dollars;
            consecutive_losses += 1;
        } else {
            consecutive_losses = 0;
        }
        cooldown_until = Some(sim.exit_time + chrono::Duration::minutes(params.cooldown_minutes));
        trades.push(sim);
    }

    trades
}

#[allow(clippy::too_many_arguments)]
fn simulate_exit(
    bars: &[Bar],
    entry_idx: usize,
    strike: f64,
    entry_price: f64,
    direction: TradeDirection,
    params: &BacktestParams,
) -> SimulatedTrade {
    let quantity = params.default_quantity;
    let entry_time = bars[entry_idx].timestamp;
    let mut highest = entry_price;
    let mut breakeven_applied = false;
    let mut stop_price = entry_price * (1.0 - params.stop_loss_percent / 100.0);

    for (offset, bar) in bars[entry_idx..].iter().enumerate() {
        let idx = entry_idx + offset;
        let mtc = minutes_to_close(bars, idx, params.force_exit_hour, params.force_exit_minute);
        let mid = estimate_option_price_at(bar.close, strike, mtc as f64, params.vix, direction).price;

        // Intra-bar stop check against the bar extreme unfavorable to the holder.
        let worst_underlying = match direction {
            TradeDirection::Call => bar.low,
            TradeDirection::Put => bar.high,
        };
        let worst_mid = estimate_option_price_at(worst_underlying, strike, mtc as f64, params.vix, direction).price;

        highest = highest.max(mid);
        let gain_pct = (mid - entry_price) / entry_price * 100.0;

        let last_bar = idx == bars.len() - 1;
        let over_hold_time = (bar.timestamp - entry_time) >= chrono::Duration::minutes(params.max_hold_minutes);
        let past_cutoff = mtc <= 0;

        if past_cutoff || last_bar {
            return close_trade(entry_time, bar.timestamp, direction, strike, entry_price, mid, quantity, ExitReason::TimeBased);
        }
        if over_hold_time {
            return close_trade(entry_time, bar.timestamp, direction, strike, entry_price, mid, quantity, ExitReason::MaxHoldTime);
        }
        if worst_mid <= stop_price {
            return close_trade(entry_time, bar.timestamp, direction, strike, entry_price, stop_price, quantity, ExitReason::StopLoss);
        }
        if !breakeven_applied && highest >= entry_price * (1.0 + params.breakeven_trigger_percent / 100.0) {
            breakeven_applied = true;
            stop_price = entry_price;
        }
        if !params.scale_out_enabled && gain_pct >= params.profit_target_percent {
            return close_trade(entry_time, bar.timestamp, direction, strike, entry_price, mid, quantity, ExitReason::ProfitTarget);
        }
        let trail_pct = if breakeven_applied { params.trailing_stop_after_scale_out_percent } else { params.trailing_stop_percent };
        if highest > entry_price && mid <= highest * (1.0 - trail_pct / 100.0) {
            return close_trade(entry_time, bar.timestamp, direction, strike, entry_price, mid, quantity, ExitReason::TrailingStop);
        }
    }

    let last = bars.last().expect("walk_day only calls simulate_exit with a non-empty bar slice");
    let mid = estimate_option_price_at(last.close, strike, 0.0, params.vix, direction).price;
    close_trade(entry_time, last.timestamp, direction, strike, entry_price, mid, quantity, ExitReason::TimeBased)
}

#[allow(clippy::too_many_arguments)]
fn close_trade(
    entry_time: DateTime<Utc>,
    exit_time: DateTime<Utc>,
    direction: TradeDirection,
    strike: f64,
    entry_price: f64,
    exit_price: f64,
    quantity: i64,
    reason: ExitReason,
) -> SimulatedTrade {
    let pnl_dollars = (exit_price - entry_price) * quantity as f64 * 100.0;
    let basis = entry_price * quantity as f64 * 100.0;
    let pnl_percent = if basis.abs() > f64::EPSILON { pnl_dollars / basis * 100.0 } else { 0.0 };
    SimulatedTrade { entry_time, exit_time, direction, strike, entry_price, exit_price, quantity, exit_reason: reason, pnl_dollars, pnl_percent }
}

fn summarize(daily: &[DailyResult]) -> BacktestSummary {
    let all_trades: Vec<&SimulatedTrade> = daily.iter().flat_map(|d| d.trades.iter()).collect();
    if all_trades.is_empty() {
        return BacktestSummary::default();
    }

    let total_trades = all_trades.len();
    let wins = all_trades.iter().filter(|t| t.pnl_dollars > 0.0).count();
    let win_rate = wins as f64 / total_trades as f64 * 100.0;
    let total_pnl: f64 = all_trades.iter().map(|t| t.pnl_dollars).sum();
    let gross_profit: f64 = all_trades.iter().map(|t| t.pnl_dollars).filter(|p| *p > 0.0).sum();
    let gross_loss: f64 = all_trades.iter().map(|t| t.pnl_dollars).filter(|p| *p < 0.0).sum::<f64>().abs();
    let profit_factor = if gross_loss > 0.0 { gross_profit / gross_loss } else { f64::INFINITY };

    let mut running = 0.0;
    let mut peak = 0.0f64;
    let mut max_drawdown = 0.0f64;
    for t in &all_trades {
        running += t.pnl_dollars;
        peak = peak.max(running);
        max_drawdown = max_drawdown.max(peak - running);
    }

    let avg_hold_minutes =
        all_trades.iter().map(|t| (t.exit_time - t.entry_time).num_minutes() as f64).sum::<f64>() / total_trades as f64;

    let mut exit_reason_counts = HashMap::new();
    for t in &all_trades {
        *exit_reason_counts.entry(format!("{:?}", t.exit_reason)).or_insert(0) += 1;
    }

    BacktestSummary { total_trades, win_rate, total_pnl, profit_factor, max_drawdown, avg_hold_minutes, exit_reason_counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::StrategyKind;
    use chrono::TimeZone;

    fn trending_day() -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 13, 30, 0).unwrap();
        (0..60)
            .map(|i| {
                let close = 600.0 + i as f64 * 0.15;
                Bar {
                    timestamp: base + chrono::Duration::minutes(i * 5),
                    open: close - 0.05,
                    high: close + 0.2,
                    low: close - 0.2,
                    close,
                    volume: 50_000,
                }
            })
            .collect()
    }

    #[test]
    fn backtest_produces_trades_on_a_trending_day() {
        let bars = trending_day();
        let mut params = BacktestParams::default();
        params.signal.strategy = StrategyKind::EmaCross;
        params.signal.ema_fast = 2;
        params.signal.ema_slow = 4;
        params.signal.afternoon_window_enabled = true;

        let day = DaySlice { date: bars[0].timestamp.date_naive(), bars: &bars, prev_high: None, prev_low: None, prev_close: None };
        let result = run_backtest(&[day], &params);
        assert_eq!(result.daily.len(), 1);
    }

    #[test]
    fn empty_day_produces_zeroed_summary() {
        let bars: Vec<Bar> = Vec::new();
        let day = DaySlice { date: Utc::now().date_naive(), bars: &bars, prev_high: None, prev_low: None, prev_close: None };
        let result = run_backtest(&[day], &BacktestParams::default());
        assert_eq!(result.summary.total_trades, 0);
    }
}
