use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::Bar;
use crate::domain::TradeDirection;

use super::indicators::{self, BollingerBands, Macd, OpeningRange, PivotLevels};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    EmaCross,
    VwapCross,
    EmaVwap,
    VwapReclaim,
    VwapRsi,
    RsiReversal,
    BbSqueeze,
    Orb,
    OrbDirection,
    Confluence,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub direction: TradeDirection,
    pub underlying_price: f64,
    pub reason: String,
    pub orb_range: Option<f64>,
    pub orb_entry_level: Option<f64>,
    pub confluence_score: Option<u32>,
    pub confluence_max_score: Option<u32>,
    pub rel_vol: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SignalParams {
    pub strategy: StrategyKind,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub orb_minutes: i64,
    pub bb_period: usize,
    pub bb_std_mult: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub vol_sma_period: usize,
    pub vol_threshold: f64,
    pub min_confluence: u32,
    pub pivot_enabled: bool,
    pub pivot_proximity_pct: f64,
    pub pivot_filter_enabled: bool,
    pub rsi_filter_enabled: bool,
    pub orb_body_min_pct: f64,
    pub orb_vwap_filter: bool,
    pub orb_gap_fade_filter: bool,
    pub orb_time_stop: NaiveTime,
    pub orb_stop_mult: f64,
    pub orb_target_mult: f64,
    pub afternoon_window_enabled: bool,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::EmaCross,
            ema_fast: 8,
            ema_slow: 21,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            orb_minutes: 15,
            bb_period: 20,
            bb_std_mult: 2.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            vol_sma_period: 20,
            vol_threshold: 1.5,
            min_confluence: 5,
            pivot_enabled: false,
            pivot_proximity_pct: 0.3,
            pivot_filter_enabled: false,
            rsi_filter_enabled: false,
            orb_body_min_pct: 0.4,
            orb_vwap_filter: true,
            orb_gap_fade_filter: true,
            orb_time_stop: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            orb_stop_mult: 1.0,
            orb_target_mult: 1.5,
            afternoon_window_enabled: true,
        }
    }
}

const MORNING_WINDOW: (u32, u32, u32, u32) = (9, 45, 11, 15);
const AFTERNOON_WINDOW: (u32, u32, u32, u32) = (12, 45, 14, 50);
const VWAP_RECLAIM_WINDOW: (u32, u32, u32, u32) = (10, 30, 12, 0);

fn in_window(t: NaiveTime, window: (u32, u32, u32, u32)) -> bool {
    let start = NaiveTime::from_hms_opt(window.0, window.1, 0).unwrap();
    let end = NaiveTime::from_hms_opt(window.2, window.3, 0).unwrap();
    t >= start && t <= end
}

fn in_session_windows(t: NaiveTime, afternoon_enabled: bool) -> bool {
    in_window(t, MORNING_WINDOW) || (afternoon_enabled && in_window(t, AFTERNOON_WINDOW))
}

/// Pure signal generation over a finished bar series plus optional prior-day
/// OHLC for pivots. `bars[i]` is compared against `bars[i-1]`; the first
/// `max(ema_slow, macd_slow) + 1` bars never emit (not enough history to seed).
///
/// Bar timestamps are exchange-local wall clock (the broker/backtest feed
/// mints them that way); `.time()` is read off them directly here and is not
/// the same instant-to-local conversion `exchange_time` applies to
/// `Utc::now()` elsewhere in the live path.
pub fn generate_signals(
    bars: &[Bar],
    params: &SignalParams,
    prev_day_high: Option<f64>,
    prev_day_low: Option<f64>,
    prev_day_close: Option<f64>,
) -> Vec<Signal> {
    let warmup = params.ema_slow.max(params.macd_slow).max(1) + 1;
    if bars.len() < warmup {
        return Vec::new();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_fast = indicators::ema(&closes, params.ema_fast);
    let ema_slow = indicators::ema(&closes, params.ema_slow);
    let rsi = indicators::rsi(&closes, params.rsi_period);
    let vwap = indicators::vwap(bars);
    let bollinger = indicators::bollinger(&closes, params.bb_period, params.bb_std_mult);
    let macd = indicators::macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal);
    let vol_sma = indicators::volume_sma(bars, params.vol_sma_period);

    let pivots = match (prev_day_high, prev_day_low, prev_day_close) {
        (Some(h), Some(l), Some(c)) => Some(indicators::pivot_levels(h, l, c)),
        _ => None,
    };

    let orb_bars_count = bars
        .iter()
        .take_while(|b| {
            let minutes_since_first = (b.timestamp - bars[0].timestamp).num_minutes();
            minutes_since_first < params.orb_minutes
        })
        .count()
        .max(1);
    let orb = indicators::opening_range(&bars[..orb_bars_count]);
    let orb_end_time = bars[0].timestamp + chrono::Duration::minutes(params.orb_minutes);

    let mut signals = Vec::new();

    for i in 1..bars.len() {
        let local_time = bars[i].timestamp.time();
        let base = match params.strategy {
            StrategyKind::EmaCross => ema_cross(&ema_fast, &ema_slow, i),
            StrategyKind::VwapCross => vwap_cross(&closes, &vwap, i),
            StrategyKind::EmaVwap => ema_vwap(&ema_fast, &ema_slow, &closes, &vwap, i),
            StrategyKind::VwapReclaim => {
                if in_window(local_time, VWAP_RECLAIM_WINDOW) {
                    vwap_reclaim(bars, &vwap, i)
                } else {
                    None
                }
            }
            StrategyKind::VwapRsi => vwap_rsi(&closes, &vwap, &rsi, i, params),
            StrategyKind::RsiReversal => rsi_reversal(&rsi, i, params),
            StrategyKind::BbSqueeze => bb_squeeze(&closes, &bollinger, i),
            StrategyKind::Orb => orb_breakout(&closes, orb, i),
            StrategyKind::OrbDirection => {
                if bars[i].timestamp >= orb_end_time && local_time <= params.orb_time_stop {
                    orb_direction(bars, &vwap, orb, i, params)
                } else {
                    None
                }
            }
            StrategyKind::Confluence => confluence(&closes, &ema_fast, &ema_slow, &rsi, &macd, &vol_sma, bars, pivots, i, params),
        };

        let Some(mut signal) = base else { continue };

        if params.strategy != StrategyKind::OrbDirection && !in_session_windows(local_time, params.afternoon_window_enabled) {
            continue;
        }

        if params.rsi_filter_enabled
            && !matches!(params.strategy, StrategyKind::VwapRsi | StrategyKind::RsiReversal | StrategyKind::Confluence)
        {
            if let Some(r) = rsi[i] {
                if signal.direction == TradeDirection::Call && r > params.rsi_overbought {
                    continue;
                }
                if signal.direction == TradeDirection::Put && r < params.rsi_oversold {
                    continue;
                }
            }
        }

        if params.pivot_filter_enabled {
            if let Some(p) = pivots {
                if pivot_blocks_signal(signal.direction, closes[i], p, params.pivot_proximity_pct) {
                    continue;
                }
            }
        }

        signal.timestamp = bars[i].timestamp;
        signals.push(signal);
    }

    signals
}

fn crossed_up(prev_a: f64, prev_b: f64, a: f64, b: f64) -> bool {
    prev_a <= prev_b && a > b
}

fn crossed_down(prev_a: f64, prev_b: f64, a: f64, b: f64) -> bool {
    prev_a >= prev_b && a < b
}

fn simple_signal(bars_close: f64, direction: TradeDirection, reason: &str) -> Signal {
    Signal {
        timestamp: Utc::now(),
        direction,
        underlying_price: bars_close,
        reason: reason.to_string(),
        orb_range: None,
        orb_entry_level: None,
        confluence_score: None,
        confluence_max_score: None,
        rel_vol: None,
    }
}

fn ema_cross(fast: &[Option<f64>], slow: &[Option<f64>], i: usize) -> Option<Signal> {
    let (pf, ps, f, s) = (fast[i - 1]?, slow[i - 1]?, fast[i]?, slow[i]?);
    if crossed_up(pf, ps, f, s) {
        Some(simple_signal(f, TradeDirection::Call, "ema_cross_up"))
    } else if crossed_down(pf, ps, f, s) {
        Some(simple_signal(f, TradeDirection::Put, "ema_cross_down"))
    } else {
        None
    }
}

fn vwap_cross(closes: &[f64], vwap: &[Option<f64>], i: usize) -> Option<Signal> {
    let (pv, v) = (vwap[i - 1]?, vwap[i]?);
    let (pc, c) = (closes[i - 1], closes[i]);
    if crossed_up(pc, pv, c, v) {
        Some(simple_signal(c, TradeDirection::Call, "vwap_cross_up"))
    } else if crossed_down(pc, pv, c, v) {
        Some(simple_signal(c, TradeDirection::Put, "vwap_cross_down"))
    } else {
        None
    }
}

fn ema_vwap(fast: &[Option<f64>], slow: &[Option<f64>], closes: &[f64], vwap: &[Option<f64>], i: usize) -> Option<Signal> {
    let cross = ema_cross(fast, slow, i)?;
    let v = vwap[i]?;
    let c = closes[i];
    let same_side = (cross.direction == TradeDirection::Call && c >= v) || (cross.direction == TradeDirection::Put && c <= v);
    if same_side {
        Some(Signal { reason: "ema_vwap".to_string(), ..cross })
    } else {
        None
    }
}

fn vwap_reclaim(bars: &[Bar], vwap: &[Option<f64>], i: usize) -> Option<Signal> {
    let (pv, v) = (vwap[i - 1]?, vwap[i]?);
    let (pc, c) = (bars[i - 1].close, bars[i].close);
    let body = (bars[i].close - bars[i].open).abs();
    if body < 0.30 {
        return None;
    }
    if crossed_up(pc, pv, c, v) {
        Some(simple_signal(c, TradeDirection::Call, "vwap_reclaim"))
    } else if crossed_down(pc, pv, c, v) {
        Some(simple_signal(c, TradeDirection::Put, "vwap_reclaim"))
    } else {
        None
    }
}

fn vwap_rsi(closes: &[f64], vwap: &[Option<f64>], rsi: &[Option<f64>], i: usize, params: &SignalParams) -> Option<Signal> {
    let (v, r, c) = (vwap[i]?, rsi[i]?, closes[i]);
    if c > v && r <= params.rsi_oversold {
        Some(simple_signal(c, TradeDirection::Call, "vwap_rsi"))
    } else if c < v && r >= params.rsi_overbought {
        Some(simple_signal(c, TradeDirection::Put, "vwap_rsi"))
    } else {
        None
    }
}

fn rsi_reversal(rsi: &[Option<f64>], i: usize, params: &SignalParams) -> Option<Signal> {
    let (pr, r) = (rsi[i - 1]?, rsi[i]?);
    if crossed_up(pr, params.rsi_oversold, r, params.rsi_oversold) {
        Some(simple_signal(r, TradeDirection::Call, "rsi_reversal_up"))
    } else if crossed_down(pr, params.rsi_overbought, r, params.rsi_overbought) {
        Some(simple_signal(r, TradeDirection::Put, "rsi_reversal_down"))
    } else {
        None
    }
}

fn bb_squeeze(closes: &[f64], bands: &[Option<BollingerBands>], i: usize) -> Option<Signal> {
    let (prev, cur) = (bands[i - 1]?, bands[i]?);
    let expanding = (cur.upper - cur.lower) > (prev.upper - prev.lower);
    if !expanding {
        return None;
    }
    let c = closes[i];
    if c > cur.upper {
        Some(simple_signal(c, TradeDirection::Call, "bb_squeeze_up"))
    } else if c < cur.lower {
        Some(simple_signal(c, TradeDirection::Put, "bb_squeeze_down"))
    } else {
        None
    }
}

fn orb_breakout(closes: &[f64], orb: Option<OpeningRange>, i: usize) -> Option<Signal> {
    let orb = orb?;
    let (prev_close, close) = (closes[i - 1], closes[i]);
    let prev_inside = prev_close >= orb.low && prev_close <= orb.high;
    if !prev_inside {
        return None;
    }
    if close > orb.high {
        Some(simple_signal(close, TradeDirection::Call, "orb_breakout_up"))
    } else if close < orb.low {
        Some(simple_signal(close, TradeDirection::Put, "orb_breakout_down"))
    } else {
        None
    }
}

fn orb_direction(bars: &[Bar], vwap: &[Option<f64>], orb: Option<OpeningRange>, i: usize, params: &SignalParams) -> Option<Signal> {
    let orb = orb?;
    let close = bars[i].close;
    let direction = if close > orb.high {
        TradeDirection::Call
    } else if close < orb.low {
        TradeDirection::Put
    } else {
        return None;
    };

    if orb.body_ratio() < params.orb_body_min_pct {
        return None;
    }

    if params.orb_vwap_filter {
        if let Some(v) = vwap[i] {
            let same_side = (direction == TradeDirection::Call && close >= v) || (direction == TradeDirection::Put && close <= v);
            if !same_side {
                return None;
            }
        }
    }

    if params.orb_gap_fade_filter {
        let prior_close = bars[0].open;
        let gap = orb.open - prior_close;
        let opposes = (direction == TradeDirection::Call && gap <= 0.0) || (direction == TradeDirection::Put && gap >= 0.0);
        if !opposes {
            return None;
        }
    }

    let entry_level = if direction == TradeDirection::Call { orb.high } else { orb.low };
    Some(Signal {
        orb_range: Some(orb.range()),
        orb_entry_level: Some(entry_level),
        ..simple_signal(close, direction, "orb_direction")
    })
}

#[allow(clippy::too_many_arguments)]
fn confluence(
    closes: &[f64],
    ema_fast: &[Option<f64>],
    ema_slow: &[Option<f64>],
    rsi: &[Option<f64>],
    macd: &[Option<Macd>],
    vol_sma: &[Option<f64>],
    bars: &[Bar],
    pivots: Option<PivotLevels>,
    i: usize,
    params: &SignalParams,
) -> Option<Signal> {
    let mut call_score = 0u32;
    let mut put_score = 0u32;
    let mut max_score = 6u32;

    let close = closes[i];
    if let Some(v) = indicators::vwap(bars)[i] {
        if close > v {
            call_score += 1;
        } else {
            put_score += 1;
        }
    }

    if let (Some(f), Some(s)) = (ema_fast[i], ema_slow[i]) {
        if f > s {
            call_score += 1;
        } else {
            put_score += 1;
        }
    }

    if let Some(r) = rsi[i] {
        if r < 50.0 {
            call_score += 1;
        } else {
            put_score += 1;
        }
    }

    if let Some(m) = macd[i] {
        if m.histogram > 0.0 {
            call_score += 1;
        } else {
            put_score += 1;
        }
    }

    let rel_vol = match (vol_sma[i], bars.get(i)) {
        (Some(avg), Some(bar)) if avg > 0.0 => Some(bar.volume as f64 / avg),
        _ => None,
    };
    if let Some(rv) = rel_vol {
        if rv >= params.vol_threshold {
            if close >= closes[i - 1] {
                call_score += 1;
            } else {
                put_score += 1;
            }
        }
    }

    if close >= bars[i].open {
        call_score += 1;
    } else {
        put_score += 1;
    }

    if params.pivot_enabled {
        max_score = 7;
        if let Some(p) = pivots {
            let proximity = params.pivot_proximity_pct / 100.0;
            if near(close, p.s1, proximity) || near(close, p.s2, proximity) {
                call_score += 1;
            } else if near(close, p.r1, proximity) || near(close, p.r2, proximity) {
                put_score += 1;
            }
        }
    }

    let direction = if call_score >= params.min_confluence && call_score > put_score {
        TradeDirection::Call
    } else if put_score >= params.min_confluence && put_score > call_score {
        TradeDirection::Put
    } else {
        return None;
    };

    let score = if direction == TradeDirection::Call { call_score } else { put_score };
    Some(Signal {
        confluence_score: Some(score),
        confluence_max_score: Some(max_score),
        rel_vol,
        ..simple_signal(close, direction, "confluence")
    })
}

fn near(price: f64, level: f64, proximity_fraction: f64) -> bool {
    (price - level).abs() <= level * proximity_fraction
}

fn pivot_blocks_signal(direction: TradeDirection, price: f64, pivots: PivotLevels, proximity_pct: f64) -> bool {
    let proximity = proximity_pct / 100.0;
    match direction {
        TradeDirection::Call => near(price, pivots.r1, proximity) || near(price, pivots.r2, proximity),
        TradeDirection::Put => near(price, pivots.s1, proximity) || near(price, pivots.s2, proximity),
    }
}

/// A base signal pending 1-minute confirmation: the live path holds it until a
/// following 1-minute bar closes green (CALL) or red (PUT), or 5 minutes elapse.
#[derive(Debug, Clone)]
pub struct PendingSignal {
    pub signal: Signal,
    pub expires_at: DateTime<Utc>,
}

impl PendingSignal {
    pub fn new(signal: Signal, bar_minutes: i64) -> Self {
        let expires_at = signal.timestamp + chrono::Duration::minutes(bar_minutes + 5);
        Self { signal, expires_at }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Confirms against a 1-minute bar; re-stamps the signal with the
    /// confirmation bar's timestamp and close if the bar's color agrees.
    pub fn confirm(&self, confirm_bar: &Bar) -> Option<Signal> {
        let green = confirm_bar.close >= confirm_bar.open;
        let confirms = match self.signal.direction {
            TradeDirection::Call => green,
            TradeDirection::Put => !green,
        };
        if !confirms {
            return None;
        }
        let mut confirmed = self.signal.clone();
        confirmed.timestamp = confirm_bar.timestamp;
        confirmed.underlying_price = confirm_bar.close;
        Some(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars_for_ema_cross() -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        let closes = [600.0, 599.0, 598.0, 597.0, 598.0, 599.5, 601.0, 603.0, 605.0, 607.0, 609.0];
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: base + chrono::Duration::minutes(i as i64 * 5),
                open: c - 0.2,
                high: c + 0.3,
                low: c - 0.3,
                close: c,
                volume: 10_000,
            })
            .collect()
    }

    #[test]
    fn ema_cross_strategy_emits_on_crossover() {
        let bars = bars_for_ema_cross();
        let params = SignalParams { ema_fast: 2, ema_slow: 4, strategy: StrategyKind::EmaCross, ..Default::default() };
        let signals = generate_signals(&bars, &params, None, None, None);
        assert!(!signals.is_empty());
    }

    #[test]
    fn pending_signal_expires_after_five_minutes_past_bar() {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        let signal = simple_signal(600.0, TradeDirection::Call, "ema_cross_up");
        let pending = PendingSignal::new(Signal { timestamp: base, ..signal }, 5);
        assert!(!pending.is_expired(base + chrono::Duration::minutes(9)));
        assert!(pending.is_expired(base + chrono::Duration::minutes(11)));
    }

    #[test]
    fn pending_signal_confirms_only_on_matching_color() {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        let signal = Signal { timestamp: base, ..simple_signal(600.0, TradeDirection::Call, "ema_cross_up") };
        let pending = PendingSignal::new(signal, 5);
        let red_bar = Bar { timestamp: base, open: 601.0, high: 601.2, low: 599.8, close: 600.5, volume: 1000 };
        assert!(pending.confirm(&red_bar).is_none());
        let green_bar = Bar { timestamp: base, open: 600.0, high: 601.2, low: 599.8, close: 601.0, volume: 1000 };
        assert!(pending.confirm(&green_bar).is_some());
    }
}
