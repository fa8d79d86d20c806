/// Pure indicator math over OHLCV series. Every function returns one value
/// per input bar, `None` until enough history has accumulated to seed it —
/// callers index these in lockstep with the bar series.
use crate::broker::Bar;

pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.len() < period || period == 0 {
        return vec![None; values.len()];
    }

    let mut result = vec![None; period - 1];
    let sma: f64 = values[..period].iter().sum::<f64>() / period as f64;
    result.push(Some(sma));

    let k = 2.0 / (period as f64 + 1.0);
    for &value in &values[period..] {
        let prev = result.last().unwrap().unwrap();
        result.push(Some(value * k + prev * (1.0 - k)));
    }
    result
}

/// Wilder's RSI: seeded from the first `period` deltas, then smoothed.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if closes.len() < period + 1 || period == 0 {
        return vec![None; closes.len()];
    }

    let mut result = vec![None; period];

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        avg_gain += delta.max(0.0);
        avg_loss += (-delta).max(0.0);
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result.push(Some(rsi_from_averages(avg_gain, avg_loss)));

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        avg_gain = (avg_gain * (period as f64 - 1.0) + delta.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + (-delta).max(0.0)) / period as f64;
        result.push(Some(rsi_from_averages(avg_gain, avg_loss)));
    }
    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Average True Range, Wilder-smoothed.
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    if bars.len() < period + 1 || period == 0 {
        return vec![None; bars.len()];
    }

    let mut trs = vec![0.0];
    for i in 1..bars.len() {
        let (h, l, prev_close) = (bars[i].high, bars[i].low, bars[i - 1].close);
        trs.push((h - l).max((h - prev_close).abs()).max((l - prev_close).abs()));
    }

    let mut result = vec![None; period];
    let mut value: f64 = trs[1..=period].iter().sum::<f64>() / period as f64;
    result.push(Some(value));

    for &tr in &trs[(period + 1)..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
        result.push(Some(value));
    }
    result
}

/// Session-cumulative VWAP with typical price (H+L+C)/3.
pub fn vwap(bars: &[Bar]) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(bars.len());
    let mut cum_tp_vol = 0.0;
    let mut cum_vol = 0i64;
    for bar in bars {
        let typical = (bar.high + bar.low + bar.close) / 3.0;
        cum_tp_vol += typical * bar.volume as f64;
        cum_vol += bar.volume;
        result.push(if cum_vol > 0 { Some(cum_tp_vol / cum_vol as f64) } else { None });
    }
    result
}

#[derive(Debug, Clone, Copy)]
pub struct BollingerBands {
    pub mid: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Moving mean +/- k * population standard deviation over a trailing window.
pub fn bollinger(closes: &[f64], period: usize, std_mult: f64) -> Vec<Option<BollingerBands>> {
    let n = closes.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &closes[(i + 1 - period)..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        result[i] = Some(BollingerBands { mid: mean, upper: mean + std_mult * std, lower: mean - std_mult * std });
    }
    result
}

#[derive(Debug, Clone, Copy)]
pub struct Macd {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// MACD line (fast EMA - slow EMA), its signal EMA, and the histogram.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Vec<Option<Macd>> {
    let n = closes.len();
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);

    let mut macd_line: Vec<Option<f64>> = vec![None; n];
    for i in 0..n {
        if let (Some(f), Some(s)) = (ema_fast[i], ema_slow[i]) {
            macd_line[i] = Some(f - s);
        }
    }

    let macd_values: Vec<f64> = macd_line.iter().filter_map(|v| *v).collect();
    if macd_values.len() < signal_period {
        return vec![None; n];
    }

    let sig_ema = ema(&macd_values, signal_period);
    let mut result = vec![None; n];
    let mut j = 0;
    for i in 0..n {
        if let Some(line) = macd_line[i] {
            if let Some(Some(signal_line)) = sig_ema.get(j) {
                result[i] = Some(Macd { macd_line: line, signal_line: *signal_line, histogram: line - signal_line });
            }
            j += 1;
        }
    }
    result
}

#[derive(Debug, Clone, Copy)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub s1: f64,
    pub r2: f64,
    pub s2: f64,
}

/// Classic floor-trader pivots from the prior session's high/low/close.
pub fn pivot_levels(prev_high: f64, prev_low: f64, prev_close: f64) -> PivotLevels {
    let p = (prev_high + prev_low + prev_close) / 3.0;
    PivotLevels { pivot: p, r1: 2.0 * p - prev_low, s1: 2.0 * p - prev_high, r2: p + (prev_high - prev_low), s2: p - (prev_high - prev_low) }
}

#[derive(Debug, Clone, Copy)]
pub struct OpeningRange {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl OpeningRange {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range <= 0.0 {
            0.0
        } else {
            (self.close - self.open).abs() / range
        }
    }
}

/// High/low/open/close of the first `bars.len()` bars inside the opening window.
pub fn opening_range(bars: &[Bar]) -> Option<OpeningRange> {
    if bars.is_empty() {
        return None;
    }
    let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some(OpeningRange { open: bars[0].open, high, low, close: bars[bars.len() - 1].close })
}

/// Rolling simple moving average of volume.
pub fn volume_sma(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let n = bars.len();
    if period == 0 || n < period {
        return vec![None; n];
    }

    let mut result = vec![None; period - 1];
    let mut window_sum: i64 = bars[..period].iter().map(|b| b.volume).sum();
    result.push(Some(window_sum as f64 / period as f64));

    for i in period..n {
        window_sum += bars[i].volume - bars[i - period].volume;
        result.push(Some(window_sum as f64 / period as f64));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(o: f64, h: f64, l: f64, c: f64, v: i64) -> Bar {
        Bar { timestamp: Utc::now(), open: o, high: h, low: l, close: c, volume: v }
    }

    #[test]
    fn ema_seeds_with_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);
        assert_eq!(result[2], Some(2.0));
        assert!(result[0].is_none() && result[1].is_none());
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = rsi(&closes, 5);
        assert_eq!(result[5], Some(100.0));
    }

    #[test]
    fn vwap_uses_typical_price() {
        let bars = vec![bar(10.0, 12.0, 8.0, 10.0, 100)];
        let result = vwap(&bars);
        assert_eq!(result[0], Some(10.0));
    }

    #[test]
    fn bollinger_band_straddles_mean() {
        let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let bands = bollinger(&closes, 5, 2.0);
        let b = bands[4].unwrap();
        assert!(b.lower < b.mid && b.mid < b.upper);
    }

    #[test]
    fn pivot_levels_match_classic_formula() {
        let levels = pivot_levels(602.10, 599.50, 600.0);
        assert!((levels.pivot - 600.5333333333334).abs() < 1e-6);
        assert!((levels.s1 - 598.9666666666668).abs() < 1e-6);
    }

    #[test]
    fn opening_range_tracks_high_low() {
        let bars = vec![bar(602.0, 602.10, 601.0, 601.5, 1000), bar(601.5, 601.8, 599.50, 600.0, 1200)];
        let or = opening_range(&bars).unwrap();
        assert_eq!(or.range(), 602.10 - 599.50);
    }
}
