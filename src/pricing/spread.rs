/// Calibrated to SPY 0DTE empirical spreads: ATM (|delta| ~0.50) ~4% of mid,
/// OTM (|delta| ~0.25) ~11%, deep (|delta| ~0.10) ~22%. Each tuple is
/// (abs_delta, spread_as_fraction_of_mid), sorted by descending delta.
const DELTA_ANCHORS: [(f64, f64); 5] = [
    (0.50, 0.04),
    (0.40, 0.065),
    (0.25, 0.11),
    (0.10, 0.22),
    (0.05, 0.35),
];

const MIN_SPREAD_DOLLARS: f64 = 0.05;
const MAX_SPREAD_PCT: f64 = 0.50;

/// Full bid-ask spread as a fraction of option mid price. A result of 0.08
/// means 8% of mid; entry slippage is half that, exit slippage the other half.
///
/// `liquidity_mult` scales for ticker liquidity tier: 1.0 = SPY/QQQ (the
/// calibration baseline), 1.5 = large caps, 2.5 = mid liquidity, 4.0 = illiquid.
pub fn estimate_spread_pct(
    delta: f64,
    minutes_to_close: f64,
    vix: f64,
    option_mid_price: f64,
    is_0dte: bool,
    liquidity_mult: f64,
) -> f64 {
    let abs_delta = delta.abs().clamp(0.01, 0.99);

    let base_spread = if abs_delta >= DELTA_ANCHORS[0].0 {
        DELTA_ANCHORS[0].1
    } else if abs_delta <= DELTA_ANCHORS[DELTA_ANCHORS.len() - 1].0 {
        DELTA_ANCHORS[DELTA_ANCHORS.len() - 1].1
    } else {
        let mut interpolated = DELTA_ANCHORS[DELTA_ANCHORS.len() - 1].1;
        for window in DELTA_ANCHORS.windows(2) {
            let (d_high, s_high) = window[0];
            let (d_low, s_low) = window[1];
            if abs_delta >= d_low && abs_delta <= d_high {
                let t = (abs_delta - d_low) / (d_high - d_low);
                interpolated = s_low + t * (s_high - s_low);
                break;
            }
        }
        interpolated
    };

    let time_mult = if is_0dte {
        if minutes_to_close <= 15.0 {
            2.5
        } else if minutes_to_close <= 30.0 {
            2.0
        } else if minutes_to_close <= 60.0 {
            let t = (60.0 - minutes_to_close) / 30.0;
            1.4 + t * 0.6
        } else if minutes_to_close <= 120.0 {
            let t = (120.0 - minutes_to_close) / 60.0;
            1.1 + t * 0.3
        } else {
            1.0
        }
    } else if minutes_to_close <= 60.0 {
        1.3
    } else if minutes_to_close <= 120.0 {
        1.1
    } else {
        1.0
    };

    let vix_mult = if vix <= 20.0 {
        1.0
    } else if vix <= 30.0 {
        1.0 + (vix - 20.0) / 10.0 * 0.3
    } else {
        (1.3 + (vix - 30.0) / 20.0 * 0.2_f64).min(1.5)
    };

    let mut spread_pct = base_spread * time_mult * vix_mult * liquidity_mult;

    if option_mid_price > 0.0 {
        let min_spread_pct = MIN_SPREAD_DOLLARS / option_mid_price;
        spread_pct = spread_pct.max(min_spread_pct);
    }

    spread_pct.min(MAX_SPREAD_PCT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atm_spread_is_narrow() {
        let s = estimate_spread_pct(0.50, 300.0, 15.0, 2.0, true, 1.0);
        assert!((s - 0.04).abs() < 1e-9);
    }

    #[test]
    fn deep_otm_spread_is_wide() {
        let s = estimate_spread_pct(0.05, 300.0, 15.0, 2.0, true, 1.0);
        assert!((s - 0.35).abs() < 1e-9);
    }

    #[test]
    fn spread_widens_near_close_0dte() {
        let wide_open = estimate_spread_pct(0.40, 300.0, 15.0, 2.0, true, 1.0);
        let near_close = estimate_spread_pct(0.40, 10.0, 15.0, 2.0, true, 1.0);
        assert!(near_close > wide_open);
    }

    #[test]
    fn min_dollar_floor_applies_to_cheap_options() {
        let s = estimate_spread_pct(0.50, 300.0, 15.0, 0.10, true, 1.0);
        assert!(s >= MIN_SPREAD_DOLLARS / 0.10 - 1e-9);
    }

    #[test]
    fn spread_never_exceeds_cap() {
        let s = estimate_spread_pct(0.01, 5.0, 80.0, 0.05, true, 4.0);
        assert!(s <= MAX_SPREAD_PCT);
    }
}
