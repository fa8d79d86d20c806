use crate::domain::TradeDirection;

/// Minutes below which time value is negligible; price collapses to intrinsic.
const MIN_T_YEARS: f64 = 1.0 / 525_600.0;
const DEFAULT_RATE: f64 = 0.05;
const MINUTES_PER_YEAR: f64 = 525_600.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionPrice {
    pub price: f64,
    pub delta: f64,
}

/// Standard normal CDF via `erf`, so the pricer carries no statistics crate.
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm_erf(x / std::f64::consts::SQRT_2))
}

#[allow(dead_code)]
fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz & Stegun 7.1.26 rational approximation of erf, accurate to ~1.5e-7.
fn libm_erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// European Black-Scholes with a negligible constant risk-free rate. `t_years`
/// below `MIN_T_YEARS` short-circuits to intrinsic value (the option is about
/// to expire and has no meaningful time value left).
pub fn black_scholes(
    underlying: f64,
    strike: f64,
    t_years: f64,
    sigma: f64,
    direction: TradeDirection,
) -> OptionPrice {
    black_scholes_rate(underlying, strike, t_years, sigma, DEFAULT_RATE, direction)
}

pub fn black_scholes_rate(
    underlying: f64,
    strike: f64,
    t_years: f64,
    sigma: f64,
    rate: f64,
    direction: TradeDirection,
) -> OptionPrice {
    if t_years < MIN_T_YEARS || sigma <= 0.0 {
        let intrinsic = match direction {
            TradeDirection::Call => (underlying - strike).max(0.0),
            TradeDirection::Put => (strike - underlying).max(0.0),
        };
        let delta = match direction {
            TradeDirection::Call => {
                if underlying > strike {
                    1.0
                } else {
                    0.0
                }
            }
            TradeDirection::Put => {
                if underlying < strike {
                    -1.0
                } else {
                    0.0
                }
            }
        };
        return OptionPrice { price: intrinsic, delta };
    }

    let sqrt_t = t_years.sqrt();
    let d1 = ((underlying / strike).ln() + (rate + sigma * sigma / 2.0) * t_years) / (sigma * sqrt_t);
    let d2 = d1 - sigma * sqrt_t;
    let discount = (-rate * t_years).exp();

    match direction {
        TradeDirection::Call => OptionPrice {
            price: underlying * norm_cdf(d1) - strike * discount * norm_cdf(d2),
            delta: norm_cdf(d1),
        },
        TradeDirection::Put => OptionPrice {
            price: strike * discount * norm_cdf(-d2) - underlying * norm_cdf(-d1),
            delta: norm_cdf(d1) - 1.0,
        },
    }
}

/// Search strikes at `strike_interval` in `[ATM - 20*interval, ATM + 20*interval]`
/// and keep the one whose |delta| is closest to `target_delta`.
pub fn select_strike_for_delta(
    underlying_price: f64,
    target_delta: f64,
    minutes_to_expiry: f64,
    vix: f64,
    direction: TradeDirection,
    strike_interval: f64,
) -> (f64, OptionPrice) {
    let atm = (underlying_price / strike_interval).round() * strike_interval;
    let t_years = minutes_to_expiry / MINUTES_PER_YEAR;
    let sigma = vix / 100.0;

    let mut best_strike = atm;
    let mut best_price = black_scholes(underlying_price, atm, t_years, sigma, direction);
    let mut best_distance = (best_price.delta.abs() - target_delta).abs();

    for offset in -20..=20 {
        if offset == 0 {
            continue;
        }
        let strike = atm + offset as f64 * strike_interval;
        if strike <= 0.0 {
            continue;
        }
        let price = black_scholes(underlying_price, strike, t_years, sigma, direction);
        let distance = (price.delta.abs() - target_delta).abs();
        if distance < best_distance {
            best_distance = distance;
            best_strike = strike;
            best_price = price;
        }
    }

    (best_strike, best_price)
}

/// Convenience wrapper: Black-Scholes mid estimate at a point in time, used by
/// the backtest simulator to synthesize option prices from underlying bars.
pub fn estimate_option_price_at(
    underlying_price: f64,
    strike: f64,
    minutes_to_expiry: f64,
    vix: f64,
    direction: TradeDirection,
) -> OptionPrice {
    let t_years = (minutes_to_expiry.max(0.0)) / MINUTES_PER_YEAR;
    let sigma = vix / 100.0;
    black_scholes(underlying_price, strike, t_years, sigma, direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atm_call_delta_near_half() {
        let p = black_scholes(600.0, 600.0, 1.0 / 252.0, 0.15, TradeDirection::Call);
        assert!((p.delta - 0.5).abs() < 0.1);
    }

    #[test]
    fn deep_itm_call_delta_near_one() {
        let p = black_scholes(650.0, 500.0, 1.0 / 252.0, 0.15, TradeDirection::Call);
        assert!(p.delta > 0.95);
    }

    #[test]
    fn put_delta_is_negative() {
        let p = black_scholes(600.0, 600.0, 1.0 / 252.0, 0.15, TradeDirection::Put);
        assert!(p.delta < 0.0);
    }

    #[test]
    fn near_expiry_is_intrinsic() {
        let p = black_scholes(605.0, 600.0, 1.0 / 525_600.0 / 2.0, 0.15, TradeDirection::Call);
        assert!((p.price - 5.0).abs() < 0.01);
    }

    #[test]
    fn strike_selection_prefers_target_delta() {
        let (strike, price) = select_strike_for_delta(600.0, 0.4, 300.0, 15.0, TradeDirection::Call, 1.0);
        assert!(strike > 0.0);
        assert!((price.delta - 0.4).abs() < 0.15);
    }
}
