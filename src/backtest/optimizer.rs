use rand::Rng;

use super::engine::{run_backtest, BacktestParams, BacktestSummary, DaySlice};

/// An inclusive uniform range to sample a single numeric knob from.
#[derive(Debug, Clone, Copy)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Which knobs to vary; `None` leaves the corresponding field at its base value.
#[derive(Debug, Clone, Default)]
pub struct SearchSpace {
    pub ema_fast: Option<ParamRange>,
    pub ema_slow: Option<ParamRange>,
    pub stop_loss_percent: Option<ParamRange>,
    pub profit_target_percent: Option<ParamRange>,
    pub trailing_stop_percent: Option<ParamRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    TotalPnl,
    ProfitFactor,
}

#[derive(Debug, Clone)]
pub struct Trial {
    pub params: BacktestParams,
    pub summary: BacktestSummary,
}

fn score(summary: &BacktestSummary, objective: Objective) -> f64 {
    match objective {
        Objective::TotalPnl => summary.total_pnl,
        Objective::ProfitFactor => {
            if summary.profit_factor.is_finite() {
                summary.profit_factor
            } else {
                f64::MAX
            }
        }
    }
}

/// Runs `trials` independent random draws from `space` over `base`, scores
/// each by `objective` (ties broken by profit factor then max drawdown), and
/// returns the top `top_k`. Each trial is fully independent — no shared
/// mutable state — so trials are safe to evaluate concurrently.
pub fn optimize(
    days: &[DaySlice],
    base: &BacktestParams,
    space: &SearchSpace,
    trials: usize,
    top_k: usize,
    objective: Objective,
    rng: &mut impl Rng,
) -> Vec<Trial> {
    let mut results = Vec::with_capacity(trials);

    for _ in 0..trials {
        let mut params = base.clone();
        if let Some(r) = space.ema_fast {
            params.signal.ema_fast = r.sample(rng).round() as usize;
        }
        if let Some(r) = space.ema_slow {
            params.signal.ema_slow = r.sample(rng).round() as usize;
        }
        if let Some(r) = space.stop_loss_percent {
            params.stop_loss_percent = r.sample(rng);
        }
        if let Some(r) = space.profit_target_percent {
            params.profit_target_percent = r.sample(rng);
        }
        if let Some(r) = space.trailing_stop_percent {
            params.trailing_stop_percent = r.sample(rng);
        }

        if params.signal.ema_fast >= params.signal.ema_slow {
            continue;
        }

        let result = run_backtest(days, &params);
        results.push(Trial { params, summary: result.summary });
    }

    results.sort_by(|a, b| {
        score(&b.summary, objective)
            .partial_cmp(&score(&a.summary, objective))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.summary.profit_factor.partial_cmp(&a.summary.profit_factor).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.summary.max_drawdown.partial_cmp(&b.summary.max_drawdown).unwrap_or(std::cmp::Ordering::Equal))
    });
    results.truncate(top_k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Bar;
    use chrono::TimeZone;
    use chrono::Utc;

    fn sample_day() -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 13, 30, 0).unwrap();
        (0..40)
            .map(|i| {
                let close = 600.0 + (i as f64 * 0.1).sin() * 2.0 + i as f64 * 0.05;
                Bar { timestamp: base + chrono::Duration::minutes(i * 5), open: close - 0.05, high: close + 0.3, low: close - 0.3, close, volume: 40_000 }
            })
            .collect()
    }

    #[test]
    fn optimizer_returns_at_most_top_k_sorted_by_objective() {
        let bars = sample_day();
        let day = DaySlice { date: bars[0].timestamp.date_naive(), bars: &bars, prev_high: None, prev_low: None, prev_close: None };
        let base = BacktestParams::default();
        let space = SearchSpace { stop_loss_percent: Some(ParamRange::new(8.0, 25.0)), ..Default::default() };

        let mut rng = rand::thread_rng();
        let trials = optimize(&[day], &base, &space, 8, 3, Objective::TotalPnl, &mut rng);
        assert!(trials.len() <= 3);
        for pair in trials.windows(2) {
            assert!(score(&pair[0].summary, Objective::TotalPnl) >= score(&pair[1].summary, Objective::TotalPnl));
        }
    }
}
