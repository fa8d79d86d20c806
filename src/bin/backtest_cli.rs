use chrono::{Duration, NaiveDate, TimeZone, Utc};
use daytrader_agent::backtest::{self, BacktestParams, DaySlice};
use daytrader_agent::broker::Bar;
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Generates a synthetic multi-day 5-minute bar series and runs it through
/// the same bar-walk the live scheduler drives trades against, printing the
/// aggregate summary. There is no historical data source wired up (the paper
/// broker's `get_price_history` is a live-quote stub, not a data feed), so
/// this is a smoke-test harness for strategy/parameter changes rather than a
/// replay of real sessions.
fn synthetic_session(date: NaiveDate, start_price: f64, seed_bias: f64, rng: &mut impl Rng) -> Vec<Bar> {
    let open = Utc
        .from_utc_datetime(&date.and_hms_opt(13, 30, 0).expect("valid market-open time"));
    let mut price = start_price;
    (0..78) // 6.5 trading hours in 5-minute bars
        .map(|i| {
            let drift = seed_bias + rng.gen_range(-0.35..0.35);
            let bar_open = price;
            price = (price + drift).max(1.0);
            let high = bar_open.max(price) + rng.gen_range(0.0..0.15);
            let low = bar_open.min(price) - rng.gen_range(0.0..0.15);
            Bar {
                timestamp: open + Duration::minutes(i * 5),
                open: bar_open,
                high,
                low,
                close: price,
                volume: rng.gen_range(10_000..80_000),
            }
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())).init();

    let days: i64 = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(20);

    let mut rng = rand::thread_rng();
    let first_day = Utc::now().date_naive() - Duration::days(days);
    let mut price = 600.0;
    let mut prev_close = None;

    let mut all_bars: Vec<Vec<Bar>> = Vec::with_capacity(days as usize);
    for d in 0..days {
        let date = first_day + Duration::days(d);
        if date.format("%u").to_string().parse::<u32>().unwrap_or(1) > 5 {
            continue; // skip weekends
        }
        let bias = rng.gen_range(-0.08..0.08);
        let bars = synthetic_session(date, price, bias, &mut rng);
        price = bars.last().expect("synthetic_session always returns 78 bars").close;
        all_bars.push(bars);
    }

    let params = BacktestParams::default();
    let slices: Vec<DaySlice> = all_bars
        .iter()
        .map(|bars| {
            let date = bars[0].timestamp.date_naive();
            let slice = DaySlice { date, bars: bars.as_slice(), prev_high: None, prev_low: None, prev_close };
            prev_close = bars.last().map(|b| b.close);
            slice
        })
        .collect();

    info!(days = slices.len(), "running synthetic backtest");
    let result = backtest::run_backtest(&slices, &params);

    println!("trading days:     {}", result.daily.len());
    println!("total trades:     {}", result.summary.total_trades);
    println!("win rate:         {:.1}%", result.summary.win_rate);
    println!("total pnl:        ${:.2}", result.summary.total_pnl);
    println!("profit factor:    {:.2}", result.summary.profit_factor);
    println!("max drawdown:     ${:.2}", result.summary.max_drawdown);
    println!("avg hold minutes: {:.1}", result.summary.avg_hold_minutes);
    println!("exit reasons:");
    let mut reasons: Vec<_> = result.summary.exit_reason_counts.iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(a.1));
    for (reason, count) in reasons {
        println!("  {reason:<16} {count}");
    }

    Ok(())
}
