pub mod engine;
pub mod optimizer;

pub use engine::{run_backtest, BacktestParams, BacktestResult, BacktestSummary, DaySlice, DailyResult, SimulatedTrade};
pub use optimizer::{optimize, Objective, ParamRange, SearchSpace, Trial};
