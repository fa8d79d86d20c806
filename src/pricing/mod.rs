pub mod black_scholes;
pub mod spread;

pub use black_scholes::{black_scholes, select_strike_for_delta, OptionPrice};
pub use spread::estimate_spread_pct;
