pub mod indicators;
pub mod strategies;

pub use strategies::{generate_signals, PendingSignal, Signal, SignalParams, StrategyKind};
