use crate::broker::{BrokerAdapter, ChainContract};
use crate::config::Config;
use crate::domain::TradeDirection;
use crate::error::{Result, TradingError};

#[derive(Debug, Clone)]
pub struct SelectedContract {
    pub option_symbol: String,
    pub strike: f64,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub delta: f64,
}

impl SelectedContract {
    pub fn spread_percent(&self) -> f64 {
        if self.mid <= 0.0 {
            f64::INFINITY
        } else {
            (self.ask - self.bid) / self.mid * 100.0
        }
    }
}

/// Picks the contract whose |delta| is closest to the configured target,
/// subject to a spread-quality filter and a positive-bid/ask requirement.
/// Scoring combines delta distance with spread as a tie-break, matching the
/// `score = delta_distance + spread_pct/100` rule from the reference selector.
pub struct OptionSelector<'a> {
    broker: &'a dyn BrokerAdapter,
    config: &'a Config,
}

impl<'a> OptionSelector<'a> {
    pub fn new(broker: &'a dyn BrokerAdapter, config: &'a Config) -> Self {
        Self { broker, config }
    }

    pub async fn select_contract(&self, symbol: &str, direction: TradeDirection) -> Result<SelectedContract> {
        let chain = self.broker.get_option_chain(symbol, direction, 20).await?;

        let mut best: Option<(f64, ChainContract)> = None;
        for contract in chain.contracts {
            if contract.bid <= 0.0 || contract.ask <= 0.0 {
                continue;
            }
            let mid = (contract.bid + contract.ask) / 2.0;
            let spread_pct = if mid > 0.0 { (contract.ask - contract.bid) / mid * 100.0 } else { f64::INFINITY };
            if spread_pct > self.config.option_max_spread_percent {
                continue;
            }
            let delta_distance = (contract.delta.abs() - self.config.option_delta_target).abs();
            let score = delta_distance + spread_pct / 100.0;

            if best.as_ref().map(|(best_score, _)| score < *best_score).unwrap_or(true) {
                best = Some((score, contract));
            }
        }

        let (_, contract) = best.ok_or_else(|| TradingError::Pricing("no suitable contract found (all too illiquid)".into()))?;
        let mid = (contract.bid + contract.ask) / 2.0;
        Ok(SelectedContract {
            option_symbol: contract.option_symbol,
            strike: contract.strike,
            bid: contract.bid,
            ask: contract.ask,
            mid,
            delta: contract.delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;

    #[tokio::test]
    async fn selects_contract_near_target_delta() {
        let broker = PaperBroker::new(600.0, 15.0);
        let config = Config::from_env();
        let selector = OptionSelector::new(&broker, &config);
        let selected = selector.select_contract("SPY", TradeDirection::Call).await.unwrap();
        assert!(selected.delta > 0.0);
        assert!(selected.spread_percent().is_finite());
    }
}
