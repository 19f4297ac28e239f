use common::{ArbitrageOpportunity, FeeBreakdown, FeeSchedule};
use chrono::Utc;

/// Cross-venue spread evaluator
///
/// Compares the CEX trade price against the DEX midpoint and nets out the
/// configured fee schedule. Profitability is decided by the sign of the
/// fee-adjusted spread alone.
#[derive(Debug, Clone)]
pub struct ArbitrageEvaluator {
    fees: FeeSchedule,
}

impl ArbitrageEvaluator {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn evaluate(&self, symbol: &str, venue_a_price: f64, venue_b_price: f64) -> ArbitrageOpportunity {
        let opportunity = evaluate(venue_a_price, venue_b_price, symbol, &self.fees);

        if opportunity.is_profitable {
            tracing::debug!(
                "Spread on {}: {:.4}% after fees (a={}, b={})",
                symbol,
                opportunity.profit_percentage,
                venue_a_price,
                venue_b_price
            );
        }

        opportunity
    }
}

impl Default for ArbitrageEvaluator {
    fn default() -> Self {
        Self::new(FeeSchedule::default())
    }
}

/// Fee-adjusted spread for one unit of the base asset
pub fn evaluate(
    venue_a_price: f64,
    venue_b_price: f64,
    symbol: &str,
    fees: &FeeSchedule,
) -> ArbitrageOpportunity {
    let total_fees = fees.total();

    let price_diff = (venue_a_price - venue_b_price).abs();
    let base_price = venue_a_price.min(venue_b_price);
    let profit_percentage = (price_diff / base_price) * 100.0 - total_fees * 100.0;
    let estimated_profit = price_diff - base_price * total_fees;

    ArbitrageOpportunity {
        symbol: symbol.to_string(),
        venue_a_price,
        venue_b_price,
        profit_percentage,
        estimated_profit,
        is_profitable: profit_percentage > 0.0,
        fee_breakdown: FeeBreakdown::from(fees),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_prices_without_fees_is_not_profitable() {
        let opp = evaluate(100.0, 100.0, "BTCUSDC", &FeeSchedule::zero());
        assert_eq!(opp.profit_percentage, 0.0);
        assert_eq!(opp.estimated_profit, 0.0);
        assert!(!opp.is_profitable);
    }

    #[test]
    fn test_one_percent_spread_clears_fees() {
        let fees = FeeSchedule {
            venue_a: 0.001,
            venue_b: 0.003,
            network: 0.000005,
        };
        let opp = evaluate(101.0, 100.0, "BTCUSDC", &fees);

        assert!((opp.profit_percentage - 0.5995).abs() < 1e-9);
        assert!((opp.estimated_profit - (1.0 - 100.0 * 0.004005)).abs() < 1e-9);
        assert!(opp.is_profitable);
        assert!((opp.fee_breakdown.venue_a - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_direction_does_not_matter() {
        let fees = FeeSchedule::default();
        let a_high = evaluate(101.0, 100.0, "ETHUSDC", &fees);
        let b_high = evaluate(100.0, 101.0, "ETHUSDC", &fees);

        assert_eq!(a_high.profit_percentage, b_high.profit_percentage);
        assert_eq!(a_high.estimated_profit, b_high.estimated_profit);
        assert_eq!(b_high.venue_a_price, 100.0);
    }

    #[test]
    fn test_spread_smaller_than_fees() {
        let opp = evaluate(100.2, 100.0, "SOLUSDC", &FeeSchedule::default());
        assert!(opp.profit_percentage < 0.0);
        assert!(opp.estimated_profit < 0.0);
        assert!(!opp.is_profitable);
    }

    #[test]
    fn test_evaluator_uses_configured_fees() {
        let evaluator = ArbitrageEvaluator::new(FeeSchedule::zero());
        let opp = evaluator.evaluate("BTCUSDC", 100.5, 100.0);
        assert!((opp.profit_percentage - 0.5).abs() < 1e-9);
        assert_eq!(evaluator.fees(), &FeeSchedule::zero());
    }
}
