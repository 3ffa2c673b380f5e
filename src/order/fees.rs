//! Trading fee calculation

use rust_decimal::Decimal;

/// Proportional taker fee applied to trade value
#[derive(Debug, Clone, Copy)]
pub struct FeeCalculator {
    trading_fee: Decimal,
}

impl FeeCalculator {
    /// `trading_fee` is the proportional rate, e.g. 0.001 for 10 bps
    pub fn new(trading_fee: Decimal) -> Self {
        Self { trading_fee }
    }

    /// Fee for a trade of the given fiat value
    pub fn calculate_fee(&self, trade_value: Decimal) -> Decimal {
        trade_value * self.trading_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_calculate_fee() {
        let calc = FeeCalculator::new(dec!(0.001));
        assert_eq!(calc.calculate_fee(dec!(5000)), dec!(5));
        assert_eq!(calc.calculate_fee(Decimal::ZERO), Decimal::ZERO);
    }
}
