//! Read-only price analysis for a named item
//!
//! Pulls the lowest-price listings for a name query and summarizes the
//! order book: lowest and second-lowest ask, mean and median, and how far
//! the floor sits below the rest. The `should_buy` verdict flags a floor
//! that is both clearly detached from the next ask and deep under the
//! median, which is the usual shape of a mispriced listing.

use crate::types::Listing;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;

/// Gap to the second-lowest ask must exceed this (percent)
const GAP_THRESHOLD_PCT: Decimal = dec!(10);

/// Discount under the median ask must exceed this (percent)
const MEDIAN_DISCOUNT_THRESHOLD_PCT: Decimal = dec!(20);

/// Summary of the current asks for one item name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceStats {
    pub samples: usize,
    pub lowest: Decimal,
    pub second_lowest: Decimal,
    pub mean: Decimal,
    pub median: Decimal,
    /// How far the floor sits under the second-lowest ask, percent
    pub gap_pct: Decimal,
    /// How far the floor sits under the median ask, percent
    pub median_discount_pct: Decimal,
    /// How far the floor sits under the mean ask, percent
    pub mean_discount_pct: Decimal,
}

impl PriceStats {
    /// Compute stats over the listed prices (NESO). Needs at least two
    /// samples; a lone ask has no book to compare against.
    pub fn compute(prices: &[Decimal]) -> Option<Self> {
        if prices.len() < 2 {
            return None;
        }

        let mut sorted = prices.to_vec();
        sorted.sort();

        let lowest = sorted[0];
        let second_lowest = sorted[1];
        let count = Decimal::from(sorted.len());
        let mean = sorted.iter().sum::<Decimal>() / count;
        let median = {
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / dec!(2)
            } else {
                sorted[mid]
            }
        };

        Some(Self {
            samples: sorted.len(),
            lowest,
            second_lowest,
            mean,
            median,
            gap_pct: discount_pct(lowest, second_lowest),
            median_discount_pct: discount_pct(lowest, median),
            mean_discount_pct: discount_pct(lowest, mean),
        })
    }

    /// Extract prices from listings, dropping ones with malformed wei
    pub fn from_listings(listings: &[Listing]) -> Option<Self> {
        let prices: Vec<Decimal> = listings.iter().filter_map(|l| l.price_neso()).collect();
        Self::compute(&prices)
    }

    /// Floor clearly detached from the next ask and deep under the median
    pub fn should_buy(&self) -> bool {
        self.gap_pct > GAP_THRESHOLD_PCT && self.median_discount_pct > MEDIAN_DISCOUNT_THRESHOLD_PCT
    }
}

/// Percent by which `floor` undercuts `reference`
fn discount_pct(floor: Decimal, reference: Decimal) -> Decimal {
    if reference.is_zero() {
        return Decimal::ZERO;
    }
    (reference - floor) / reference * dec!(100)
}

impl fmt::Display for PriceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  samples:        {}", self.samples)?;
        writeln!(f, "  lowest ask:     {} NESO", self.lowest.round_dp(2))?;
        writeln!(f, "  second lowest:  {} NESO", self.second_lowest.round_dp(2))?;
        writeln!(f, "  median ask:     {} NESO", self.median.round_dp(2))?;
        writeln!(f, "  mean ask:       {} NESO", self.mean.round_dp(2))?;
        writeln!(f, "  gap to second:  {}%", self.gap_pct.round_dp(1))?;
        writeln!(
            f,
            "  under median:   {}%",
            self.median_discount_pct.round_dp(1)
        )?;
        writeln!(
            f,
            "  under mean:     {}%",
            self.mean_discount_pct.round_dp(1)
        )?;
        write!(
            f,
            "  verdict:        {}",
            if self.should_buy() {
                "BUY - floor is detached"
            } else {
                "pass"
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn needs_at_least_two_samples() {
        assert!(PriceStats::compute(&[]).is_none());
        assert!(PriceStats::compute(&prices(&[100])).is_none());
        assert!(PriceStats::compute(&prices(&[100, 200])).is_some());
    }

    #[test]
    fn stats_over_unsorted_input() {
        let stats = PriceStats::compute(&prices(&[300, 100, 200, 400])).unwrap();
        assert_eq!(stats.lowest, Decimal::from(100));
        assert_eq!(stats.second_lowest, Decimal::from(200));
        assert_eq!(stats.mean, Decimal::from(250));
        assert_eq!(stats.median, Decimal::from(250));
        assert_eq!(stats.gap_pct, Decimal::from(50));
        assert_eq!(stats.median_discount_pct, Decimal::from(60));
    }

    #[test]
    fn odd_sample_count_takes_middle_median() {
        let stats = PriceStats::compute(&prices(&[100, 200, 300])).unwrap();
        assert_eq!(stats.median, Decimal::from(200));
    }

    #[test]
    fn detached_floor_is_a_buy() {
        // Floor 100 vs second 150 (33% gap) vs median 200 (50% under)
        let stats = PriceStats::compute(&prices(&[100, 150, 200, 200, 250])).unwrap();
        assert!(stats.should_buy());
    }

    #[test]
    fn tight_book_is_a_pass() {
        // Floor barely under the rest: no gap, no discount
        let stats = PriceStats::compute(&prices(&[100, 102, 104, 106])).unwrap();
        assert!(!stats.should_buy());
    }

    #[test]
    fn gap_without_median_discount_is_a_pass() {
        // 16.7% gap to the second ask, but only ~17% under the median
        let stats = PriceStats::compute(&prices(&[100, 120, 121, 122])).unwrap();
        assert!(stats.gap_pct > GAP_THRESHOLD_PCT);
        assert!(!stats.should_buy());
    }

    #[test]
    fn malformed_prices_are_dropped_from_listings() {
        let good = |id: u64, wei: &str| Listing {
            token_id: id,
            name: "Gold Maple Leaf".to_string(),
            price_wei: wei.to_string(),
            skills: Default::default(),
        };
        let listings = vec![
            good(1, "100000000000000000000"),
            good(2, "oops"),
            good(3, "200000000000000000000"),
        ];
        let stats = PriceStats::from_listings(&listings).unwrap();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.lowest, Decimal::from(100));
    }
}
