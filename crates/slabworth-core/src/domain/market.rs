use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ProviderId, Sale, UtcDateTime};

/// Direction of recent price movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// Observed min/max sale price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Merged, statistically derived market view for one card + grade.
///
/// Always rebuilt from the full merged sale set on a cache miss, never
/// partially mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAggregate {
    /// Newest first, capped at [`MarketAggregate::RECENT_SALES_CAP`].
    pub recent_sales: Vec<Sale>,
    pub average_price: f64,
    pub median_price: f64,
    pub price_range: PriceRange,
    /// Sales per 30-day period, rounded.
    pub velocity: f64,
    pub trend: Trend,
    pub last_updated: UtcDateTime,
    /// Providers that contributed at least one sale, sorted and deduplicated.
    pub data_sources: Vec<ProviderId>,
}

impl MarketAggregate {
    pub const RECENT_SALES_CAP: usize = 20;

    /// Minimum merged sample before a trend other than `Stable` is reported.
    const TREND_MIN_SAMPLE: usize = 5;
    const TREND_RISING_FACTOR: f64 = 1.1;
    const TREND_FALLING_FACTOR: f64 = 0.9;

    /// Aggregate with no market signal, returned when every provider
    /// responded but none had sales to report.
    pub fn zero(now: UtcDateTime) -> Self {
        Self {
            recent_sales: Vec::new(),
            average_price: 0.0,
            median_price: 0.0,
            price_range: PriceRange { min: 0.0, max: 0.0 },
            velocity: 0.0,
            trend: Trend::Stable,
            last_updated: now,
            data_sources: Vec::new(),
        }
    }

    /// Build the aggregate from a merged sale set.
    ///
    /// Sorting, statistics, and trend classification are deterministic over
    /// the input set, so the same sales always produce an equal aggregate.
    pub fn from_sales(mut sales: Vec<Sale>, now: UtcDateTime) -> Self {
        if sales.is_empty() {
            return Self::zero(now);
        }

        sales.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let mut data_sources: Vec<ProviderId> = sales.iter().map(|sale| sale.source).collect();
        data_sources.sort();
        data_sources.dedup();

        let mut prices: Vec<f64> = sales.iter().map(|sale| sale.price).collect();
        prices.sort_by(|a, b| a.partial_cmp(b).expect("sale prices are finite"));

        let count = prices.len();
        let average_price = prices.iter().sum::<f64>() / count as f64;
        let median_price = if count % 2 == 1 {
            prices[count / 2]
        } else {
            (prices[count / 2 - 1] + prices[count / 2]) / 2.0
        };
        let price_range = PriceRange {
            min: prices[0],
            max: prices[count - 1],
        };

        let oldest = sales[count - 1].occurred_at;
        let elapsed_days = oldest.whole_days_until(now).max(1);
        let velocity = (count as f64 / elapsed_days as f64 * 30.0).round();

        let trend = classify_trend(&sales);

        let mut recent_sales = sales;
        recent_sales.truncate(Self::RECENT_SALES_CAP);

        Self {
            recent_sales,
            average_price,
            median_price,
            price_range,
            velocity,
            trend,
            last_updated: now,
            data_sources,
        }
    }
}

/// Compare the newest slice of sales against the oldest.
///
/// `sales` must already be sorted newest first.
fn classify_trend(sales: &[Sale]) -> Trend {
    if sales.len() < MarketAggregate::TREND_MIN_SAMPLE {
        return Trend::Stable;
    }

    let half = MarketAggregate::TREND_MIN_SAMPLE.min(sales.len() / 2);
    let recent_mean =
        sales[..half].iter().map(|sale| sale.price).sum::<f64>() / half as f64;
    let older_mean = sales[sales.len() - half..]
        .iter()
        .map(|sale| sale.price)
        .sum::<f64>()
        / half as f64;

    if recent_mean > older_mean * MarketAggregate::TREND_RISING_FACTOR {
        Trend::Rising
    } else if recent_mean < older_mean * MarketAggregate::TREND_FALLING_FACTOR {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

/// Graded-population counts for one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationReport {
    pub total: u64,
    pub by_grade: BTreeMap<String, u64>,
    /// Contributing providers; single-element when built by one provider.
    pub sources: Vec<ProviderId>,
    pub last_updated: UtcDateTime,
}

impl PopulationReport {
    /// Report with no graded population on record.
    pub fn empty(now: UtcDateTime) -> Self {
        Self {
            total: 0,
            by_grade: BTreeMap::new(),
            sources: Vec::new(),
            last_updated: now,
        }
    }

    pub fn single(
        total: u64,
        by_grade: BTreeMap<String, u64>,
        source: ProviderId,
        last_updated: UtcDateTime,
    ) -> Self {
        Self {
            total,
            by_grade,
            sources: vec![source],
            last_updated,
        }
    }

    /// Merge reports from several providers.
    ///
    /// The authoritative grading service wins outright when it responded.
    /// Otherwise counts are merged as an element-wise maximum per grade —
    /// never summed, since providers index overlapping populations.
    pub fn merge(
        reports: Vec<PopulationReport>,
        authoritative: ProviderId,
        now: UtcDateTime,
    ) -> Option<PopulationReport> {
        if reports.is_empty() {
            return None;
        }

        if let Some(report) = reports
            .iter()
            .find(|report| report.sources.contains(&authoritative))
        {
            return Some(report.clone());
        }

        let mut by_grade: BTreeMap<String, u64> = BTreeMap::new();
        let mut sources: Vec<ProviderId> = Vec::new();
        let mut largest_total = 0;

        for report in reports {
            for (grade, count) in report.by_grade {
                let slot = by_grade.entry(grade).or_insert(0);
                *slot = (*slot).max(count);
            }
            largest_total = largest_total.max(report.total);
            sources.extend(report.sources);
        }

        sources.sort();
        sources.dedup();

        let grade_sum: u64 = by_grade.values().sum();
        Some(PopulationReport {
            total: grade_sum.max(largest_total),
            by_grade,
            sources,
            last_updated: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sale;

    fn sale(price: f64, days_ago: i64, source: ProviderId) -> Sale {
        let occurred_at = UtcDateTime::now()
            .days_before(days_ago)
            .expect("timestamp in range");
        Sale::new(price, occurred_at, source, "PSA 10", "test listing", None)
            .expect("valid sale")
    }

    #[test]
    fn empty_sale_set_yields_zero_aggregate() {
        let aggregate = MarketAggregate::from_sales(Vec::new(), UtcDateTime::now());
        assert_eq!(aggregate.average_price, 0.0);
        assert_eq!(aggregate.trend, Trend::Stable);
        assert!(aggregate.data_sources.is_empty());
        assert!(aggregate.recent_sales.is_empty());
    }

    #[test]
    fn statistics_cover_mean_median_and_range() {
        let sales = vec![
            sale(100.0, 1, ProviderId::Ebay),
            sale(200.0, 2, ProviderId::Ebay),
            sale(300.0, 3, ProviderId::SportsCardsPro),
        ];

        let aggregate = MarketAggregate::from_sales(sales, UtcDateTime::now());
        assert_eq!(aggregate.average_price, 200.0);
        assert_eq!(aggregate.median_price, 200.0);
        assert_eq!(aggregate.price_range.min, 100.0);
        assert_eq!(aggregate.price_range.max, 300.0);
        assert_eq!(
            aggregate.data_sources,
            vec![ProviderId::Ebay, ProviderId::SportsCardsPro]
        );
    }

    #[test]
    fn rising_trend_detected_from_ten_sale_split() {
        // 5 most recent average $150, 5 oldest average $100.
        let mut sales = Vec::new();
        for day in 0..5 {
            sales.push(sale(150.0, day, ProviderId::Ebay));
        }
        for day in 10..15 {
            sales.push(sale(100.0, day, ProviderId::Ebay));
        }

        let aggregate = MarketAggregate::from_sales(sales, UtcDateTime::now());
        assert_eq!(aggregate.trend, Trend::Rising);
    }

    #[test]
    fn five_percent_move_stays_stable() {
        let mut sales = Vec::new();
        for day in 0..5 {
            sales.push(sale(95.0, day, ProviderId::Ebay));
        }
        for day in 10..15 {
            sales.push(sale(100.0, day, ProviderId::Ebay));
        }

        let aggregate = MarketAggregate::from_sales(sales, UtcDateTime::now());
        assert_eq!(aggregate.trend, Trend::Stable);
    }

    #[test]
    fn fewer_than_five_sales_is_always_stable() {
        let sales = vec![
            sale(500.0, 0, ProviderId::Ebay),
            sale(100.0, 20, ProviderId::Ebay),
        ];
        let aggregate = MarketAggregate::from_sales(sales, UtcDateTime::now());
        assert_eq!(aggregate.trend, Trend::Stable);
    }

    #[test]
    fn recent_sales_capped_at_twenty() {
        let sales = (0..30)
            .map(|day| sale(50.0 + day as f64, day, ProviderId::CardLadder))
            .collect();
        let aggregate = MarketAggregate::from_sales(sales, UtcDateTime::now());
        assert_eq!(aggregate.recent_sales.len(), 20);
        // Newest first.
        assert_eq!(aggregate.recent_sales[0].price, 50.0);
    }

    #[test]
    fn aggregation_is_deterministic_over_the_same_input() {
        let sales: Vec<Sale> = (0..8)
            .map(|day| sale(80.0 + day as f64 * 3.0, day, ProviderId::Ebay))
            .collect();
        let now = UtcDateTime::now();

        let first = MarketAggregate::from_sales(sales.clone(), now);
        let second = MarketAggregate::from_sales(sales, now);
        assert_eq!(first, second);
    }

    #[test]
    fn authoritative_population_report_wins() {
        let now = UtcDateTime::now();
        let psa = PopulationReport::single(
            1000,
            BTreeMap::from([(String::from("10"), 100), (String::from("9"), 400)]),
            ProviderId::Psa,
            now,
        );
        let other = PopulationReport::single(
            5000,
            BTreeMap::from([(String::from("10"), 900)]),
            ProviderId::SportsCardsPro,
            now,
        );

        let merged = PopulationReport::merge(vec![other, psa.clone()], ProviderId::Psa, now)
            .expect("non-empty");
        assert_eq!(merged, psa);
    }

    #[test]
    fn overlapping_reports_take_element_wise_maximum_not_sum() {
        let now = UtcDateTime::now();
        let first = PopulationReport::single(
            300,
            BTreeMap::from([(String::from("10"), 120), (String::from("9"), 180)]),
            ProviderId::SportsCardsPro,
            now,
        );
        let second = PopulationReport::single(
            260,
            BTreeMap::from([(String::from("10"), 90), (String::from("9"), 200)]),
            ProviderId::CardLadder,
            now,
        );

        let merged =
            PopulationReport::merge(vec![first, second], ProviderId::Psa, now).expect("non-empty");
        assert_eq!(merged.by_grade.get("10"), Some(&120));
        assert_eq!(merged.by_grade.get("9"), Some(&200));
        assert_eq!(merged.total, 320);
        assert_eq!(
            merged.sources,
            vec![ProviderId::SportsCardsPro, ProviderId::CardLadder]
        );
    }
}
