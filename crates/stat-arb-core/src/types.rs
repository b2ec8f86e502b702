use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StatArbError;
use crate::StatArbResult;

/// Prices, spreads, PnL and equity. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Bar timestamp. Daily bars use midnight.
pub type Timestamp = NaiveDateTime;

/// A single observation of one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: Timestamp,
    pub price: Money,
}

/// Accepts `2024-01-02`, `2024-01-02 15:59:00` and `2024-01-02T15:59:00[.fff]`.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Parse a bar timestamp from text.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, String> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("unrecognised timestamp '{raw}'"))
}

#[derive(Deserialize)]
struct RawPriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

/// Price history of one instrument, strictly increasing in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceSeries")]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl TryFrom<RawPriceSeries> for PriceSeries {
    type Error = StatArbError;

    fn try_from(raw: RawPriceSeries) -> Result<Self, Self::Error> {
        PriceSeries::new(raw.symbol, raw.points)
    }
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> StatArbResult<Self> {
        let symbol = symbol.into();
        if let Some(p) = points.iter().find(|p| p.price <= Decimal::ZERO) {
            return Err(StatArbError::InvalidInput {
                field: format!("{symbol}.points"),
                reason: format!("price at {} must be positive, got {}", p.timestamp, p.price),
            });
        }
        if let Some(w) = points.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(StatArbError::InvalidInput {
                field: format!("{symbol}.points"),
                reason: format!(
                    "timestamps must be strictly increasing ({} followed by {})",
                    w[0].timestamp, w[1].timestamp
                ),
            });
        }
        Ok(Self { symbol, points })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct RawPair {
    series_a: PriceSeries,
    series_b: PriceSeries,
}

/// Two price series sharing one timestamp index.
///
/// Alignment is checked once at construction; every engine component
/// takes an `AlignedPair` and never re-aligns. Series A is the dependent
/// leg of the hedge regression (A ≈ hedge_ratio × B + intercept).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPair", into = "RawPair")]
pub struct AlignedPair {
    symbol_a: String,
    symbol_b: String,
    timestamps: Vec<Timestamp>,
    prices_a: Vec<Money>,
    prices_b: Vec<Money>,
}

impl TryFrom<RawPair> for AlignedPair {
    type Error = StatArbError;

    fn try_from(raw: RawPair) -> Result<Self, Self::Error> {
        AlignedPair::new(raw.series_a, raw.series_b)
    }
}

impl From<AlignedPair> for RawPair {
    fn from(pair: AlignedPair) -> Self {
        let to_points = |prices: &[Money]| {
            pair.timestamps
                .iter()
                .zip(prices)
                .map(|(&timestamp, &price)| PricePoint { timestamp, price })
                .collect::<Vec<_>>()
        };
        RawPair {
            series_a: PriceSeries {
                symbol: pair.symbol_a.clone(),
                points: to_points(&pair.prices_a),
            },
            series_b: PriceSeries {
                symbol: pair.symbol_b.clone(),
                points: to_points(&pair.prices_b),
            },
        }
    }
}

impl AlignedPair {
    /// Pair two series, rejecting any difference in length or timestamps.
    pub fn new(a: PriceSeries, b: PriceSeries) -> StatArbResult<Self> {
        if a.len() != b.len() {
            return Err(StatArbError::MisalignedSeries(format!(
                "{} has {} bars but {} has {}",
                a.symbol,
                a.len(),
                b.symbol,
                b.len()
            )));
        }
        if let Some((i, (pa, pb))) = a
            .points
            .iter()
            .zip(&b.points)
            .enumerate()
            .find(|(_, (pa, pb))| pa.timestamp != pb.timestamp)
        {
            return Err(StatArbError::MisalignedSeries(format!(
                "bar {i}: {} is at {} but {} is at {}",
                a.symbol, pa.timestamp, b.symbol, pb.timestamp
            )));
        }
        Ok(Self {
            timestamps: a.points.iter().map(|p| p.timestamp).collect(),
            prices_a: a.points.iter().map(|p| p.price).collect(),
            prices_b: b.points.iter().map(|p| p.price).collect(),
            symbol_a: a.symbol,
            symbol_b: b.symbol,
        })
    }

    /// Build a pair from parallel columns sharing one timestamp column.
    pub fn from_columns(
        symbol_a: impl Into<String>,
        symbol_b: impl Into<String>,
        timestamps: Vec<Timestamp>,
        prices_a: Vec<Money>,
        prices_b: Vec<Money>,
    ) -> StatArbResult<Self> {
        if prices_a.len() != timestamps.len() || prices_b.len() != timestamps.len() {
            return Err(StatArbError::MisalignedSeries(format!(
                "{} timestamps, {} prices for A, {} prices for B",
                timestamps.len(),
                prices_a.len(),
                prices_b.len()
            )));
        }
        let points = |prices: &[Money]| {
            timestamps
                .iter()
                .zip(prices)
                .map(|(&timestamp, &price)| PricePoint { timestamp, price })
                .collect::<Vec<_>>()
        };
        let a = PriceSeries::new(symbol_a, points(&prices_a))?;
        let b = PriceSeries::new(symbol_b, points(&prices_b))?;
        Self::new(a, b)
    }

    pub fn symbol_a(&self) -> &str {
        &self.symbol_a
    }

    pub fn symbol_b(&self) -> &str {
        &self.symbol_b
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn prices_a(&self) -> &[Money] {
        &self.prices_a
    }

    pub fn prices_b(&self) -> &[Money] {
        &self.prices_b
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Bars `[start, end)` as a new pair. Bounds are clamped to the pair length.
    pub fn slice(&self, start: usize, end: usize) -> AlignedPair {
        let end = end.min(self.len());
        let start = start.min(end);
        AlignedPair {
            symbol_a: self.symbol_a.clone(),
            symbol_b: self.symbol_b.clone(),
            timestamps: self.timestamps[start..end].to_vec(),
            prices_a: self.prices_a[start..end].to_vec(),
            prices_b: self.prices_b[start..end].to_vec(),
        }
    }

    /// Chronological train/test split. The first `floor(n × fraction)` bars train.
    pub fn split(&self, train_fraction: Rate) -> StatArbResult<(AlignedPair, AlignedPair)> {
        if train_fraction <= Decimal::ZERO || train_fraction >= Decimal::ONE {
            return Err(StatArbError::InvalidInput {
                field: "train_fraction".into(),
                reason: format!("must be strictly between 0 and 1, got {train_fraction}"),
            });
        }
        let cut = (Decimal::from(self.len() as u64) * train_fraction)
            .floor()
            .to_usize()
            .unwrap_or(0);
        if cut == 0 || cut >= self.len() {
            return Err(StatArbError::InvalidInput {
                field: "train_fraction".into(),
                reason: format!(
                    "fraction {train_fraction} of {} bars leaves an empty train or test slice",
                    self.len()
                ),
            });
        }
        Ok((self.slice(0, cut), self.slice(cut, self.len())))
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn series(symbol: &str, days: &[u32], prices: &[Decimal]) -> PriceSeries {
        let points = days
            .iter()
            .zip(prices)
            .map(|(&d, &price)| PricePoint {
                timestamp: day(d),
                price,
            })
            .collect();
        PriceSeries::new(symbol, points).unwrap()
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let points = vec![
            PricePoint { timestamp: day(2), price: dec!(10) },
            PricePoint { timestamp: day(2), price: dec!(11) },
        ];
        assert!(PriceSeries::new("X", points).is_err());
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let points = vec![PricePoint { timestamp: day(2), price: dec!(0) }];
        assert!(PriceSeries::new("X", points).is_err());
    }

    #[test]
    fn test_length_mismatch_is_misaligned() {
        let a = series("A", &[1, 2, 3], &[dec!(1), dec!(2), dec!(3)]);
        let b = series("B", &[1, 2], &[dec!(1), dec!(2)]);
        let err = AlignedPair::new(a, b).unwrap_err();
        assert!(matches!(err, StatArbError::MisalignedSeries(_)));
    }

    #[test]
    fn test_timestamp_mismatch_is_misaligned() {
        let a = series("A", &[1, 2, 3], &[dec!(1), dec!(2), dec!(3)]);
        let b = series("B", &[1, 2, 4], &[dec!(1), dec!(2), dec!(3)]);
        let err = AlignedPair::new(a, b).unwrap_err();
        assert!(format!("{err}").contains("bar 2"));
    }

    #[test]
    fn test_split_is_chronological() {
        let days: Vec<u32> = (1..=10).collect();
        let prices: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        let pair = AlignedPair::new(series("A", &days, &prices), series("B", &days, &prices)).unwrap();
        let (train, test) = pair.split(dec!(0.7)).unwrap();
        assert_eq!(train.len(), 7);
        assert_eq!(test.len(), 3);
        assert_eq!(test.timestamps()[0], day(8));
    }

    #[test]
    fn test_split_rejects_degenerate_fraction() {
        let pair = AlignedPair::new(
            series("A", &[1, 2], &[dec!(1), dec!(2)]),
            series("B", &[1, 2], &[dec!(1), dec!(2)]),
        )
        .unwrap();
        assert!(pair.split(dec!(1)).is_err());
        assert!(pair.split(dec!(0.1)).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-05").unwrap(), day(5));
        assert_eq!(parse_timestamp("2024-01-05T00:00:00").unwrap(), day(5));
        assert_eq!(parse_timestamp("2024-01-05 00:00:00").unwrap(), day(5));
        assert!(parse_timestamp("05/01/2024").is_err());
    }

    #[test]
    fn test_pair_deserializes_and_validates() {
        let json = r#"{
            "series_a": {"symbol": "UMAC", "points": [
                {"timestamp": "2024-01-01", "price": "10.5"},
                {"timestamp": "2024-01-02", "price": "10.7"}]},
            "series_b": {"symbol": "RCAT", "points": [
                {"timestamp": "2024-01-01", "price": "7.5"},
                {"timestamp": "2024-01-03", "price": "7.6"}]}
        }"#;
        let result: Result<AlignedPair, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
