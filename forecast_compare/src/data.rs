//! Price series data handling for forecasting
//!
//! Raw CSV exports are read with polars, cleaned into strictly increasing
//! daily [`PriceBar`]s and enriched with the derived feature columns
//! (daily return, 30-day volatility, 50-day moving average).

use crate::error::{ForecastError, Result};
use crate::utils::{parse_date, round2};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use trade_math::moving_averages::rolling_mean;
use trade_math::returns::pct_change;
use trade_math::volatility::rolling_std;

/// Trailing window of the volatility feature, in daily returns
pub const VOLATILITY_WINDOW: usize = 30;
/// Trailing window of the moving-average feature, in closes
pub const MA_WINDOW: usize = 50;

/// One daily observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: f64,
}

/// Derived columns for one observation; `None` during warm-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeatureRow {
    pub daily_return: Option<f64>,
    pub volatility_30d: Option<f64>,
    pub ma_50: Option<f64>,
}

/// Last close and its day-over-day change
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatestQuote {
    pub date: NaiveDate,
    pub close: f64,
    /// Change against the previous close in percent, absent for a single bar
    pub change_pct: Option<f64>,
}

/// Daily price history of one asset, sorted by date with no duplicates
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
    features: Vec<FeatureRow>,
}

impl PriceSeries {
    /// Build a series from bars, deriving the feature columns.
    ///
    /// Dates must be strictly increasing and closes finite. An empty
    /// series is allowed here and rejected by the forecasting engine.
    pub fn new(bars: Vec<PriceBar>) -> Result<Self> {
        if let Some(pair) = bars.windows(2).find(|pair| pair[1].date <= pair[0].date) {
            return Err(ForecastError::DataError(format!(
                "dates must be strictly increasing: {} followed by {}",
                pair[0].date, pair[1].date
            )));
        }
        if let Some(bar) = bars.iter().find(|bar| !bar.close.is_finite()) {
            return Err(ForecastError::DataError(format!(
                "non-finite close on {}",
                bar.date
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let features = derive_features(&closes)?;

        Ok(Self { bars, features })
    }

    /// Series of consecutive calendar days starting at `start`, one per close
    pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Result<Self> {
        let bars = closes
            .iter()
            .zip(start.iter_days())
            .map(|(&close, date)| PriceBar {
                date,
                open: close,
                high: close,
                low: close,
                close,
                adj_close: None,
                volume: 0.0,
            })
            .collect();

        Self::new(bars)
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// All bars in date order
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    /// Derived features, aligned with [`bars`](Self::bars)
    pub fn features(&self) -> &[FeatureRow] {
        &self.features
    }

    /// Observation dates
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|bar| bar.date).collect()
    }

    /// Close prices
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    /// Traded volumes
    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.volume).collect()
    }

    /// Date of the first observation
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|bar| bar.date)
    }

    /// Date of the last observation
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|bar| bar.date)
    }

    /// Last close with the day-over-day change, both rounded to 2 decimals
    pub fn latest_quote(&self) -> Option<LatestQuote> {
        let last = self.bars.last()?;
        let change_pct = self
            .features
            .last()
            .and_then(|f| f.daily_return)
            .map(|r| round2(r * 100.0));

        Some(LatestQuote {
            date: last.date,
            close: round2(last.close),
            change_pct,
        })
    }
}

/// Compute the derived feature columns for a close-price series
pub fn derive_features(closes: &[f64]) -> Result<Vec<FeatureRow>> {
    let returns = pct_change(closes);
    let volatility = rolling_std(&returns, VOLATILITY_WINDOW)?;
    let moving_average = rolling_mean(closes, MA_WINDOW)?;

    Ok(returns
        .into_iter()
        .zip(volatility)
        .zip(moving_average)
        .map(|((daily_return, volatility_30d), ma_50)| FeatureRow {
            daily_return,
            volatility_30d,
            ma_50,
        })
        .collect())
}

/// Market an asset belongs to, taken from its file-name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssetClass {
    Crypto,
    Stock,
}

impl AssetClass {
    /// File-name prefix of this class, e.g. `crypto_BTC.csv`
    pub fn file_prefix(&self) -> &'static str {
        match self {
            AssetClass::Crypto => "crypto_",
            AssetClass::Stock => "stock_",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Crypto => write!(f, "crypto"),
            AssetClass::Stock => write!(f, "stock"),
        }
    }
}

/// A named price series
#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub class: AssetClass,
    pub series: PriceSeries,
}

/// Assets in load order; iteration order is insertion order
#[derive(Debug, Clone, Default)]
pub struct AssetUniverse {
    assets: Vec<Asset>,
}

impl AssetUniverse {
    /// Create an empty universe
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset; names are unique
    pub fn insert(&mut self, asset: Asset) -> Result<()> {
        if self.get(&asset.name).is_some() {
            return Err(ForecastError::ValidationError(format!(
                "asset {} is already loaded",
                asset.name
            )));
        }
        self.assets.push(asset);
        Ok(())
    }

    /// Look up an asset by name
    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// Asset names in load order, optionally restricted to one class
    pub fn names(&self, class: Option<AssetClass>) -> Vec<&str> {
        self.assets
            .iter()
            .filter(|asset| class.map_or(true, |c| asset.class == c))
            .map(|asset| asset.name.as_str())
            .collect()
    }

    /// Earliest and latest date across all non-empty series
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self
            .assets
            .iter()
            .filter_map(|asset| asset.series.first_date())
            .min()?;
        let last = self
            .assets
            .iter()
            .filter_map(|asset| asset.series.last_date())
            .max()?;
        Some((first, last))
    }

    /// Iterate over assets in load order
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    /// Number of assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Check if no asset is loaded
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl FromIterator<Asset> for AssetUniverse {
    fn from_iter<I: IntoIterator<Item = Asset>>(iter: I) -> Self {
        let mut universe = AssetUniverse::new();
        for asset in iter {
            if let Err(err) = universe.insert(asset) {
                warn!("{}", err);
            }
        }
        universe
    }
}

/// Data loader for price CSV files
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load and clean one price CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<PriceSeries> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(df)
    }

    /// Clean an already loaded DataFrame into a price series
    pub fn from_dataframe(df: DataFrame) -> Result<PriceSeries> {
        let date_column = find_column(&df, "date").ok_or_else(|| {
            ForecastError::DataError("No Date column found in data".to_string())
        })?;
        let close_column = find_column(&df, "close").ok_or_else(|| {
            ForecastError::DataError("No Close column found in data".to_string())
        })?;

        let dates: Vec<Option<NaiveDate>> = {
            let raw = df.column(&date_column)?.cast(&DataType::Utf8)?;
            let raw = raw.utf8()?;
            raw.into_iter()
                .map(|cell| cell.and_then(parse_date))
                .collect()
        };

        let close = numeric_column(&df, &close_column)?;
        let optional = |name: &str| -> Result<Option<Vec<Option<f64>>>> {
            match find_column(&df, name) {
                Some(column) => numeric_column(&df, &column).map(Some),
                None => Ok(None),
            }
        };
        let open = optional("open")?;
        let high = optional("high")?;
        let low = optional("low")?;
        let adj_close = optional("adj close")?;
        let volume = optional("volume")?;

        // rows without a usable date are dropped, the rest sorted by date
        let mut order: Vec<(NaiveDate, usize)> = dates
            .iter()
            .enumerate()
            .filter_map(|(row, date)| date.map(|d| (d, row)))
            .collect();
        let dropped = df.height() - order.len();
        if dropped > 0 {
            debug!(dropped, "rows with unparseable dates dropped");
        }
        order.sort_by_key(|&(date, row)| (date, row));
        order.dedup_by_key(|(date, _)| *date);

        let pick = |column: &[Option<f64>]| -> Vec<Option<f64>> {
            order.iter().map(|&(_, row)| column[row]).collect()
        };

        let close = fill_gaps(&pick(&close)).ok_or_else(|| {
            ForecastError::DataError("Close column has no numeric values".to_string())
        })?;
        let or_close = |column: Option<Vec<Option<f64>>>| {
            column
                .and_then(|values| fill_gaps(&pick(&values)))
                .unwrap_or_else(|| close.clone())
        };
        let open = or_close(open);
        let high = or_close(high);
        let low = or_close(low);
        let adj_close = adj_close.and_then(|values| fill_gaps(&pick(&values)));
        let volume = volume
            .and_then(|values| fill_gaps(&pick(&values)))
            .unwrap_or_else(|| vec![0.0; order.len()]);

        let bars = order
            .iter()
            .enumerate()
            .map(|(i, &(date, _))| PriceBar {
                date,
                open: open[i],
                high: high[i],
                low: low[i],
                close: close[i],
                adj_close: adj_close.as_ref().map(|values| values[i]),
                volume: volume[i],
            })
            .collect();

        PriceSeries::new(bars)
    }

    /// Load every `crypto_*.csv` and `stock_*.csv` file in `dir`.
    ///
    /// Crypto assets come first, each class in file-name order. Files that
    /// fail to load are logged and skipped.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<AssetUniverse> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "csv"))
            .collect();
        files.sort();

        let mut universe = AssetUniverse::new();
        for class in [AssetClass::Crypto, AssetClass::Stock] {
            for path in &files {
                let Some(name) = asset_name(path, class) else {
                    continue;
                };
                match Self::from_csv(path) {
                    Ok(series) => {
                        debug!(asset = %name, rows = series.len(), "loaded price file");
                        let asset = Asset {
                            name,
                            class,
                            series,
                        };
                        if let Err(err) = universe.insert(asset) {
                            warn!(file = %path.display(), error = %err, "skipping price file");
                        }
                    }
                    Err(err) => warn!(file = %path.display(), error = %err, "skipping price file"),
                }
            }
        }

        info!(
            assets = universe.len(),
            dir = %dir.display(),
            "price universe loaded"
        );
        Ok(universe)
    }
}

/// Asset name encoded in a file name such as `crypto_BTC.csv`
pub fn asset_name(path: &Path, class: AssetClass) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let rest = file_name.strip_prefix(class.file_prefix())?;
    let name = rest.split(&['_', '.'][..]).next()?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Find a column by case-insensitive name
fn find_column(df: &DataFrame, name: &str) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .find(|column| column.trim().eq_ignore_ascii_case(name))
        .map(str::to_string)
}

/// Read a column as floats; cells that do not parse become `None`
fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let values = df.column(name)?.cast(&DataType::Float64)?;
    let values = values.f64()?;
    Ok(values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Forward-fill then back-fill missing values; `None` if nothing is present
fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        values
            .iter()
            .map(|value| {
                if let Some(v) = value {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fill_gaps_forward_then_backward() {
        let filled = fill_gaps(&[None, Some(1.0), None, Some(3.0), None]).unwrap();
        assert_eq!(filled, vec![1.0, 1.0, 1.0, 3.0, 3.0]);
        assert_eq!(fill_gaps(&[None, None]), None);
    }

    #[test]
    fn asset_names_from_file_names() {
        let name = |f: &str, class| asset_name(Path::new(f), class);
        assert_eq!(name("data/crypto_BTC.csv", AssetClass::Crypto), Some("BTC".into()));
        assert_eq!(name("stock_AAPL.csv", AssetClass::Stock), Some("AAPL".into()));
        assert_eq!(name("stock_BRK_B.csv", AssetClass::Stock), Some("BRK".into()));
        assert_eq!(name("stock_AAPL.csv", AssetClass::Crypto), None);
        assert_eq!(name("crypto_.csv", AssetClass::Crypto), None);
    }

    #[test]
    fn feature_warm_up_lengths() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i % 7) as f64).collect();
        let series = PriceSeries::from_closes(day(2024, 1, 1), &closes).unwrap();
        let features = series.features();

        assert!(features[0].daily_return.is_none());
        assert!(features[1].daily_return.is_some());
        assert!(features[29].volatility_30d.is_none());
        assert!(features[30].volatility_30d.is_some());
        assert!(features[48].ma_50.is_none());
        assert!(features[49].ma_50.is_some());
    }

    #[test]
    fn series_rejects_unsorted_dates() {
        let bar = |date| PriceBar {
            date,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            adj_close: None,
            volume: 0.0,
        };
        let err = PriceSeries::new(vec![bar(day(2024, 1, 2)), bar(day(2024, 1, 2))]);
        assert!(err.is_err());
        assert!(PriceSeries::new(vec![]).unwrap().is_empty());
    }

    #[test]
    fn latest_quote_reports_change() {
        let series = PriceSeries::from_closes(day(2024, 1, 1), &[100.0, 102.5]).unwrap();
        let quote = series.latest_quote().unwrap();
        assert_eq!(quote.date, day(2024, 1, 2));
        assert_eq!(quote.close, 102.5);
        assert_eq!(quote.change_pct, Some(2.5));

        let single = PriceSeries::from_closes(day(2024, 1, 1), &[100.0]).unwrap();
        assert_eq!(single.latest_quote().unwrap().change_pct, None);
    }

    #[test]
    fn dataframe_cleaning() {
        let df = DataFrame::new(vec![
            Series::new(
                "Date",
                &[
                    "2024-01-03",
                    "2024-01-01",
                    "not a date",
                    "2024-01-02",
                    "2024-01-01",
                ],
            ),
            Series::new(
                "Close",
                &[Some(103.0), Some(101.0), Some(999.0), None, Some(555.0)],
            ),
            Series::new("Volume", &[30.0, 10.0, 0.0, 20.0, 99.0]),
        ])
        .unwrap();

        let series = DataLoader::from_dataframe(df).unwrap();
        assert_eq!(series.dates(), vec![day(2024, 1, 1), day(2024, 1, 2), day(2024, 1, 3)]);
        // duplicate date keeps the first row; missing close is forward-filled
        assert_eq!(series.closes(), vec![101.0, 101.0, 103.0]);
        assert_eq!(series.volumes(), vec![10.0, 20.0, 30.0]);
        assert_eq!(series.bars()[0].open, 101.0);
        assert_eq!(series.bars()[0].adj_close, None);
    }

    #[test]
    fn universe_keeps_insertion_order() {
        let series = PriceSeries::from_closes(day(2024, 1, 1), &[1.0, 2.0]).unwrap();
        let later = PriceSeries::from_closes(day(2024, 2, 1), &[1.0, 2.0]).unwrap();
        let universe: AssetUniverse = vec![
            Asset {
                name: "ETH".into(),
                class: AssetClass::Crypto,
                series: series.clone(),
            },
            Asset {
                name: "AAPL".into(),
                class: AssetClass::Stock,
                series: later,
            },
            Asset {
                name: "ETH".into(),
                class: AssetClass::Crypto,
                series,
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(universe.len(), 2);
        assert_eq!(universe.names(None), vec!["ETH", "AAPL"]);
        assert_eq!(universe.names(Some(AssetClass::Stock)), vec!["AAPL"]);
        assert_eq!(universe.date_range(), Some((day(2024, 1, 1), day(2024, 2, 2))));
        assert!(universe.get("BTC").is_none());
    }
}
