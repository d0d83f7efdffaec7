use chrono::NaiveDate;
use forecast_compare::data::{MA_WINDOW, VOLATILITY_WINDOW};
use forecast_compare::{AssetClass, AssetSnapshot, DataLoader, PriceSeries};
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile};

fn write_csv(dir: &Path, name: &str, days: usize, base: f64) {
    let mut text = String::from("Date,Open,High,Low,Close,Adj Close,Volume\n");
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    for (i, day) in start.iter_days().take(days).enumerate() {
        let close = base + i as f64;
        text.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            day,
            close - 0.5,
            close + 1.0,
            close - 1.0,
            close,
            close,
            1000 + i
        ));
    }
    fs::write(dir.join(name), text).unwrap();
}

#[test]
fn test_messy_csv_is_cleaned() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,close,volume").unwrap();
    writeln!(file, "2023-01-03,103.0,30").unwrap();
    writeln!(file, "2023-01-01,101.0,10").unwrap();
    writeln!(file, "not a date,999.0,0").unwrap();
    writeln!(file, "2023-01-02,,20").unwrap();
    writeln!(file, "2023-01-03,555.0,99").unwrap();
    writeln!(file, "2023-01-04,104.0,").unwrap();
    file.flush().unwrap();

    let series = DataLoader::from_csv(file.path()).unwrap();
    let dates: Vec<String> = series.dates().iter().map(|d| d.to_string()).collect();

    assert_eq!(
        dates,
        vec!["2023-01-01", "2023-01-02", "2023-01-03", "2023-01-04"]
    );
    // missing close forward-filled, duplicate date keeps the first row
    assert_eq!(series.closes(), vec![101.0, 101.0, 103.0, 104.0]);
    assert_eq!(series.volumes(), vec![10.0, 20.0, 30.0, 30.0]);
    // no open column: open falls back to close
    assert_eq!(series.bars()[2].open, 103.0);
}

#[test]
fn test_missing_close_column_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,price").unwrap();
    writeln!(file, "2023-01-01,1.0").unwrap();
    file.flush().unwrap();

    assert!(DataLoader::from_csv(file.path()).is_err());
}

#[test]
fn test_load_dir_orders_crypto_before_stock() {
    let dir = tempdir().unwrap();
    write_csv(dir.path(), "stock_AAPL.csv", 40, 150.0);
    write_csv(dir.path(), "crypto_ETH.csv", 40, 2000.0);
    write_csv(dir.path(), "crypto_BTC_daily.csv", 80, 30000.0);
    write_csv(dir.path(), "notes.csv", 5, 1.0);
    fs::write(dir.path().join("stock_BAD.csv"), "Date,Close\n").unwrap();

    let universe = DataLoader::load_dir(dir.path()).unwrap();

    assert_eq!(universe.names(None), vec!["BTC", "ETH", "AAPL"]);
    assert_eq!(universe.names(Some(AssetClass::Stock)), vec!["AAPL"]);
    let (first, last) = universe.date_range().unwrap();
    assert_eq!(first, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
    assert_eq!(last, NaiveDate::from_ymd_opt(2023, 3, 21).unwrap());

    let btc = universe.get("BTC").unwrap();
    assert_eq!(btc.class, AssetClass::Crypto);
    assert_eq!(btc.series.bars()[0].adj_close, Some(30000.0));
    assert!(universe.get("BAD").is_none());
}

#[test]
fn test_feature_warm_up_and_snapshot() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let closes: Vec<f64> = (0..60).map(|t| 100.0 * 1.01f64.powi(t)).collect();
    let series = PriceSeries::from_closes(start, &closes).unwrap();
    let features = series.features();

    assert!(features[0].daily_return.is_none());
    assert!((features[1].daily_return.unwrap() - 0.01).abs() < 1e-12);
    assert!(features[VOLATILITY_WINDOW - 1].volatility_30d.is_none());
    assert!(features[VOLATILITY_WINDOW].volatility_30d.unwrap().abs() < 1e-9);
    assert!(features[MA_WINDOW - 2].ma_50.is_none());
    assert!(features[MA_WINDOW - 1].ma_50.is_some());

    let quote = series.latest_quote().unwrap();
    assert_eq!(quote.change_pct, Some(1.0));

    let asset = forecast_compare::Asset {
        name: "GROW".to_string(),
        class: AssetClass::Stock,
        series,
    };
    let snapshot = AssetSnapshot::from_asset(&asset);
    assert_eq!(snapshot.dates.len(), 60);
    assert_eq!(snapshot.volatility[0], 0.0);
}
