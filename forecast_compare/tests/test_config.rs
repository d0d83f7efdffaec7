use forecast_compare::config::ArimaMode;
use forecast_compare::models::arima::ArimaCapability;
use forecast_compare::models::sequence::SequenceCapability;
use forecast_compare::{Capabilities, ForecastConfig, ForecastEngine, ForecastError};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[data]
dir = "prices"

[engine]
horizon = 14
seed = 9

[arima]
mode = "disabled"

[sequence]
units = [32, 16]
epochs = 10

[logging]
level = "debug"
"#
    )
    .unwrap();
    file.flush().unwrap();

    let config = ForecastConfig::load(file.path()).unwrap();
    assert_eq!(config.data.dir, PathBuf::from("prices"));
    assert_eq!(config.engine.horizon, 14);
    assert_eq!(config.arima.mode, ArimaMode::Disabled);
    assert_eq!(config.logging.level, "debug");

    let capabilities = Capabilities::from_config(&config).unwrap();
    assert!(matches!(capabilities.arima, ArimaCapability::Unavailable));
    match capabilities.sequence {
        SequenceCapability::Available(model) => {
            assert_eq!(model.lstm_units, vec![32, 16]);
            assert_eq!(model.epochs, 10);
            assert_eq!(model.seed, 9);
            assert_eq!(model.lookback, 60);
        }
        SequenceCapability::Unavailable => panic!("sequence model should be enabled"),
    }

    let engine = ForecastEngine::new(&config).unwrap();
    assert_eq!(engine.horizon(), 14);
}

#[test]
fn test_missing_or_malformed_file() {
    let err = ForecastConfig::load("/nonexistent/forecast.toml").unwrap_err();
    assert!(matches!(err, ForecastError::Config(_)));

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[engine\nhorizon = ").unwrap();
    file.flush().unwrap();
    let err = ForecastConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ForecastError::Config(_)));
}
