use database::StoreBackend;
use opr_core::Network;
use oprpad::config::StatusFormat;
use oprpad::{Config, ConfigError};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const DEVNET_TOML: &str = r#"
[network]
network = "devnet"

[storage]
backend = "memory"

[feed]
start_height = 50
block_interval_ms = 1000
watchdog_timeout_ms = 10000

[mining]
enabled = true
miner_id = "toml-miner"
payout_address = "toml-payout"
num_threads = 2
grace_period_ms = 500
submission_window_ms = 900
settle_timeout_ms = 500

[prices]
default = 2.5

[prices.quotes]
BTC = 60000.0

[status]
interval_secs = 5
format = "json"
"#;

#[test]
fn loads_a_complete_file() {
    let file = write_config(DEVNET_TOML);
    let config = Config::load(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.network.network, Network::DevNet);
    assert_eq!(config.storage, StoreBackend::Memory);
    assert_eq!(config.feed.start_height, 50);
    assert_eq!(config.status.format, StatusFormat::Json);

    let coordinator = config.coordinator_config();
    assert_eq!(coordinator.num_workers, 2);
    assert_eq!(coordinator.miner_id, "toml-miner");
    assert_eq!(coordinator.price_timeout, Duration::from_secs(5));
}

#[test]
fn optional_sections_fall_back_to_defaults() {
    let trimmed = DEVNET_TOML
        .split("[prices]")
        .next()
        .unwrap()
        .replace("enabled = true", "enabled = false");
    let file = write_config(&trimmed);
    let config = Config::load(file.path()).unwrap();

    assert!(config.prices.default.is_none());
    assert_eq!(config.status.format, StatusFormat::Text);
    config.validate().unwrap();
}

#[test]
fn rocksdb_backend_is_read_from_file() {
    let content = DEVNET_TOML.replace(
        "backend = \"memory\"",
        "backend = \"rocksdb\"\npath = \"/var/lib/oprpad/grades\"",
    );
    let file = write_config(&content);
    let config = Config::load(file.path()).unwrap();
    assert!(matches!(config.storage, StoreBackend::RocksDb { .. }));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("[network]\nnetwork = \"moonnet\"\n");
    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn invalid_values_are_rejected_after_loading() {
    let content = DEVNET_TOML.replace("num_threads = 2", "num_threads = 0");
    let file = write_config(&content);
    let config = Config::load(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { section: "mining", .. }));
}

#[test]
fn submission_window_longer_than_interval_is_rejected() {
    let content = DEVNET_TOML.replace("submission_window_ms = 900", "submission_window_ms = 1500");
    let file = write_config(&content);
    let config = Config::load(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { section: "mining", .. }));
}
