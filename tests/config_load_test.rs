//! Configuration file loading tests

use std::io::Write;
use std::time::Duration;

use sockframe::{Config, Error};

#[test]
fn loads_a_full_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [server]
        bind_host = "127.0.0.1"
        ports = [9000, 9001, 9002]
        shutdown_timeout = "15s"

        [key_exchange]
        poll_interval = "500ms"
        max_attempts = 4
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.server.ports, vec![9000, 9001, 9002]);
    assert_eq!(config.server.shutdown_timeout, Duration::from_secs(15));
    assert_eq!(config.key_exchange.poll_interval, Duration::from_millis(500));
    assert_eq!(config.key_exchange.max_attempts, 4);
}

#[test]
fn rejects_duplicate_ports_on_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [server]
        ports = [9000, 9000]
        "#
    )
    .unwrap();

    assert!(matches!(
        Config::load(file.path()),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn missing_file_is_an_error() {
    assert!(Config::load("/nonexistent/sockframe.toml").is_err());
}
