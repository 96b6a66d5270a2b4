// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the emqpg configuration system.

use std::io::Write;

use serial_test::serial;

use emqpg_config::diagnostic::ConfigError;
use emqpg_config::model::EmqpgConfig;
use emqpg_config::{
    load_and_validate_path, load_and_validate_str, load_config_from_path, load_config_from_str,
};

const FULL: &str = r#"
[broker]
address = "ssl://broker.example.com:8883"
client_id = "ingest-1"
username = "ingest"
password = "mqtt-secret"
topic = "devices/+/telemetry"
qos = 2
keep_alive_secs = 30
reconnect_interval_secs = 2
connect_timeout_secs = 4
clean_session = false

[broker.tls]
enabled = true
ca_file = "/etc/emqpg/ca.pem"

[postgres]
host = "db.internal"
port = 6432
database = "telemetry"
username = "writer"
password = "pg-secret"
sslmode = "verify-full"
table = "ingest.device_data"
max_connections = 4
connect_timeout_secs = 3
insert_timeout_secs = 2

[log]
level = "debug"
"#;

const MINIMAL: &str = r#"
[broker]
address = "tcp://localhost:1883"
topic = "telemetry"

[postgres]
host = "localhost"
database = "telemetry"
"#;

#[test]
fn full_toml_deserializes() {
    let config = load_config_from_str(FULL).expect("valid TOML should deserialize");

    assert_eq!(config.broker.address, "ssl://broker.example.com:8883");
    assert_eq!(config.broker.client_id, "ingest-1");
    assert_eq!(config.broker.username.as_deref(), Some("ingest"));
    assert_eq!(config.broker.password.as_deref(), Some("mqtt-secret"));
    assert_eq!(config.broker.qos, 2);
    assert_eq!(config.broker.keep_alive_secs, 30);
    assert!(!config.broker.clean_session);
    assert!(config.broker.tls.enabled);
    assert_eq!(config.broker.tls.ca_file.as_deref(), Some("/etc/emqpg/ca.pem"));
    assert_eq!(config.postgres.port, 6432);
    assert_eq!(config.postgres.sslmode, "verify-full");
    assert_eq!(config.postgres.table, "ingest.device_data");
    assert_eq!(config.postgres.max_connections, 4);
    assert_eq!(config.log.level, "debug");
}

#[test]
fn minimal_toml_validates_with_defaults() {
    let config = load_and_validate_str(MINIMAL).expect("minimal config is valid");
    assert_eq!(config.broker.qos, 1);
    assert_eq!(config.broker.reconnect_interval_secs, 5);
    assert!(config.broker.clean_session);
    assert!(!config.broker.tls.enabled);
    assert_eq!(config.postgres.port, 5432);
    assert_eq!(config.postgres.sslmode, "disable");
    assert_eq!(config.postgres.table, "device_data");
    assert_eq!(config.postgres.insert_timeout_secs, 5);
}

#[test]
fn unknown_key_suggests_correction() {
    let toml = "[broker]\nadress = \"tcp://localhost\"\n";
    let errors = load_and_validate_str(toml).unwrap_err();

    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "broker.adress");
            assert_eq!(suggestion.as_deref(), Some("address"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let toml = format!("{MINIMAL}\n[mqtt]\nhost = \"x\"\n");
    assert!(load_config_from_str(&toml).is_err());
}

#[test]
fn invalid_type_names_the_key() {
    let toml = "[postgres]\nport = \"five\"\n";
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(matches!(
        &errors[0],
        ConfigError::InvalidType { key, .. } if key == "postgres.port"
    ));
}

#[test]
fn override_layer_wins_over_file() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: EmqpgConfig = Figment::new()
        .merge(Serialized::defaults(EmqpgConfig::default()))
        .merge(Toml::string(MINIMAL))
        .merge(("broker.topic", "override/topic"))
        .merge(("postgres.password", "from-env"))
        .extract()
        .expect("should merge override");

    assert_eq!(config.broker.topic, "override/topic");
    assert_eq!(config.postgres.password.as_deref(), Some("from-env"));
    assert_eq!(config.broker.address, "tcp://localhost:1883");
}

#[test]
fn serialized_defaults_omit_passwords() {
    let mut config = EmqpgConfig::default();
    config.postgres.password = Some("pg-secret".into());
    let rendered = toml::to_string(&config).expect("defaults serialize");
    assert!(!rendered.contains("pg-secret"));
    assert!(!rendered.contains("password"));
}

#[test]
fn validation_errors_are_collected() {
    let toml = r#"
[broker]
address = "tcp://localhost"
topic = ""
qos = 5

[postgres]
host = "localhost"
database = "telemetry"
sslmode = "maybe"
table = "bad table"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 4, "{errors:?}");
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

#[test]
#[serial]
fn explicit_path_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();

    let config = load_and_validate_path(file.path()).expect("file config is valid");
    assert_eq!(config.broker.topic, "telemetry");
}

#[test]
#[serial]
fn explicit_path_unknown_key_points_into_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[postgres]\nhost = \"x\"\ndatabse = \"y\"\n")
        .unwrap();

    let errors = load_and_validate_path(file.path()).unwrap_err();
    match &errors[0] {
        ConfigError::UnknownKey {
            suggestion, span, ..
        } => {
            assert_eq!(suggestion.as_deref(), Some("database"));
            assert!(span.is_some());
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
#[serial]
fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let errors = load_and_validate_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(!errors.is_empty());
}

#[test]
fn config_error_renders_with_miette() {
    use miette::GraphicalReportHandler;

    let errors = load_and_validate_str("[log]\nlevle = \"debug\"\n").unwrap_err();
    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler.render_report(&mut buf, &errors[0]).unwrap();
    assert!(buf.contains("levle"));
    assert!(buf.contains("level"));
}

#[test]
#[serial]
fn working_directory_config_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("emqpg.toml"),
        "[broker]\ntopic = \"cwd/+/telemetry\"\n",
    )
    .unwrap();

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let loaded = emqpg_config::load_config();
    std::env::set_current_dir(previous).unwrap();

    assert_eq!(loaded.unwrap().broker.topic, "cwd/+/telemetry");
}

#[test]
#[serial]
fn environment_overrides_reach_nested_keys() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();

    // SAFETY: test-only env mutation. Tests touching env vars are #[serial].
    unsafe {
        std::env::set_var("EMQPG_BROKER_CLIENT_ID", "ingest-7");
        std::env::set_var("EMQPG_BROKER_TLS_ENABLED", "true");
        std::env::set_var("EMQPG_POSTGRES_PASSWORD", "s3cret-pw");
        std::env::set_var("EMQPG_LOG_LEVEL", "debug");
    }
    let loaded = load_config_from_path(file.path());
    unsafe {
        std::env::remove_var("EMQPG_BROKER_CLIENT_ID");
        std::env::remove_var("EMQPG_BROKER_TLS_ENABLED");
        std::env::remove_var("EMQPG_POSTGRES_PASSWORD");
        std::env::remove_var("EMQPG_LOG_LEVEL");
    }

    let config = loaded.expect("environment overrides are known keys");
    assert_eq!(config.broker.client_id, "ingest-7");
    assert!(config.broker.tls.enabled);
    assert_eq!(config.postgres.password.as_deref(), Some("s3cret-pw"));
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.broker.topic, "telemetry");
}

#[test]
#[serial]
fn test_database_url_is_not_treated_as_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();

    // SAFETY: test-only env mutation. Tests touching env vars are #[serial].
    unsafe { std::env::set_var("EMQPG_TEST_DATABASE_URL", "postgres://localhost/scratch") };
    let loaded = load_and_validate_path(file.path());
    unsafe { std::env::remove_var("EMQPG_TEST_DATABASE_URL") };

    assert!(loaded.is_ok(), "{loaded:?}");
}
