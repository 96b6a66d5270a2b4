// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Covers what serde attributes cannot express: a resolvable broker address,
//! a sane SQL table name, allowed sslmode values and non-zero timeouts.

use crate::diagnostic::ConfigError;
use crate::model::EmqpgConfig;

/// sslmode values accepted by libpq and sqlx.
pub const SSL_MODES: [&str; 6] = [
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// PostgreSQL truncates identifiers past this length.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns every failing check at once; never stops at the first error.
pub fn validate_config(config: &EmqpgConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let broker = &config.broker;
    let postgres = &config.postgres;

    if broker.address.trim().is_empty() {
        errors.push(ConfigError::validation("broker.address must not be empty"));
    } else if let Err(reason) = broker.endpoint() {
        errors.push(ConfigError::validation(format!("broker.address: {reason}")));
    }

    if broker.topic.trim().is_empty() {
        errors.push(ConfigError::validation("broker.topic must not be empty"));
    }

    if broker.qos > 2 {
        errors.push(ConfigError::validation(format!(
            "broker.qos must be 0, 1 or 2, got {}",
            broker.qos
        )));
    }

    if let Some(ca_file) = &broker.tls.ca_file
        && ca_file.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "broker.tls.ca_file must not be empty when set",
        ));
    }

    if postgres.host.trim().is_empty() {
        errors.push(ConfigError::validation("postgres.host must not be empty"));
    }

    if postgres.database.trim().is_empty() {
        errors.push(ConfigError::validation("postgres.database must not be empty"));
    }

    if !SSL_MODES.contains(&postgres.sslmode.as_str()) {
        errors.push(ConfigError::validation(format!(
            "postgres.sslmode `{}` is not one of: {}",
            postgres.sslmode,
            SSL_MODES.join(", ")
        )));
    }

    if !is_table_name(&postgres.table) {
        errors.push(ConfigError::validation(format!(
            "postgres.table `{}` must be an identifier or schema.identifier",
            postgres.table
        )));
    }

    if postgres.max_connections < 1 {
        errors.push(ConfigError::validation(
            "postgres.max_connections must be at least 1",
        ));
    }

    for (key, value) in [
        ("broker.keep_alive_secs", broker.keep_alive_secs),
        ("broker.reconnect_interval_secs", broker.reconnect_interval_secs),
        ("broker.connect_timeout_secs", broker.connect_timeout_secs),
        ("postgres.connect_timeout_secs", postgres.connect_timeout_secs),
        ("postgres.insert_timeout_secs", postgres.insert_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{key} must be greater than zero"
            )));
        }
    }

    if !LOG_LEVELS.contains(&config.log.level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(format!(
            "log.level `{}` is not one of: {}",
            config.log.level,
            LOG_LEVELS.join(", ")
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Accepts `name` or `schema.name` made of unquoted SQL identifier segments.
///
/// The table name is interpolated into the insert statement, so anything
/// outside `[A-Za-z_][A-Za-z0-9_]*` is refused.
pub fn is_table_name(table: &str) -> bool {
    let segments: Vec<&str> = table.split('.').collect();
    (1..=2).contains(&segments.len()) && segments.iter().all(|s| is_identifier(s))
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');

    starts_ok
        && segment.len() <= MAX_IDENTIFIER_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
