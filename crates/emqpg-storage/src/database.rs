// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PostgreSQL connection pool setup and lifecycle.
//!
//! The pool is the only synchronization point for concurrent inserts;
//! nothing above it takes a lock.

use std::str::FromStr;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::debug;

use emqpg_config::PostgresConfig;
use emqpg_core::{EmqpgError, RecordStore, TelemetryRecord};

use crate::queries;

/// A pooled PostgreSQL handle bound to one telemetry table.
pub struct Database {
    pool: PgPool,
    insert_sql: String,
}

impl Database {
    /// Builds the pool and opens its first connection.
    ///
    /// Does not bound the wait on its own; callers wrap it in a timeout.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, EmqpgError> {
        let options = connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(unavailable)?;

        debug!(
            host = %config.host,
            port = config.port,
            max_connections = config.max_connections,
            "postgres pool created"
        );

        Ok(Self {
            pool,
            insert_sql: queries::telemetry::insert_statement(&config.table),
        })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool, table: &str) -> Self {
        Self {
            pool,
            insert_sql: queries::telemetry::insert_statement(table),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), EmqpgError> {
        queries::telemetry::insert_record(&self.pool, &self.insert_sql, record).await
    }

    async fn ping(&self) -> Result<(), EmqpgError> {
        queries::telemetry::ping(&self.pool).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Translates the DSN-style parameters into sqlx connect options.
pub fn connect_options(config: &PostgresConfig) -> Result<PgConnectOptions, EmqpgError> {
    let ssl_mode = PgSslMode::from_str(&config.sslmode).map_err(unavailable)?;

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .ssl_mode(ssl_mode)
        .application_name("emqpg");

    if let Some(username) = &config.username {
        options = options.username(username);
    }

    let password = config.password.clone().map(SecretString::from);
    if let Some(password) = &password {
        options = options.password(password.expose_secret());
    }

    Ok(options)
}

pub(crate) fn unavailable(err: sqlx::Error) -> EmqpgError {
    EmqpgError::StorageUnavailable {
        source: Box::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PostgresConfig {
        PostgresConfig {
            host: "db.internal".into(),
            database: "telemetry".into(),
            username: Some("writer".into()),
            password: Some("pg-secret".into()),
            ..PostgresConfig::default()
        }
    }

    #[test]
    fn options_carry_dsn_parameters() {
        let options = connect_options(&config()).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_database(), Some("telemetry"));
        assert_eq!(options.get_username(), "writer");
    }

    #[test]
    fn every_configured_sslmode_parses() {
        for mode in ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"] {
            let mut config = config();
            config.sslmode = mode.into();
            assert!(connect_options(&config).is_ok(), "{mode}");
        }
    }

    #[test]
    fn unknown_sslmode_is_storage_unavailable() {
        let mut config = config();
        config.sslmode = "sometimes".into();
        assert!(matches!(
            connect_options(&config),
            Err(EmqpgError::StorageUnavailable { .. })
        ));
    }
}
