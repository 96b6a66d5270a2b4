// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the emqpg pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.
//! Passwords are never serialized and never printed by `Debug`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level emqpg configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// The broker address, topic, database host, and database name have no
/// usable defaults and are caught by validation when left empty.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmqpgConfig {
    /// MQTT broker session settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// PostgreSQL sink settings.
    #[serde(default)]
    pub postgres: PostgresConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// MQTT broker session configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Broker address: `tcp://host:1883`, `ssl://host:8883`, or bare `host[:port]`.
    #[serde(default)]
    pub address: String,

    /// MQTT client identifier. Empty generates `emqpg-<uuid>` at connect time.
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Topic filter to subscribe to.
    #[serde(default)]
    pub topic: String,

    /// Subscription quality of service (0, 1 or 2).
    #[serde(default = "default_qos")]
    pub qos: u8,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Fixed delay between reconnection attempts. Retries never stop.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Ceiling on the initial connection attempt.
    #[serde(default = "default_broker_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_clean_session")]
    pub clean_session: bool,

    /// Transport encryption settings.
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            client_id: String::new(),
            username: None,
            password: None,
            topic: String::new(),
            qos: default_qos(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            connect_timeout_secs: default_broker_connect_timeout_secs(),
            clean_session: default_clean_session(),
            tls: TlsConfig::default(),
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("address", &self.address)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("reconnect_interval_secs", &self.reconnect_interval_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("clean_session", &self.clean_session)
            .field("tls", &self.tls)
            .finish()
    }
}

impl BrokerConfig {
    /// Resolves the address into host, port and transport encryption.
    ///
    /// `ssl://`, `tls://` and `mqtts://` imply TLS, as does `tls.enabled`.
    /// Missing ports default to 8883 with TLS and 1883 without.
    pub fn endpoint(&self) -> Result<BrokerEndpoint, String> {
        let raw = self.address.trim();
        if raw.is_empty() {
            return Err("broker address is empty".to_string());
        }

        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("tcp://{raw}")
        };

        let url = url::Url::parse(&with_scheme)
            .map_err(|e| format!("invalid broker address `{raw}`: {e}"))?;

        let scheme_tls = match url.scheme() {
            "tcp" | "mqtt" => false,
            "ssl" | "tls" | "mqtts" => true,
            other => return Err(format!("unsupported broker scheme `{other}`")),
        };

        let host = url
            .host_str()
            .map(|h| h.trim_matches(&['[', ']'][..]))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("broker address `{raw}` has no host"))?;

        let tls = scheme_tls || self.tls.enabled;
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(BrokerEndpoint {
            host: host.to_string(),
            port,
            tls,
        })
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// A broker address resolved for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_reconnect_interval_secs() -> u64 {
    5
}

fn default_broker_connect_timeout_secs() -> u64 {
    10
}

fn default_clean_session() -> bool {
    true
}

/// Broker transport encryption configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// Encrypt the broker connection even for `tcp://` addresses.
    #[serde(default)]
    pub enabled: bool,

    /// PEM bundle to trust instead of the platform root store.
    #[serde(default)]
    pub ca_file: Option<String>,
}

/// PostgreSQL sink configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_pg_port")]
    pub port: u16,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// libpq-style sslmode: disable, allow, prefer, require, verify-ca, verify-full.
    #[serde(default = "default_sslmode")]
    pub sslmode: String,

    /// Target table, optionally schema-qualified.
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Ceiling on pool creation plus the liveness check.
    #[serde(default = "default_pg_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Ceiling on each single-row insert.
    #[serde(default = "default_insert_timeout_secs")]
    pub insert_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            username: None,
            password: None,
            sslmode: default_sslmode(),
            table: default_table(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_pg_connect_timeout_secs(),
            insert_timeout_secs: default_insert_timeout_secs(),
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sslmode", &self.sslmode)
            .field("table", &self.table)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("insert_timeout_secs", &self.insert_timeout_secs)
            .finish()
    }
}

impl PostgresConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn insert_timeout(&self) -> Duration {
        Duration::from_secs(self.insert_timeout_secs)
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_sslmode() -> String {
    "disable".to_string()
}

fn default_table() -> String {
    "device_data".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_connect_timeout_secs() -> u64 {
    10
}

fn default_insert_timeout_secs() -> u64 {
    5
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
