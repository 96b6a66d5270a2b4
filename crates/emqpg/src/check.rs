// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `emqpg check` command implementation.
//!
//! Connects to the configured database and broker the same way `serve` would,
//! without ingesting anything.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use emqpg_config::{BrokerConfig, EmqpgConfig, PostgresConfig};
use emqpg_core::{
    EmqpgError, HealthStatus, MessageHandler, PluginAdapter, SessionEvent, StorageAdapter,
};
use emqpg_mqtt::ConnectionManager;
use emqpg_storage::TelemetrySink;

use crate::serve;

/// Status of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Runs every check and prints a report. Returns `false` if any check failed.
pub async fn run_check(config: &EmqpgConfig, plain: bool) -> bool {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(config),
        check_postgres(&config.postgres).await,
        check_broker(&config.broker).await,
    ];

    println!();
    println!("  emqpg check");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", format_line(result, use_color));
    }

    let fail_count = count(&results, CheckStatus::Fail);
    let warn_count = count(&results, CheckStatus::Warn);

    println!("  {}", "-".repeat(50));
    if fail_count == 0 && warn_count == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {fail_count} failed, {warn_count} warning(s).");
    }
    println!();

    fail_count == 0
}

fn count(results: &[CheckResult], status: CheckStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();

    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!("    {symbol} {:<12} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<12} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Configuration was already loaded and validated; report what it resolved to.
fn check_config(config: &EmqpgConfig) -> CheckResult {
    let start = Instant::now();
    match config.broker.endpoint() {
        Ok(endpoint) => CheckResult::new(
            "config",
            CheckStatus::Pass,
            format!(
                "broker {}:{}{}, table {}",
                endpoint.host,
                endpoint.port,
                if endpoint.tls { " (tls)" } else { "" },
                config.postgres.table
            ),
            start,
        ),
        Err(e) => CheckResult::new("config", CheckStatus::Fail, e, start),
    }
}

async fn check_postgres(config: &PostgresConfig) -> CheckResult {
    let start = Instant::now();
    let sink = match TelemetrySink::open(config).await {
        Ok(sink) => sink,
        Err(e) => return CheckResult::new("postgres", CheckStatus::Fail, e.to_string(), start),
    };

    let result = match sink.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(
            "postgres",
            CheckStatus::Pass,
            format!("{}@{}:{}", config.database, config.host, config.port),
            start,
        ),
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new("postgres", CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new("postgres", CheckStatus::Fail, e.to_string(), start),
    };
    serve::release(&sink).await;
    result
}

/// Discards everything; `check` only proves the subscription is granted.
struct Discard;

#[async_trait]
impl MessageHandler for Discard {
    async fn handle(&self, _topic: &str, _payload: &[u8]) -> Result<(), EmqpgError> {
        Ok(())
    }
}

async fn check_broker(config: &BrokerConfig) -> CheckResult {
    let start = Instant::now();
    let manager = match ConnectionManager::new(config, Arc::new(Discard)) {
        Ok(manager) => manager,
        Err(e) => return CheckResult::new("broker", CheckStatus::Fail, e.to_string(), start),
    };
    let mut events = manager.events();

    if let Err(e) = manager.connect().await {
        return CheckResult::new("broker", CheckStatus::Fail, e.to_string(), start);
    }

    let granted = tokio::time::timeout(config.connect_timeout(), async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Subscribed { .. }) => return Some(true),
                Ok(SessionEvent::SubscribeFailed { .. }) => return Some(false),
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten();
    if let Err(e) = manager.disconnect().await {
        warn!(error = %e, "broker disconnect failed");
    }

    match granted {
        Some(true) => CheckResult::new(
            "broker",
            CheckStatus::Pass,
            format!("subscribed to {}", config.topic),
            start,
        ),
        Some(false) => CheckResult::new(
            "broker",
            CheckStatus::Warn,
            format!("connected, but subscription to {} was rejected", config.topic),
            start,
        ),
        None => CheckResult::new(
            "broker",
            CheckStatus::Warn,
            "connected, but no subscription acknowledgement",
            start,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: CheckStatus) -> CheckResult {
        CheckResult {
            name: "postgres".into(),
            status,
            message: "device_data@db:5432".into(),
            duration: Duration::from_millis(12),
        }
    }

    #[test]
    fn plain_lines_carry_status_tags() {
        assert_eq!(
            format_line(&result(CheckStatus::Pass), false),
            "    [OK]   postgres     device_data@db:5432 (12ms)"
        );
        let warn = format_line(&result(CheckStatus::Warn), false);
        assert!(warn.starts_with("    [WARN] postgres"));
        let fail = format_line(&result(CheckStatus::Fail), false);
        assert!(fail.starts_with("    [FAIL] postgres"));
    }

    #[test]
    fn failures_and_warnings_are_counted_separately() {
        let results = vec![
            result(CheckStatus::Pass),
            result(CheckStatus::Warn),
            result(CheckStatus::Fail),
            result(CheckStatus::Fail),
        ];
        assert_eq!(count(&results, CheckStatus::Fail), 2);
        assert_eq!(count(&results, CheckStatus::Warn), 1);
        assert_eq!(count(&results, CheckStatus::Pass), 1);
    }

    #[test]
    fn config_check_reports_resolved_endpoint() {
        let mut config = EmqpgConfig::default();
        config.broker.address = "mqtts://broker.example.com".into();

        let result = check_config(&config);

        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.message, "broker broker.example.com:8883 (tls), table device_data");
    }

    #[tokio::test]
    async fn unreachable_postgres_fails() {
        let config = PostgresConfig {
            host: "127.0.0.1".into(),
            port: 1,
            database: "emqpg".into(),
            connect_timeout_secs: 2,
            ..PostgresConfig::default()
        };

        let result = check_postgres(&config).await;

        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("storage unavailable"), "{}", result.message);
    }

    #[tokio::test]
    async fn unreachable_broker_fails() {
        let config = BrokerConfig {
            address: "tcp://127.0.0.1:1".into(),
            topic: "devices/#".into(),
            connect_timeout_secs: 2,
            ..BrokerConfig::default()
        };

        let result = check_broker(&config).await;

        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("127.0.0.1:1"), "{}", result.message);
    }
}
