// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telemetry row insert and liveness check.

use sqlx::PgPool;

use emqpg_core::{EmqpgError, TelemetryRecord};

/// Column order of the telemetry table. Existing deployments depend on it.
pub const COLUMNS: [&str; 10] = [
    "imei",
    "lat",
    "lng",
    "gps_ts",
    "uptime",
    "csq",
    "vbat",
    "up_vbat",
    "ip",
    "receivetime",
];

/// Builds the parameterized single-row insert for `table`.
///
/// The table name must already be a validated identifier.
pub fn insert_statement(table: &str) -> String {
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

/// Insert one telemetry record.
pub async fn insert_record(
    pool: &PgPool,
    sql: &str,
    record: &TelemetryRecord,
) -> Result<(), EmqpgError> {
    let report = record.report();
    sqlx::query(sql)
        .bind(&report.imei)
        .bind(report.lat)
        .bind(report.lng)
        .bind(report.gps_ts)
        .bind(report.uptime)
        .bind(report.csq)
        .bind(report.vbat)
        .bind(report.up_vbat)
        .bind(&report.ip)
        .bind(record.received_at())
        .execute(pool)
        .await
        .map_err(|e| EmqpgError::StoragePersistFailed {
            source: Box::new(e),
        })?;
    Ok(())
}

/// `SELECT 1` round-trip through the pool.
pub async fn ping(pool: &PgPool) -> Result<(), EmqpgError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(crate::database::unavailable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_has_fixed_column_order() {
        assert_eq!(
            insert_statement("device_data"),
            "INSERT INTO device_data (imei, lat, lng, gps_ts, uptime, csq, vbat, up_vbat, ip, receivetime) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
    }

    #[test]
    fn insert_statement_keeps_schema_qualifier() {
        let sql = insert_statement("ingest.device_data");
        assert!(sql.starts_with("INSERT INTO ingest.device_data ("));
    }
}
