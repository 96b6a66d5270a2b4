// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telemetry and session types shared across the pipeline crates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A device report exactly as it arrives on the wire.
///
/// Every key is required and must match its JSON type; unknown keys are
/// ignored. Values are not range-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    /// Device identifier.
    pub imei: String,
    pub lat: f64,
    pub lng: f64,
    /// Device-reported GPS fix time, epoch seconds.
    pub gps_ts: i64,
    pub uptime: i64,
    /// Signal quality indicator.
    pub csq: i16,
    /// Battery voltage.
    pub vbat: i16,
    /// Upstream/reference battery voltage.
    pub up_vbat: i16,
    /// Reporting IP address.
    pub ip: String,
}

impl DeviceReport {
    /// Decodes a raw payload into a report.
    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// A decoded report stamped with the time it reached the sink.
///
/// Built once per inbound message and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    report: DeviceReport,
    received_at: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Attaches the receive timestamp to a decoded report.
    pub fn stamp(report: DeviceReport, received_at: DateTime<Utc>) -> Self {
        Self {
            report,
            received_at,
        }
    }

    pub fn report(&self) -> &DeviceReport {
        &self.report
    }

    /// System clock time (UTC) assigned at persistence time.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Lifecycle state of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl SessionState {
    /// Returns whether moving from `self` to `next` is a legal transition.
    ///
    /// `Reconnecting -> Reconnecting` covers a failed retry. `Disconnected`
    /// is reachable from everywhere because `disconnect()` is terminal.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Disconnected, Reconnecting)
                | (Connecting, Connected)
                | (Reconnecting, Connected)
                | (Reconnecting, Reconnecting)
                | (_, Disconnected)
        )
    }
}

/// An observable session transition, published to external observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The initial connection attempt started.
    Connecting { broker: String },
    /// The broker acknowledged a (re)connection.
    Connected { session_present: bool },
    /// An established session dropped unexpectedly.
    ConnectionLost { reason: String },
    /// A reconnection attempt is scheduled after `delay`.
    Reconnecting { attempt: u64, delay: Duration },
    /// The broker granted the topic subscription.
    Subscribed { topic: String },
    /// The subscription was refused or could not be requested.
    SubscribeFailed { topic: String, reason: String },
    /// The session was closed on request.
    Disconnected,
}
