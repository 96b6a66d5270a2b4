// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQL statements executed against the telemetry table.

pub mod telemetry;
