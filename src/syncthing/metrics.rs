//! Pure metric derivations. Deterministic; wall-clock time only enters
//! through explicit arguments.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::api::ConnectionState;

/// Average throughput over the daemon's lifetime, in bytes per second.
/// Zero when the uptime is not positive.
pub fn throughput(total_bytes: u64, uptime_seconds: i64) -> f64 {
    if uptime_seconds <= 0 {
        return 0.0;
    }
    total_bytes as f64 / uptime_seconds as f64
}

/// The connection with the highest combined in+out rate. Ties keep the first
/// entry encountered in iteration order; connections idling at zero are never
/// selected.
pub fn fastest_peer(connections: &BTreeMap<String, ConnectionState>) -> Option<(&str, u64)> {
    let mut best: Option<(&str, u64)> = None;
    for (device_id, conn) in connections {
        let combined = conn.in_bps.saturating_add(conn.out_bps);
        if combined > best.map(|(_, bps)| bps).unwrap_or(0) {
            best = Some((device_id, combined));
        }
    }
    best
}

/// Items a peer already holds: `max(0, global - needed)`.
pub fn synced_items(global: u64, needed: u64) -> u64 {
    global.saturating_sub(needed)
}

/// Completion percentage for one peer. The daemon-reported value is trusted
/// when present; otherwise derived from the item counts.
pub fn completion_pct(reported: Option<f64>, global: u64, synced: u64) -> f64 {
    if let Some(pct) = reported {
        return pct;
    }
    if global == 0 {
        return 0.0;
    }
    synced as f64 / global as f64 * 100.0
}

/// Seconds a connection has been up, from its start timestamp to `now`.
/// None when the timestamp is absent or unparsable.
pub fn connection_uptime(connected_at: Option<&str>, now: DateTime<Utc>) -> Option<i64> {
    let started = DateTime::parse_from_rfc3339(connected_at?).ok()?;
    Some(now.signed_duration_since(started.with_timezone(&Utc)).num_seconds().max(0))
}
