use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::Instance;
use crate::syncthing::api::RecentError;

use super::folder::FolderRow;

/// Aggregated dashboard record for one configured instance.
///
/// Either fully populated (`ok = true`) or carrying only name, base URL and an
/// error message; no mixed state is exposed.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TransferStats>,
    pub devices: Vec<DeviceRow>,
    pub folders: Vec<FolderRow>,
    pub shares: ShareSummary,
    pub paused_folders: Vec<String>,
    pub per_device_folders: BTreeMap<String, Vec<String>>,
    pub errors: Vec<RecentError>,
    pub out_of_sync_items: u64,
}

impl Node {
    /// Node shell for an instance whose baseline calls failed.
    pub fn unreachable(instance: &Instance, message: String) -> Self {
        Self {
            name: instance.name.clone(),
            ok: false,
            error: Some(message),
            base_url: instance.base_url.clone(),
            ..Default::default()
        }
    }
}

/// Throughput figures derived from the connection totals and daemon uptime.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    pub uptime_seconds: i64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub avg_send_bps: f64,
    pub avg_recv_bps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fastest_peer_device_id: Option<String>,
    pub fastest_peer_total_bps: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShareSummary {
    pub count: usize,
    pub peers: Vec<String>,
}

/// One row of the per-device connection table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRow {
    pub device_id: String,
    pub name: String,
    pub online: bool,
    pub in_bps: u64,
    pub out_bps: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_stats: Option<DeviceStatsRow>,
}

/// Last-seen enrichment from the device statistics endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatsRow {
    pub last_seen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection_duration_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection_started_at: Option<String>,
}
