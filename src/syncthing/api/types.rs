use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `/rest/system/status`. Only the fields the dashboard consumes.
#[derive(Debug, Deserialize, Default)]
pub struct SystemStatus {
    #[serde(default, rename = "myID")]
    pub my_id: Option<String>,
    #[serde(default, rename = "myName")]
    pub my_name: Option<String>,
    #[serde(default)]
    pub uptime: i64,
}

/// `/rest/system/connections`.
#[derive(Debug, Deserialize, Default)]
pub struct ConnectionsResponse {
    #[serde(default)]
    pub total: ConnectionTotals,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionState>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConnectionTotals {
    #[serde(default, rename = "bytesSent")]
    pub bytes_sent: u64,
    #[serde(default, rename = "bytesReceived")]
    pub bytes_received: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectionState {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, rename = "inBytesPerSecond")]
    pub in_bps: u64,
    #[serde(default, rename = "outBytesPerSecond")]
    pub out_bps: u64,
    #[serde(default, rename = "connectedAt", alias = "startedAt")]
    pub connected_at: Option<String>,
}

/// One entry of the `/rest/stats/device` map.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeviceStats {
    #[serde(default, rename = "lastSeen")]
    pub last_seen: Option<String>,
    #[serde(default, rename = "lastConnectionDurationS")]
    pub last_connection_duration_s: Option<f64>,
    #[serde(default, rename = "lastConnectionStartedAt")]
    pub last_connection_started_at: Option<String>,
}

/// `/rest/config`, or the merge of the folder- and device-scoped fallbacks.
#[derive(Debug, Deserialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FolderConfig {
    /// Folders without an id cannot be queried and are skipped.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub devices: Vec<FolderDevice>,
}

impl FolderConfig {
    pub fn display_label(&self) -> String {
        self.label.clone().filter(|l| !l.is_empty()).unwrap_or_else(|| self.id.clone())
    }

    /// Member device ids, de-duplicated, preserving configuration order.
    pub fn member_ids(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.devices
            .iter()
            .map(|d| d.device_id.as_str())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FolderDevice {
    #[serde(rename = "deviceID", alias = "deviceId")]
    pub device_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `/rest/system/error`. Some daemon versions wrap the list, some return it
/// bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SystemErrors {
    Wrapped {
        #[serde(default)]
        errors: Option<Vec<RecentError>>,
    },
    Bare(Vec<RecentError>),
}

impl SystemErrors {
    pub fn into_vec(self) -> Vec<RecentError> {
        match self {
            SystemErrors::Wrapped { errors } => errors.unwrap_or_default(),
            SystemErrors::Bare(errors) => errors,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RecentError {
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// One entry of the `/rest/events` stream.
#[derive(Debug, Deserialize, Clone)]
pub struct Event {
    #[serde(default)]
    pub id: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn folder_id(&self) -> Option<&str> {
        self.data.get("folder").and_then(|v| v.as_str())
    }

    pub fn item(&self) -> Option<&str> {
        self.data.get("item").and_then(|v| v.as_str())
    }

    pub fn action(&self) -> Option<&str> {
        self.data.get("action").and_then(|v| v.as_str())
    }
}

/// `/rest/db/status` for one folder.
#[derive(Debug, Deserialize, Default)]
pub struct DbStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "needBytes")]
    pub need_bytes: Option<u64>,
    #[serde(default, rename = "needItems")]
    pub need_items: Option<u64>,
    #[serde(default, rename = "stateChanged")]
    pub state_changed: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

/// `/rest/db/completion` for one folder/device pair.
#[derive(Debug, Deserialize, Default)]
pub struct Completion {
    #[serde(default, alias = "completionPct")]
    pub completion: Option<f64>,
    #[serde(default, rename = "globalItems", alias = "globalFiles")]
    pub global_items: Option<u64>,
    #[serde(default, rename = "needItems", alias = "needFiles")]
    pub need_items: Option<u64>,
}

/// One entry of the `/rest/stats/folder` map.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FolderStats {
    #[serde(default, rename = "lastFile")]
    pub last_file: Option<LastFile>,
    #[serde(default, rename = "lastScan")]
    pub last_scan: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LastFile {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub at: String,
    #[serde(default)]
    pub deleted: bool,
}
