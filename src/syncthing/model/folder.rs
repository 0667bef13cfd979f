use serde::Serialize;

use super::peer::PeerCompletion;

/// Sync state of a folder as reported by its database status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FolderState {
    #[default]
    Unknown,
    Idle,
    Scanning,
    Syncing,
    Error,
    Other,
}

impl FolderState {
    pub fn from_raw(state: Option<&str>) -> Self {
        match state {
            None => FolderState::Unknown,
            Some(s) if s.eq_ignore_ascii_case("idle") => FolderState::Idle,
            Some(s) if s.eq_ignore_ascii_case("scanning") => FolderState::Scanning,
            Some(s) if s.eq_ignore_ascii_case("syncing") => FolderState::Syncing,
            Some(s) if s.eq_ignore_ascii_case("error") => FolderState::Error,
            Some(_) => FolderState::Other,
        }
    }
}

/// One row of the folder table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRow {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: FolderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub need_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub need_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_pct: Option<f64>,
    pub peers: Vec<PeerCompletion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_change: Option<FolderChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_changed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_stats: Option<FolderStatsRow>,
    pub paused: bool,
}

/// Latest change seen for a folder, from the event stream or the
/// state-changed fallback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderChange {
    pub file: String,
    pub time: String,
    pub action: String,
}

/// Last-written-file info from the folder statistics endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStatsRow {
    pub filename: String,
    pub at: String,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_states_and_buckets_the_rest() {
        assert_eq!(FolderState::from_raw(Some("idle")), FolderState::Idle);
        assert_eq!(FolderState::from_raw(Some("Scanning")), FolderState::Scanning);
        assert_eq!(FolderState::from_raw(Some("syncing")), FolderState::Syncing);
        assert_eq!(FolderState::from_raw(Some("error")), FolderState::Error);
        assert_eq!(FolderState::from_raw(Some("sync-preparing")), FolderState::Other);
        assert_eq!(FolderState::from_raw(None), FolderState::Unknown);
    }
}
