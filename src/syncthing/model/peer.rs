use serde::Serialize;

/// Completion of one folder as seen by one member device (including self).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCompletion {
    pub id: String,
    pub name: String,
    pub online: bool,
    pub items: CompletionItems,
}

/// Item counts for one peer. All counts are null when the peer's completion
/// query failed; membership stays visible either way.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItems {
    pub global_items: Option<u64>,
    pub need_items: Option<u64>,
    pub synced_items: Option<u64>,
    pub completion_pct: Option<f64>,
}
