//! Pause/resume writes against one daemon.

use serde::Deserialize;
use serde_json::Value;

use crate::syncthing::api::DevicePauseQuery;
use crate::syncthing::client::DaemonClient;
use crate::types::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
}

impl ControlAction {
    pub fn pause(self) -> bool {
        matches!(self, ControlAction::Pause)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
        }
    }
}

/// Toggles one folder's paused flag: reads the folder's configuration,
/// flips the flag and writes the whole object back.
pub async fn set_folder_paused(
    client: &DaemonClient,
    folder_id: &str,
    pause: bool,
) -> Result<(), DaemonError> {
    let path = format!("/rest/config/folders/{folder_id}");
    let mut config: Value = client.get_json(&path).await?;
    if let Some(object) = config.as_object_mut() {
        object.insert("paused".to_string(), Value::Bool(pause));
    }
    client.put_json(&path, &config).await
}

/// Pauses or resumes one device through the system-level pause action.
pub async fn set_device_paused(
    client: &DaemonClient,
    device_id: &str,
    pause: bool,
) -> Result<(), DaemonError> {
    let query = DevicePauseQuery {
        device: device_id,
        pause,
    };
    client.post_with_query("/rest/system/pause", &query).await
}
