mod queries;
mod types;

pub use queries::{CompletionQuery, DevicePauseQuery, EventsQuery, FolderQuery};
pub use types::{
    Completion, ConnectionState, ConnectionsResponse, DaemonConfig, DbStatus, DeviceConfig,
    DeviceStats, Event, FolderConfig, FolderStats, RecentError, SystemErrors, SystemStatus,
};
