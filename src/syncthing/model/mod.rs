mod folder;
mod node;
mod peer;

pub use folder::{FolderChange, FolderRow, FolderState, FolderStatsRow};
pub use node::{DeviceRow, DeviceStatsRow, Node, ShareSummary, TransferStats};
pub use peer::{CompletionItems, PeerCompletion};
