pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod remote;

pub use config::{BackupConfig, ResolvedConfig};
pub use self::core::{Excludes, SyncEngine, SyncReport};
pub use error::{ConfigError, SyncError};
pub use remote::{Entry, EntryKind, FileManager, Listing, RrfFileManager};
