pub mod engine;
pub mod exclude;
pub mod marker;

pub use engine::{needs_download, SyncEngine, SyncReport};
pub use exclude::{clean_path, Excludes};
pub use marker::{is_managed, write_marker, DIR_MARKER};
