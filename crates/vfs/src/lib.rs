pub mod backend;
pub mod error;
pub mod local;
pub mod sandbox;

pub use backend::{Deleted, DirectoryEntry, EntryType, FileStore};
pub use error::FsError;
pub use local::LocalFs;
pub use sandbox::PathSandbox;
