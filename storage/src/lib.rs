//! Local collaborators for pbench
//!
//! This crate provides in-process and filesystem implementations of the
//! collaborator traits defined in `pbench-core`:
//!
//! - [`MemoryStore`]: object store held in memory (`StorageConnector`)
//! - [`FsStore`]: object store backed by a directory (`StorageConnector`)
//! - [`DirResultStore`]: result files copied below a directory (`ResultStore`)
//! - [`LocalJobRegistry`]: sequential job ids, tracks live jobs (`JobRegistry`)

#![warn(missing_docs)]
#![warn(clippy::all)]

mod fs;
mod memory;
mod registry;
mod results;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use registry::LocalJobRegistry;
pub use results::DirResultStore;
