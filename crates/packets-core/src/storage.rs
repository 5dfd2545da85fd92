//! Authoritative store implementations
//!
//! - [`FsStorage`]: a directory on the local filesystem
//! - [`MemoryStorage`]: an in-process map, shared between clones

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;
