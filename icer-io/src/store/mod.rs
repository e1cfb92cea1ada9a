//! Side-file stores backing archive containers

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;
