mod store_file;
mod store_interface;

pub use store_file::FileStore;
pub use store_interface::*;

// In-memory implementation for testing.
#[cfg(test)]
mod store_mem;
#[cfg(test)]
pub use store_mem::{MemMedium, MemStore};
