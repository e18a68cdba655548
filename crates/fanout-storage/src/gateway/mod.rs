//! Key/value gateway implementations
//!
//! - [`InMemoryGateway`]: DashMap-backed, with call counters and failure injection for tests
//! - [`InMemoryVersionedGateway`]: DashMap-backed store supporting conditional writes
//! - [`FileGateway`]: one JSON file per key below a root directory

mod file;
mod memory;
mod versioned;

pub use file::FileGateway;
pub use memory::InMemoryGateway;
pub use versioned::InMemoryVersionedGateway;
