//! Vendor registry storage.
//!
//! [`VendorRegistry`] is the abstract contract; [`InMemoryVendorRegistry`]
//! is the thread-safe reference backend.

mod memory;
mod traits;

pub use memory::InMemoryVendorRegistry;
pub use traits::{StorageError, VendorRegistry};
