//! Allocation and collection types for sprocket.
//!
//! This module provides:
//! - [`region`]: merged interval sets and a first-fit index allocator
//! - [`sparse_set`]: a generational arena
//! - A re-export of the AHash-backed hash map

pub mod region;
pub mod sparse_set;

pub use region::{Region, RegionAllocator, RegionBuffer, RegionError};

// Re-export the optimized hash map
pub use ahash::AHashMap as HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_ahash() {
        let mut map = HashMap::new();
        map.insert("key", "value");
        assert_eq!(map.get("key"), Some(&"value"));
    }
}
