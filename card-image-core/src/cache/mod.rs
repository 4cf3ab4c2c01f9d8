pub mod computing_cache;


pub use computing_cache::{CacheConfig, CacheEntry, CacheStats, CacheWeight, ComputingCache};
