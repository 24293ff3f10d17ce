// src/store/mod.rs

pub mod memory;
pub mod record;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use memory::InMemoryStore;
pub use record::KeyRecord;
#[cfg(feature = "redis")]
pub use redis::RedisStore;
pub use traits::KeyStore;
