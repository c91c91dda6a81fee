pub mod cache;
pub mod durable;
pub mod error;
pub mod locks;
pub mod store;

pub use cache::{cache_key, MemorySessionCache, SessionCache, DEFAULT_CACHE_CAPACITY};
pub use durable::{DurableStore, JsonFileDurableStore, MemoryDurableStore};
pub use error::StoreError;
pub use locks::{UserGuard, UserLocks};
pub use store::{SessionStore, DEFAULT_CACHE_TTL};
