pub mod redis;
pub mod session;

pub use redis::create_redis_client;
pub use redis::RedisStorage;
pub use redis::StorageWriterHandle;
pub use session::{MemoryStorage, SessionKey, SessionStorage, SessionStore};
