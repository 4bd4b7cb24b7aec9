//! [`SharedCache`](crate::cache::SharedCache) adapters.

mod disabled;
mod local;
mod redis_cache;

pub use disabled::DisabledSharedCache;
pub use local::LocalSharedCache;
pub use redis_cache::RedisSharedCache;
