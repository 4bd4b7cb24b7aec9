//! Cache tiers in front of the backing store.
//!
//! - **Memo**: per-process map, partitioned by namespace ([`MemoCache`])
//! - **Shared**: cross-process tier behind the [`SharedCache`] trait
//!
//! Neither tier expires entries. They are only replaced by a write or dropped by an
//! explicit forget or clear.
//!
//! ```toml
//! [cache]
//! prefix = "settings."
//! backend = "local"
//! shared_timeout_ms = 2000
//! backing_timeout_ms = 5000
//! ```

mod config;
mod entry;
mod keys;
pub(crate) mod lock;
mod memo;
mod shared;

pub use config::CacheConfig;
pub use entry::CachedValue;
pub use keys::{CacheKey, Namespace, NamespaceError, PREFIX_DELIMITER, SEPARATOR};
pub use memo::MemoCache;
pub use shared::{SharedCache, SharedCacheError};
