pub mod cache_store;
pub mod favorite_set;

pub use cache_store::{CACHE_SNAPSHOT_KEY, CacheSnapshot, CacheStatus, CacheStore};
pub use favorite_set::{FavoriteRecord, FavoriteSet};
