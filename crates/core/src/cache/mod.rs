//! Cache naming shared by every cache backend.

mod keys;

pub use keys::{ALL_USERS_KEY, USERS_CACHE_NAME};
