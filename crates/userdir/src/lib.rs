//! Caching and live-update layer for a user directory.
//!
//! [`UserDirectory`] sits between a transport and a [`UserRepository`]:
//! the full user list is memoized in a [`TtlCache`] with concurrent loads
//! collapsed into one, and every successful write is fanned out to watchers
//! through a [`ChangeBroadcaster`].
//!
//! [`UserRepository`]: userdir_core::storage::UserRepository

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod storage;
pub mod telemetry;
pub mod watch;

pub use cache::{CacheConfig, ChangeBroadcaster, Delivery, SubscriberId, Subscription, TtlCache};
pub use config::Config;
pub use directory::{UserDirectory, DEFAULT_LOAD_TIMEOUT};
pub use error::{DirectoryError, Result};
pub use storage::InMemoryUserRepository;
pub use watch::{forward_updates, UpdateSink, WatchEnd};
