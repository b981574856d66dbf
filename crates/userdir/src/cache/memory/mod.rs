//! In-memory cache backend.
//!
//! Provides the TTL cache with load collapsing and the change broadcaster
//! for a single process. Nothing here survives a restart.

mod cache;
mod pubsub;

pub use cache::{CacheConfig, TtlCache, DEFAULT_SWEEP_INTERVAL};
pub use pubsub::{ChangeBroadcaster, Delivery, SubscriberId, Subscription, DEFAULT_QUEUE_CAPACITY};
