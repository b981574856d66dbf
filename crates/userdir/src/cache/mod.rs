//! Cache and change-feed implementations.
//!
//! Only the in-memory backend exists; the directory runs as a single
//! process and both components live for the process lifetime.

pub mod memory;

pub use memory::{
    CacheConfig, ChangeBroadcaster, Delivery, SubscriberId, Subscription, TtlCache,
};
