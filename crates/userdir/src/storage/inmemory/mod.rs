//! In-memory storage backend.
//!
//! Stands in for the persistent store in tests and single-process setups.

mod repository;

pub use repository::InMemoryUserRepository;
