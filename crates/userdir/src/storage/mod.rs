//! Storage backends for the user repository.

pub mod inmemory;

pub use inmemory::InMemoryUserRepository;
