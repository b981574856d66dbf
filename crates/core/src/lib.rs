//! Core types and traits for the user directory.
//!
//! This crate holds everything that does not depend on a concrete backend:
//! the user model and change events, pure filtering functions and the
//! repository boundary. Implementations live in the `userdir` crate.

pub mod cache;
pub mod serde;
pub mod storage;
pub mod user;
