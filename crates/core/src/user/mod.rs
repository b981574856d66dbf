mod filter;
mod types;

pub use filter::{apply_filter, matches_filter, UserFilter, MAX_LIMIT, MAX_PAGE};
pub use types::{NewUser, UpdateKind, User, UserUpdate};
