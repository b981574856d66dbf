/// Diagnostic name of the cache holding the full user list.
pub const USERS_CACHE_NAME: &str = "users";

/// Key under which the full user list is cached.
///
/// The users cache only ever holds this one entry; the key exists so the
/// cache stays keyed like any other.
pub const ALL_USERS_KEY: &str = "users:all";
