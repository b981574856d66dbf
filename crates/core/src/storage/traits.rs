use async_trait::async_trait;
use uuid::Uuid;

use crate::user::{User, UserFilter};

use super::Result;

/// Repository for user records.
///
/// This is the boundary to the backing store. Implementations are expected to
/// bound their own latency; callers do not impose timeouts on every method.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Returns every user in the store.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Returns the page of users matching the filter.
    async fn find_users(&self, filter: &UserFilter) -> Result<Vec<User>>;

    /// Gets a user by ID.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Gets a user by exact nickname.
    async fn get_user_by_nickname(&self, nickname: &str) -> Result<Option<User>>;

    /// Inserts a new user.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Overwrites an existing user and returns the stored record.
    async fn update_user(&self, user: &User) -> Result<User>;

    /// Deletes a user by ID.
    async fn delete_user(&self, id: Uuid) -> Result<()>;

    /// Deletes every user.
    async fn delete_all_users(&self) -> Result<()>;
}
