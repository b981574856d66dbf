//! In-memory user repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use userdir_core::storage::{RepositoryError, Result, UserRepository};
use userdir_core::user::{apply_filter, User, UserFilter};

/// In-memory storage backend.
///
/// Uses a HashMap wrapped in `Arc<RwLock<_>>` for thread-safe access.
/// Data is not persisted and will be lost when the repository is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    /// Creates a new empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-populated with the given users.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users.into_iter().map(|user| (user.id, user)).collect();
        Self {
            users: Arc::new(RwLock::new(users)),
        }
    }
}

/// Sorts by creation time, then ID, so paging is stable.
fn sorted(users: impl Iterator<Item = User>) -> Vec<User> {
    let mut users: Vec<User> = users.collect();
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    users
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn list_users(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(sorted(users.values().cloned()))
    }

    async fn find_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let ordered = sorted(users.values().cloned());
        Ok(apply_filter(&ordered, filter))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn get_user_by_nickname(&self, nickname: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.nickname == nickname).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(RepositoryError::AlreadyExists {
                entity_type: "User",
                id: user.id.to_string(),
            });
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let mut users = self.users.write().await;
        let Some(stored) = users.get_mut(&user.id) else {
            return Err(RepositoryError::NotFound {
                entity_type: "User",
                id: user.id.to_string(),
            });
        };

        // Creation time is owned by the store.
        let created_at = stored.created_at;
        *stored = User {
            created_at,
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut users = self.users.write().await;
        if users.remove(&id).is_none() {
            return Err(RepositoryError::NotFound {
                entity_type: "User",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_all_users(&self) -> Result<()> {
        let mut users = self.users.write().await;
        users.clear();
        Ok(())
    }
}
