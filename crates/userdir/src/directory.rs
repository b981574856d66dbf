//! The user directory service.
//!
//! Serves the full user list through a [`TtlCache`] and broadcasts a
//! [`UserUpdate`] to every watcher after each successful write.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use userdir_core::cache::ALL_USERS_KEY;
use userdir_core::storage::{RepositoryError, UserRepository};
use userdir_core::user::{NewUser, User, UserFilter, UserUpdate};

use crate::cache::{ChangeBroadcaster, Delivery, Subscription, TtlCache};
use crate::config::Config;
use crate::error::{DirectoryError, Result};

/// Upper bound on a single all-users load.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

type UsersCache = TtlCache<String, Arc<Vec<User>>, RepositoryError>;

/// Caching and live-update layer over a [`UserRepository`].
///
/// Cloning is cheap and clones share the cache and the watcher registry.
pub struct UserDirectory<R: UserRepository> {
    repository: Arc<R>,
    users_cache: UsersCache,
    updates: ChangeBroadcaster<UserUpdate>,
    load_timeout: Duration,
}

impl<R: UserRepository> Clone for UserDirectory<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            users_cache: self.users_cache.clone(),
            updates: self.updates.clone(),
            load_timeout: self.load_timeout,
        }
    }
}

impl<R: UserRepository> std::fmt::Debug for UserDirectory<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("users_cache", &self.users_cache)
            .field("updates", &self.updates)
            .field("load_timeout", &self.load_timeout)
            .finish_non_exhaustive()
    }
}

impl<R: UserRepository> UserDirectory<R> {
    /// Creates a directory over `repository`.
    ///
    /// Starts the cache sweep task, so this must be called from within a
    /// Tokio runtime.
    pub fn new(repository: Arc<R>, config: &Config) -> Self {
        Self {
            repository,
            users_cache: TtlCache::new(config.users_cache_config()),
            updates: ChangeBroadcaster::new(config.watch_queue_capacity()),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    /// Overrides the bound on a single all-users load.
    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.updates.subscriber_count()
    }

    /// Returns every user, served from the cache while fresh.
    ///
    /// Writes do not invalidate the cached list, so a recent change may be
    /// missing until the entry expires.
    pub async fn list_users(&self) -> Result<Arc<Vec<User>>> {
        let repository = &self.repository;
        let load_timeout = self.load_timeout;

        let users = self
            .users_cache
            .get_or_load(ALL_USERS_KEY.to_string(), |_| async move {
                match tokio::time::timeout(load_timeout, repository.list_users()).await {
                    Ok(result) => result.map(Arc::new),
                    Err(_) => Err(RepositoryError::Timeout(load_timeout)),
                }
            })
            .await?;

        tracing::trace!(count = users.len(), "Listed users");
        Ok(users)
    }

    /// Returns the page of users matching `filter`, straight from the
    /// repository.
    pub async fn find_users(&self, filter: UserFilter) -> Result<Vec<User>> {
        let filter = filter.normalized();
        let users = self.repository.find_users(&filter).await?;

        tracing::trace!(
            page = filter.page,
            limit = filter.limit,
            count = users.len(),
            "Found users"
        );
        Ok(users)
    }

    /// Creates a user and notifies watchers.
    pub async fn add_user(&self, new_user: NewUser) -> Result<User> {
        if self
            .repository
            .get_user_by_nickname(&new_user.nickname)
            .await?
            .is_some()
        {
            return Err(DirectoryError::NicknameTaken(new_user.nickname));
        }

        let user = User::from_new(new_user, Utc::now());
        self.repository.insert_user(&user).await?;

        let delivery = self.updates.publish(UserUpdate::created(user.clone()));
        log_delivery("User created", user.id, delivery);
        Ok(user)
    }

    /// Overwrites an existing user and notifies watchers with the stored
    /// record.
    pub async fn update_user(&self, user: User) -> Result<User> {
        if let Some(owner) = self
            .repository
            .get_user_by_nickname(&user.nickname)
            .await?
        {
            if owner.id != user.id {
                return Err(DirectoryError::NicknameTaken(user.nickname));
            }
        }

        let user = User {
            updated_at: Utc::now(),
            ..user
        };
        let stored = self.repository.update_user(&user).await?;

        let delivery = self.updates.publish(UserUpdate::updated(stored.clone()));
        log_delivery("User updated", stored.id, delivery);
        Ok(stored)
    }

    /// Deletes a user and notifies watchers.
    pub async fn delete_user(&self, id: Uuid) -> Result<()> {
        self.repository.delete_user(id).await?;

        let delivery = self.updates.publish(UserUpdate::deleted(id));
        log_delivery("User deleted", id, delivery);
        Ok(())
    }

    /// Deletes every user and notifies watchers.
    pub async fn delete_all_users(&self) -> Result<()> {
        self.repository.delete_all_users().await?;

        let delivery = self.updates.publish(UserUpdate::all_deleted());
        tracing::info!(
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "All users deleted"
        );
        Ok(())
    }

    /// Registers a new watcher. Every update published from now on is queued
    /// for it until the subscription is dropped or unsubscribed.
    pub fn watch(&self) -> Subscription<UserUpdate> {
        let subscription = self.updates.subscribe();
        tracing::debug!(subscriber_id = %subscription.id(), "Watcher registered");
        subscription
    }

    /// Drops every cached list so the next read goes to the repository.
    pub fn clear_cache(&self) {
        self.users_cache.clear();
    }

    /// Stops background cache maintenance. Reads keep working.
    pub async fn shutdown(&self) {
        self.users_cache.close().await;
        tracing::debug!("User directory shut down");
    }
}

fn log_delivery(message: &'static str, user_id: Uuid, delivery: Delivery) {
    tracing::info!(
        %user_id,
        delivered = delivery.delivered,
        dropped = delivery.dropped,
        "{message}"
    );
}
