use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user record held by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Unique across the directory.
    pub nickname: String,
    pub password: String,
    pub email: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Builds a user from creation fields, stamping a fresh ID and the given
    /// creation time into both timestamps.
    pub fn from_new(new_user: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            nickname: new_user.nickname,
            password: new_user.password,
            email: new_user.email,
            country: new_user.country,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets a specific ID for this user (useful for testing).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

/// The writable fields of a user, as supplied when creating one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub password: String,
    pub email: String,
    pub country: String,
}

impl NewUser {
    /// Creates creation fields with the given nickname and placeholder
    /// values for the rest.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }
}

/// What happened to the user an update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    Created,
    Updated,
    Deleted,
    AllDeleted,
}

impl UpdateKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Created => "CREATED",
            UpdateKind::Updated => "UPDATED",
            UpdateKind::Deleted => "DELETED",
            UpdateKind::AllDeleted => "ALL_DELETED",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification delivered to watchers.
///
/// `user` carries the full record for creations and updates. Deletions only
/// carry the ID, and a bulk deletion carries neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub user_id: String,
    pub kind: UpdateKind,
    pub user: Option<User>,
}

impl UserUpdate {
    pub fn created(user: User) -> Self {
        Self {
            user_id: user.id.to_string(),
            kind: UpdateKind::Created,
            user: Some(user),
        }
    }

    pub fn updated(user: User) -> Self {
        Self {
            user_id: user.id.to_string(),
            kind: UpdateKind::Updated,
            user: Some(user),
        }
    }

    pub fn deleted(user_id: Uuid) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind: UpdateKind::Deleted,
            user: None,
        }
    }

    pub fn all_deleted() -> Self {
        Self {
            user_id: String::new(),
            kind: UpdateKind::AllDeleted,
            user: None,
        }
    }
}
