//! User accounts and login sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered user account.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct User {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Unique login name.
    pub username: String,

    /// bcrypt hash of the user's password. Never serialized to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Whether this user may reach the admin surface.
    pub is_admin: bool,

    /// When this account was created.
    pub created_at: DateTime<Utc>,
}

/// A login session backing the session cookie.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Session {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// The user this session belongs to.
    pub user_id: Uuid,

    /// Random opaque token carried by the cookie.
    pub token: String,

    /// Sessions past this instant are treated as absent.
    pub expires_at: DateTime<Utc>,

    /// When this session was created.
    pub created_at: DateTime<Utc>,
}

/// Request-scoped view of the signed-in user.
///
/// Resolved from the session cookie by the auth middleware and handed to
/// handlers as a request extension, so no handler touches cookies directly.
#[derive(Clone, Debug, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}
