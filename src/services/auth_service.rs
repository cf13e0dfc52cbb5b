//! AuthService — user accounts and cookie-backed login sessions.
//!
//! Sessions live in SQLite: the cookie carries only a random opaque token,
//! resolved per request by the auth middleware into a `CurrentUser` that is
//! passed to handlers as explicit request-scoped context.

use crate::models::user::{CurrentUser, Session, User};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Sessions expire 30 days after login.
const SESSION_TTL_DAYS: i64 = 30;

pub const SESSION_COOKIE: &str = "coursebox_session";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Clone)]
pub struct AuthService {
    pub db: Arc<SqlitePool>,
}

impl AuthService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Verify a username/password pair against the stored bcrypt hash.
    pub async fn verify_login(&self, username: &str, password: &str) -> AuthResult<User> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, is_admin, created_at
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => AuthError::InvalidCredentials,
            other => AuthError::Sqlx(other),
        })?;

        if bcrypt::verify(password, &user.password_hash)? {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Create a session row and return it; the token goes into the cookie.
    pub async fn create_session(&self, user_id: Uuid) -> AuthResult<Session> {
        let token = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at: now + Duration::days(SESSION_TTL_DAYS),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&*self.db)
        .await?;

        Ok(session)
    }

    /// Resolve a cookie token to the signed-in user, ignoring expired rows.
    pub async fn resolve_session(&self, token: &str) -> AuthResult<Option<CurrentUser>> {
        let row = sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.password_hash, u.is_admin, u.created_at
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ? AND s.expires_at > ?",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(|user| CurrentUser {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
        }))
    }

    /// Drop the session backing a token. Idempotent.
    pub async fn delete_session(&self, token: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Create a user account with a bcrypt-hashed password.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> AuthResult<User> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: bcrypt::hash(password, bcrypt::DEFAULT_COST)?,
            is_admin,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, is_admin, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(user.created_at)
        .execute(&*self.db)
        .await?;

        Ok(user)
    }

    /// Create the initial admin account when the users table is empty.
    ///
    /// The generated password is logged once; there is no other way to
    /// retrieve it.
    pub async fn bootstrap_admin(&self) -> AuthResult<()> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&*self.db)
            .await?;
        if count > 0 {
            return Ok(());
        }

        let password = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>());
        self.create_user("admin", &password, true).await?;
        warn!("created bootstrap admin user `admin` with password `{password}`");
        Ok(())
    }
}
