//! Credential store — user rows and password hashes.
//!
//! Passwords are stored as Argon2 PHC strings with a per-user random salt.
//! Email lookup is an exact, case-sensitive match.

use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("email already exists")]
    DuplicateEmail,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid password")]
    InvalidPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// A registered user. Mirrors the `users` table.
#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    #[serde(skip)]
    pub password_hash: String,
}

/// Persistence for registered users.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::DuplicateEmail`] if the email is taken.
    async fn create_user(&self, email: &str, display_name: &str, password_hash: &str) -> Result<Uuid, CredentialError>;

    /// Look up a user by exact email.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Db`] if the backing store fails.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, CredentialError>;
}

// =============================================================================
// PASSWORD HASHING
// =============================================================================

/// Hash a password with a fresh random salt.
///
/// # Errors
///
/// Returns [`CredentialError::Hash`] if Argon2 rejects the input.
pub fn hash_password(plaintext: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Check a password against a stored PHC hash. Malformed hashes never match.
#[must_use]
pub fn check_password(stored_hash: &str, plaintext: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Hash on the blocking pool; Argon2 is deliberately slow.
///
/// # Errors
///
/// Returns [`CredentialError::Hash`] if hashing fails or the task panics.
pub async fn hash_password_blocking(plaintext: String) -> Result<String, CredentialError> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext))
        .await
        .map_err(|e| CredentialError::Hash(e.to_string()))?
}

/// Resolve `email` and check `plaintext` against its stored hash.
///
/// # Errors
///
/// Returns [`CredentialError::UserNotFound`] or
/// [`CredentialError::InvalidPassword`] for a failed login.
pub async fn verify_password(
    store: &dyn CredentialStore,
    email: &str,
    plaintext: &str,
) -> Result<User, CredentialError> {
    let user = store.find_by_email(email).await?.ok_or(CredentialError::UserNotFound)?;

    let stored_hash = user.password_hash.clone();
    let plaintext = plaintext.to_owned();
    let matches = tokio::task::spawn_blocking(move || check_password(&stored_hash, &plaintext))
        .await
        .map_err(|e| CredentialError::Hash(e.to_string()))?;

    if matches { Ok(user) } else { Err(CredentialError::InvalidPassword) }
}

// =============================================================================
// POSTGRES
// =============================================================================

/// `users` table in Postgres.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, email: &str, display_name: &str, password_hash: &str) -> Result<Uuid, CredentialError> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r"INSERT INTO users (id, email, display_name, password_hash)
              VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(email)
        .bind(display_name)
        .bind(password_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(CredentialError::DuplicateEmail),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, CredentialError> {
        let row = sqlx::query("SELECT id, email, display_name, password_hash FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| User {
            id: r.get("id"),
            email: r.get("email"),
            display_name: r.get("display_name"),
            password_hash: r.get("password_hash"),
        }))
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Process-local store for development (`AUTH_STORE=memory`) and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, email: &str, display_name: &str, password_hash: &str) -> Result<Uuid, CredentialError> {
        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Err(CredentialError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            display_name: display_name.to_owned(),
            password_hash: password_hash.to_owned(),
        };
        let id = user.id;
        users.insert(user.email.clone(), user);
        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, CredentialError> {
        Ok(self.users.read().await.get(email).cloned())
    }
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
