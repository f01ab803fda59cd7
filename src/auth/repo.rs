use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

/// PostgreSQL SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user record conflicts with existing state")]
    Conflict,
    #[error("user not found")]
    NotFound,
    #[error("user store unavailable: {0}")]
    Io(#[from] sqlx::Error),
}

/// Persistent account records.
///
/// Uniqueness of `email` and the activation predicate are enforced by the
/// backend itself, not by callers.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// `Conflict` when the email is already registered.
    async fn insert(&self, user: &NewUser) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;
    /// Matches only unactivated users whose code has not yet expired.
    async fn find_by_email_and_activation_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<User, StoreError>;
    /// `Conflict` when the user is already activated.
    async fn mark_activated(&self, id: Uuid) -> Result<(), StoreError>;
    async fn list_all(&self) -> Result<Vec<User>, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, activation_code, activation_code_expiry)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, password_hash, activated, activation_code,
                      activation_code_expiry, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.activation_code)
        .bind(user.activation_code_expiry)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict
            } else {
                StoreError::Io(e)
            }
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, activated, activation_code,
                   activation_code_expiry, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn find_by_email_and_activation_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, activated, activation_code,
                   activation_code_expiry, created_at
            FROM users
            WHERE email = $1
              AND activation_code = $2
              AND activated = false
              AND activation_code_expiry > now()
            "#,
        )
        .bind(email)
        .bind(code)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn mark_activated(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET activated = true
             WHERE id = $1 AND activated = false
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    // Unpaginated full scan; fine for small deployments only.
    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, activated, activation_code,
                   activation_code_expiry, created_at
            FROM users
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}
