use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string, never exposed
    pub activated: bool,
    pub activation_code: String,
    pub activation_code_expiry: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Fields supplied by registration; the database assigns `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub activation_code: String,
    pub activation_code_expiry: OffsetDateTime,
}

/// Listing view with the digest and activation code stripped.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub activated: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            activated: u.activated,
            created_at: u.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_hides_secrets() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            activated: false,
            activation_code: "0011223344556677".into(),
            activation_code_expiry: OffsetDateTime::now_utc(),
            created_at: OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"activated\":false"));
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("0011223344556677"));
    }
}
