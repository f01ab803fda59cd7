use std::{sync::Arc, time::Duration};

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::{
        activation::random_hex,
        cache::{CacheError, SessionCache},
    },
    config::SessionConfig,
};

/// Lifetime of a session in the token cache. This is the authoritative
/// session lifetime; the assertion's own `exp` matches it.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const OPAQUE_TOKEN_BYTES: usize = 24;

/// Claims of the signed identity assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("signing session assertion failed: {0}")]
    SigningFailure(#[source] jsonwebtoken::errors::Error),
    #[error("storing session failed: {0}")]
    Cache(#[from] CacheError),
    #[error("invalid session assertion: {0}")]
    InvalidAssertion(#[source] jsonwebtoken::errors::Error),
}

/// Cache key under which a session's assertion is stored.
pub fn session_key(token: &str) -> String {
    format!("token:{token}")
}

/// Opaque tokens are exactly the hex form of `OPAQUE_TOKEN_BYTES` random bytes.
pub fn is_well_formed_token(token: &str) -> bool {
    token.len() == OPAQUE_TOKEN_BYTES * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Mints signed assertions and the opaque tokens that reference them.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    cache: Arc<dyn SessionCache>,
}

impl SessionIssuer {
    pub fn new(cfg: &SessionConfig, cache: Arc<dyn SessionCache>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            cache,
        }
    }

    pub fn sign(&self, user_id: Uuid) -> Result<String, SessionError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(SESSION_TTL.as_secs() as i64);
        let claims = SessionClaims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let assertion = encode(&Header::default(), &claims, &self.encoding)
            .map_err(SessionError::SigningFailure)?;
        debug!(user_id = %user_id, "session assertion signed");
        Ok(assertion)
    }

    /// Signs an assertion and stores it under a fresh opaque token.
    ///
    /// The token is random and unrelated to the assertion, so evicting the
    /// cache entry revokes the session on its own.
    /// Returns `(opaque_token, signed_assertion)`.
    pub async fn issue(&self, user_id: Uuid) -> Result<(String, String), SessionError> {
        let assertion = self.sign(user_id)?;
        let token = random_hex(OPAQUE_TOKEN_BYTES);
        self.cache
            .put(&session_key(&token), &assertion, SESSION_TTL)
            .await?;
        debug!(user_id = %user_id, "session issued");
        Ok((token, assertion))
    }

    /// Checks signature, expiry, issuer and audience.
    pub fn verify(&self, assertion: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(assertion, &self.decoding, &validation)
            .map_err(SessionError::InvalidAssertion)?;
        Ok(data.claims)
    }
}
