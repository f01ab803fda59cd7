use std::{future::Future, sync::Arc, time::Duration};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        activation::{self, ActivationCode},
        cache::{CacheError, SessionCache},
        events::{AccountEvent, AccountEvents},
        password::{hash_password, verify_password, PasswordError},
        repo::{StoreError, UserStore},
        repo_types::{NewUser, PublicUser},
        session::{is_well_formed_token, session_key, SessionIssuer},
    },
    telemetry::record_operation,
};

const MAX_EMAIL_LEN: usize = 254;
const MAX_PASSWORD_LEN: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),
    #[error("email already registered")]
    Conflict,
    #[error("activation code is invalid or expired")]
    NotFoundOrExpired,
    #[error("invalid user or password")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal error: {0}")]
    Internal(String),
}

fn internal(context: &str) -> AccountError {
    AccountError::Internal(context.to_string())
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AccountError> {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || !is_valid_email(email) {
        return Err(AccountError::Validation("Invalid email".into()));
    }
    if password.is_empty() {
        return Err(AccountError::Validation("Password must not be empty".into()));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AccountError::Validation("Password too long".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub database: bool,
    pub cache: bool,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.database && self.cache
    }
}

/// Account lifecycle: register, activate, login, authorize.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionCache>,
    issuer: SessionIssuer,
    events: Arc<dyn AccountEvents>,
    timeout: Duration,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionCache>,
        issuer: SessionIssuer,
        events: Arc<dyn AccountEvents>,
        timeout: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            issuer,
            events,
            timeout,
        }
    }

    /// Runs a store or cache call under the dependency deadline.
    async fn within<T>(&self, what: &str, fut: impl Future<Output = T>) -> Result<T, AccountError> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            error!(operation = what, timeout_ms = self.timeout.as_millis() as u64, "dependency timed out");
            internal(what)
        })
    }

    fn emit(&self, event: AccountEvent) {
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            if let Err(e) = events.publish(event).await {
                warn!(error = %e, "publishing account event failed");
            }
        });
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<(), AccountError> {
        let result = self.try_register(email, password).await;
        record_operation("register", &result);
        result
    }

    pub async fn activate(&self, email: &str, code: &str) -> Result<(), AccountError> {
        let result = self.try_activate(email, code).await;
        record_operation("activate", &result);
        result
    }

    /// Returns the opaque session token. Activation is not required.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AccountError> {
        let result = self.try_login(email, password).await;
        record_operation("login", &result);
        result
    }

    /// Resolves an opaque token to its signed assertion. Every failure,
    /// including an unreachable cache, is reported as `Unauthorized`.
    pub async fn authorize(&self, token: &str) -> Result<String, AccountError> {
        let result = self.try_authorize(token).await;
        record_operation("authorize", &result);
        result
    }

    #[instrument(skip(self, password))]
    async fn try_register(&self, email: &str, password: &str) -> Result<(), AccountError> {
        let email = normalize_email(email);
        validate_credentials(&email, password)?;

        let plain = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(|e| {
                error!(error = %e, "hashing task failed");
                internal("hash password")
            })?
            .map_err(|e| {
                error!(error = %e, "hash_password failed");
                internal("hash password")
            })?;

        let ActivationCode { code, expires_at } = activation::generate();
        let new_user = NewUser {
            id: Uuid::new_v4(),
            email,
            password_hash,
            activation_code: code,
            activation_code_expiry: expires_at,
        };

        let user = match self.within("insert user", self.users.insert(&new_user)).await? {
            Ok(u) => u,
            Err(StoreError::Conflict) => {
                warn!(email = %new_user.email, "email already registered");
                return Err(AccountError::Conflict);
            }
            Err(e) => {
                error!(error = %e, "insert user failed");
                return Err(internal("insert user"));
            }
        };

        self.emit(AccountEvent::ActivationNeeded {
            user_id: user.id,
            email: user.email.clone(),
            code: user.activation_code,
            expires_at: user.activation_code_expiry,
        });
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn try_activate(&self, email: &str, code: &str) -> Result<(), AccountError> {
        let email = normalize_email(email);
        let code = code.trim();
        if email.is_empty() || code.is_empty() {
            return Err(AccountError::NotFoundOrExpired);
        }

        let lookup = self.users.find_by_email_and_activation_code(&email, code);
        let user = match self.within("find activation code", lookup).await? {
            Ok(u) => u,
            Err(StoreError::NotFound) => {
                warn!(email = %email, "activation code not found or expired");
                return Err(AccountError::NotFoundOrExpired);
            }
            Err(e) => {
                error!(error = %e, "activation lookup failed");
                return Err(internal("find activation code"));
            }
        };

        match self.within("mark activated", self.users.mark_activated(user.id)).await? {
            Ok(()) => {}
            // Another request consumed the code between lookup and update.
            Err(StoreError::Conflict) | Err(StoreError::NotFound) => {
                warn!(user_id = %user.id, "activation lost race");
                return Err(AccountError::NotFoundOrExpired);
            }
            Err(e) => {
                error!(error = %e, user_id = %user.id, "activating user failed");
                return Err(internal("mark activated"));
            }
        }

        self.emit(AccountEvent::Activated {
            user_id: user.id,
            email: user.email.clone(),
        });
        info!(user_id = %user.id, "user activated");
        Ok(())
    }

    #[instrument(skip(self, password))]
    async fn try_login(&self, email: &str, password: &str) -> Result<String, AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidCredentials);
        }

        let user = match self.within("find user", self.users.find_by_email(&email)).await? {
            Ok(u) => u,
            Err(StoreError::NotFound) => {
                warn!(email = %email, "login unknown email");
                return Err(AccountError::InvalidCredentials);
            }
            Err(e) => {
                error!(error = %e, "find_by_email failed");
                return Err(internal("find user"));
            }
        };

        let plain = password.to_owned();
        let digest = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &digest))
            .await
            .map_err(|e| {
                error!(error = %e, "verify task failed");
                internal("verify password")
            })?
            .map_err(|e: PasswordError| {
                error!(error = %e, user_id = %user.id, "verify_password failed");
                internal("verify password")
            })?;

        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AccountError::InvalidCredentials);
        }

        let (token, _assertion) = self
            .within("issue session", self.issuer.issue(user.id))
            .await?
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "issuing session failed");
                internal("issue session")
            })?;

        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    #[instrument(skip(self, token))]
    async fn try_authorize(&self, token: &str) -> Result<String, AccountError> {
        if !is_well_formed_token(token) {
            debug!("malformed session token");
            return Err(AccountError::Unauthorized);
        }

        let key = session_key(token);
        let lookup = tokio::time::timeout(self.timeout, self.sessions.get(&key));
        match lookup.await {
            // A shared cache is writable by others; only re-emit what we signed.
            Ok(Ok(assertion)) => match self.issuer.verify(&assertion) {
                Ok(_) => Ok(assertion),
                Err(e) => {
                    warn!(error = %e, "cached assertion failed verification");
                    Err(AccountError::Unauthorized)
                }
            },
            Ok(Err(CacheError::Miss)) => {
                debug!("session not found");
                Err(AccountError::Unauthorized)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "session lookup failed");
                Err(AccountError::Unauthorized)
            }
            Err(_) => {
                warn!("session lookup timed out");
                Err(AccountError::Unauthorized)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<PublicUser>, AccountError> {
        let users = self
            .within("list users", self.users.list_all())
            .await?
            .map_err(|e| {
                error!(error = %e, "loading users failed");
                internal("list users")
            })?;
        Ok(users.into_iter().map(PublicUser::from).collect())
    }

    /// Pings the store and the cache concurrently under one deadline.
    pub async fn probe(&self, deadline: Duration) -> HealthReport {
        let (database, cache) = tokio::join!(
            tokio::time::timeout(deadline, self.users.ping()),
            tokio::time::timeout(deadline, self.sessions.ping()),
        );
        let report = HealthReport {
            database: matches!(database, Ok(Ok(()))),
            cache: matches!(cache, Ok(Ok(()))),
        };
        if !report.healthy() {
            warn!(database = report.database, cache = report.cache, "health probe failed");
        }
        report
    }
}
