//! Identity: accounts, sessions and one-time links.
//!
//! [`Identity`] is the only way in. Every surface turns credentials into a
//! [`Session`] here and passes that session explicitly to the views.

mod email;
mod limit;
mod password;
mod tokens;
pub mod validate;

pub use email::{EmailConfig, EmailError, Mailer};
pub use limit::RateLimiter;
pub use password::{hash_password, needs_rehash, verify_password};
pub use tokens::{generate_token, TokenPurpose, TokenStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::{SessionRepository, SessionRow, UserRepository};
use crate::models::{Actor, User};

const DEFAULT_SESSION_DAYS: i64 = 30;
const RESET_EXPIRY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Too many failed sign-in attempts, try again in a minute")]
    RateLimited,
    #[error("An account with email {0} already exists")]
    EmailTaken(String),
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Session expired, sign in again")]
    SessionExpired,
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Sign-in with {0} is not configured")]
    ProviderUnavailable(String),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),
}

impl AuthError {
    /// Errors caught before any I/O happened.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidEmail(_)
                | AuthError::WeakPassword(_)
                | AuthError::PasswordMismatch
                | AuthError::MissingField(_)
        )
    }
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.email.clone())
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            token: row.token,
            user_id: row.user_id,
            email: row.email,
            expires_at: row.expires_at,
        }
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn { user_id: Uuid, email: String },
    SignedOut { user_id: Uuid, token: String },
    PasswordUpdated { user_id: Uuid },
}

#[derive(Debug)]
pub struct Identity {
    users: UserRepository,
    sessions: SessionRepository,
    tokens: TokenStore,
    limiter: RateLimiter,
    mailer: Option<Mailer>,
    events: broadcast::Sender<AuthEvent>,
    public_url: String,
    session_ttl: chrono::Duration,
}

impl Identity {
    pub fn new(
        users: UserRepository,
        sessions: SessionRepository,
        mailer: Option<Mailer>,
        public_url: impl Into<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            users,
            sessions,
            tokens: TokenStore::default(),
            limiter: RateLimiter::default(),
            mailer,
            events,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            session_ttl: chrono::Duration::days(DEFAULT_SESSION_DAYS),
        }
    }

    pub fn with_session_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn mailer(&self) -> Option<&Mailer> {
        self.mailer.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Resolves a bearer token to its session.
    pub async fn session(&self, token: &str) -> Result<Session, AuthError> {
        let row = self
            .sessions
            .get(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if row.expires_at <= Utc::now() {
            self.sessions.delete(token).await?;
            return Err(AuthError::SessionExpired);
        }
        Ok(row.into())
    }

    /// Swaps the token for a fresh one with a new expiry.
    pub async fn refresh_session(&self, token: &str) -> Result<Session, AuthError> {
        let current = self.session(token).await?;
        let fresh = generate_token();
        let expires_at = Utc::now() + self.session_ttl;

        if !self.sessions.rotate(token, &fresh, expires_at).await? {
            return Err(AuthError::InvalidToken);
        }

        Ok(Session {
            token: fresh,
            expires_at,
            ..current
        })
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Session, AuthError> {
        let email = validate::email(email)?;
        validate::password(password)?;

        let user = User::new(&email).with_display_name(display_name.map(str::to_string));
        let user = match self.users.create(&user, Some(&hash_password(password)?)).await {
            Ok(user) => user,
            Err(e) if crate::db::is_unique_violation(&e) => {
                return Err(AuthError::EmailTaken(email))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(email = %user.email, "account created");
        self.start_session(&user).await
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = validate::required("email", email)?;
        validate::required("password", password)?;

        if self.limiter.is_limited(email) {
            tracing::warn!(%email, "sign-in rate limited");
            return Err(AuthError::RateLimited);
        }

        let user = match self.users.by_email(email).await? {
            Some(user) => user,
            None => {
                self.limiter.record_failure(email);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let stored = self.users.password_hash(user.id).await?;
        let Some(stored) = stored.filter(|stored| verify_password(password, stored)) else {
            self.limiter.record_failure(email);
            return Err(AuthError::InvalidCredentials);
        };

        if needs_rehash(&stored) {
            self.users
                .set_password_hash(user.id, &hash_password(password)?)
                .await?;
            tracing::info!(email = %user.email, "password hash upgraded");
        }

        self.limiter.reset(email);
        self.start_session(&user).await
    }

    /// Issues a one-time sign-in link and returns it.
    ///
    /// The link is mailed when SMTP is configured and logged otherwise.
    pub async fn send_magic_link(
        &self,
        email: &str,
        redirect: Option<&str>,
    ) -> Result<String, AuthError> {
        let email = validate::email(email)?;
        let token = self.tokens.issue(&email, TokenPurpose::MagicLink, redirect);
        let link = format!(
            "{}/auth/verify?token={}",
            self.public_url,
            urlencoding::encode(&token)
        );

        match &self.mailer {
            Some(mailer) => mailer.send_magic_link(&email, &link).await?,
            None => tracing::info!(%email, %link, "email not configured, magic link"),
        }
        Ok(link)
    }

    /// Redeems a magic link. Unknown addresses get a passwordless account.
    ///
    /// Returns the new session and the redirect requested with the link.
    pub async fn verify_magic_link(
        &self,
        token: &str,
    ) -> Result<(Session, Option<String>), AuthError> {
        let data = self
            .tokens
            .redeem(token, TokenPurpose::MagicLink)
            .ok_or(AuthError::InvalidToken)?;

        let user = match self.users.by_email(&data.email).await? {
            Some(user) => user,
            None => {
                let user = self.users.create(&User::new(&data.email), None).await?;
                tracing::info!(email = %user.email, "account created from magic link");
                user
            }
        };

        let session = self.start_session(&user).await?;
        Ok((session, data.redirect))
    }

    /// Third-party sign-in. No provider is wired in.
    pub async fn sign_in_with_oauth(&self, provider: &str) -> Result<Session, AuthError> {
        let provider = validate::required("provider", provider)?;
        tracing::warn!(%provider, "oauth sign-in requested but no provider is configured");
        Err(AuthError::ProviderUnavailable(provider.to_string()))
    }

    pub async fn update_password(&self, session: &Session, new: &str) -> Result<(), AuthError> {
        validate::password(new)?;
        self.users
            .set_password_hash(session.user_id, &hash_password(new)?)
            .await?;

        let _ = self.events.send(AuthEvent::PasswordUpdated {
            user_id: session.user_id,
        });
        Ok(())
    }

    /// Issues a reset link. Returns `None` without error for unknown
    /// addresses so that callers cannot probe for accounts.
    pub async fn send_password_reset(&self, email: &str) -> Result<Option<String>, AuthError> {
        let email = validate::email(email)?;
        if self.users.by_email(&email).await?.is_none() {
            tracing::debug!(%email, "password reset for unknown email");
            return Ok(None);
        }

        let token =
            self.tokens
                .issue_with_expiry(&email, TokenPurpose::PasswordReset, None, RESET_EXPIRY);
        let link = format!(
            "{}/auth/reset/confirm?token={}",
            self.public_url,
            urlencoding::encode(&token)
        );

        match &self.mailer {
            Some(mailer) => mailer.send_password_reset(&email, &link).await?,
            None => tracing::info!(%email, %link, "email not configured, reset link"),
        }
        Ok(Some(link))
    }

    /// Sets a new password from a reset token and ends every session of the
    /// account.
    pub async fn reset_password(&self, token: &str, new: &str) -> Result<(), AuthError> {
        validate::password(new)?;
        let data = self
            .tokens
            .redeem(token, TokenPurpose::PasswordReset)
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .users
            .by_email(&data.email)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.users
            .set_password_hash(user.id, &hash_password(new)?)
            .await?;
        let ended = self.sessions.delete_for_user(user.id).await?;
        self.limiter.reset(&user.email);

        tracing::info!(email = %user.email, sessions = ended, "password reset");
        let _ = self.events.send(AuthEvent::PasswordUpdated { user_id: user.id });
        Ok(())
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let session = self.session(token).await?;
        self.sessions.delete(token).await?;

        let _ = self.events.send(AuthEvent::SignedOut {
            user_id: session.user_id,
            token: session.token,
        });
        Ok(())
    }

    /// Drops expired sessions and one-time tokens.
    pub async fn cleanup(&self) -> Result<(), AuthError> {
        let sessions = self.sessions.delete_expired().await?;
        let tokens = self.tokens.cleanup_expired();
        let limits = self.limiter.prune();
        tracing::debug!(sessions, tokens, limits, "expired credentials removed");
        Ok(())
    }

    async fn start_session(&self, user: &User) -> Result<Session, AuthError> {
        let token = generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.sessions.create(&token, user.id, expires_at).await?;

        let _ = self.events.send(AuthEvent::SignedIn {
            user_id: user.id,
            email: user.email.clone(),
        });

        Ok(Session {
            token,
            user_id: user.id,
            email: user.email.clone(),
            expires_at,
        })
    }
}

/// Pulls the `token` query parameter out of a link, or returns the input
/// when it is already a bare token.
pub fn token_from_link(link: &str) -> String {
    let link = link.trim();
    if let Some((_, query)) = link.split_once('?') {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("token=") {
                return urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
            }
        }
    }
    link.rsplit('/').next().unwrap_or(link).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_store, TestDb};

    fn identity(db: &TestDb) -> Identity {
        Identity::new(
            db.store.users.clone(),
            db.store.sessions.clone(),
            None,
            "http://localhost:8080/",
        )
    }

    #[tokio::test]
    async fn test_sign_up_and_session() {
        let db = setup_store().await;
        let identity = identity(&db);

        let session = identity
            .sign_up("a@x.com", "secret1", Some("Alice"))
            .await
            .unwrap();
        let resolved = identity.session(&session.token).await.unwrap();

        assert_eq!(resolved.email, "a@x.com");
        assert_eq!(resolved.user_id, session.user_id);
    }

    #[tokio::test]
    async fn test_sign_up_validates_before_io() {
        let db = setup_store().await;
        let identity = identity(&db);

        let err = identity.sign_up("a@x.com", "short", None).await.unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword(6)));
        assert!(err.is_validation());

        let err = identity.sign_up("nope", "secret1", None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail(_)));
        assert_eq!(db.store.users.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_sign_up() {
        let db = setup_store().await;
        let identity = identity(&db);

        identity.sign_up("a@x.com", "secret1", None).await.unwrap();
        let err = identity
            .sign_up("A@x.com", "secret1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken(_)));
    }

    #[tokio::test]
    async fn test_sign_in_with_password() {
        let db = setup_store().await;
        let identity = identity(&db);
        identity.sign_up("a@x.com", "secret1", None).await.unwrap();

        assert!(identity
            .sign_in_with_password("a@x.com", "secret1")
            .await
            .is_ok());
        assert!(matches!(
            identity.sign_in_with_password("a@x.com", "wrong!").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.sign_in_with_password("b@x.com", "secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_legacy_hash_upgraded_on_sign_in() {
        use sha2::{Digest, Sha256};

        let db = setup_store().await;
        let identity = identity(&db);
        let session = identity.sign_up("a@x.com", "secret1", None).await.unwrap();

        let digest = hex::encode(Sha256::digest(b"oldsalt:secret1"));
        db.store
            .users
            .set_password_hash(session.user_id, &format!("oldsalt${}", digest))
            .await
            .unwrap();

        identity
            .sign_in_with_password("a@x.com", "secret1")
            .await
            .unwrap();

        let stored = db.store.users.password_hash(session.user_id).await.unwrap().unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("secret1", &stored));
    }

    #[tokio::test]
    async fn test_cleanup_forgets_expired_failures() {
        let db = setup_store().await;
        let mut identity = identity(&db);
        identity.limiter = RateLimiter::new(5, std::time::Duration::from_millis(10));

        for n in 0..50 {
            let email = format!("nobody{}@x.com", n);
            let err = identity
                .sign_in_with_password(&email, "secret1")
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
        assert_eq!(identity.limiter.len(), 50);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        identity.cleanup().await.unwrap();
        assert!(identity.limiter.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_after_five_failures() {
        let db = setup_store().await;
        let identity = identity(&db);
        identity.sign_up("a@x.com", "secret1", None).await.unwrap();

        for _ in 0..5 {
            let _ = identity.sign_in_with_password("a@x.com", "wrong!").await;
        }

        assert!(matches!(
            identity.sign_in_with_password("a@x.com", "secret1").await,
            Err(AuthError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_magic_link_creates_account() {
        let db = setup_store().await;
        let identity = identity(&db);

        let link = identity
            .send_magic_link("new@x.com", Some("/lists"))
            .await
            .unwrap();
        assert!(link.starts_with("http://localhost:8080/auth/verify?token="));

        let token = token_from_link(&link);
        let (session, redirect) = identity.verify_magic_link(&token).await.unwrap();

        assert_eq!(session.email, "new@x.com");
        assert_eq!(redirect.as_deref(), Some("/lists"));
        assert!(matches!(
            identity.verify_magic_link(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_ends_sessions() {
        let db = setup_store().await;
        let identity = identity(&db);
        let session = identity.sign_up("a@x.com", "secret1", None).await.unwrap();

        assert!(identity
            .send_password_reset("nobody@x.com")
            .await
            .unwrap()
            .is_none());

        let link = identity
            .send_password_reset("a@x.com")
            .await
            .unwrap()
            .unwrap();
        identity
            .reset_password(&token_from_link(&link), "newsecret")
            .await
            .unwrap();

        assert!(identity.session(&session.token).await.is_err());
        assert!(identity
            .sign_in_with_password("a@x.com", "newsecret")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let db = setup_store().await;
        let identity = identity(&db);
        let session = identity.sign_up("a@x.com", "secret1", None).await.unwrap();

        let refreshed = identity.refresh_session(&session.token).await.unwrap();

        assert_ne!(refreshed.token, session.token);
        assert_eq!(refreshed.user_id, session.user_id);
        assert!(matches!(
            identity.session(&session.token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_expired_session() {
        let db = setup_store().await;
        let identity = identity(&db).with_session_ttl(chrono::Duration::seconds(-1));
        let session = identity.sign_up("a@x.com", "secret1", None).await.unwrap();

        assert!(matches!(
            identity.session(&session.token).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_sign_out_emits_event() {
        let db = setup_store().await;
        let identity = identity(&db);
        let session = identity.sign_up("a@x.com", "secret1", None).await.unwrap();
        let mut events = identity.subscribe();

        identity.sign_out(&session.token).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedOut {
                user_id: session.user_id,
                token: session.token.clone(),
            }
        );
        assert!(identity.session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_update_password() {
        let db = setup_store().await;
        let identity = identity(&db);
        let session = identity.sign_up("a@x.com", "secret1", None).await.unwrap();

        assert!(identity.update_password(&session, "12345").await.is_err());
        identity.update_password(&session, "123456").await.unwrap();

        assert!(identity
            .sign_in_with_password("a@x.com", "123456")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_oauth_unavailable() {
        let db = setup_store().await;
        let identity = identity(&db);

        assert!(matches!(
            identity.sign_in_with_oauth("google").await,
            Err(AuthError::ProviderUnavailable(p)) if p == "google"
        ));
    }

    #[test]
    fn test_token_from_link() {
        assert_eq!(
            token_from_link("http://h/auth/verify?token=abc-_1"),
            "abc-_1"
        );
        assert_eq!(token_from_link("http://h/share/xyz"), "xyz");
        assert_eq!(token_from_link(" xyz "), "xyz");
    }
}
