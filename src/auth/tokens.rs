//! One-time tokens for magic links and password resets.
//!
//! Tokens live in memory only. Each one is bound to a purpose and is consumed
//! on the first verification attempt, whether or not it was still valid.

use rand::Rng;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// What a one-time token may be redeemed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    MagicLink,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct TokenData {
    pub email: String,
    pub purpose: TokenPurpose,
    /// Where to send the user after a magic-link sign-in.
    pub redirect: Option<String>,
    pub expires_at: Instant,
}

#[derive(Debug)]
pub struct TokenStore {
    tokens: RwLock<HashMap<String, TokenData>>,
    default_expiry: Duration,
}

impl TokenStore {
    pub fn new(expiry_minutes: u64) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            default_expiry: Duration::from_secs(expiry_minutes * 60),
        }
    }

    pub fn issue(&self, email: &str, purpose: TokenPurpose, redirect: Option<&str>) -> String {
        self.issue_with_expiry(email, purpose, redirect, self.default_expiry)
    }

    pub fn issue_with_expiry(
        &self,
        email: &str,
        purpose: TokenPurpose,
        redirect: Option<&str>,
        expiry: Duration,
    ) -> String {
        let token = generate_token();
        let data = TokenData {
            email: email.to_string(),
            purpose,
            redirect: redirect.map(str::to_string),
            expires_at: Instant::now() + expiry,
        };

        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), data);

        token
    }

    /// Consumes a token. Returns its data when it exists, has not expired and
    /// was issued for `purpose`.
    pub fn redeem(&self, token: &str, purpose: TokenPurpose) -> Option<TokenData> {
        let data = self
            .tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)?;

        if Instant::now() > data.expires_at || data.purpose != purpose {
            return None;
        }
        Some(data)
    }

    /// Drops expired tokens and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let before = tokens.len();
        tokens.retain(|_, data| data.expires_at > now);
        before - tokens.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(10)
    }
}

/// 32 random bytes, base64url without padding.
pub fn generate_token() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_issue_and_redeem() {
        let store = TokenStore::new(10);

        let token = store.issue("a@x.com", TokenPurpose::MagicLink, Some("/lists"));
        let data = store.redeem(&token, TokenPurpose::MagicLink).unwrap();

        assert_eq!(data.email, "a@x.com");
        assert_eq!(data.redirect.as_deref(), Some("/lists"));
    }

    #[test]
    fn test_token_is_single_use() {
        let store = TokenStore::new(10);
        let token = store.issue("a@x.com", TokenPurpose::MagicLink, None);

        assert!(store.redeem(&token, TokenPurpose::MagicLink).is_some());
        assert!(store.redeem(&token, TokenPurpose::MagicLink).is_none());
    }

    #[test]
    fn test_wrong_purpose_burns_token() {
        let store = TokenStore::new(10);
        let token = store.issue("a@x.com", TokenPurpose::PasswordReset, None);

        assert!(store.redeem(&token, TokenPurpose::MagicLink).is_none());
        assert!(store.redeem(&token, TokenPurpose::PasswordReset).is_none());
    }

    #[test]
    fn test_expired_token() {
        let store = TokenStore::new(10);
        let token = store.issue_with_expiry(
            "a@x.com",
            TokenPurpose::MagicLink,
            None,
            Duration::from_secs(0),
        );

        thread::sleep(Duration::from_millis(10));
        assert!(store.redeem(&token, TokenPurpose::MagicLink).is_none());
    }

    #[test]
    fn test_cleanup_expired() {
        let store = TokenStore::new(10);
        store.issue_with_expiry("a@x.com", TokenPurpose::MagicLink, None, Duration::ZERO);
        store.issue_with_expiry("b@x.com", TokenPurpose::PasswordReset, None, Duration::ZERO);
        store.issue("c@x.com", TokenPurpose::MagicLink, None);

        thread::sleep(Duration::from_millis(10));

        assert_eq!(store.cleanup_expired(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_generate_token_format() {
        let token = generate_token();

        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
