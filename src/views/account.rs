//! Sign-in, registration and profile forms.

use serde::Deserialize;

use super::{Notice, ViewError};
use crate::auth::{validate, Identity, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Login,
    Register,
    Reset,
    MagicLink,
}

/// The sign-in dialog.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthForm {
    pub mode: AuthMode,
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    SignedIn(Session),
    /// A link went out by mail. Nothing else happens until it is used.
    LinkSent(Notice),
}

impl AuthForm {
    pub fn new(mode: AuthMode, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mode,
            email: email.into(),
            password: password.into(),
            display_name: None,
        }
    }

    /// Field checks that need no I/O.
    pub fn validate(&self) -> Result<(), ViewError> {
        validate::email(&self.email)?;
        match self.mode {
            AuthMode::Login => {
                validate::required("password", &self.password)?;
            }
            AuthMode::Register => validate::password(&self.password)?,
            AuthMode::Reset | AuthMode::MagicLink => {}
        }
        Ok(())
    }

    pub async fn submit(&self, identity: &Identity) -> Result<AuthOutcome, ViewError> {
        self.validate()?;

        let outcome = match self.mode {
            AuthMode::Login => AuthOutcome::SignedIn(
                identity
                    .sign_in_with_password(&self.email, &self.password)
                    .await?,
            ),
            AuthMode::Register => AuthOutcome::SignedIn(
                identity
                    .sign_up(&self.email, &self.password, self.display_name.as_deref())
                    .await?,
            ),
            AuthMode::Reset => {
                identity.send_password_reset(&self.email).await?;
                AuthOutcome::LinkSent(Notice::info(
                    "If the account exists, a reset link is on its way",
                ))
            }
            AuthMode::MagicLink => {
                identity.send_magic_link(&self.email, None).await?;
                AuthOutcome::LinkSent(Notice::info("Check your email for a sign-in link"))
            }
        };
        Ok(outcome)
    }
}

/// The profile page's change-password form.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChangeForm {
    pub new_password: String,
    pub confirm: String,
}

impl PasswordChangeForm {
    pub fn validate(&self) -> Result<(), ViewError> {
        validate::password(&self.new_password)?;
        validate::confirmation(&self.new_password, &self.confirm)?;
        Ok(())
    }

    pub async fn submit(
        &self,
        identity: &Identity,
        session: &Session,
    ) -> Result<Notice, ViewError> {
        self.validate()?;
        identity
            .update_password(session, &self.new_password)
            .await?;
        Ok(Notice::success("Password changed"))
    }
}

pub async fn sign_out(identity: &Identity, session: &Session) -> Result<Notice, ViewError> {
    identity.sign_out(&session.token).await?;
    Ok(Notice::info("Signed out"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::views::test_support::setup_app;

    #[tokio::test]
    async fn test_register_then_login() {
        let app = setup_app().await;
        let identity = &app.ctx.identity;

        let registered = AuthForm::new(AuthMode::Register, "a@x.com", "secret1")
            .submit(identity)
            .await
            .unwrap();
        assert!(matches!(registered, AuthOutcome::SignedIn(_)));

        let login = AuthForm::new(AuthMode::Login, "a@x.com", "secret1")
            .submit(identity)
            .await
            .unwrap();
        match login {
            AuthOutcome::SignedIn(session) => assert_eq!(session.email, "a@x.com"),
            other => panic!("expected session, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_per_mode() {
        assert!(AuthForm::new(AuthMode::Login, "a@x.com", "").validate().is_err());
        assert!(AuthForm::new(AuthMode::Login, "a@x.com", "x").validate().is_ok());
        assert!(AuthForm::new(AuthMode::Register, "a@x.com", "12345")
            .validate()
            .is_err());
        assert!(AuthForm::new(AuthMode::Reset, "a@x.com", "").validate().is_ok());
        assert!(AuthForm::new(AuthMode::MagicLink, "bad", "").validate().is_err());
    }

    #[tokio::test]
    async fn test_reset_does_not_reveal_accounts() {
        let app = setup_app().await;

        let outcome = AuthForm::new(AuthMode::Reset, "nobody@x.com", "")
            .submit(&app.ctx.identity)
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::LinkSent(_)));
    }

    #[tokio::test]
    async fn test_password_change_form() {
        let app = setup_app().await;
        let session = app.sign_up("a@x.com").await;

        let mismatch = PasswordChangeForm {
            new_password: "newsecret".into(),
            confirm: "other".into(),
        };
        assert!(matches!(
            mismatch.submit(&app.ctx.identity, &session).await,
            Err(ViewError::Auth(AuthError::PasswordMismatch))
        ));

        let form = PasswordChangeForm {
            new_password: "newsecret".into(),
            confirm: "newsecret".into(),
        };
        form.submit(&app.ctx.identity, &session).await.unwrap();

        sign_out(&app.ctx.identity, &session).await.unwrap();
        assert!(app
            .ctx
            .identity
            .sign_in_with_password("a@x.com", "newsecret")
            .await
            .is_ok());
    }
}
