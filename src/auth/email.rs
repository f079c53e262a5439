//! Outgoing mail: magic links, password resets and list invitations.

use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::models::Role;

/// SMTP settings.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Optional for local relays.
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to build email: {0}")]
    Message(String),
    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// A message ready to hand to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone)]
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub async fn send_magic_link(&self, to: &str, link: &str) -> Result<(), EmailError> {
        self.send(magic_link_message(to, link)).await
    }

    pub async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), EmailError> {
        self.send(password_reset_message(to, link)).await
    }

    pub async fn send_invitation(
        &self,
        to: &str,
        inviter: &str,
        list_name: &str,
        role: Role,
        link: &str,
    ) -> Result<(), EmailError> {
        self.send(invitation_message(to, inviter, list_name, role, link))
            .await
    }

    async fn send(&self, outgoing: Outgoing) -> Result<(), EmailError> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);

        let email = Message::builder()
            .from(from.parse().map_err(|e| EmailError::Message(format!("{}", e)))?)
            .to(outgoing
                .to
                .parse()
                .map_err(|e| EmailError::Message(format!("{}", e)))?)
            .subject(outgoing.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(outgoing.body)
            .map_err(|e| EmailError::Message(e.to_string()))?;

        let transport = self.build_transport()?;
        transport
            .send(email)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        tracing::info!(to = %outgoing.to, "email sent");
        Ok(())
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let mut builder = if self.config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
                .map_err(|e| EmailError::Transport(e.to_string()))?
                .port(465)
        } else {
            // STARTTLS, or plain for a local relay
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| EmailError::Transport(e.to_string()))?
                .port(self.config.smtp_port)
        };

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("smtp_host", &self.config.smtp_host)
            .field("smtp_port", &self.config.smtp_port)
            .field("from_email", &self.config.from_email)
            .finish()
    }
}

fn magic_link_message(to: &str, link: &str) -> Outgoing {
    Outgoing {
        to: to.to_string(),
        subject: "Sign in to Shoplist".to_string(),
        body: format!(
            "Hi,\n\nClick the link below to sign in to Shoplist:\n\n{link}\n\n\
             This link expires in 10 minutes.\n\n\
             If you didn't request this, you can ignore this email.\n"
        ),
    }
}

fn password_reset_message(to: &str, link: &str) -> Outgoing {
    Outgoing {
        to: to.to_string(),
        subject: "Reset your Shoplist password".to_string(),
        body: format!(
            "Hi,\n\nSomeone asked to reset the password for this account. \
             Open the link below to choose a new one:\n\n{link}\n\n\
             This link expires in 60 minutes.\n"
        ),
    }
}

fn invitation_message(to: &str, inviter: &str, list_name: &str, role: Role, link: &str) -> Outgoing {
    Outgoing {
        to: to.to_string(),
        subject: format!("{} shared \"{}\" with you", inviter, list_name),
        body: format!(
            "Hi,\n\n{inviter} invited you to the shopping list \"{list_name}\" as {role}.\n\n\
             Open the link below to join:\n\n{link}\n"
        ),
    }
}
