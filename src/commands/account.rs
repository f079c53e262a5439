//! Sign-in, registration and profile commands.

use axum::{extract::Query, response::Html, routing::get, Router};
use clap::Args;
use serde::Deserialize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

use super::render::Output;
use super::CommandResult;
use shoplist::auth::validate;
use shoplist::client::{ClientError, ClientState};
use shoplist::views::Notice;

const MAGIC_LINK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Args)]
pub struct LoginArgs {
    /// Email address (prompted when omitted)
    #[arg(long, short)]
    pub email: Option<String>,

    /// Sign in with an emailed link instead of a password
    #[arg(long)]
    pub magic_link: bool,
}

#[derive(Args)]
pub struct RegisterArgs {
    /// Email address (prompted when omitted)
    #[arg(long, short)]
    pub email: Option<String>,

    /// Display name
    #[arg(long, short)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Email address (prompted when omitted)
    #[arg(long, short)]
    pub email: Option<String>,
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

fn email_or_prompt(email: &Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    let email = match email {
        Some(email) => email.clone(),
        None => prompt("Email")?,
    };
    Ok(validate::email(&email)?)
}

pub async fn login(state: &mut ClientState, args: &LoginArgs) -> CommandResult {
    let email = email_or_prompt(&args.email)?;

    let (token, email) = if args.magic_link {
        magic_link_login(state, &email).await?
    } else {
        let password = prompt("Password")?;
        let session = state.api().login(&email, &password).await?;
        (session.token, session.email)
    };

    println!("Logged in as {}", email);
    state.set_session(token, email);
    state.save()?;
    Ok(())
}

/// Callback parameters from the verify redirect
#[derive(Deserialize)]
struct CallbackParams {
    token: String,
    email: String,
}

/// Requests a magic link that redirects to a local callback server and
/// waits for the browser to arrive there.
async fn magic_link_login(
    state: &ClientState,
    email: &str,
) -> Result<(String, String), Box<dyn std::error::Error>> {
    let (tx, rx) = oneshot::channel::<CallbackParams>();
    let tx = Arc::new(Mutex::new(Some(tx)));

    // Start local callback server
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let callback_url = format!("http://127.0.0.1:{}/callback", listener.local_addr()?.port());

    let server_handle = tokio::spawn(async move {
        let app = Router::new().route(
            "/callback",
            get(move |Query(params): Query<CallbackParams>| {
                let tx = tx.clone();
                async move {
                    if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                        let _ = tx.send(params);
                    }
                    Html(
                        r#"<!DOCTYPE html>
<html>
<head><title>Shoplist - Signed in</title></head>
<body>
<h1>You are signed in.</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#,
                    )
                }
            }),
        );
        if let Err(e) = axum::serve(listener, app).await {
            tracing::warn!("Callback server failed: {}", e);
        }
    });

    let notice = state
        .api()
        .request_magic_link(email, Some(callback_url))
        .await?;
    println!("{}", notice);
    println!("Waiting for you to open the link (timeout: 5 minutes)");

    let result = tokio::time::timeout(MAGIC_LINK_TIMEOUT, rx).await;
    server_handle.abort();

    match result {
        Ok(Ok(params)) => Ok((params.token, params.email)),
        Ok(Err(_)) | Err(_) => Err(ClientError::Timeout.into()),
    }
}

pub async fn register(state: &mut ClientState, args: &RegisterArgs) -> CommandResult {
    let email = email_or_prompt(&args.email)?;
    let password = prompt("Password")?;
    validate::password(&password)?;
    let confirm = prompt("Confirm password")?;
    validate::confirmation(&password, &confirm)?;

    let session = state
        .api()
        .sign_up(&email, &password, args.name.clone())
        .await?;

    println!("Account created. Logged in as {}", session.email);
    state.set_session(session.token, session.email);
    state.save()?;
    Ok(())
}

pub async fn reset_password(state: &ClientState, args: &ResetArgs) -> CommandResult {
    let email = email_or_prompt(&args.email)?;
    let notice = state.api().request_password_reset(&email).await?;
    println!("{}", notice);
    Ok(())
}

pub async fn logout(state: &mut ClientState) -> CommandResult {
    if !state.is_logged_in() {
        println!("Already logged out.");
        return Ok(());
    }

    // The local session goes even when the server no longer knows it
    if let Err(e) = state.api().logout().await {
        tracing::debug!("Server logout failed: {}", e);
    }
    state.clear_session()?;
    state.save()?;
    println!("Logged out.");
    Ok(())
}

pub async fn passwd(state: &ClientState) -> CommandResult {
    let new = prompt("New password")?;
    validate::password(&new)?;
    let confirm = prompt("Confirm password")?;
    validate::confirmation(&new, &confirm)?;

    let notice = state.api().change_password(&new, &confirm).await?;
    Output::new(state)?.notice(&notice).await?;
    Ok(())
}

pub async fn whoami(state: &ClientState) -> CommandResult {
    if !state.is_logged_in() {
        println!("Not logged in. Run 'shoplist login' to sign in.");
        return Ok(());
    }

    let me = state.api().me().await?;
    println!("Email:    {}", me.email);
    if let Some(name) = me.display_name {
        println!("Name:     {}", name);
    }
    println!("Server:   {}", state.server_url);
    println!("Language: {}", state.language);
    println!("Session:  expires {}", me.expires_at.format("%Y-%m-%d %H:%M"));
    Ok(())
}

pub async fn lang(state: &mut ClientState, code: &str) -> CommandResult {
    let code = validate::required("language", code)?.to_lowercase();
    state.language = code;
    state.save()?;

    let notice = Notice::success(format!("Language set to {}", state.language));
    Output::new(state)?.notice(&notice).await?;
    Ok(())
}
