//! Shoplist Admin CLI
//!
//! Administration tool working directly on the server database.
//!
//! # Usage
//!
//! ```bash
//! shoplist-admin user add erik@example.com --name Erik --admin
//! shoplist-admin user list
//! shoplist-admin user promote erik@example.com
//! shoplist-admin user remove erik@example.com
//! shoplist-admin stats
//! ```
//!
//! The database is located the same way the server locates it.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use shoplist::auth::{hash_password, validate};
use shoplist::config::ServerConfig;
use shoplist::db::Store;
use shoplist::models::User;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "shoplist-admin")]
#[command(version)]
#[command(about = "Shoplist server administration tool")]
struct Cli {
    /// Path to server config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User(UserCommand),
    /// Show user, list and item counts
    Stats,
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Add a new user
    Add {
        /// User's email address
        email: String,
        /// User's display name
        #[arg(long, short)]
        name: Option<String>,
        /// Initial password. Without one the user signs in by magic link.
        #[arg(long, short)]
        password: Option<String>,
        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },
    /// List all users
    List,
    /// Remove a user with their lists and sessions
    Remove {
        /// User's email address
        email: String,
    },
    /// Grant admin rights
    Promote {
        /// User's email address
        email: String,
        /// Revoke instead of grant
        #[arg(long)]
        revoke: bool,
    },
}

// ============================================================================
// Commands
// ============================================================================

async fn add_user(
    store: &Store,
    email: String,
    name: Option<String>,
    password: Option<String>,
    admin: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let email = validate::email(&email)?;
    if store.users.by_email(&email).await?.is_some() {
        return Err(format!("User '{}' already exists", email).into());
    }

    let hash = match &password {
        Some(password) => {
            validate::password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let mut user = User::new(&email).with_display_name(name.clone());
    user.is_admin = admin;
    let user = store.users.create(&user, hash.as_deref()).await?;

    println!("Added user: {}", user.email);
    if let Some(n) = name {
        println!("  Name: {}", n);
    }
    if admin {
        println!("  Admin: yes");
    }
    if password.is_none() {
        println!("  No password set, sign in with a magic link");
    }

    Ok(())
}

async fn list_users(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    let users = store.users.list().await?;

    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!("{:<40} {:<20} {:<6} {:<20}", "EMAIL", "NAME", "ADMIN", "CREATED");
    println!("{}", "-".repeat(90));

    for user in &users {
        println!(
            "{:<40} {:<20} {:<6} {:<20}",
            user.email,
            user.display_name.as_deref().unwrap_or(""),
            if user.is_admin { "yes" } else { "" },
            user.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("Total: {} user(s)", users.len());

    Ok(())
}

async fn remove_user(store: &Store, email: String) -> Result<(), Box<dyn std::error::Error>> {
    if !store.users.delete_by_email(&email).await? {
        return Err(format!("User '{}' not found", email).into());
    }

    println!("Removed user: {}", email);
    Ok(())
}

async fn promote_user(
    store: &Store,
    email: String,
    revoke: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !store.users.set_admin(&email, !revoke).await? {
        return Err(format!("User '{}' not found", email).into());
    }

    if revoke {
        println!("Revoked admin rights: {}", email);
    } else {
        println!("Granted admin rights: {}", email);
    }
    Ok(())
}

async fn stats(store: &Store) -> Result<(), Box<dyn std::error::Error>> {
    println!("Users: {}", store.users.count().await?);
    println!("Lists: {}", store.lists.count().await?);
    println!("Items: {}", store.items.count().await?);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config)?;
    let store = Store::open(&config.database_path.value).await?;

    match cli.command {
        Commands::User(user_cmd) => match user_cmd.command {
            UserSubcommand::Add {
                email,
                name,
                password,
                admin,
            } => add_user(&store, email, name, password, admin).await,
            UserSubcommand::List => list_users(&store).await,
            UserSubcommand::Remove { email } => remove_user(&store, email).await,
            UserSubcommand::Promote { email, revoke } => {
                promote_user(&store, email, revoke).await
            }
        },
        Commands::Stats => stats(&store).await,
    }
}
