use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{account, lists, sharing, watch, LoginArgs, RegisterArgs, ResetArgs};
use shoplist::client::ClientState;
use shoplist::models::Role;

#[derive(Parser)]
#[command(name = "shoplist")]
#[command(version)]
#[command(about = "Shared shopping lists from the terminal", long_about = None)]
struct Cli {
    /// Directory holding the client state (default: ~/.config/shoplist)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Server URL, saved for later runs
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a password or an emailed link
    Login(LoginArgs),

    /// Create an account
    Register(RegisterArgs),

    /// Email a password reset link
    ResetPassword(ResetArgs),

    /// Sign out of this machine
    Logout,

    /// Change your password
    Passwd,

    /// Show the signed-in account
    Whoami,

    /// Set the display language (e.g. "cs", "de"; "en" turns translation off)
    Lang {
        code: String,
    },

    /// Show your lists
    Lists,

    /// Create a list
    Create {
        name: String,
    },

    /// Show a list
    Show {
        /// List ID, number from `lists`, or name
        list: String,
    },

    /// Add an item
    Add {
        list: String,
        name: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Check or uncheck an item
    Check {
        list: String,
        /// Item ID, number from `show`, or name
        item: String,
    },

    /// Rename an item or change its note
    Edit {
        list: String,
        item: String,

        #[arg(long)]
        name: Option<String>,

        /// New note ("" clears it)
        #[arg(long)]
        note: Option<String>,
    },

    /// Remove an item
    Remove {
        list: String,
        item: String,
    },

    /// Set the list note ("" clears it)
    Note {
        list: String,
        text: String,
    },

    /// Print the list's share link
    Share {
        list: String,
    },

    /// Invite someone by email
    Invite {
        list: String,
        email: String,

        #[arg(long, short, default_value = "viewer")]
        role: Role,
    },

    /// Change the role of a share
    Role {
        list: String,
        /// Share number from `show`, its ID, or the member's email
        share: String,
        role: Role,
    },

    /// Revoke a share
    Unshare {
        list: String,
        share: String,
    },

    /// Join a list from a share link or token
    Accept {
        link: String,

        /// Only show what the link grants
        #[arg(long)]
        preview: bool,
    },

    /// Follow changes live (all lists, or one list)
    Watch {
        list: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoplist=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut state = ClientState::load(cli.state_dir)?;
    if let Some(server) = cli.server {
        state.server_url = server;
        state.save()?;
    }

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    match command {
        Commands::Login(args) => account::login(&mut state, &args).await,
        Commands::Register(args) => account::register(&mut state, &args).await,
        Commands::ResetPassword(args) => account::reset_password(&state, &args).await,
        Commands::Logout => account::logout(&mut state).await,
        Commands::Passwd => account::passwd(&state).await,
        Commands::Whoami => account::whoami(&state).await,
        Commands::Lang { code } => account::lang(&mut state, &code).await,
        Commands::Lists => lists::overview(&state).await,
        Commands::Create { name } => lists::create(&state, &name).await,
        Commands::Show { list } => lists::show(&state, &list).await,
        Commands::Add { list, name, note } => lists::add(&state, &list, &name, note).await,
        Commands::Check { list, item } => lists::check(&state, &list, &item).await,
        Commands::Edit {
            list,
            item,
            name,
            note,
        } => lists::edit(&state, &list, &item, name, note).await,
        Commands::Remove { list, item } => lists::remove(&state, &list, &item).await,
        Commands::Note { list, text } => lists::note(&state, &list, &text).await,
        Commands::Share { list } => sharing::share(&state, &list).await,
        Commands::Invite { list, email, role } => {
            sharing::invite(&state, &list, &email, role).await
        }
        Commands::Role { list, share, role } => {
            sharing::change_role(&state, &list, &share, role).await
        }
        Commands::Unshare { list, share } => sharing::unshare(&state, &list, &share).await,
        Commands::Accept { link, preview } => sharing::accept(&state, &link, preview).await,
        Commands::Watch { list } => watch::watch(&state, list.as_deref()).await,
    }
}
