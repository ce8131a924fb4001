//! Shop Next Door CLI - database migrations and user management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations (schema and session table)
//! snd-cli migrate
//!
//! # Create the first admin
//! snd-cli user create -e admin@example.com -n "Admin Name" -r admin
//!
//! # Turn a customer into a vendor
//! snd-cli user promote -e mama@example.com -r vendor
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "snd-cli")]
#[command(author, version, about = "Shop Next Door CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user of any role
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`customer`, `vendor`, `admin`)
        #[arg(short, long, default_value = "customer")]
        role: String,

        /// Password; a random one is generated and printed when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Change an existing user's role
    Promote {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// New role (`customer`, `vendor`, `admin`)
        #[arg(short, long)]
        role: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                role,
                password,
            } => {
                commands::user::create(&email, &name, &role, password).await?;
            }
            UserAction::Promote { email, role } => {
                commands::user::promote(&email, &role).await?;
            }
        },
    }
    Ok(())
}
