use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use versolivro::auth::SessionState;
use versolivro::config::Config;
use versolivro::gateway::{self, AppState};

/// Book catalog API server and account administration.
#[derive(Parser)]
#[command(name = "versolivro")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Bind address (overrides [gateway] host)
        #[arg(long)]
        host: Option<String>,
        /// Port (overrides [gateway] port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Account administration
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account
    Add {
        username: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Show whether the account currently holds a token
    Status { username: String },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn prompt_password() -> Result<String> {
    dialoguer::Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("Failed to read password")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.validate()?;
            gateway::run_gateway(config).await
        }
        Commands::User { command } => {
            let state = AppState::open(&config)?;
            match command {
                UserCommands::Add { username, password } => {
                    let password = match password {
                        Some(p) => p,
                        None => prompt_password()?,
                    };
                    let user = state.auth.register(&username, &password)?;
                    println!("Created user {} (id {})", user.username, user.id);
                }
                UserCommands::Status { username } => match state.auth.session_state(&username)? {
                    Some(SessionState::Authenticated { .. }) => {
                        println!("{username}: authenticated");
                    }
                    Some(SessionState::Anonymous) => println!("{username}: anonymous"),
                    None => anyhow::bail!("No such user: {username}"),
                },
            }
            Ok(())
        }
    }
}
