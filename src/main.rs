//! playsession - session keeper for the game backend
//!
//! Logs in, keeps the bearer token on disk between runs, and auto-loads
//! per-domain data once a session exists.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playsession::app::AppContext;
use playsession::auth::StoreKind;
use playsession::config::AppDirs;

#[derive(Parser)]
#[command(name = "playsession")]
#[command(about = "Session keeper for the game backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep config and session data under this directory instead of the
    /// platform defaults
    #[arg(long, global = true)]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        /// Account email (defaults to the remembered one)
        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        password: String,
    },

    /// Create an account and log in
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        #[arg(short, long)]
        username: String,
    },

    /// Log out and clear the stored token
    Logout,

    /// Show current session status
    Status,

    /// Ask the backend whether the stored token is still valid
    Verify,

    /// Move the stored token to another storage backend
    Store {
        #[arg(value_enum)]
        kind: StoreKind,
    },

    /// Forget the remembered email
    ForgetEmail,

    /// Keep the configured collections loaded until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let dirs = match cli.home {
        Some(root) => AppDirs::under(root),
        None => AppDirs::platform()?,
    };
    let mut ctx = AppContext::load(dirs)?;

    match cli.command {
        Commands::Login { email, password } => {
            let email = email
                .or_else(|| ctx.auth.remembered_email())
                .context("No email given and none remembered. Use --email.")?;
            if ctx.auth.login(&email, &password).await.is_none() {
                bail!("Login failed, check your credentials.");
            }
            println!("Logged in as {}.", email);
        }
        Commands::Register {
            email,
            password,
            username,
        } => {
            if ctx.auth.register(&email, &password, &username).await.is_none() {
                bail!("Registration failed.");
            }
            println!("Registered and logged in as {}.", email);
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            ctx.auth.logout().await;
            println!("Logged out.");
        }
        Commands::Status => {
            status(&ctx);
        }
        Commands::Verify => {
            if ctx.auth.verify().await {
                println!("Token is valid.");
            } else {
                println!("No valid token. Run 'playsession login'.");
            }
        }
        Commands::Store { kind } => {
            let carried = ctx.switch_store(kind)?;
            if carried {
                println!("Token moved to {} store.", kind);
            } else {
                println!("Using {} store.", kind);
            }
        }
        Commands::ForgetEmail => {
            ctx.auth.forget_email();
            println!("Remembered email cleared.");
        }
        Commands::Watch => {
            watch(&ctx).await?;
        }
    }

    Ok(())
}

/// Display current session status
fn status(ctx: &AppContext) {
    let valid = ctx.session.has_valid_token();
    let diag = ctx.session.diagnostics();

    println!("Token:       {}", if valid { "valid" } else { "none" });
    if let Some(preview) = &diag.token_preview {
        println!("  preview:   {}", preview);
    }
    if let Some(exp) = diag.expires_at {
        println!("  expires_at: {}", exp);
    }
    if let Some(left) = diag.seconds_remaining {
        println!("  remaining: {}s", left);
    }
    println!("Store:       {} ({:?})", diag.store, diag.persistence);
    println!("Backend:     {}", ctx.api.base_url());
    println!(
        "Email:       {}",
        ctx.auth.remembered_email().as_deref().unwrap_or("(none)")
    );

    if !valid {
        println!("\nRun 'playsession login' to authenticate.");
    }
}

async fn watch(ctx: &AppContext) -> Result<()> {
    let mut loaders = ctx.collection_loaders();
    if loaders.is_empty() {
        bail!("No collections configured in {}", ctx.dirs.config_path().display());
    }
    for loader in &mut loaders {
        loader.start();
    }

    println!("Watching {} collections. (Ctrl-C to stop)", loaders.len());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    println!("Shutting down...");

    for loader in &mut loaders {
        loader.shutdown().await;
        println!("{:<12} {:?}, {} items", loader.name(), loader.phase(), loader.items().len());
    }
    Ok(())
}
