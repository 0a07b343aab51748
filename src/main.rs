use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use satchel::app::AppContext;
use satchel::cli::{commands, Cli, Commands, PASSWORD_ENV};
use satchel::config::Config;
use satchel::credentials::{Credentials, StaticCredentials};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let mut credentials = StaticCredentials::new();
    if let Some(user) = cli.command.user() {
        let password = std::env::var(PASSWORD_ENV)
            .with_context(|| format!("{} must hold the portal password", PASSWORD_ENV))?;
        let username = cli.username.clone().unwrap_or_else(|| user.to_string());
        credentials.insert(user, Credentials::new(username, password));
    }
    let credentials = Arc::new(credentials);
    let ctx = Arc::new(AppContext::new(config, credentials.clone())?);

    match cli.command {
        Commands::Login { user } => {
            commands::login(&ctx, credentials.as_ref(), &user).await?;
        }
        Commands::Sync {
            user,
            course,
            refresh,
        } => {
            commands::sync(&ctx, &user, course.as_deref(), refresh).await?;
        }
        Commands::Courses { user } => {
            commands::list_courses(&ctx, credentials.as_ref(), &user).await?;
        }
        Commands::Items {
            course,
            content_type,
        } => {
            commands::list_items(&ctx, &course, content_type)?;
        }
        Commands::Watch {
            user,
            interval,
            no_initial_sync,
        } => {
            commands::watch(ctx.clone(), &user, &interval, no_initial_sync).await?;
        }
    }

    Ok(())
}
