pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::ContentType;

/// Environment variable holding the portal password.
pub const PASSWORD_ENV: &str = "SATCHEL_PASSWORD";

#[derive(Parser)]
#[command(name = "satchel")]
#[command(about = "Keeps a local copy of your course portal", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/satchel/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Portal login name, if different from the user id
    #[arg(long, global = true)]
    pub username: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in to the portal and check the session
    Login {
        #[arg(short, long)]
        user: String,
    },
    /// Synchronize one course or all of them
    Sync {
        #[arg(short, long)]
        user: String,

        /// Course id (default: every course on the portal)
        #[arg(long)]
        course: Option<String>,

        /// Re-fetch and overwrite items that are already stored
        #[arg(long)]
        refresh: bool,
    },
    /// List the user's courses as the portal shows them
    Courses {
        #[arg(short, long)]
        user: String,
    },
    /// List stored items of a course
    Items {
        #[arg(long)]
        course: String,

        /// Only this content type (notice, material, assignment, syllabus)
        #[arg(short = 't', long = "type")]
        content_type: Option<ContentType>,
    },
    /// Sync every interval until interrupted
    Watch {
        #[arg(short, long)]
        user: String,

        /// Sync interval (e.g., "1h", "30m", "6h", "1d")
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// Skip the sync on start
        #[arg(long)]
        no_initial_sync: bool,
    },
}

impl Commands {
    /// The user whose credentials the command needs, if any.
    pub fn user(&self) -> Option<&str> {
        match self {
            Commands::Login { user }
            | Commands::Sync { user, .. }
            | Commands::Courses { user }
            | Commands::Watch { user, .. } => Some(user),
            Commands::Items { .. } => None,
        }
    }
}
