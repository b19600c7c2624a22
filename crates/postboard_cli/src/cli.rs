use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "postboard")]
#[command(version)]
#[command(about = "Post and browse short articles on a Supabase project")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log verbosity (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "POSTBOARD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory for rolling log files
    #[arg(long, global = true, env = "POSTBOARD_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// File that keeps the signed-in session between runs
    #[arg(long, global = true, env = "POSTBOARD_SESSION_FILE", value_name = "FILE")]
    pub session_file: Option<PathBuf>,

    /// Keep article rows in this SQLite file instead of the hosted database
    #[arg(long, global = true, env = "POSTBOARD_LOCAL_DB", value_name = "FILE")]
    pub local_db: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long, env = "POSTBOARD_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Creates an account
    Signup(CredentialArgs),
    /// Signs in with email and password
    Login(CredentialArgs),
    /// Ends the current session
    Logout,
    /// Shows the signed-in user
    Whoami,
    /// Lists all articles, newest first
    List,
    /// Publishes a new article
    Post {
        content: String,
        /// Image file to attach
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
    },
    /// Replaces the text of one of your articles
    Edit {
        #[arg(value_name = "ARTICLE_ID")]
        id: Uuid,
        content: String,
    },
    /// Deletes one of your articles and its image
    Delete {
        #[arg(value_name = "ARTICLE_ID")]
        id: Uuid,
    },
    /// Checks whether a screen path may be opened right now
    Open {
        #[arg(value_name = "PATH")]
        path: String,
    },
}
