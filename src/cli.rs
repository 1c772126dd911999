use clap::{Parser, Subcommand};

use crate::types::*;

#[derive(Parser, Debug)]
#[command(
    name = "lastperson-rs",
    about = "Read, write and delete the last person in a CloudKit private database"
)]
pub struct Cli {
    /// CloudKit container identifier (e.g. iCloud.com.example.app)
    #[arg(long, env = "CLOUDKIT_CONTAINER")]
    pub container: String,

    /// CloudKit environment
    #[arg(long, value_enum, default_value = "development")]
    pub environment: Environment,

    /// CloudKit Web Services API token.
    /// Prefer the CLOUDKIT_API_TOKEN environment variable over the flag.
    #[arg(long, env = "CLOUDKIT_API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    /// Web auth token of the signed-in iCloud user (required for the private database)
    #[arg(long, env = "CLOUDKIT_WEB_AUTH_TOKEN", hide_env_values = true)]
    pub web_auth_token: Option<String>,

    /// CloudKit Web Services root URL
    #[arg(long, default_value = "https://api.apple-cloudkit.com")]
    pub api_root: String,

    /// Use the test record instead of the production one
    #[arg(long)]
    pub testing: bool,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch and print the last person
    Show,
    /// Save a new last person, overwriting the stored one
    Save {
        /// Name to store (may be empty)
        name: String,
    },
    /// Re-fetch the last person
    Refresh,
    /// Delete the last person record
    Delete,
    /// Check that the container and account are usable
    Check,
    /// Write, read back and delete a random name on the test record
    Probe,
    /// Refresh periodically and print changes until interrupted
    Watch {
        /// Seconds between refreshes
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}
