use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "practice")]
#[command(about = "Practice platform API client")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Log filter used when RUST_LOG is not set
    pub fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Show whether a session is stored
    Status,

    /// Sign in
    Login { email: String, password: String },

    /// Create an account and sign in
    Register {
        username: String,
        email: String,
        password: String,
    },

    /// End the session
    Logout,

    /// GET an API path and print the JSON body
    Get { path: String },

    /// POST a JSON body to an API path
    Post {
        path: String,
        /// Request body as JSON
        json: String,
    },
}
