//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use clap::{Parser, Subcommand, ValueEnum};

use jarvis_sync::application::OutputFormat;
use jarvis_sync::domain::RecorderMode;

/// Jarvis Sync - inspect and drive the Jarvis engine and cloud backends.
#[derive(Parser, Debug)]
#[command(name = "jarvis-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format: table or json.
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check both backends once.
    Status,

    /// Watch backend reachability until interrupted.
    Monitor {
        /// Seconds between checks (defaults to the configured interval).
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Sign in to the cloud backend.
    Login {
        /// Email or user name.
        identifier: String,

        /// Password (read from JARVIS_PASSWORD when omitted).
        #[arg(short, long, env = "JARVIS_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the refresh token.
        #[arg(long)]
        remember: bool,
    },

    /// Sign out and forget stored credentials.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// List workflows.
    Workflows,

    /// List recent runs, or start one.
    Runs {
        /// Execute this workflow id instead of listing.
        #[arg(long)]
        start: Option<String>,
    },

    /// Print run updates from the engine as they happen.
    WatchRuns,

    /// Record user actions until Enter is pressed.
    Record {
        #[arg(short, long, value_enum, default_value = "auto")]
        mode: ModeArg,
    },

    /// List assistant tasks.
    Tasks,

    /// Ask the assistant to plan a request.
    Plan {
        /// What the assistant should do.
        query: String,
    },

    /// List registered tools.
    Tools,

    /// List voice calls.
    Calls,

    /// List configured agents.
    Agents,

    /// Show host metrics reported by the engine.
    System {
        /// Also list installed software.
        #[arg(long)]
        scan: bool,
    },

    /// List knowledge bases, or search them.
    Knowledge {
        /// Search query.
        #[arg(short, long)]
        query: Option<String>,

        /// Restrict the search to these base ids.
        #[arg(short, long)]
        base: Vec<String>,
    },

    /// Send a chat message and stream the reply.
    Chat {
        /// Conversation id.
        conversation: String,

        /// Message text.
        message: String,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default config file if none exists.
    Init,
    /// Print the effective configuration.
    Show,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ModeArg {
    Auto,
    Manual,
}

impl From<ModeArg> for RecorderMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => Self::Auto,
            ModeArg::Manual => Self::Manual,
        }
    }
}

impl Cli {
    /// Parse the output format argument.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        self.format.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_knowledge_search() {
        let cli = Cli::parse_from([
            "jarvis-sync", "knowledge", "-q", "invoices", "-b", "kb1", "-b", "kb2", "-f", "json",
        ]);
        assert_eq!(cli.output_format(), Ok(OutputFormat::Json));
        match cli.command {
            Commands::Knowledge { query, base } => {
                assert_eq!(query.as_deref(), Some("invoices"));
                assert_eq!(base, vec!["kb1", "kb2"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::parse_from(["jarvis-sync", "-vv", "config", "init"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Config { action: ConfigAction::Init }
        ));
    }
}
