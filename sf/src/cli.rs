//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// StoryForge - requirements to user stories and tasks
#[derive(Parser)]
#[command(
    name = "sf",
    about = "Turn project requirements into validated user stories and tasks",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/storyforge/logs/storyforge.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, global = true, help = "Log level (overrides config)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Generate stories and tasks from requirements
    Generate {
        /// Requirements text
        #[arg(short, long)]
        text: Option<String>,

        /// File holding the primary requirements text
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Supporting document (plain text), repeatable
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,

        /// Project context entry as key=value, repeatable
        #[arg(long = "context", value_parser = parse_key_value)]
        context: Vec<(String, String)>,

        /// Generation attempts before accepting or escalating
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Also write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Review a pull request against its backlog task
    Review {
        /// Webhook payload (JSON) of the pull_request event
        #[arg(short, long)]
        event: PathBuf,

        /// Stored project JSON written by the json storage backend
        #[arg(short, long)]
        backlog: PathBuf,

        /// Unified diff of the pull request
        #[arg(short, long)]
        diff: PathBuf,
    },

    /// Print the task id referenced by a PR title or branch
    TaskId {
        /// Pull-request title
        title: String,

        /// Branch name
        #[arg(short, long, default_value = "")]
        branch: String,
    },

    /// Show the effective configuration
    Config,
}

/// Output format for the generate command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Parse `key=value`; the value may itself contain `=`
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("storyforge")
        .join("logs")
        .join("storyforge.log")
}
