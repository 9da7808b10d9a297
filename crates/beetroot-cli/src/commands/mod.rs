//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use beetroot_core::config::Config;

/// Load configuration from `path`, or from the default location.
///
/// A missing file yields defaults; a broken one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map_or_else(Config::config_path, Path::to_path_buf);
    Config::load_from(&path).with_context(|| format!("loading {}", path.display()))
}

/// Where `config` subcommands read and write.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map_or_else(Config::config_path, Path::to_path_buf)
}

pub mod completions;
pub mod config;
pub mod session;

/// Beetroot - peer-to-peer file transfer with copy/paste signaling
#[derive(Parser)]
#[command(name = "beetroot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Use this configuration file instead of the default
    #[arg(long, global = true, env = "BEETROOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Detailed logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Start an interactive transfer session
    Session(SessionArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the session command
#[derive(Parser)]
pub struct SessionArgs {
    /// Output directory for received files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Device name placed in offers and answers
    #[arg(long)]
    pub name: Option<String>,

    /// Address the initiator listens on (e.g. 0.0.0.0:7400)
    #[arg(long)]
    pub bind: Option<String>,

    /// Show a notification when a file arrives
    #[arg(long)]
    pub notify: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Value to set
        value: String,
    },

    /// Show all configuration
    Show,

    /// List all available configuration keys
    List,

    /// Show the configuration file path
    Path,

    /// Reset to defaults
    Reset,
}

/// Arguments for the completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Completions subcommand
    #[command(subcommand)]
    pub action: CompletionsAction,
}

/// Completions subcommands
#[derive(Subcommand, Clone, Copy)]
pub enum CompletionsAction {
    /// Install shell completions (auto-detects shell)
    Install {
        /// Override shell detection
        #[arg(long, value_enum)]
        shell: Option<ShellType>,
    },

    /// Generate completions and print to stdout (for manual installation)
    Generate {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: ShellType,
    },
}

/// Supported shell types for completions
#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell
    Elvish,
}
