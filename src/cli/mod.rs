//! CLI entry point for keel.

pub mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// keel session engine CLI
#[derive(Parser, Debug)]
#[command(name = "keel", version, about = "keel: scripted agent sessions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scripted conversation against the demo calculator server
    Replay(ReplayArgs),
    /// List the demo tools
    Tools,
}

/// Arguments for the `replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Script file: `{"calls": [[event, ...], ...]}`
    pub script: PathBuf,

    /// Session config file (TOML); defaults to the platform config dir
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Permission mode (default, acceptEdits, bypassPermissions, plan)
    #[arg(short = 'm', long)]
    pub permission_mode: Option<String>,

    /// Prompt to submit; repeat for a multi-turn conversation
    #[arg(short, long = "prompt")]
    pub prompts: Vec<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_replay_with_defaults() {
        let cli = Cli::try_parse_from(["keel", "replay", "session.json"]).unwrap();
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.script, PathBuf::from("session.json"));
                assert!(args.config.is_none());
                assert!(args.permission_mode.is_none());
                assert!(args.prompts.is_empty());
            }
            other => panic!("expected Replay, got {other:?}"),
        }
    }

    #[test]
    fn parse_replay_with_all_options() {
        let cli = Cli::try_parse_from([
            "keel",
            "replay",
            "session.json",
            "--config",
            "keel.toml",
            "-m",
            "plan",
            "-p",
            "What is 123 + 456?",
            "--prompt",
            "And times 2?",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.config, Some(PathBuf::from("keel.toml")));
                assert_eq!(args.permission_mode.as_deref(), Some("plan"));
                assert_eq!(args.prompts, vec!["What is 123 + 456?", "And times 2?"]);
            }
            other => panic!("expected Replay, got {other:?}"),
        }
    }

    #[test]
    fn parse_tools() {
        let cli = Cli::try_parse_from(["keel", "tools"]).unwrap();
        assert!(matches!(cli.command, Commands::Tools));
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["keel"]).is_err());
    }

    #[test]
    fn parse_replay_missing_script_is_error() {
        assert!(Cli::try_parse_from(["keel", "replay"]).is_err());
    }
}
