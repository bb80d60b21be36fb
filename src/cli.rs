// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "agento",
    about = "Local orchestration service for Claude Code agents",
    version
)]
pub struct Cli {
    /// Increase stderr log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory for the SQLite database and service state.
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// HTTP listen port.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP service (the default when no command is given).
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_command() {
        let cli = Cli::parse_from(["agento"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parses_serve_with_overrides() {
        let cli = Cli::parse_from(["agento", "--port", "9999", "--data-dir", "/tmp/x", "serve"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.port, Some(9999));
        assert_eq!(cli.data_dir.as_deref(), Some(std::path::Path::new("/tmp/x")));
    }

    #[test]
    fn parses_migrate() {
        let cli = Cli::parse_from(["agento", "migrate"]);
        assert!(matches!(cli.command, Some(Commands::Migrate)));
    }
}
