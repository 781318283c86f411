//! Command-line definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Feedsync - mirror inspection platform feeds into SQL, CSV and report files
#[derive(Parser, Debug)]
#[command(name = "feedsync")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (YAML)
    #[arg(short, long, env = "FEEDSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Comma-separated feeds to run; overrides `export.tables`
    #[arg(long, value_delimiter = ',', global = true)]
    pub tables: Vec<String>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Export the selected feeds into the configured database
    Sql,

    /// Export the selected feeds into CSV files under the export path
    Csv,

    /// Download PDF and Word reports for synced inspections
    Reports,

    /// List every available feed
    Feeds,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_tables_are_comma_separated() {
        let cli = Cli::try_parse_from(["feedsync", "sql", "--tables", "users,sites"]).unwrap();
        assert_eq!(cli.command, Commands::Sql);
        assert_eq!(cli.tables, vec!["users", "sites"]);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["feedsync", "csv", "-v", "--config", "prod.yaml"]).unwrap();
        assert_eq!(cli.command, Commands::Csv);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("prod.yaml")));
        assert!(cli.tables.is_empty());
    }
}
