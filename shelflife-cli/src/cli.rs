//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "shelflife",
    version,
    about = "Product lookup and expiry-date calculator",
    long_about = "Look up products by code or name and compute expiry dates.\n\n\
                  The product dataset is fetched from the configured endpoint, \
                  cached locally and revalidated with ETags."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the TOML config file (falls back to SHELFLIFE_CONFIG).
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Never touch the network; serve the cache or sample data.
    #[arg(long, global = true)]
    pub offline: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Print the product with this code.
    Lookup {
        #[arg(value_name = "CODE")]
        code: String,
    },

    /// Search products by code or name (at least two characters).
    Search {
        #[arg(value_name = "TERM")]
        term: String,
    },

    /// Compute the expiry date of a product.
    Expiry {
        #[arg(value_name = "CODE")]
        code: String,

        /// Production date, YYYY-MM-DD.
        #[arg(long, value_name = "DATE")]
        produced: String,
    },

    /// Drop the cache and fetch the dataset again.
    Refresh,

    /// Delete the cached dataset.
    ClearCache,

    /// Load the dataset and keep it in sync until interrupted.
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_expiry_with_global_flags() {
        let cli = Cli::try_parse_from([
            "shelflife",
            "expiry",
            "000001",
            "--produced",
            "2024-01-01",
            "--offline",
            "--config",
            "shelflife.toml",
        ])
        .expect("arguments should parse");

        assert!(cli.offline);
        assert_eq!(cli.config, Some(PathBuf::from("shelflife.toml")));
        assert_eq!(
            cli.command,
            Command::Expiry {
                code: "000001".to_string(),
                produced: "2024-01-01".to_string(),
            }
        );
    }

    #[test]
    fn test_expiry_requires_production_date() {
        assert!(Cli::try_parse_from(["shelflife", "expiry", "000001"]).is_err());
    }

    #[test]
    fn test_kebab_case_subcommand() {
        let cli = Cli::try_parse_from(["shelflife", "clear-cache"]).expect("should parse");
        assert_eq!(cli.command, Command::ClearCache);
    }
}
