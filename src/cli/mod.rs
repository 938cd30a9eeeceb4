//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "jurix",
    version,
    author = "neur0map",
    about = "Hybrid retrieval and context compression over a legal corpus",
    long_about = "Jurix indexes article-sized passages of a legal corpus, retrieves the most relevant \
                  ones for a question with combined BM25 and embedding search, and assembles a \
                  token-bounded context block for a downstream language model."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/jurix/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config (e.g., "precise", "fast")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import chunk records and write a new index snapshot
    Rebuild {
        /// JSONL file with one chunk record per line
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Keep only this many snapshots afterwards
        #[arg(long, value_name = "N")]
        keep: Option<usize>,
    },

    /// Retrieve a compressed context for a question
    Query {
        /// Question text
        query: String,

        /// Token budget (defaults to compression.budget)
        #[arg(short, long)]
        budget: Option<usize>,

        /// Skip the embedding model and use lexical scores only
        #[arg(long)]
        lexical_only: bool,

        /// Show the result in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the active snapshot
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::parse_from(["jurix", "query", "límite de velocidad", "--budget", "500", "--json"]);
        match cli.command {
            Commands::Query {
                query,
                budget,
                lexical_only,
                json,
            } => {
                assert_eq!(query, "límite de velocidad");
                assert_eq!(budget, Some(500));
                assert!(!lexical_only);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["jurix", "stats", "--verbose", "--profile", "fast"]);
        assert!(cli.verbose);
        assert_eq!(cli.profile.as_deref(), Some("fast"));
    }
}
