//! CLI argument definitions using clap
//!
//! Commands:
//! - tessera explain --config <path> --plan <plan.json>
//! - tessera index-info --index <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tessera - distributed query planning and two-level index tooling
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan and optimize a logical plan, then print its execution blocks
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./tessera.json")]
        config: PathBuf,

        /// Logical plan encoded as JSON
        #[arg(long)]
        plan: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the header of a two-level index file
    IndexInfo {
        #[arg(long)]
        index: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explain() {
        let cli = Cli::try_parse_from([
            "tessera", "explain", "--config", "c.json", "--plan", "p.json", "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Explain { config, plan, json } => {
                assert_eq!(config, PathBuf::from("c.json"));
                assert_eq!(plan, PathBuf::from("p.json"));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_index_info_requires_path() {
        assert!(Cli::try_parse_from(["tessera", "index-info"]).is_err());
    }
}
