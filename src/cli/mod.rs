//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "outfitter",
    version,
    about = "Hybrid product discovery engine for fashion catalogs",
    long_about = "Outfitter answers free-text and image-seeded product searches over a fashion \
                  catalog using hybrid lexical/semantic retrieval, rank fusion, adaptive \
                  cross-encoder reranking, and deterministic merchandising rules. It can also \
                  complete an outfit around an anchor catalog item."
)]
pub struct Cli {
    /// Config file path (defaults to ~/.config/outfitter/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the catalog with a free-text query
    Search {
        /// Query text
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'k', long, default_value = "8")]
        top_k: usize,

        /// JSON file with vision attributes for an image-seeded search
        #[arg(long, value_name = "FILE")]
        vision: Option<PathBuf>,

        /// Print results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Recommend items that complete an outfit around a catalog product
    Complete {
        /// Anchor product id
        anchor_id: u32,

        /// Maximum number of results to return
        #[arg(short = 'k', long, default_value = "4")]
        top_k: usize,

        /// Print results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show catalog and configuration summary
    Info,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
