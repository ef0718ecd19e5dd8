mod commands;
mod database;
mod error;
mod library;
mod scrape;
mod source;
mod utils;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::tag::TagOptions;
use crate::source::{parse_selection, Genre, Source};
use crate::utils::config::{default_config_path, default_db_path, load_config};

const SOURCE_CHOICES: [&str; 3] = ["all", "romance.io", "booknaut"];

/// Enrich your BookLore library with metadata from romance.io and thebooknaut.com.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local cache database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export BookLore library as Goodreads-compatible CSV
    Export {
        #[arg(short, long, default_value = "booklore-export.csv")]
        output: PathBuf,

        /// BookLore username, saved to the config file
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Scrape trope and spice metadata for books in the library
    Scrape {
        #[arg(long, default_value = "all", value_parser = SOURCE_CHOICES)]
        source: String,

        /// Maximum books to scrape per source
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Push enriched metadata into BookLore as shelves and tags
    Tag {
        /// Show the plan without changing anything
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        skip_shelves: bool,

        #[arg(long)]
        skip_tags: bool,
    },

    /// Discover new books by trope from topic pages
    Discover {
        #[arg(long, default_value = "all", value_parser = SOURCE_CHOICES)]
        source: String,

        /// romance, sci-fi or fantasy
        #[arg(long)]
        genre: Option<Genre>,
    },

    /// List or dismiss stored discoveries
    Discoveries {
        #[arg(long)]
        source: Option<Source>,

        /// Include dismissed entries
        #[arg(long)]
        all: bool,

        /// Dismiss the discovery with this id
        #[arg(long, value_name = "ID")]
        dismiss: Option<i64>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    debug!("Config: {:?}, cache: {:?}", config_path, db_path);

    let mut config = load_config(&config_path)?;
    let mut out = io::stdout().lock();

    match cli.command {
        Command::Export { output, username } => {
            commands::export::run(&mut config, &config_path, username, &output, &mut out)?;
        }
        Command::Scrape { source, limit } => {
            let sources = parse_selection(&source)?;
            commands::scrape::run(&config, &db_path, &sources, limit, &mut out)?;
        }
        Command::Tag { dry_run, skip_shelves, skip_tags } => {
            let options = TagOptions { dry_run, skip_shelves, skip_tags };
            commands::tag::run(&config, &db_path, options, &mut out)?;
        }
        Command::Discover { source, genre } => {
            let sources = parse_selection(&source)?;
            commands::discover::run(&config, &db_path, &sources, genre, &mut out)?;
        }
        Command::Discoveries { source, all, dismiss } => {
            commands::discover::run_list(&db_path, source, all, dismiss, &mut out)?;
        }
    }

    Ok(())
}
