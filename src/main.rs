use anyhow::Context;
use clap::{Parser, Subcommand};
use fx_artifact_cache::config::{CacheConfig, CacheRoot, Var};
use fx_artifact_cache::core::allocator::{Allocator, TableAllocator};
use fx_artifact_cache::core::description::{Description, canonical_json};
use fx_artifact_cache::core::storage::{self, Registry};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "fx-artifact-cache",
    version = "0.1",
    about = "Inspect and manage a content-addressed artifact cache"
)]
struct Args {
    /// Cache root holding db.json and data/
    #[arg(long, env = CacheRoot::NAME, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Allocate (or reuse) the artifact path for a JSON description
    Allocate {
        /// Description as JSON, e.g. '{"args": [1], "kwargs": {}}'
        description: String,
    },
    /// Print the artifact path for a JSON description, without allocating
    Lookup { description: String },
    /// List every allocation record, ordered by id
    Records,
    /// Print the category recorded in an artifact's metadata
    Inspect { path: PathBuf },
    /// Print the payload of a json artifact
    Show { path: PathBuf },
}

fn parse_description(raw: &str) -> anyhow::Result<Description> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON description: {}", raw))
}

fn open_allocator(root: Option<PathBuf>) -> anyhow::Result<TableAllocator> {
    let config = match root {
        Some(root) => CacheConfig::new(root),
        None => CacheConfig::from_env()?,
    };
    Ok(config.allocator()?)
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Allocate { description } => {
            let allocator = open_allocator(args.root)?;
            let path = allocator.allocate(&parse_description(&description)?)?;
            println!("{}", path.display());
        }
        Command::Lookup { description } => {
            let allocator = open_allocator(args.root)?;
            match allocator.lookup(&parse_description(&description)?)? {
                Some(id) => println!("{}", allocator.path_for(id).display()),
                None => anyhow::bail!("No allocation matches the description"),
            }
        }
        Command::Records => {
            let allocator = open_allocator(args.root)?;
            for record in allocator.records()? {
                println!("{}\t{}", record.id, canonical_json(&record.description));
            }
        }
        Command::Inspect { path } => {
            let category = storage::read_category(&path)?;
            println!("{}", category);
        }
        Command::Show { path } => {
            let value: serde_json::Value = Registry::with_defaults()
                .load(&path)
                .with_context(|| format!("Could not load {} as a json artifact", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
