//! specrag CLI - Command-line interface for the OpenAPI retrieval engine.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use specrag_core::SpecRagConfig;
use specrag_service::{
    IngestParams, PathParams, SchemaParams, SearchParams, SearchScope, SpecRagServer, ToolResult,
};

/// specrag - Hybrid retrieval and $ref resolution over OpenAPI specifications
#[derive(Parser)]
#[command(name = "specrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/specrag/config.toml, then ./specrag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the configured one
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recreate the path, component and vector indices empty
    Init,

    /// Ingest an OpenAPI JSON file, or every .json file in a directory
    Ingest {
        /// Path to file or directory to ingest
        path: PathBuf,
    },

    /// Search ingested fragments
    Search {
        /// The question to search for
        query: String,

        /// Maximum number of ranked fragments
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Search schema fragments instead of paths
        #[arg(long)]
        components: bool,
    },

    /// Show a path with every component it references
    Path {
        /// Path key, e.g. /pets/{id}
        key: String,
    },

    /// Show a component with all references inlined
    Schema {
        /// Component name, e.g. Pet
        key: String,
    },

    /// Show document counts per index
    Stats,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(
    path: Option<&Path>,
    database: Option<PathBuf>,
) -> Result<SpecRagConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => SpecRagConfig::load(path)?,
        None => SpecRagConfig::load_default()?,
    };
    if let Some(database) = database {
        config.database.path = database;
    }
    debug!("Using database at {:?}", config.database.path);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.database)?;
    let server = SpecRagServer::new(config)?;

    match cli.command {
        Commands::Init => {
            report(server.spec_init().await);
        }
        Commands::Ingest { path } => {
            ingest(&server, &path).await?;
        }
        Commands::Search {
            query,
            top_k,
            components,
        } => {
            let scope = if components {
                SearchScope::Components
            } else {
                SearchScope::Paths
            };
            let params = SearchParams {
                query,
                top_k,
                scope,
            };
            report(server.spec_search(params).await);
        }
        Commands::Path { key } => {
            report(server.spec_path(PathParams { path: key }).await);
        }
        Commands::Schema { key } => {
            report(server.spec_schema(SchemaParams { key }).await);
        }
        Commands::Stats => {
            report(server.spec_stats().await);
        }
    }

    Ok(())
}

/// Print a tool result, exiting non-zero on failure.
fn report(result: ToolResult) {
    if result.success {
        println!("{}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
        std::process::exit(1);
    }
}

async fn ingest(server: &SpecRagServer, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let files = collect_files(path)?;

    if files.is_empty() {
        println!("No JSON files found at: {}", path.display());
        return Ok(());
    }

    println!("Ingesting {} file(s)...", files.len());

    let mut success_count = 0;
    let mut error_count = 0;

    for file_path in files {
        let content = match fs::read_to_string(&file_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("  Error reading {}: {}", file_path.display(), e);
                error_count += 1;
                continue;
            }
        };

        let result = server.spec_ingest(IngestParams { content }).await;
        if result.success {
            println!("  {} - OK\n{}", file_path.display(), result.message);
            success_count += 1;
        } else {
            eprintln!("  {} - Error: {}", file_path.display(), result.message);
            error_count += 1;
        }
    }

    println!(
        "\nComplete: {} succeeded, {} failed",
        success_count, error_count
    );

    Ok(())
}

fn collect_files(path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();

    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry_path = entry?.path();
            let is_json = entry_path.extension().and_then(|e| e.to_str()) == Some("json");
            if entry_path.is_file() && is_json {
                files.push(entry_path);
            }
        }
        files.sort();
    }

    Ok(files)
}
