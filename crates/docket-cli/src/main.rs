//! Docket CLI - Command Line Interface
//!
//! Command-line tool for managing and querying Docket document stores kept
//! in a local data directory.
//!
//! Key Features:
//! - Collection and index administration
//! - Newline-delimited JSON loading across parallel workers
//! - Filtered count, find and plan inspection
//! - Log compaction
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use clap::{Parser, Subcommand};
use docket_common::utils::format_size;
use docket_common::{DocketError, EngineConfig, Result};
use docket_document::{CollectionHandle, Database, Session};
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "docket")]
#[command(author = "AutomataNexus Development Team")]
#[command(version = "0.1.0")]
#[command(about = "Docket document store CLI", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, used when no configuration file is given
    #[arg(short, long, global = true, default_value = "./docket-data")]
    data_dir: PathBuf,

    /// Run against a throwaway in-memory store
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List collections
    Collections,
    /// Create a collection
    CreateCollection { name: String },
    /// Drop a collection
    DropCollection { name: String },
    /// Create an index from a JSON specification
    CreateIndex {
        collection: String,
        #[arg(short, long)]
        spec: String,
    },
    /// Drop an index
    DropIndex {
        collection: String,
        name: String,
        #[arg(long)]
        force: bool,
    },
    /// List the indexes of a collection
    Indexes { collection: String },
    /// Insert one JSON document
    Insert { collection: String, document: String },
    /// Load newline-delimited JSON documents
    Load {
        collection: String,
        file: PathBuf,
        /// Parallel workers (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Count documents matching a filter
    Count {
        collection: String,
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Print documents matching a filter
    Find {
        collection: String,
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show the scan strategy for a filter
    Explain {
        collection: String,
        #[arg(short, long)]
        filter: String,
    },
    /// Rewrite the data log
    Compact,
    /// Run the sample office scenario
    Demo,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    if cli.memory {
        return Ok(EngineConfig::in_memory());
    }
    match &cli.config {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::local(cli.data_dir.clone())),
    }
}

fn parse_json(label: &str, text: &str) -> Result<JsonValue> {
    serde_json::from_str(text)
        .map_err(|e| DocketError::InvalidDocument(format!("{} is not valid JSON: {}", label, e)))
}

fn open(session: &Session, name: &str) -> Result<CollectionHandle> {
    session
        .open_collection(name)
        .ok_or_else(|| DocketError::NotFound(format!("collection '{}'", name)))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let db = Database::open(config)?;
    let session = db.session();

    match cli.command {
        Commands::Collections => {
            for name in session.collection_names() {
                println!("{}", name);
            }
        }
        Commands::CreateCollection { name } => {
            session.create_collection(&name)?;
            println!("Created collection '{}'", name);
        }
        Commands::DropCollection { name } => {
            let result = session.drop_collection(&name)?;
            println!("{}", json!(result));
        }
        Commands::CreateIndex { collection, spec } => {
            let spec = parse_json("index spec", &spec)?;
            open(&session, &collection)?.create_index(Some(&spec))?;
            println!("Created index on '{}'", collection);
        }
        Commands::DropIndex {
            collection,
            name,
            force,
        } => {
            let options = json!({ "force": force });
            let result = open(&session, &collection)?.drop_index(&name, Some(&options))?;
            println!("{}", json!(result));
        }
        Commands::Indexes { collection } => {
            for spec in open(&session, &collection)?.list_indexes()? {
                println!("{}", spec.to_json());
            }
        }
        Commands::Insert {
            collection,
            document,
        } => {
            let document = parse_json("document", &document)?;
            let meta = open(&session, &collection)?.insert_one(document)?;
            session.commit()?;
            println!("Inserted {}", meta.key);
        }
        Commands::Load {
            collection,
            file,
            workers,
        } => {
            let coll = open(&session, &collection)?;
            let workers = workers.unwrap_or_else(num_cpus::get);
            let loaded = load_file(&coll, &file, workers).await?;
            session.commit()?;
            println!("Loaded {} documents into '{}'", loaded, collection);
        }
        Commands::Count { collection, filter } => {
            let mut query = open(&session, &collection)?.find();
            if let Some(filter) = filter {
                query = query.filter(&parse_json("filter", &filter)?);
            }
            println!("{}", json!(query.count()?));
        }
        Commands::Find {
            collection,
            filter,
            skip,
            limit,
        } => {
            let mut query = open(&session, &collection)?.find().skip(skip);
            if let Some(filter) = filter {
                query = query.filter(&parse_json("filter", &filter)?);
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            for doc in query.get_documents()? {
                println!("{} {}", doc.key(), doc.content_json());
            }
        }
        Commands::Explain { collection, filter } => {
            let strategy = open(&session, &collection)?
                .find()
                .filter(&parse_json("filter", &filter)?)
                .explain()?;
            println!("{}", json!(strategy));
        }
        Commands::Compact => {
            db.compact()?;
            let stats = db.storage_stats();
            println!(
                "Compacted: {} records, {}",
                stats.total_records,
                format_size(stats.total_bytes)
            );
        }
        Commands::Demo => demo(&db)?,
    }

    Ok(())
}

// =============================================================================
// Loading
// =============================================================================

/// Stage every line of an NDJSON file, spreading the inserts over blocking
/// worker tasks.
async fn load_file(coll: &CollectionHandle, file: &Path, workers: usize) -> Result<usize> {
    let text = tokio::fs::read_to_string(file).await?;
    let documents = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_json(&format!("line {}", i + 1), line))
        .collect::<Result<Vec<_>>>()?;
    let total = documents.len();

    let chunk_size = total.div_ceil(workers.max(1)).max(1);
    let mut tasks = Vec::new();
    for chunk in documents.chunks(chunk_size) {
        let coll = coll.clone();
        let chunk = chunk.to_vec();
        tasks.push(tokio::task::spawn_blocking(move || coll.insert_many(chunk)));
    }

    for task in tasks {
        task.await
            .map_err(|e| DocketError::Transaction(format!("load worker failed: {}", e)))??;
    }
    tracing::info!(collection = %coll.name(), documents = total, "documents staged");
    Ok(total)
}

// =============================================================================
// Demo
// =============================================================================

fn demo(db: &Database) -> Result<()> {
    let session = db.session();
    let coll = session.create_collection("docket_demo_offices")?;

    let records = [
        ("Gillian", "Shenzhen"),
        ("Chris", "Melbourne"),
        ("Venkat", "Bangalore"),
        ("Changjie", "Shenzhen"),
        ("Mandy", "London"),
        ("Jay", "San Francisco"),
        ("Eric", "New York"),
    ];
    coll.insert_many(
        records
            .iter()
            .enumerate()
            .map(|(i, (name, office))| json!({ "id": 1001 + i, "name": name, "office": office })),
    )?;
    session.commit()?;

    coll.create_index(Some(&json!({
        "name": "OFFICE_IDX",
        "fields": [ { "path": "office", "datatype": "string", "order": "asc" } ]
    })))?;

    let shenzhen = json!({ "office": { "$like": "Shenzhen" } });
    let changjie = json!({ "name": "Changjie" });
    println!(
        "office = Shenzhen: {} ({})",
        coll.find().filter(&shenzhen).count()?.count,
        json!(coll.find().filter(&shenzhen).explain()?)
    );
    println!(
        "name = Changjie: {} ({})",
        coll.find().filter(&changjie).count()?.count,
        json!(coll.find().filter(&changjie).explain()?)
    );

    println!("drop index: {}", json!(coll.drop_index("OFFICE_IDX", None)?));
    println!("drop collection: {}", json!(coll.drop()?));
    println!("drop collection again: {}", json!(coll.drop()?));
    Ok(())
}
