//! Main module for the Concierge CLI application.
//!
//! Parses the command line, loads configuration, constructs the pipeline
//! collaborators (embedder, vector store, answerer) once per invocation, and
//! dispatches to the requested command.
//!
//! # Examples
//!
//! ```sh
//! concierge init
//! concierge build-index
//! concierge ask "Which country has the most bookings?" -f country=PRT
//! concierge history -n 20
//! ```

use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use once_cell::sync::OnceCell;
use std::io::{Write, stdout};
use std::sync::{Arc, RwLock};
use std::{env, error::Error, fs};
use tracing::debug;

use concierge::commands::{self, Cli, Commands};
use concierge::config::{ConciergeConfig, establish_connection, load_config};
use concierge::documents::generate_booking_documents;
use concierge::embedder::{EMBEDDING_DIM, MiniLmEmbedder};
use concierge::llm::GroundedAnswerer;
use concierge::models::init_db;
use concierge::query_engine::QueryEngine;
use concierge::vector_store::VectorStore;
use concierge::config_dir;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        return init();
    }

    // CONCIERGE_CONFIG overrides the per-platform default location.
    let config_path = match env::var("CONCIERGE_CONFIG") {
        Ok(path) => path.into(),
        Err(_) => config_dir()?.join("config.yaml"),
    };
    debug!("loading config from: {}", config_path.display());
    let config = load_config(config_path.to_str().ok_or("non-UTF-8 config path")?)?;

    match cli.command {
        Commands::Ask { question, filters } => {
            let filters = commands::parse_filters(&filters)?;
            let filters = if filters.is_empty() {
                None
            } else {
                Some(filters)
            };

            let engine = build_engine(&config)?;
            let response = engine.process_query(&question, filters.as_ref()).await;

            let mut stdout = stdout();
            stdout.execute(SetForegroundColor(Color::Blue))?;
            stdout.execute(SetAttribute(Attribute::Bold))?;
            writeln!(stdout, "{}", response.answer)?;
            stdout.execute(SetAttribute(Attribute::Reset))?;
            stdout.execute(SetForegroundColor(Color::Reset))?;
            writeln!(
                stdout,
                "\n({} context documents, {:.1}ms)",
                response.context_docs.len(),
                response.execution_time_ms
            )?;
        }
        Commands::BuildIndex => {
            let mut conn = establish_connection(&config.db_url);
            let documents = generate_booking_documents(&mut conn)?;
            println!("Generated {} document representations", documents.len());

            let embedder = MiniLmEmbedder::load()?;
            let mut store = VectorStore::open(
                &config.data_dir,
                &config.collection_name,
                config.embedding_dim,
                Box::new(embedder),
            )?;
            store.add_documents(documents)?;
            println!("Index now holds {} documents", store.len());
        }
        Commands::History { limit } => {
            let engine = build_engine(&config)?;
            let (rows, total) = engine.recent_history(limit)?;
            for row in &rows {
                println!(
                    "#{} [{}] ({:.1}ms)\n  Q: {}\n  A: {}",
                    row.id,
                    row.timestamp,
                    row.execution_time_ms,
                    row.query_text,
                    truncate(&row.response_text, 200),
                );
            }
            println!("{} of {} recorded queries", rows.len(), total);
        }
        Commands::Init => unreachable!("handled above"),
    }

    Ok(())
}

/// Construct the pipeline collaborators once and hand them to the engine.
fn build_engine(config: &ConciergeConfig) -> Result<QueryEngine, Box<dyn Error>> {
    let embedder = MiniLmEmbedder::load()?;
    let store = VectorStore::open(
        &config.data_dir,
        &config.collection_name,
        config.embedding_dim,
        Box::new(embedder),
    )?;
    let answerer = GroundedAnswerer::new(config);
    Ok(QueryEngine::new(
        Arc::new(RwLock::new(store)),
        answerer,
        config.db_url.clone(),
    ))
}

/// Write a default configuration file and create the database tables.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = config_dir()?;
    fs::create_dir_all(&config_dir)?;

    let config = ConciergeConfig {
        api_base: "http://localhost:5001/v1".to_string(),
        api_key: "CHANGEME".to_string(),
        model: "tinyllama-1.1b-chat".to_string(),
        max_answer_tokens: 512,
        context_max_tokens: 2048,
        db_url: config_dir
            .join("concierge.db")
            .to_string_lossy()
            .into_owned(),
        data_dir: config_dir
            .join("embeddings")
            .to_string_lossy()
            .into_owned(),
        collection_name: "hotel_bookings".to_string(),
        embedding_dim: EMBEDDING_DIM,
    };

    let config_path = config_dir.join("config.yaml");
    fs::write(&config_path, serde_yaml::to_string(&config)?)?;
    println!("Wrote {}", config_path.display());

    let mut conn = establish_connection(&config.db_url);
    init_db(&mut conn)?;
    println!("Database tables created at {}", config.db_url);

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}
