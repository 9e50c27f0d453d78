//! # Concierge (library root)
//!
//! This crate provides the core plumbing for the **Concierge** hotel-booking
//! question-answering CLI and library:
//!
//! - Booking → document conversion (`documents`).
//! - Sentence embeddings and the embedder contract (`embedder`).
//! - A persistent nearest-neighbor index over booking documents (`vector_store`).
//! - Grounded and fallback answer generation (`llm`).
//! - The query orchestrator that ties retrieval, generation and history
//!   logging together (`query_engine`).
//! - CLI parsing & commands (`commands`), configuration & DB integration
//!   (`config`, `models`, `schema`).
//!
//! ## Pipeline at a glance
//!
//! ```text
//! build-index:  bookings DB ──> documents ──> embeddings ──> vector store (disk)
//! ask:          question ──> vector store.query() ──> grounded answer (or fallback)
//!                      └──────────> query_history (always, success or failure)
//! ```
//!
//! The vector store persists two co-located artifacts per collection under the
//! configured data directory; see [`vector_store::VectorStore`] for the layout
//! and the load contract.

use directories::ProjectDirs;
use std::error::Error;

pub mod commands;
pub mod config;
pub mod documents;
pub mod embedder;
pub mod llm;
pub mod models;
pub mod query_engine;
pub mod schema;
pub mod vector_store;

/// Return the per-platform configuration directory used by Concierge.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "concierge-dev", "concierge")`, so you get the right place on each
/// OS (e.g., `~/.config/concierge` on Linux under XDG).
///
/// The directory is **not** created by this function; callers that need it
/// should create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be
/// determined (rare, but possible in heavily sandboxed environments).
pub fn config_dir() -> Result<std::path::PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "concierge-dev", "concierge")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
