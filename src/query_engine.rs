//! # Query engine
//!
//! Top-level orchestrator for one question: embed-and-search the vector
//! store, generate an answer, measure latency, and log the interaction to
//! `query_history`, success or failure.
//!
//! Failure handling is two-layered by design:
//!
//! 1. [`GroundedAnswerer::answer`] catches every generation failure and
//!    reports it as [`Generation::Failed`]; the engine substitutes the
//!    keyword-routed fallback answer for that request.
//! 2. The engine's own guard turns anything else that goes wrong during
//!    retrieval (embedding failure, a poisoned lock) into an apologetic
//!    answer string carrying the error text.
//!
//! Either way the caller receives a well-formed [`QueryResponse`];
//! [`QueryEngine::process_query`] has no error path. History persistence is
//! best-effort: a failed insert is logged and swallowed, never surfaced.

use diesel::prelude::*;
use serde::Serialize;
use std::error::Error;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::documents::MetadataFilter;
use crate::llm::{Generation, GroundedAnswerer, fallback_answer};
use crate::models::{NewQueryHistory, QueryHistory};
use crate::schema::query_history;
use crate::vector_store::{QueryHit, VectorStore};

/// Number of context documents retrieved per question.
const CONTEXT_K: usize = 5;

/// Result of one processed question.
#[derive(Serialize, Debug)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    /// Ranked, filtered context the answer was grounded on (empty when the
    /// pipeline fell back or errored before retrieval completed).
    pub context_docs: Vec<QueryHit>,
    pub execution_time_ms: f64,
}

/// Orchestrates retrieval, generation and history logging.
///
/// Holds already-constructed collaborators: the process lifecycle owner
/// builds the embedder, store and answerer once and reuses them for every
/// question. The store sits behind a read-write lock: queries share read
/// access, while the offline index build takes the write side for its whole
/// append-and-persist critical section.
pub struct QueryEngine {
    store: Arc<RwLock<VectorStore>>,
    answerer: GroundedAnswerer,
    db_url: String,
}

impl QueryEngine {
    pub fn new(
        store: Arc<RwLock<VectorStore>>,
        answerer: GroundedAnswerer,
        db_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            answerer,
            db_url: db_url.into(),
        }
    }

    /// Process one question end to end.
    ///
    /// Retrieves up to five ranked, filtered context documents, asks the
    /// grounded answerer, and falls back to the canned decision table when
    /// generation fails. Elapsed wall-clock time is measured across the whole
    /// pipeline and a history record is written unconditionally before
    /// returning. This method never returns an error and never panics on
    /// pipeline failures; the failure shows up as the answer text.
    pub async fn process_query(
        &self,
        question: &str,
        filters: Option<&MetadataFilter>,
    ) -> QueryResponse {
        let started = Instant::now();

        let (answer, context_docs) = match self.retrieve_and_answer(question, filters).await {
            Ok(result) => result,
            Err(err) => {
                error!("error processing query: {err}");
                (
                    format!(
                        "I apologize, but I encountered an error while processing \
                         your question: {err}"
                    ),
                    Vec::new(),
                )
            }
        };

        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.save_query_history(question, &answer, execution_time_ms);

        info!("answered query in {execution_time_ms:.1}ms");

        QueryResponse {
            question: question.to_string(),
            answer,
            context_docs,
            execution_time_ms,
        }
    }

    async fn retrieve_and_answer(
        &self,
        question: &str,
        filters: Option<&MetadataFilter>,
    ) -> Result<(String, Vec<QueryHit>), Box<dyn Error>> {
        let context_docs = {
            let store = self
                .store
                .read()
                .map_err(|_| "vector store lock poisoned")?;
            store.query(question, CONTEXT_K, filters)?
        };

        let answer = match self.answerer.answer(question, &context_docs).await {
            Generation::Grounded(text) => text,
            Generation::Failed(reason) => {
                warn!("grounded generation unavailable, using fallback: {reason}");
                fallback_answer(question)
            }
        };

        Ok((answer, context_docs))
    }

    /// Newest-first page of the query history plus the total row count.
    pub fn recent_history(&self, limit: i64) -> Result<(Vec<QueryHistory>, i64), Box<dyn Error>> {
        let mut conn = SqliteConnection::establish(&self.db_url)?;
        let rows = query_history::table
            .order(query_history::id.desc())
            .limit(limit)
            .load::<QueryHistory>(&mut conn)?;
        let total: i64 = query_history::table.count().get_result(&mut conn)?;
        Ok((rows, total))
    }

    /// Best-effort history insert; failures are logged and swallowed so a
    /// broken history DB can never break the user-facing answer.
    fn save_query_history(&self, query_text: &str, response_text: &str, execution_time_ms: f64) {
        let record = NewQueryHistory {
            query_text: query_text.to_string(),
            response_text: response_text.to_string(),
            execution_time_ms,
        };
        let result: Result<(), Box<dyn Error>> = (|| {
            let mut conn = SqliteConnection::establish(&self.db_url)?;
            conn.transaction(|conn| {
                diesel::insert_into(query_history::table)
                    .values(&record)
                    .execute(conn)
            })?;
            Ok(())
        })();
        if let Err(err) = result {
            warn!("error saving query history: {err}");
        }
    }
}
