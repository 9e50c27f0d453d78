//! # VectorStore
//!
//! Persistent nearest-neighbor index over booking documents.
//!
//! This module pairs a [HNSW](https://arxiv.org/abs/1603.09320) index
//! (`hora` crate, Euclidean metric) with the parallel, ordered document list
//! it indexes. The two are owned by one type so the pairing invariant
//! (`vectors.len() == documents.len()`, slot *i* answers for document *i*)
//! holds by construction rather than by caller discipline.
//!
//! ## Responsibilities
//! - **Indexing**: embeds document texts (via an injected [`Embedder`]) and
//!   appends them in order; slots are zero-based ordinal positions.
//! - **Search**: L2 nearest-neighbor lookup with optional exact-match
//!   metadata post-filtering.
//! - **Persistence**: two co-located bincode artifacts per collection under
//!   the data directory:
//!   - `{collection}_vectors.bin`: embedding dimension + ordered raw vectors
//!   - `{collection}_docs.bin`: the ordered document list
//!
//! Both artifacts are written via temp-file + atomic rename on every
//! successful add, vectors first and documents last, and always read
//! together. Finding exactly one of them at open time is corruption and
//! fails loudly; it is never silently treated as "no index". The in-memory
//! HNSW index is rebuilt from the persisted vectors on load: the raw vectors
//! are the durable truth, which is what makes the count check at load time
//! enforceable.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, fmt};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::documents::{Document, MetadataFilter};
use crate::embedder::Embedder;

/// One ranked search result: the resolved document plus its L2 distance to
/// the query embedding. Ephemeral; produced per search call.
#[derive(Serialize, Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: MetadataFilter,
    /// Non-negative Euclidean distance; smaller is closer.
    pub distance: f32,
}

/// Durable form of the vector half of the store.
#[derive(Serialize, Deserialize)]
struct VectorSnapshot {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Persistent embedding store over a named collection.
///
/// Holds the HNSW index, the raw vectors it was built from, the parallel
/// document list, and the embedder used for both document and query texts.
pub struct VectorStore {
    /// Dimensionality of vectors (384 for MiniLM-L6).
    dimension: usize,
    /// Raw embeddings, slot-ordered; the durable source for the index.
    vectors: Vec<Vec<f32>>,
    /// Documents, slot-ordered in lockstep with `vectors`.
    documents: Vec<Document>,
    /// ANN index for similarity search, rebuilt from `vectors`.
    index: HNSWIndex<f32, usize>,
    /// Embedding model shared by indexing and query paths.
    embedder: Box<dyn Embedder>,
    data_dir: PathBuf,
    vectors_path: PathBuf,
    docs_path: PathBuf,
}

impl fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("dimension", &self.dimension)
            .field("documents", &self.documents.len())
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl VectorStore {
    /// Open the collection at `data_dir`, loading persisted state if present.
    ///
    /// - Both artifacts present: load them, verify the persisted dimension
    ///   matches `dimension` and the vector count matches the document count.
    /// - Neither present: start an empty store.
    /// - Exactly one present: the persisted state is inconsistent; fail
    ///   loudly rather than shadowing data with a fresh empty index.
    ///
    /// # Parameters
    /// - `data_dir`: Directory holding (or receiving) the artifacts.
    /// - `collection`: Name the artifact files are derived from.
    /// - `dimension`: Expected embedding dimensionality.
    /// - `embedder`: Embedding model; its `dim()` must equal `dimension`.
    ///
    /// # Errors
    /// Corrupt or mismatched persisted state, an embedder of the wrong
    /// dimensionality, or I/O failures.
    pub fn open(
        data_dir: impl Into<PathBuf>,
        collection: &str,
        dimension: usize,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self, Box<dyn Error>> {
        if embedder.dim() != dimension {
            return Err(format!(
                "embedder produces {}-d vectors but the store expects {}-d",
                embedder.dim(),
                dimension
            )
            .into());
        }

        let data_dir = data_dir.into();
        let vectors_path = data_dir.join(format!("{collection}_vectors.bin"));
        let docs_path = data_dir.join(format!("{collection}_docs.bin"));

        let (vectors, documents) = match (vectors_path.exists(), docs_path.exists()) {
            (true, true) => {
                let snapshot: VectorSnapshot = read_artifact(&vectors_path)?;
                let documents: Vec<Document> = read_artifact(&docs_path)?;
                if snapshot.dimension != dimension {
                    return Err(format!(
                        "persisted index is {}-d but {}-d was requested",
                        snapshot.dimension, dimension
                    )
                    .into());
                }
                if snapshot.vectors.len() != documents.len() {
                    return Err(format!(
                        "corrupt collection '{collection}': {} vectors but {} documents",
                        snapshot.vectors.len(),
                        documents.len()
                    )
                    .into());
                }
                info!(
                    "loaded collection '{collection}' with {} documents",
                    documents.len()
                );
                (snapshot.vectors, documents)
            }
            (false, false) => {
                info!("created new collection '{collection}'");
                (Vec::new(), Vec::new())
            }
            _ => {
                return Err(format!(
                    "corrupt collection '{collection}': expected both {} and {} (or neither)",
                    vectors_path.display(),
                    docs_path.display()
                )
                .into());
            }
        };

        let index = build_hnsw(dimension, &vectors)?;

        Ok(Self {
            dimension,
            vectors,
            documents,
            index,
            embedder,
            data_dir,
            vectors_path,
            docs_path,
        })
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Embed and append a batch of documents, then persist.
    ///
    /// A no-op for an empty batch. Vectors and documents are appended in
    /// document order (each document's slot is its ordinal position), the
    /// index is rebuilt, and both artifacts are written durably (vectors
    /// first, documents last, each via temp-file + atomic rename) before
    /// this returns. A crash between the two renames leaves a count mismatch
    /// that the next [`VectorStore::open`] rejects as corruption instead of
    /// silently serving a torn state.
    ///
    /// # Errors
    /// Embedding failures, dimension mismatches, index build failures, or
    /// I/O failures while persisting. The in-memory state is only extended
    /// after the whole batch embedded cleanly.
    pub fn add_documents(&mut self, docs: Vec<Document>) -> Result<(), Box<dyn Error>> {
        if docs.is_empty() {
            debug!("no documents to add");
            return Ok(());
        }

        let texts: Vec<String> = docs.iter().map(|doc| doc.text.clone()).collect();
        let embeddings = self.embedder.embed_many(&texts)?;
        if embeddings.len() != docs.len() {
            return Err(format!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                docs.len()
            )
            .into());
        }
        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    embedding.len()
                )
                .into());
            }
        }

        let added = docs.len();
        self.vectors.extend(embeddings);
        self.documents.extend(docs);
        self.index = build_hnsw(self.dimension, &self.vectors)?;
        self.persist()?;

        info!(
            "added {added} documents to the index ({} total)",
            self.documents.len()
        );
        Ok(())
    }

    /// Search for the `k` documents nearest to `query_text`, optionally
    /// post-filtered by metadata.
    ///
    /// Results are ordered by ascending L2 distance (closest first; ties keep
    /// their ranked order). An empty index yields an empty result set, not an
    /// error, without calling the embedder. Candidate slots the index reports
    /// that fall outside the document list are silently skipped.
    ///
    /// Filtering happens strictly **after** ranking: a candidate is dropped
    /// only when a filter key exists in its metadata *and* the value differs.
    /// Keys absent from a document's metadata never exclude it. Dropped
    /// candidates are not backfilled, so callers may receive fewer than `k`
    /// hits.
    ///
    /// # Errors
    /// Query embedding failures only.
    pub fn query(
        &self,
        query_text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, Box<dyn Error>> {
        if self.documents.is_empty() {
            debug!("index is empty");
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query_text)?;
        if query_vector.len() != self.dimension {
            return Err(format!(
                "query embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                query_vector.len()
            )
            .into());
        }

        let mut ranked: Vec<(usize, f32)> = Vec::new();
        for (node, distance) in self.index.search_nodes(&query_vector, k) {
            let Some(slot) = *node.idx() else { continue };
            if slot >= self.documents.len() {
                continue;
            }
            ranked.push((slot, distance));
        }
        // Stable sort: equal distances keep the index's ranked order.
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        let mut hits = Vec::new();
        for (slot, distance) in ranked {
            let document = &self.documents[slot];
            if let Some(filter) = filter {
                let mismatch = filter.iter().any(|(key, expected)| {
                    document
                        .metadata
                        .get(key)
                        .is_some_and(|actual| actual != expected)
                });
                if mismatch {
                    continue;
                }
            }
            hits.push(QueryHit {
                id: document.id.clone(),
                text: document.text.clone(),
                metadata: document.metadata.clone(),
                distance,
            });
        }

        Ok(hits)
    }

    /// Write both artifacts durably, vectors first, documents last.
    fn persist(&self) -> Result<(), Box<dyn Error>> {
        fs::create_dir_all(&self.data_dir)?;
        let snapshot = VectorSnapshot {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        write_artifact(&self.vectors_path, &encode_to_vec(&snapshot, standard())?)?;
        write_artifact(&self.docs_path, &encode_to_vec(&self.documents, standard())?)?;
        debug!(
            "persisted {} vectors to {}",
            self.vectors.len(),
            self.data_dir.display()
        );
        Ok(())
    }
}

fn build_hnsw(
    dimension: usize,
    vectors: &[Vec<f32>],
) -> Result<HNSWIndex<f32, usize>, Box<dyn Error>> {
    let mut index = HNSWIndex::new(dimension, &HNSWParams::default());
    for (slot, vector) in vectors.iter().enumerate() {
        index
            .add(vector, slot)
            .map_err(|e| format!("vector index rejected slot {slot}: {e}"))?;
    }
    if !vectors.is_empty() {
        index
            .build(Metric::Euclidean)
            .map_err(|e| format!("vector index build failed: {e}"))?;
    }
    Ok(index)
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let bytes = fs::read(path)?;
    let (value, _) = decode_from_slice(&bytes, standard())?;
    Ok(value)
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
    let dir = path
        .parent()
        .ok_or_else(|| format!("artifact path {} has no parent", path.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::MetadataValue;
    use crate::embedder::testing::StubEmbedder;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn doc(id: &str, text: &str, country: &str) -> Document {
        let mut metadata = HashMap::new();
        metadata.insert("country".to_string(), MetadataValue::from(country));
        Document {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }
    }

    fn open_store(dir: &TempDir) -> VectorStore {
        VectorStore::open(
            dir.path(),
            "test_bookings",
            DIM,
            Box::new(StubEmbedder::new(DIM)),
        )
        .unwrap()
    }

    #[test]
    fn test_add_then_counts_match_across_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .add_documents(vec![
                doc("1", "Hotel: City Hotel\nCountry: Portugal", "PRT"),
                doc("2", "Hotel: Resort Hotel\nCountry: Great Britain", "GBR"),
                doc("3", "Hotel: City Hotel\nCountry: Portugal again", "PRT"),
            ])
            .unwrap();
        assert_eq!(store.len(), 3);

        drop(store);
        let reloaded = open_store(&dir);
        assert_eq!(reloaded.len(), 3);
    }

    #[test]
    fn test_add_empty_batch_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.add_documents(Vec::new()).unwrap();
        assert!(store.is_empty());
        // Nothing was persisted either.
        assert!(!dir.path().join("test_bookings_vectors.bin").exists());
        assert!(!dir.path().join("test_bookings_docs.bin").exists());
    }

    #[test]
    fn test_query_empty_index_returns_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let hits = store.query("anything at all", 5, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_query_orders_by_distance_and_respects_k() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .add_documents(vec![
                doc("1", "bookings in Portugal", "PRT"),
                doc("2", "cancellation statistics for August", "PRT"),
                doc("3", "resort hotel weekend stays", "GBR"),
            ])
            .unwrap();

        let hits = store.query("bookings in Portugal", 2, None).unwrap();
        assert!(hits.len() <= 2);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        // The query text itself is indexed; it must rank first at distance ~0.
        assert_eq!(hits[0].id, "1");
        assert!(hits[0].distance < 1e-4);
    }

    #[test]
    fn test_filter_excludes_on_mismatch_only() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .add_documents(vec![doc("1", "a booking from Portugal", "PRT")])
            .unwrap();

        // Explicit mismatch on a present key excludes.
        let mut filter = HashMap::new();
        filter.insert("country".to_string(), MetadataValue::from("GBR"));
        let hits = store.query("a booking from Portugal", 5, Some(&filter)).unwrap();
        assert!(hits.is_empty());

        // A key absent from the document's metadata does not exclude.
        let mut filter = HashMap::new();
        filter.insert("hotel_type".to_string(), MetadataValue::from("Resort"));
        let hits = store.query("a booking from Portugal", 5, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[test]
    fn test_filter_does_not_backfill_dropped_candidates() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .add_documents(vec![
                doc("1", "city hotel stay in Lisbon", "PRT"),
                doc("2", "city hotel stay in London", "GBR"),
                doc("3", "city hotel stay in Porto", "PRT"),
            ])
            .unwrap();

        let mut filter = HashMap::new();
        filter.insert("country".to_string(), MetadataValue::from("PRT"));
        // k=2 retrieves two candidates before filtering; whatever survives is
        // at most 2 and all PRT — never topped up from beyond the original k.
        let hits = store.query("city hotel stay", 2, Some(&filter)).unwrap();
        assert!(hits.len() <= 2);
        for hit in &hits {
            assert_eq!(
                hit.metadata.get("country"),
                Some(&MetadataValue::from("PRT"))
            );
        }
    }

    #[test]
    fn test_roundtrip_query_results_are_identical() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .add_documents(vec![
                doc("1", "bookings in Portugal", "PRT"),
                doc("2", "lead time for resort hotels", "GBR"),
                doc("3", "average daily rate by month", "PRT"),
            ])
            .unwrap();
        let before: Vec<String> = store
            .query("lead time", 3, None)
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect();

        drop(store);
        let reloaded = open_store(&dir);
        let after: Vec<String> = reloaded
            .query("lead time", 3, None)
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect();

        assert_eq!(before, after);
    }

    #[test]
    fn test_single_surviving_artifact_is_corruption() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .add_documents(vec![doc("1", "a booking", "PRT")])
            .unwrap();
        drop(store);

        fs::remove_file(dir.path().join("test_bookings_docs.bin")).unwrap();
        let result = VectorStore::open(
            dir.path(),
            "test_bookings",
            DIM,
            Box::new(StubEmbedder::new(DIM)),
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("corrupt"));
    }

    #[test]
    fn test_wrong_dimension_embedder_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = VectorStore::open(
            dir.path(),
            "test_bookings",
            DIM,
            Box::new(StubEmbedder::new(DIM + 1)),
        );
        assert!(result.is_err());
    }
}
