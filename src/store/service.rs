//! The document store facade.
//!
//! Ties the document ledger, the semantic service and the cluster engine
//! together behind the operations the HTTP/CLI surfaces consume. The ledger
//! and the vector index are kept in lockstep: every mutation touches both or
//! neither, and a failed second write is compensated by rolling back the
//! first. A rollback that itself fails returns `PartialWrite` and leaves the
//! divergence detectable via [`DocumentStore::check_consistency`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::cluster::{self, ClusterCache, ClusterError, ClusterReport, ClusterRequest};
use crate::config::Config;
use crate::documents::{self, CsvLedger, Document, DocumentCreate, DocumentLedger, DocumentUpdate};
use crate::semantic::{content_hash, SemanticError, SemanticService};
use crate::store::StoreError;

/// One search hit. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: Document,

    /// `1 - cosine_distance`: higher is more similar.
    pub similarity_score: f32,

    /// The document's 1-based rank under the creation-time total order,
    /// stable across calls regardless of search order.
    pub ordinal_index: usize,
}

/// Store statistics. None of these require the embedding model.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub embedding_dimension: usize,
    pub model: String,
    pub storage_location: String,
    pub indexed_vectors: usize,
    pub vector_file_size_kb: f64,
}

/// Id-set comparison of the two stores. Diagnostic only: the core never
/// auto-heals a divergence, an external repair tool reconciles it.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    /// Ledger documents with no vector in the index.
    pub missing_embeddings: Vec<u64>,

    /// Index vectors whose id is unknown to the ledger.
    pub orphaned_vectors: Vec<u64>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_embeddings.is_empty() && self.orphaned_vectors.is_empty()
    }
}

pub struct DocumentStore {
    pub(crate) ledger: Arc<dyn DocumentLedger>,
    pub(crate) semantic: SemanticService,
    cluster_cache: ClusterCache,
    config: Config,
}

impl DocumentStore {
    /// Open (or create) a store rooted at the config's base path.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let base_path = PathBuf::from(config.base_path());
        std::fs::create_dir_all(&base_path).context("couldnt create store directory")?;

        let ledger_path = base_path.join("documents.csv");
        let ledger =
            CsvLedger::load(ledger_path.to_str().context("store path is not valid utf8")?)?;

        let semantic = SemanticService::new(
            &config.embedding.model,
            base_path,
            config.embedding.show_download_progress,
        );

        let cluster_cache =
            ClusterCache::new(Duration::from_secs(config.clustering.cache_ttl_secs));

        Ok(Self {
            ledger: Arc::new(ledger),
            semantic,
            cluster_cache,
            config,
        })
    }

    /// Embed and store a new document.
    pub fn add_document(&self, create: DocumentCreate) -> Result<Document, StoreError> {
        // embed first so a missing model fails before anything is written
        let embedding = self.semantic.embed(&create.content)?;
        let hash = content_hash(&create.content);

        let document = self.ledger.create(create)?;

        match self
            .semantic
            .with_index_mut(|index| index.insert(document.id, hash, embedding))
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(self.rollback_create(document.id, SemanticError::Index(err).into()))
            }
            Err(err) => return Err(self.rollback_create(document.id, err.into())),
        }

        if let Err(err) = self.semantic.save_index() {
            let _ = self
                .semantic
                .with_index_mut(|index| index.remove(document.id));
            return Err(self.rollback_create(document.id, err.into()));
        }

        self.cluster_cache.invalidate();
        log::info!("added document {}", document.id);
        Ok(document)
    }

    /// Apply field updates; the embedding is regenerated only when the
    /// content actually changed.
    pub fn update_document(&self, id: u64, update: DocumentUpdate) -> Result<Document, StoreError> {
        let existing = self.ledger.get(id)?.ok_or(StoreError::NotFound(id))?;

        // embed before writing anything, same reasoning as add_document
        let reembed = match update.content.as_deref() {
            Some(content) if content_hash(content) != content_hash(&existing.content) => {
                Some((content_hash(content), self.semantic.embed(content)?))
            }
            _ => None,
        };

        let updated = self
            .ledger
            .update(id, update)?
            .ok_or(StoreError::NotFound(id))?;

        if let Some((hash, embedding)) = reembed {
            let previous = match self.semantic.with_index_mut(|index| {
                let previous = index.get(id).cloned();
                index.update(id, hash, embedding).map(|_| previous)
            }) {
                Ok(Ok(previous)) => previous,
                Ok(Err(err)) => {
                    return Err(self.rollback_update(existing, SemanticError::Index(err).into()))
                }
                Err(err) => return Err(self.rollback_update(existing, err.into())),
            };

            if let Err(err) = self.semantic.save_index() {
                if let Some(previous) = previous {
                    let _ = self.semantic.with_index_mut(|index| {
                        index.update(id, previous.content_hash, previous.embedding)
                    });
                }
                return Err(self.rollback_update(existing, err.into()));
            }
        }

        self.cluster_cache.invalidate();
        Ok(updated)
    }

    /// Remove a document from both stores. Never needs the model.
    pub fn delete_document(&self, id: u64) -> Result<(), StoreError> {
        let removed = self.ledger.delete(id)?.ok_or(StoreError::NotFound(id))?;

        let entry = match self.semantic.with_index_mut(|index| index.remove(id)) {
            Ok(entry) => entry,
            Err(err) => return Err(self.rollback_delete(removed, err.into())),
        };

        if let Err(err) = self.semantic.save_index() {
            if let Some(entry) = entry {
                // reinsertion appends, so only distance-tie order shifts
                let _ = self
                    .semantic
                    .with_index_mut(|index| index.insert(id, entry.content_hash, entry.embedding));
            }
            return Err(self.rollback_delete(removed, err.into()));
        }

        self.cluster_cache.invalidate();
        log::info!("deleted document {id}");
        Ok(())
    }

    /// Top-k semantic search, nearest first.
    ///
    /// Results keep the vector index's ranking; `ordinal_index` lets callers
    /// address hits as "document N" independently of that ranking.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidK);
        }

        let documents = self.ledger.all()?;
        if documents.is_empty() {
            // nothing to rank; notably this never loads the model
            return Ok(Vec::new());
        }

        let hits = self.semantic.query(query, k.min(documents.len()))?;

        let ordinals = documents::ordinal_positions(&documents);
        let mut by_id: HashMap<u64, Document> =
            documents.into_iter().map(|d| (d.id, d)).collect();

        Ok(hits
            .into_iter()
            .filter_map(|(id, distance)| {
                by_id.remove(&id).map(|document| SearchResult {
                    similarity_score: 1.0 - distance,
                    ordinal_index: ordinals.get(&id).copied().unwrap_or(0),
                    document,
                })
            })
            .collect())
    }

    /// Cluster the full document set. Needs at least 2 documents; never
    /// needs the model (it runs over stored embeddings).
    pub fn cluster(&self, request: &ClusterRequest) -> Result<ClusterReport, StoreError> {
        let documents = self.ledger.all()?;
        if documents.len() < 2 {
            return Err(ClusterError::TooFewDocuments(documents.len()).into());
        }

        let embeddings = self.semantic.with_index(|index| index.get_all())?;
        Ok(cluster::compute_clusters(&documents, embeddings, request)?)
    }

    /// Cached clustering with the configured default parameters.
    ///
    /// Returns the memoized report while the document count is unchanged and
    /// the cache TTL has not elapsed; otherwise recomputes and re-memoizes.
    /// `None` when the store has fewer than 2 documents or the computation
    /// fails (callers treat clusters as decoration, not as a hard result).
    pub fn clusters_cached(&self) -> Option<ClusterReport> {
        let count = self.ledger.count().ok()?;
        if count < 2 {
            return None;
        }

        if let Some(report) = self.cluster_cache.get(count) {
            return Some(report);
        }

        match self.cluster(&self.default_cluster_request()) {
            Ok(report) => {
                self.cluster_cache.store(report.clone(), count);
                Some(report)
            }
            Err(err) => {
                log::error!("failed to refresh cluster cache: {err}");
                None
            }
        }
    }

    pub fn get_document(&self, id: u64) -> Result<Document, StoreError> {
        self.ledger.get(id)?.ok_or(StoreError::NotFound(id))
    }

    pub fn get_all_documents(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.ledger.all()?)
    }

    /// Document at 1-based position `n` under the creation-time order.
    pub fn get_by_ordinal(&self, n: usize) -> Result<Document, StoreError> {
        let count = self.ledger.count()?;
        self.ledger
            .by_ordinal(n)?
            .ok_or(StoreError::OrdinalOutOfRange { n, count })
    }

    /// 1-based position of document `id` under the creation-time order.
    pub fn ordinal_index(&self, id: u64) -> Result<usize, StoreError> {
        self.ledger
            .ordinal_index(id)?
            .ok_or(StoreError::NotFound(id))
    }

    /// Wipe both stores. Returns how many documents were removed.
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let count = self.ledger.clear()?;

        let result = self
            .semantic
            .with_index_mut(|index| index.clear())
            .and_then(|_| self.semantic.save_index());
        if let Err(err) = result {
            log::error!("cleared ledger but not the vector index: {err}");
            return Err(StoreError::PartialWrite(format!(
                "ledger cleared but the vector index was not: {err}"
            )));
        }

        self.cluster_cache.invalidate();
        Ok(count)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let total_documents = self.ledger.count()?;
        let embedding_dimension = self.semantic.dimensions()?;
        let indexed_vectors = self.semantic.with_index(|index| index.len())?;

        let vectors_path = Path::new(self.config.base_path()).join("vectors.bin");
        let vector_file_size_kb = std::fs::metadata(vectors_path)
            .map(|meta| (meta.len() as f64 / 1024.0 * 100.0).round() / 100.0)
            .unwrap_or(0.0);

        Ok(StoreStats {
            total_documents,
            embedding_dimension,
            model: self.semantic.model_name().to_string(),
            storage_location: self.config.base_path().to_string(),
            indexed_vectors,
            vector_file_size_kb,
        })
    }

    /// Compare id membership of the two stores.
    pub fn check_consistency(&self) -> Result<ConsistencyReport, StoreError> {
        let ledger_ids: HashSet<u64> = self.ledger.all()?.iter().map(|d| d.id).collect();
        let index_ids: HashSet<u64> = self.semantic.with_index(|index| index.ids().collect())?;

        let mut missing_embeddings: Vec<u64> =
            ledger_ids.difference(&index_ids).copied().collect();
        let mut orphaned_vectors: Vec<u64> = index_ids.difference(&ledger_ids).copied().collect();
        missing_embeddings.sort();
        orphaned_vectors.sort();

        Ok(ConsistencyReport {
            missing_embeddings,
            orphaned_vectors,
        })
    }

    fn default_cluster_request(&self) -> ClusterRequest {
        ClusterRequest {
            num_clusters: None,
            min_clusters: self.config.clustering.min_clusters,
            max_clusters: self.config.clustering.max_clusters,
        }
    }

    fn rollback_create(&self, id: u64, cause: StoreError) -> StoreError {
        match self.ledger.delete(id) {
            Ok(_) => cause,
            Err(rollback_err) => {
                log::error!("rollback of created document {id} failed: {rollback_err}");
                StoreError::PartialWrite(format!(
                    "indexing document {id} failed ({cause}) and the ledger rollback failed too: {rollback_err}"
                ))
            }
        }
    }

    fn rollback_update(&self, previous: Document, cause: StoreError) -> StoreError {
        let id = previous.id;
        match self.ledger.restore(previous) {
            Ok(()) => cause,
            Err(rollback_err) => {
                log::error!("rollback of updated document {id} failed: {rollback_err}");
                StoreError::PartialWrite(format!(
                    "re-indexing document {id} failed ({cause}) and the ledger rollback failed too: {rollback_err}"
                ))
            }
        }
    }

    fn rollback_delete(&self, removed: Document, cause: StoreError) -> StoreError {
        let id = removed.id;
        match self.ledger.restore(removed) {
            Ok(()) => cause,
            Err(rollback_err) => {
                log::error!("rollback of deleted document {id} failed: {rollback_err}");
                StoreError::PartialWrite(format!(
                    "unindexing document {id} failed ({cause}) and the ledger rollback failed too: {rollback_err}"
                ))
            }
        }
    }
}
