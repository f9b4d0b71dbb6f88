//! Shared semantic state: embedding model, vector index, vector storage.
//!
//! Everything is lazy. Opening the index needs only the configured model
//! *name* (its hash identifies vectors.bin and its dimensions are known per
//! model), so deletes, clustering and stats never load model weights. The
//! model itself is constructed on the first embed and reused for the process
//! lifetime.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::semantic::embeddings::{expected_dimensions, model_id_hash, EmbeddingError};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};
use crate::semantic::EmbeddingModel;

/// Errors that can occur during semantic operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    /// The embedding model could not be loaded. Callers can degrade
    /// gracefully: listing and deleting keep working without the model.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(#[source] EmbeddingError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("vector storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

struct SemanticState {
    index: VectorIndex,
    storage: VectorStorage,
    /// Loaded on first embed; index-only operations leave this `None`.
    model: Option<EmbeddingModel>,
}

/// Lazily-initialized semantic state shared by every store operation.
///
/// The single `Mutex` also serializes index writes against the clustering
/// snapshot: `get_all` can never observe a half-applied mutation.
pub struct SemanticService {
    model_name: String,
    base_path: PathBuf,
    show_download_progress: bool,
    state: Mutex<Option<SemanticState>>,
}

impl SemanticService {
    /// Create the service in an uninitialized state.
    ///
    /// `base_path` holds `vectors.bin` and the `models/` cache directory.
    pub fn new(model_name: &str, base_path: PathBuf, show_download_progress: bool) -> Self {
        Self {
            model_name: model_name.to_string(),
            base_path,
            show_download_progress,
            state: Mutex::new(None),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embedding dimensions of the configured model, without loading it.
    pub fn dimensions(&self) -> Result<usize, SemanticError> {
        expected_dimensions(&self.model_name).map_err(SemanticError::ModelUnavailable)
    }

    /// Generate an embedding for `text`, loading the model if needed.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        let mut guard = self.lock()?;
        let state = self.ensure_index(&mut guard)?;
        self.ensure_model(state)?;

        let model = Self::loaded_model(state)?;
        model.embed(text).map_err(SemanticError::Embedding)
    }

    /// Embed `query` and return its `k` nearest neighbors as
    /// `(id, cosine distance)` pairs, nearest first. Embedding and query run
    /// under one lock so the result reflects a consistent index state.
    pub fn query(&self, query: &str, k: usize) -> Result<Vec<(u64, f32)>, SemanticError> {
        let mut guard = self.lock()?;
        let state = self.ensure_index(&mut guard)?;
        self.ensure_model(state)?;

        let model = Self::loaded_model(state)?;
        let query_embedding = model.embed(query).map_err(SemanticError::Embedding)?;
        state
            .index
            .query(&query_embedding, k)
            .map_err(SemanticError::Index)
    }

    /// Run a read-only closure against the index. Does not load the model.
    pub fn with_index<F, R>(&self, f: F) -> Result<R, SemanticError>
    where
        F: FnOnce(&VectorIndex) -> R,
    {
        let mut guard = self.lock()?;
        let state = self.ensure_index(&mut guard)?;
        Ok(f(&state.index))
    }

    /// Run a mutating closure against the index. Does not load the model.
    /// The caller is responsible for persisting via `save_index` and for
    /// keeping the document ledger in agreement.
    pub fn with_index_mut<F, R>(&self, f: F) -> Result<R, SemanticError>
    where
        F: FnOnce(&mut VectorIndex) -> R,
    {
        let mut guard = self.lock()?;
        let state = self.ensure_index(&mut guard)?;
        Ok(f(&mut state.index))
    }

    /// Persist the current index state to vectors.bin.
    pub fn save_index(&self) -> Result<(), SemanticError> {
        let mut guard = self.lock()?;
        let state = self.ensure_index(&mut guard)?;

        let model_id = model_id_hash(&self.model_name);
        state.storage.save(&state.index, &model_id)?;

        Ok(())
    }

    /// Whether any state (index or model) has been initialized yet.
    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .ok()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SemanticState>>, SemanticError> {
        self.state
            .lock()
            .map_err(|e| SemanticError::Internal(format!("lock poisoned: {e}")))
    }

    fn ensure_index<'a>(
        &self,
        guard: &'a mut Option<SemanticState>,
    ) -> Result<&'a mut SemanticState, SemanticError> {
        if guard.is_none() {
            *guard = Some(self.open_index()?);
        }

        guard
            .as_mut()
            .ok_or_else(|| SemanticError::Internal("state missing after init".to_string()))
    }

    fn open_index(&self) -> Result<SemanticState, SemanticError> {
        let dimensions =
            expected_dimensions(&self.model_name).map_err(SemanticError::ModelUnavailable)?;
        let model_id = model_id_hash(&self.model_name);

        let storage = VectorStorage::new(self.base_path.join("vectors.bin"));

        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(index) => {
                    log::info!("Loaded {} vectors from storage", index.len());
                    index
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("Model changed, starting a fresh index");
                    VectorIndex::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!("Storage version {file_ver} unsupported, starting a fresh index");
                    VectorIndex::new(dimensions)
                }
                Err(err) => {
                    log::error!("Failed to load vectors: {err}");
                    return Err(err.into());
                }
            }
        } else {
            log::info!("No existing index, starting fresh");
            VectorIndex::new(dimensions)
        };

        Ok(SemanticState {
            index,
            storage,
            model: None,
        })
    }

    fn ensure_model(&self, state: &mut SemanticState) -> Result<(), SemanticError> {
        if state.model.is_none() {
            log::info!("Loading embedding model '{}'", self.model_name);
            let model = EmbeddingModel::new(
                &self.model_name,
                self.base_path.clone(),
                self.show_download_progress,
            )
            .map_err(SemanticError::ModelUnavailable)?;

            if model.dimensions() != state.index.dimensions() {
                return Err(SemanticError::Internal(format!(
                    "model '{}' produced {} dimensions, index expects {}",
                    self.model_name,
                    model.dimensions(),
                    state.index.dimensions()
                )));
            }

            state.model = Some(model);
        }

        Ok(())
    }

    fn loaded_model(state: &SemanticState) -> Result<&EmbeddingModel, SemanticError> {
        state
            .model
            .as_ref()
            .ok_or_else(|| SemanticError::Internal("model missing after init".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service(dir: &std::path::Path) -> SemanticService {
        SemanticService::new(crate::semantic::DEFAULT_MODEL, dir.to_path_buf(), false)
    }

    #[test]
    fn test_not_initialized_initially() {
        let tmp = tempfile::tempdir().unwrap();
        let service = test_service(tmp.path());
        assert!(!service.is_initialized());
    }

    #[test]
    fn test_unknown_model_is_model_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let service = SemanticService::new("no-such-model", tmp.path().to_path_buf(), false);

        let result = service.with_index(|index| index.len());
        assert!(matches!(result, Err(SemanticError::ModelUnavailable(_))));
    }

    #[test]
    fn test_index_operations_work_without_model() {
        let tmp = tempfile::tempdir().unwrap();
        let service = test_service(tmp.path());

        let dims = service.dimensions().unwrap();
        assert_eq!(dims, 384);

        service
            .with_index_mut(|index| index.insert(1, 42, vec![0.5; 384]))
            .unwrap()
            .unwrap();
        service.save_index().unwrap();

        assert_eq!(service.with_index(|index| index.len()).unwrap(), 1);
        assert!(tmp.path().join("vectors.bin").exists());
        assert!(service.is_initialized());
    }

    #[test]
    fn test_index_persists_across_service_instances() {
        let tmp = tempfile::tempdir().unwrap();

        {
            let service = test_service(tmp.path());
            service
                .with_index_mut(|index| index.insert(7, 1, vec![1.0; 384]))
                .unwrap()
                .unwrap();
            service.save_index().unwrap();
        }

        let service = test_service(tmp.path());
        assert_eq!(service.with_index(|index| index.len()).unwrap(), 1);
        assert!(service.with_index(|index| index.contains(7)).unwrap());
    }

    #[test]
    fn test_model_change_discards_stored_index() {
        let tmp = tempfile::tempdir().unwrap();

        {
            let service = test_service(tmp.path());
            service
                .with_index_mut(|index| index.insert(7, 1, vec![1.0; 384]))
                .unwrap()
                .unwrap();
            service.save_index().unwrap();
        }

        // same dimensions, different model name: stored vectors are stale
        let service = SemanticService::new("bge-small-en-v1.5", tmp.path().to_path_buf(), false);
        assert_eq!(service.with_index(|index| index.len()).unwrap(), 0);
    }

    // Integration tests require model download
    #[test]
    #[ignore = "requires model download"]
    fn test_embed_and_query_integration() {
        let tmp = tempfile::tempdir().unwrap();
        let service = test_service(tmp.path());

        let ml = service.embed("machine learning artificial intelligence").unwrap();
        let cooking = service.embed("cooking recipes food").unwrap();
        service
            .with_index_mut(|index| {
                index.insert(1, 100, ml).unwrap();
                index.insert(2, 200, cooking).unwrap();
            })
            .unwrap();

        let hits = service.query("AI and deep learning", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 < hits[1].1);
    }
}
