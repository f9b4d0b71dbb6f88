//! Integration tests over a tempdir-isolated store.
//!
//! Tests that need real embeddings are marked #[ignore] and run with:
//! cargo test -- --ignored

mod store;

use crate::config::Config;
use crate::documents::DocumentCreate;
use crate::semantic::content_hash;
use crate::store::DocumentStore;

/// Creates an isolated DocumentStore using a unique temp directory.
/// Each test gets its own directory so parallel tests never collide,
/// and no real data is touched.
pub fn create_store() -> (DocumentStore, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let config = Config::load_with(tmp.path().to_str().unwrap());
    let store = DocumentStore::open(config).expect("failed to open store");
    (store, tmp)
}

/// A 384-dim vector pointing mostly along `axis`, with a little spread so
/// same-group vectors are near but not identical.
pub fn axis_vector(axis: usize, jitter: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; 384];
    v[axis] = 1.0;
    v[(axis + 1) % 384] = jitter;
    v
}

/// Seed a document through the ledger and plant a synthetic embedding for it,
/// bypassing the model. Lets the model-free paths (clustering, deletes,
/// consistency, stats) run against a populated store.
pub fn seed_document(
    store: &DocumentStore,
    title: &str,
    content: &str,
    tags: &[&str],
    vector: Vec<f32>,
) -> u64 {
    let document = store
        .ledger
        .create(DocumentCreate {
            title: title.to_string(),
            content: content.to_string(),
            tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        })
        .expect("failed to seed document");

    store
        .semantic
        .with_index_mut(|index| index.insert(document.id, content_hash(content), vector))
        .expect("failed to open index")
        .expect("failed to insert vector");
    store.semantic.save_index().expect("failed to save index");

    document.id
}
