use super::{axis_vector, create_store, seed_document};
use crate::documents::{DocumentCreate, DocumentUpdate};
use crate::store::{DocumentStore, StoreError};

fn create(title: &str, content: &str) -> DocumentCreate {
    DocumentCreate {
        title: title.to_string(),
        content: content.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_ledger_and_index_stay_in_lockstep() {
    let (store, _tmp) = create_store();

    let a = seed_document(&store, "A", "alpha", &[], axis_vector(0, 0.1));
    let b = seed_document(&store, "B", "beta", &[], axis_vector(10, 0.1));
    let c = seed_document(&store, "C", "gamma", &[], axis_vector(20, 0.1));

    assert!(store.check_consistency().unwrap().is_consistent());
    assert_eq!(store.stats().unwrap().total_documents, 3);
    assert_eq!(store.stats().unwrap().indexed_vectors, 3);

    store.delete_document(b).unwrap();
    assert!(store.check_consistency().unwrap().is_consistent());
    assert_eq!(store.stats().unwrap().indexed_vectors, 2);
    assert!(matches!(
        store.get_document(b),
        Err(StoreError::NotFound(_))
    ));

    let cleared = store.clear_all().unwrap();
    assert_eq!(cleared, 2);
    assert!(store.check_consistency().unwrap().is_consistent());
    assert_eq!(store.stats().unwrap().total_documents, 0);
    assert_eq!(store.stats().unwrap().indexed_vectors, 0);

    // ids a and c are gone for good
    for id in [a, c] {
        assert!(matches!(
            store.get_document(id),
            Err(StoreError::NotFound(_))
        ));
    }
}

#[test]
fn test_consistency_check_reports_divergence() {
    let (store, _tmp) = create_store();

    // document without a vector
    let orphan_doc = store
        .ledger
        .create(create("No Vector", "ledger only"))
        .unwrap();

    // vector without a document
    store
        .semantic
        .with_index_mut(|index| index.insert(999, 0, axis_vector(5, 0.0)))
        .unwrap()
        .unwrap();

    let report = store.check_consistency().unwrap();
    assert!(!report.is_consistent());
    assert_eq!(report.missing_embeddings, vec![orphan_doc.id]);
    assert_eq!(report.orphaned_vectors, vec![999]);
}

#[test]
fn test_ordinal_addressing() {
    let (store, _tmp) = create_store();

    let d1 = store.ledger.create(create("D1", "one")).unwrap();
    let d2 = store.ledger.create(create("D2", "two")).unwrap();
    let d3 = store.ledger.create(create("D3", "three")).unwrap();

    assert_eq!(store.get_by_ordinal(2).unwrap().id, d2.id);
    assert_eq!(store.ordinal_index(d3.id).unwrap(), 3);
    assert_eq!(store.ordinal_index(d1.id).unwrap(), 1);

    assert!(matches!(
        store.get_by_ordinal(4),
        Err(StoreError::OrdinalOutOfRange { n: 4, count: 3 })
    ));

    // ordinals close ranks after a delete
    store.ledger.delete(d2.id).unwrap();
    assert_eq!(store.ordinal_index(d3.id).unwrap(), 2);
    assert_eq!(store.get_by_ordinal(2).unwrap().id, d3.id);
}

#[test]
fn test_store_reopens_with_persisted_state() {
    let tmp = tempfile::tempdir().unwrap();
    let base_path = tmp.path().to_str().unwrap().to_string();

    let first_id;
    {
        let config = crate::config::Config::load_with(&base_path);
        let store = DocumentStore::open(config).unwrap();
        first_id = seed_document(&store, "Kept", "persisted text", &["keep"], axis_vector(0, 0.2));
    }

    let config = crate::config::Config::load_with(&base_path);
    let store = DocumentStore::open(config).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.indexed_vectors, 1);
    assert!(stats.vector_file_size_kb > 0.0);

    let document = store.get_document(first_id).unwrap();
    assert_eq!(document.title, "Kept");
    assert_eq!(document.tags, vec!["keep"]);
    assert!(store.check_consistency().unwrap().is_consistent());
}

#[test]
fn test_metadata_update_needs_no_model() {
    let (store, _tmp) = create_store();

    let id = seed_document(&store, "Old Title", "unchanged body", &[], axis_vector(0, 0.1));

    // title/tags-only update must not re-embed, so no model is required
    let updated = store
        .update_document(
            id,
            DocumentUpdate {
                title: Some("New Title".to_string()),
                tags: Some(vec!["fresh".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "New Title");
    assert_eq!(updated.tags, vec!["fresh"]);
    assert!(store.check_consistency().unwrap().is_consistent());
}

#[test]
fn test_search_results_serialize_for_the_api_layer() {
    // the surrounding API layer serializes results; make sure the shapes are
    // plain data it can encode
    let (store, _tmp) = create_store();
    seed_document(&store, "A", "alpha", &["x"], axis_vector(0, 0.1));
    seed_document(&store, "B", "beta", &["x"], axis_vector(0, 0.15));

    let report = store.clusters_cached().unwrap();
    let encoded = serde_json::to_string(&report).unwrap();
    assert!(encoded.contains("\"clusters\""));

    let stats = store.stats().unwrap();
    let encoded = serde_json::to_string(&stats).unwrap();
    assert!(encoded.contains("\"total_documents\""));
}

// --- end-to-end flows through the real embedding model ---

#[test]
#[ignore = "requires model download"]
fn test_add_then_search_scenario() {
    let (store, _tmp) = create_store();

    let cats = store
        .add_document(create("Cats", "cats are great pets"))
        .unwrap();
    let stocks = store
        .add_document(create("Stocks", "stock market analysis"))
        .unwrap();

    let results = store.search("kittens", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.id, cats.id);

    // both ranked: the cat document scores higher than the stock one
    let results = store.search("kittens", 2).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].document.id, cats.id);
    assert_eq!(results[1].document.id, stocks.id);
    assert!(results[0].similarity_score > results[1].similarity_score);

    // ordinal positions reflect creation order, not search order
    assert_eq!(results[0].ordinal_index, 1);
    assert_eq!(results[1].ordinal_index, 2);
}

#[test]
#[ignore = "requires model download"]
fn test_search_scores_never_increase_and_k_bounds_hold() {
    let (store, _tmp) = create_store();

    for (title, content) in [
        ("ML", "machine learning and neural networks"),
        ("Rust", "rust programming language guide"),
        ("Baking", "how to bake sourdough bread"),
        ("Space", "orbital mechanics for satellites"),
    ] {
        store.add_document(create(title, content)).unwrap();
    }

    let results = store.search("deep learning models", 10).unwrap();
    assert_eq!(results.len(), 4); // capped at document count
    for pair in results.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }

    assert_eq!(store.search("deep learning models", 2).unwrap().len(), 2);
}

#[test]
#[ignore = "requires model download"]
fn test_update_reembeds_only_on_content_change() {
    let (store, _tmp) = create_store();

    let doc = store
        .add_document(create("Pets", "cats are great pets"))
        .unwrap();
    store
        .add_document(create("Finance", "stock market analysis"))
        .unwrap();

    // content swap flips what the document is about
    store
        .update_document(
            doc.id,
            DocumentUpdate {
                content: Some("quarterly earnings and dividends".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let results = store.search("kittens and puppies", 2).unwrap();
    assert_ne!(results[0].document.id, doc.id);

    let results = store.search("dividends", 1).unwrap();
    assert_eq!(results[0].document.id, doc.id);
    assert!(store.check_consistency().unwrap().is_consistent());
}

#[test]
#[ignore = "requires model download"]
fn test_embeddings_are_deterministic_across_adds() {
    let (store, _tmp) = create_store();

    let a = store.add_document(create("A", "identical text")).unwrap();
    let b = store.add_document(create("B", "identical text")).unwrap();

    let (va, vb) = store
        .semantic
        .with_index(|index| {
            (
                index.get(a.id).unwrap().embedding.clone(),
                index.get(b.id).unwrap().embedding.clone(),
            )
        })
        .unwrap();

    assert_eq!(va, vb);
}
