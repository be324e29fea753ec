use std::sync::Arc;

use groundqa_corpus::{
    CorpusError, Document, DocumentStore, FileStore, FingerprintTracker, MemoryStore,
    StoreFingerprintTracker,
};
use tempfile::TempDir;

fn tracker(store: Arc<dyn DocumentStore>) -> StoreFingerprintTracker {
    StoreFingerprintTracker::new(store).with_salt("hash:sha512-stream:64")
}

#[tokio::test]
async fn test_file_edit_changes_fingerprint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("papers.jsonl");
    std::fs::write(
        &path,
        "{\"id\": \"p1\", \"title\": \"A\", \"abstract\": \"first\"}\n",
    )
    .unwrap();
    let tracker = tracker(Arc::new(FileStore::new(&path)));

    let before = tracker.current().await.unwrap();
    assert_eq!(before.item_count, 1);
    assert!(!tracker.was_changed(Some(&before)).await.unwrap());

    std::fs::write(
        &path,
        "{\"id\": \"p1\", \"title\": \"A\", \"abstract\": \"first, revised\"}\n",
    )
    .unwrap();
    assert!(tracker.was_changed(Some(&before)).await.unwrap());
}

#[tokio::test]
async fn test_formatting_only_edit_keeps_fingerprint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("papers.jsonl");
    std::fs::write(
        &path,
        "{\"id\": \"p1\", \"title\": \"A\", \"abstract\": \"first\"}\n",
    )
    .unwrap();
    let tracker = tracker(Arc::new(FileStore::new(&path)));
    let before = tracker.current().await.unwrap();

    std::fs::write(
        &path,
        "\n{ \"abstract\": \"first\",  \"title\": \" A \", \"id\": \"p1\" }\n\n",
    )
    .unwrap();
    assert!(!tracker.was_changed(Some(&before)).await.unwrap());
}

#[tokio::test]
async fn test_memory_store_mutations_are_detected() {
    let store = Arc::new(MemoryStore::with_documents(vec![
        Document::new("a", "Alpha", "first"),
        Document::new("b", "Beta", "second"),
    ]));
    let tracker = tracker(store.clone());
    let initial = tracker.current().await.unwrap();

    store.upsert(Document::new("c", "Gamma", "third"));
    let grown = tracker.current().await.unwrap();
    assert_eq!(grown.item_count, 3);
    assert!(!grown.same_content(&initial));

    assert!(store.remove("c"));
    let shrunk = tracker.current().await.unwrap();
    assert!(shrunk.same_content(&initial));
}

#[tokio::test]
async fn test_deleted_file_is_never_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("papers.json");
    std::fs::write(&path, r#"[{"id": "p1", "title": "A", "text": "body"}]"#).unwrap();
    let tracker = tracker(Arc::new(FileStore::new(&path)));
    let before = tracker.current().await.unwrap();

    std::fs::remove_file(&path).unwrap();
    let err = tracker.was_changed(Some(&before)).await.unwrap_err();
    assert!(matches!(err, CorpusError::SourceUnavailable(_)));
}
