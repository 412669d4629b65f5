//! Unit tests for the local store implementations.

use std::time::Duration;

use marksync::managers::local_store::{watch_file, JsonFileStore, LocalStore, MemoryStore};
use marksync::managers::tree_builder::TreeBuilder;
use marksync::services::diff_engine::DiffEngine;
use marksync::types::bookmark::BookmarkModel;
use marksync::types::errors::StoreError;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn sample() -> BookmarkModel {
    let mut model = BookmarkModel::new();
    {
        let mut b = TreeBuilder::new(&mut model);
        b.start_folder();
        b.set_name("Reading");
        b.push_folder();
        b.start_bookmark();
        b.set_name("The Book");
        b.set_id("book");
        b.set_description(Some("Rust book"));
        b.set_bookmark_href("https://doc.rust-lang.org/book/");
        b.end_bookmark();
        b.pop_folder();
        b.end_folder();
        b.new_separator();
    }
    model
}

#[test]
fn test_missing_file_loads_empty_tree() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new("firefox", dir.path().join("absent.json"));
    let tree = store.load().unwrap();
    assert!(tree.is_empty());
    assert_eq!(store.name(), "firefox");
}

#[test]
fn test_save_then_load_preserves_tree() {
    let dir = TempDir::new().unwrap();
    let mut store = JsonFileStore::new("firefox", dir.path().join("nested/dir/bookmarks.json"));
    let tree = sample();
    store.save(&tree).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, tree);
    assert!(loaded.is_valid());
    let book = loaded.find_by_id("book").unwrap();
    assert_eq!(
        loaded.get(book).item().and_then(|i| i.description.as_deref()),
        Some("Rust book")
    );
}

#[test]
fn test_save_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bookmarks.json");
    let mut store = JsonFileStore::new("chrome", &path);
    store.save(&sample()).unwrap();
    store.save(&BookmarkModel::new()).unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_corrupt_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    let store = JsonFileStore::new("broken", &path);
    assert!(matches!(store.load(), Err(StoreError::ParseError(_))));
}

#[test]
fn test_memory_store_shares_its_tree() {
    let mut store = MemoryStore::new("mem", BookmarkModel::new());
    let handle = store.tree();
    store.save(&sample()).unwrap();
    assert!(DiffEngine::new().equivalent(&handle.lock(), &sample()));

    *handle.lock() = BookmarkModel::new();
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_failing_memory_store_is_unavailable() {
    let mut store = MemoryStore::new("flaky", sample());
    store.set_failing(true);
    assert!(matches!(store.load(), Err(StoreError::Unavailable(name)) if name == "flaky"));
    assert!(store.save(&BookmarkModel::new()).is_err());

    store.set_failing(false);
    assert_eq!(store.load().unwrap(), sample());
}

#[tokio::test]
async fn test_watcher_reports_saves_to_the_store_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("profile").join("watched.json");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = watch_file(&path, move || {
        let _ = tx.send(());
    })
    .unwrap();
    assert!(path.parent().unwrap().is_dir());

    let mut store = JsonFileStore::new("watched", &path);
    store.save(&sample()).unwrap();

    let seen = timeout(Duration::from_secs(5), rx.recv()).await;
    assert!(matches!(seen, Ok(Some(()))), "save should be reported");
}

#[tokio::test]
async fn test_watcher_ignores_sibling_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("watched.json");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = watch_file(&path, move || {
        let _ = tx.send(());
    })
    .unwrap();

    std::fs::write(dir.path().join("other.json"), "{}").unwrap();
    std::fs::write(dir.path().join("watched.json.bak"), "{}").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());

    std::fs::write(&path, "{}").unwrap();
    let seen = timeout(Duration::from_secs(5), rx.recv()).await;
    assert!(matches!(seen, Ok(Some(()))));
}

#[tokio::test]
async fn test_dropped_watcher_releases_its_callback() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("watched.json");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = watch_file(&path, move || {
        let _ = tx.send(());
    })
    .unwrap();
    drop(watcher);

    let closed = timeout(Duration::from_secs(5), async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "callback should be dropped with the watcher");
}
