//! Local bookmark stores.
//!
//! A store is one browser's bookmark collection. The coordinator reads it
//! when it changes and rewrites it when the current tree moved ahead.
//! Store failures are never fatal: the store is skipped for that cycle.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::types::bookmark::BookmarkModel;
use crate::types::errors::StoreError;
use crate::types::serial;

pub trait LocalStore: Send {
    fn name(&self) -> &str;

    fn load(&self) -> Result<BookmarkModel, StoreError>;

    fn save(&mut self, tree: &BookmarkModel) -> Result<(), StoreError>;
}

/// A store kept as a JSON file in the serial tree format.
pub struct JsonFileStore {
    name: String,
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Calls `on_change` whenever the file at `path` is written, created,
/// replaced or removed. The watch lasts as long as the returned watcher.
///
/// The parent directory is watched instead of the file itself, so the file
/// may appear later and the rename done by [`JsonFileStore::save`] is seen.
pub fn watch_file<F>(path: &Path, on_change: F) -> Result<RecommendedWatcher, StoreError>
where
    F: Fn() + Send + 'static,
{
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| StoreError::IoError(format!("{}: not a file path", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StoreError::IoError(format!("{}: {}", dir.display(), e)))?;

    let shown = path.display().to_string();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                if event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                    debug!(store = %shown, kind = ?event.kind, "store file changed");
                    on_change();
                }
            }
            Err(e) => warn!(store = %shown, error = %e, "watch error"),
        },
        Config::default(),
    )
    .map_err(|e| StoreError::IoError(format!("{}: {}", path.display(), e)))?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| StoreError::IoError(format!("{}: {}", dir.display(), e)))?;
    Ok(watcher)
}

impl LocalStore for JsonFileStore {
    fn name(&self) -> &str {
        &self.name
    }

    /// A missing file is an empty store.
    fn load(&self) -> Result<BookmarkModel, StoreError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BookmarkModel::new()),
            Err(e) => return Err(StoreError::IoError(format!("{}: {}", self.path.display(), e))),
        };
        serial::from_json(&json)
            .map_err(|e| StoreError::ParseError(format!("{}: {}", self.path.display(), e)))
    }

    /// Writes a sibling temp file and renames it over the store.
    fn save(&mut self, tree: &BookmarkModel) -> Result<(), StoreError> {
        let json = serial::to_json(tree).map_err(|e| StoreError::ParseError(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let result = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            warn!(store = %self.name, error = %e, "store write failed");
            return Err(StoreError::IoError(format!("{}: {}", self.path.display(), e)));
        }
        Ok(())
    }
}

/// In-memory store, shared with whoever holds its [`MemoryStore::tree`] handle.
#[derive(Clone)]
pub struct MemoryStore {
    name: String,
    tree: Arc<Mutex<BookmarkModel>>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(name: &str, tree: BookmarkModel) -> Self {
        Self {
            name: name.to_string(),
            tree: Arc::new(Mutex::new(tree)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tree(&self) -> Arc<Mutex<BookmarkModel>> {
        Arc::clone(&self.tree)
    }

    /// While set, every load and save fails with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(self.name.clone()));
        }
        Ok(())
    }
}

impl LocalStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<BookmarkModel, StoreError> {
        self.check()?;
        Ok(self.tree.lock().clone())
    }

    fn save(&mut self, tree: &BookmarkModel) -> Result<(), StoreError> {
        self.check()?;
        *self.tree.lock() = tree.clone();
        Ok(())
    }
}
