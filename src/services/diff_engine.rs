//! Diff Engine for marksync.
//!
//! Computes the add/remove edit script that turns one bookmark tree into
//! another and streams it into a [`DiffSink`].
//!
//! Identity is the diff key only: a bookmark is matched by
//! (case-insensitive name, canonical URL) and a folder by case-insensitive
//! name. Ids, descriptions, images and timestamps are deliberately not part
//! of the key, so metadata-only changes produce no edits.
//!
//! Same-named sibling folders are pooled on each side before recursing, so
//! duplicate folder names never cause missed matches. Items whose name
//! starts with the hidden prefix are invisible to the diff, recursively.
//!
//! `push_folder` is emitted lazily, right before the first edit inside a
//! folder, so sinks only see paths that actually change.

use std::cmp::Ordering;

use crate::types::bookmark::{BookmarkModel, BookmarkNode, NodeId};
use crate::types::href::Href;

/// Prefix marking items the diff must ignore.
pub const DEFAULT_HIDDEN_PREFIX: char = '.';

/// A node of one of the two trees being compared.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub tree: &'a BookmarkModel,
    pub id: NodeId,
    hidden_prefix: Option<char>,
}

impl<'a> NodeRef<'a> {
    pub fn new(tree: &'a BookmarkModel, id: NodeId, hidden_prefix: Option<char>) -> Self {
        Self {
            tree,
            id,
            hidden_prefix,
        }
    }

    pub fn node(&self) -> &'a BookmarkNode {
        self.tree.get(self.id)
    }

    pub fn name(&self) -> &'a str {
        self.node().name()
    }

    pub fn href(&self) -> Option<&'a Href> {
        self.node().as_bookmark().map(|b| &b.href)
    }

    /// True if the item is skipped by the hidden-item convention.
    pub fn is_hidden(&self) -> bool {
        is_hidden(self.name(), self.hidden_prefix)
    }

    /// Visible bookmark and folder children, in insertion order.
    pub fn visible_children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let (tree, prefix) = (self.tree, self.hidden_prefix);
        tree.children(self.id)
            .iter()
            .map(move |child| NodeRef::new(tree, *child, prefix))
            .filter(|child| {
                let node = child.node();
                (node.is_bookmark() || node.is_folder()) && !child.is_hidden()
            })
    }
}

fn is_hidden(name: &str, prefix: Option<char>) -> bool {
    prefix.is_some_and(|p| name.starts_with(p))
}

/// Receiver of an edit script.
///
/// `add_folder` and `del_folder` default to a per-item expansion built on
/// [`DiffSink::new_folder`] and [`DiffSink::remove_folder`]; sinks that want
/// whole-subtree granularity override them.
pub trait DiffSink {
    /// Enter a folder that exists on both sides.
    fn push_folder(&mut self, folder: NodeRef<'_>);

    fn pop_folder(&mut self);

    fn add_bookmark(&mut self, bookmark: NodeRef<'_>);

    fn del_bookmark(&mut self, bookmark: NodeRef<'_>);

    /// Create an empty copy of `folder` in the current location.
    fn new_folder(&mut self, folder: NodeRef<'_>);

    /// Remove the (already emptied) `folder` from the current location.
    fn remove_folder(&mut self, folder: NodeRef<'_>);

    fn add_folder(&mut self, folder: NodeRef<'_>) {
        self.new_folder(folder);
        self.push_folder(folder);
        for child in folder.visible_children() {
            if child.node().is_folder() {
                self.add_folder(child);
            } else {
                self.add_bookmark(child);
            }
        }
        self.pop_folder();
    }

    fn del_folder(&mut self, folder: NodeRef<'_>) {
        self.push_folder(folder);
        for child in folder.visible_children() {
            if child.node().is_folder() {
                self.del_folder(child);
            } else {
                self.del_bookmark(child);
            }
        }
        self.pop_folder();
        self.remove_folder(folder);
    }
}

/// Tree comparison with a configurable hidden prefix.
#[derive(Debug, Clone, Copy)]
pub struct DiffEngine {
    hidden_prefix: Option<char>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct BookmarkEntry<'a> {
    name: String,
    node: NodeRef<'a>,
}

struct FolderEntry<'a> {
    name: String,
    node: NodeRef<'a>,
}

struct Frame<'a> {
    folder: NodeRef<'a>,
    pushed: bool,
}

/// Per-diff state: lazily pushed folder frames and the edit counter.
struct Walk<'s, 'a> {
    sink: &'s mut dyn DiffSink,
    frames: Vec<Frame<'a>>,
    edits: usize,
}

impl<'s, 'a> Walk<'s, 'a> {
    fn flush(&mut self) {
        for frame in self.frames.iter_mut().filter(|f| !f.pushed) {
            self.sink.push_folder(frame.folder);
            frame.pushed = true;
        }
    }

    fn emit(&mut self, edit: impl FnOnce(&mut dyn DiffSink)) {
        self.flush();
        edit(&mut *self.sink);
        self.edits += 1;
    }

    fn enter(&mut self, folder: NodeRef<'a>) {
        self.frames.push(Frame {
            folder,
            pushed: false,
        });
    }

    fn leave(&mut self) {
        if let Some(frame) = self.frames.pop() {
            if frame.pushed {
                self.sink.pop_folder();
            }
        }
    }
}

impl DiffEngine {
    pub fn new() -> Self {
        Self {
            hidden_prefix: Some(DEFAULT_HIDDEN_PREFIX),
        }
    }

    /// `None` disables the hidden-item convention.
    pub fn with_hidden_prefix(hidden_prefix: Option<char>) -> Self {
        Self { hidden_prefix }
    }

    pub fn hidden_prefix(&self) -> Option<char> {
        self.hidden_prefix
    }

    /// Streams the edits turning `old` into `new` into `sink`.
    ///
    /// Returns the number of add/del operations emitted; `0` means the trees
    /// are equivalent under the diff key.
    pub fn diff(&self, new: &BookmarkModel, old: &BookmarkModel, sink: &mut dyn DiffSink) -> usize {
        let mut walk = Walk {
            sink,
            frames: Vec::new(),
            edits: 0,
        };
        let new_root = [NodeRef::new(new, new.root(), self.hidden_prefix)];
        let old_root = [NodeRef::new(old, old.root(), self.hidden_prefix)];
        self.diff_pooled(&mut walk, &new_root, &old_root);
        walk.edits
    }

    /// Number of edits between two trees, without observing them.
    pub fn count(&self, new: &BookmarkModel, old: &BookmarkModel) -> usize {
        self.diff(new, old, &mut EditCounter::default())
    }

    /// True if the trees are equivalent under the diff key.
    pub fn equivalent(&self, a: &BookmarkModel, b: &BookmarkModel) -> bool {
        self.count(a, b) == 0
    }

    fn collect<'a>(folders: &[NodeRef<'a>]) -> (Vec<BookmarkEntry<'a>>, Vec<FolderEntry<'a>>) {
        let mut bookmarks = Vec::new();
        let mut subfolders = Vec::new();
        for folder in folders {
            for child in folder.visible_children() {
                let name = child.name().to_lowercase();
                if child.node().is_folder() {
                    subfolders.push(FolderEntry { name, node: child });
                } else {
                    bookmarks.push(BookmarkEntry { name, node: child });
                }
            }
        }
        bookmarks.sort_by(compare_bookmarks);
        // stable: same-named folders keep tree order within their group
        subfolders.sort_by(|a, b| a.name.cmp(&b.name));
        (bookmarks, subfolders)
    }

    fn diff_pooled<'a>(&self, walk: &mut Walk<'_, 'a>, new: &[NodeRef<'a>], old: &[NodeRef<'a>]) {
        let (new_marks, new_folders) = Self::collect(new);
        let (old_marks, old_folders) = Self::collect(old);

        let (mut i, mut j) = (0, 0);
        while i < new_marks.len() && j < old_marks.len() {
            match compare_bookmarks(&new_marks[i], &old_marks[j]) {
                Ordering::Less => {
                    let node = new_marks[i].node;
                    walk.emit(|sink| sink.add_bookmark(node));
                    i += 1;
                }
                Ordering::Greater => {
                    let node = old_marks[j].node;
                    walk.emit(|sink| sink.del_bookmark(node));
                    j += 1;
                }
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        for entry in &new_marks[i..] {
            let node = entry.node;
            walk.emit(|sink| sink.add_bookmark(node));
        }
        for entry in &old_marks[j..] {
            let node = entry.node;
            walk.emit(|sink| sink.del_bookmark(node));
        }

        let new_groups = group_by_name(&new_folders);
        let old_groups = group_by_name(&old_folders);
        let (mut i, mut j) = (0, 0);
        while i < new_groups.len() || j < old_groups.len() {
            let order = match (new_groups.get(i), old_groups.get(j)) {
                (Some(n), Some(o)) => n[0].name.cmp(&o[0].name),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            match order {
                Ordering::Less => {
                    for entry in new_groups[i] {
                        let node = entry.node;
                        walk.emit(|sink| sink.add_folder(node));
                    }
                    i += 1;
                }
                Ordering::Greater => {
                    for entry in old_groups[j] {
                        let node = entry.node;
                        walk.emit(|sink| sink.del_folder(node));
                    }
                    j += 1;
                }
                Ordering::Equal => {
                    let pooled_new: Vec<NodeRef<'a>> = new_groups[i].iter().map(|e| e.node).collect();
                    let pooled_old: Vec<NodeRef<'a>> = old_groups[j].iter().map(|e| e.node).collect();
                    walk.enter(pooled_new[0]);
                    self.diff_pooled(walk, &pooled_new, &pooled_old);
                    walk.leave();
                    i += 1;
                    j += 1;
                }
            }
        }
    }
}

fn compare_bookmarks(a: &BookmarkEntry<'_>, b: &BookmarkEntry<'_>) -> Ordering {
    a.name.cmp(&b.name).then_with(|| match (a.node.href(), b.node.href()) {
        (Some(x), Some(y)) => Href::canonical_compare(x, y),
        _ => Ordering::Equal,
    })
}

fn group_by_name<'e, 'a>(folders: &'e [FolderEntry<'a>]) -> Vec<&'e [FolderEntry<'a>]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for index in 1..=folders.len() {
        if index == folders.len() || folders[index].name != folders[start].name {
            if start < index {
                groups.push(&folders[start..index]);
            }
            start = index;
        }
    }
    groups
}

/// Diffs with the default engine.
pub fn diff(new: &BookmarkModel, old: &BookmarkModel, sink: &mut dyn DiffSink) -> usize {
    DiffEngine::new().diff(new, old, sink)
}

/// Sink that only counts; folders count as one edit each.
#[derive(Debug, Default)]
pub struct EditCounter {
    pub adds: usize,
    pub dels: usize,
}

impl DiffSink for EditCounter {
    fn push_folder(&mut self, _folder: NodeRef<'_>) {}

    fn pop_folder(&mut self) {}

    fn add_bookmark(&mut self, _bookmark: NodeRef<'_>) {
        self.adds += 1;
    }

    fn del_bookmark(&mut self, _bookmark: NodeRef<'_>) {
        self.dels += 1;
    }

    fn new_folder(&mut self, _folder: NodeRef<'_>) {
        self.adds += 1;
    }

    fn remove_folder(&mut self, _folder: NodeRef<'_>) {
        self.dels += 1;
    }

    fn add_folder(&mut self, folder: NodeRef<'_>) {
        self.new_folder(folder);
    }

    fn del_folder(&mut self, folder: NodeRef<'_>) {
        self.remove_folder(folder);
    }
}

/// One recorded edit, addressed by folder names from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    AddBookmark { path: Vec<String>, name: String, url: String },
    DelBookmark { path: Vec<String>, name: String, url: String },
    AddFolder { path: Vec<String>, name: String },
    DelFolder { path: Vec<String>, name: String },
}

/// Observer sink recording every item-level change, with folders expanded
/// into their descendants.
#[derive(Debug, Default)]
pub struct ChangeLog {
    path: Vec<String>,
    ops: Vec<EditOp>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<EditOp> {
        self.ops
    }
}

impl DiffSink for ChangeLog {
    fn push_folder(&mut self, folder: NodeRef<'_>) {
        self.path.push(folder.name().to_string());
    }

    fn pop_folder(&mut self) {
        self.path.pop();
    }

    fn add_bookmark(&mut self, bookmark: NodeRef<'_>) {
        self.ops.push(EditOp::AddBookmark {
            path: self.path.clone(),
            name: bookmark.name().to_string(),
            url: bookmark.href().map(Href::format).unwrap_or_default(),
        });
    }

    fn del_bookmark(&mut self, bookmark: NodeRef<'_>) {
        self.ops.push(EditOp::DelBookmark {
            path: self.path.clone(),
            name: bookmark.name().to_string(),
            url: bookmark.href().map(Href::format).unwrap_or_default(),
        });
    }

    fn new_folder(&mut self, folder: NodeRef<'_>) {
        self.ops.push(EditOp::AddFolder {
            path: self.path.clone(),
            name: folder.name().to_string(),
        });
    }

    fn remove_folder(&mut self, folder: NodeRef<'_>) {
        self.ops.push(EditOp::DelFolder {
            path: self.path.clone(),
            name: folder.name().to_string(),
        });
    }
}
