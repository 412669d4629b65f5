//! Change Applier for marksync.
//!
//! A [`DiffSink`] that replays an edit script onto a live target tree.
//!
//! - [`ApplyStrategy::Merge`] only adds: new items are copied into the
//!   target, deletes are ignored. Nothing a user added anywhere is lost.
//! - [`ApplyStrategy::Edit`] adds and deletes, forcing the target to match
//!   the new side of the diff.
//!
//! Folder paths are resolved from the target root by case-insensitive name.
//! Each level resolves to every same-named folder under the previous level,
//! mirroring the pooling done by the diff engine: adds go into the first
//! folder of the set, deletes search the whole set.

use tracing::{debug, warn};

use crate::managers::tree_builder::TreeBuilder;
use crate::services::diff_engine::{DiffEngine, DiffSink, NodeRef};
use crate::types::bookmark::{eq_ignore_case, BookmarkModel, NodeId};
use crate::types::href::Href;

/// How deletes in an edit script are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStrategy {
    /// Fold new items in, never delete.
    Merge,
    /// Apply adds and deletes.
    Edit,
}

/// One entry of the folder path being replayed.
struct Level {
    name: String,
    /// Matching folders in the target; empty if the path does not exist there.
    folders: Vec<NodeId>,
}

/// Applies a diff stream to `target`.
pub struct ChangeApplier<'t> {
    target: &'t mut BookmarkModel,
    strategy: ApplyStrategy,
    levels: Vec<Level>,
    applied: usize,
    skipped: usize,
}

impl<'t> ChangeApplier<'t> {
    pub fn new(target: &'t mut BookmarkModel, strategy: ApplyStrategy) -> Self {
        let root = target.root();
        Self {
            target,
            strategy,
            levels: vec![Level {
                name: String::new(),
                folders: vec![root],
            }],
            applied: 0,
            skipped: 0,
        }
    }

    pub fn strategy(&self) -> ApplyStrategy {
        self.strategy
    }

    /// Number of operations that changed the target.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Number of deletes that found nothing to remove.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn current_folders(&self) -> &[NodeId] {
        self.levels.last().map(|l| l.folders.as_slice()).unwrap_or(&[])
    }

    /// First folder of the current level, creating missing path segments.
    fn insertion_folder(&mut self) -> NodeId {
        let mut parent = self.target.root();
        for index in 0..self.levels.len() {
            if let Some(first) = self.levels[index].folders.first() {
                parent = *first;
                continue;
            }
            let name = self.levels[index].name.clone();
            warn!(folder = %name, "path missing in target, creating it");
            let mut builder = TreeBuilder::at(self.target, parent);
            let created = builder.start_folder();
            builder.set_name(&name);
            builder.end_folder();
            self.levels[index].folders.push(created);
            parent = created;
        }
        parent
    }

    fn find_bookmark(&self, name: &str, href: Option<&Href>) -> Option<NodeId> {
        self.current_folders().iter().find_map(|folder| {
            self.target.children(*folder).iter().copied().find(|child| {
                let node = self.target.get(*child);
                node.as_bookmark().is_some_and(|b| {
                    eq_ignore_case(&b.item.name, name) && href.map_or(true, |h| b.href == *h)
                })
            })
        })
    }

    fn find_folder(&self, name: &str) -> Option<NodeId> {
        self.current_folders()
            .iter()
            .find_map(|folder| self.target.find_child_folder(*folder, name))
    }

    fn remove(&mut self, node: NodeId) {
        TreeBuilder::new(self.target).remove(node);
        self.applied += 1;
    }
}

impl DiffSink for ChangeApplier<'_> {
    fn push_folder(&mut self, folder: NodeRef<'_>) {
        let name = folder.name();
        let folders = self
            .current_folders()
            .iter()
            .flat_map(|parent| self.target.children(*parent).iter().copied())
            .filter(|child| {
                let node = self.target.get(*child);
                node.is_folder() && eq_ignore_case(node.name(), name)
            })
            .collect();
        self.levels.push(Level {
            name: name.to_string(),
            folders,
        });
    }

    fn pop_folder(&mut self) {
        assert!(self.levels.len() > 1, "pop_folder without matching push_folder");
        self.levels.pop();
    }

    fn add_bookmark(&mut self, bookmark: NodeRef<'_>) {
        let Some(shared) = bookmark.node().as_bookmark() else {
            return;
        };
        let folder = self.insertion_folder();
        TreeBuilder::at(self.target, folder).insert_bookmark(shared);
        self.applied += 1;
    }

    fn del_bookmark(&mut self, bookmark: NodeRef<'_>) {
        if self.strategy == ApplyStrategy::Merge {
            return;
        }
        match self.find_bookmark(bookmark.name(), bookmark.href()) {
            Some(node) => self.remove(node),
            None => {
                debug!(name = bookmark.name(), "bookmark to delete not found");
                self.skipped += 1;
            }
        }
    }

    fn new_folder(&mut self, folder: NodeRef<'_>) {
        let parent = self.insertion_folder();
        let mut builder = TreeBuilder::at(self.target, parent);
        builder.start_folder();
        builder.set_name(folder.name());
        builder.end_folder();
        self.applied += 1;
    }

    fn remove_folder(&mut self, folder: NodeRef<'_>) {
        if self.strategy == ApplyStrategy::Merge {
            return;
        }
        match self.find_folder(folder.name()) {
            Some(node) => self.remove(node),
            None => self.skipped += 1,
        }
    }

    /// Copies the whole subtree in one step.
    fn add_folder(&mut self, folder: NodeRef<'_>) {
        let parent = self.insertion_folder();
        TreeBuilder::at(self.target, parent).copy_subtree(folder.tree, folder.id);
        self.applied += 1;
    }

    /// Removes the whole subtree in one step.
    fn del_folder(&mut self, folder: NodeRef<'_>) {
        self.remove_folder(folder);
    }
}

/// Diffs `new` against `old` and applies the script to `target`.
///
/// Returns the number of operations that changed `target`.
pub fn apply(
    engine: &DiffEngine,
    strategy: ApplyStrategy,
    new: &BookmarkModel,
    old: &BookmarkModel,
    target: &mut BookmarkModel,
) -> usize {
    let applied = {
        let mut applier = ChangeApplier::new(target, strategy);
        engine.diff(new, old, &mut applier);
        applier.applied()
    };
    debug_assert!(target.is_valid());
    applied
}
