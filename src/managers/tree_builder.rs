//! Tree Builder for marksync.
//!
//! Cursor-based builder that is the only way to mutate a [`BookmarkModel`].
//! Format readers drive it node by node; the change appliers use the
//! subtree helpers ([`TreeBuilder::insert_bookmark`],
//! [`TreeBuilder::copy_subtree`], [`TreeBuilder::remove`]).
//!
//! Exactly one node is "current" at a time. Calling a setter that does not
//! apply to the current node's variant is a programming error and panics.

use std::sync::Arc;

use tracing::warn;

use crate::types::bookmark::{
    Bookmark, BookmarkModel, BookmarkNode, Folder, HeaderMark, ItemAttrs, NodeId, NodeKind,
    Subscription, Timestamp,
};
use crate::types::href::Href;

/// Builder over a mutable model.
pub struct TreeBuilder<'m> {
    model: &'m mut BookmarkModel,
    targets: Vec<NodeId>,
    current: Option<NodeId>,
}

impl<'m> TreeBuilder<'m> {
    /// Creates a builder that inserts into the model's root folder.
    pub fn new(model: &'m mut BookmarkModel) -> Self {
        let root = model.root();
        Self::at(model, root)
    }

    /// Creates a builder that inserts into an existing folder.
    pub fn at(model: &'m mut BookmarkModel, folder: NodeId) -> Self {
        assert!(
            model.get(folder).is_folder(),
            "builder insertion target must be a folder"
        );
        Self {
            model,
            targets: vec![folder],
            current: None,
        }
    }

    pub fn model(&self) -> &BookmarkModel {
        &*self.model
    }

    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// The folder new nodes are appended to.
    pub fn insertion_folder(&self) -> NodeId {
        *self.targets.last().unwrap_or(&self.model.root())
    }

    fn begin(&mut self, node: BookmarkNode) -> NodeId {
        let parent = self.insertion_folder();
        let id = self.model.append(parent, node);
        self.current = Some(id);
        id
    }

    fn current_id(&self) -> NodeId {
        match self.current {
            Some(id) => id,
            None => panic!("builder has no current node"),
        }
    }

    fn expect_kind(&self, allowed: &[NodeKind], operation: &str) -> NodeId {
        let id = self.current_id();
        let kind = self.model.get(id).kind();
        assert!(
            allowed.contains(&kind),
            "{} called while current node is a {:?}",
            operation,
            kind
        );
        id
    }

    fn item_mut(&mut self, operation: &str) -> &mut ItemAttrs {
        let id = self.expect_kind(
            &[NodeKind::Bookmark, NodeKind::Folder, NodeKind::Subscription],
            operation,
        );
        match self.model.node_mut(id).item_mut() {
            Some(item) => item,
            None => unreachable!(),
        }
    }

    // ── node lifecycle ───────────────────────────────────────────────────

    pub fn start_bookmark(&mut self) -> NodeId {
        self.begin(BookmarkNode::Bookmark(Arc::new(Bookmark::default())))
    }

    pub fn end_bookmark(&mut self) {
        self.expect_kind(&[NodeKind::Bookmark], "end_bookmark");
        self.current = None;
    }

    pub fn start_folder(&mut self) -> NodeId {
        self.begin(BookmarkNode::Folder(Folder::default()))
    }

    pub fn end_folder(&mut self) {
        self.expect_kind(&[NodeKind::Folder], "end_folder");
        self.current = None;
    }

    pub fn start_subscription(&mut self) -> NodeId {
        self.begin(BookmarkNode::Subscription(Subscription::default()))
    }

    pub fn end_subscription(&mut self) {
        self.expect_kind(&[NodeKind::Subscription], "end_subscription");
        self.current = None;
    }

    /// Makes the current folder the insertion target for following nodes.
    pub fn push_folder(&mut self) {
        let id = self.expect_kind(&[NodeKind::Folder, NodeKind::Subscription], "push_folder");
        self.targets.push(id);
        self.current = None;
    }

    /// Leaves the insertion folder; it becomes current again so it can be ended.
    pub fn pop_folder(&mut self) {
        assert!(self.targets.len() > 1, "pop_folder without matching push_folder");
        self.current = self.targets.pop();
    }

    pub fn new_separator(&mut self) -> NodeId {
        let id = self.begin(BookmarkNode::Separator);
        self.current = None;
        id
    }

    pub fn new_alias(&mut self, target_id: &str) -> NodeId {
        let id = self.begin(BookmarkNode::Alias(target_id.to_string()));
        self.current = None;
        id
    }

    /// Discards the current node together with anything built inside it.
    pub fn undo_current(&mut self) {
        if let Some(id) = self.current.take() {
            self.model.remove_subtree(id);
        }
    }

    /// Makes the root subscription current so its attributes can be set.
    pub fn edit_root(&mut self) {
        self.current = Some(self.model.root());
    }

    /// Makes an existing node current.
    pub fn select(&mut self, node: NodeId) {
        assert!(self.model.contains(node), "select of a removed node");
        self.current = Some(node);
    }

    // ── common item setters ──────────────────────────────────────────────

    pub fn set_name(&mut self, name: &str) {
        self.item_mut("set_name").name = name.to_string();
    }

    /// Sets the item id and registers it in the model's id index.
    ///
    /// An id already owned by another node is dropped with a warning so the
    /// index never maps one id to two nodes.
    pub fn set_id(&mut self, item_id: &str) {
        let node = self.expect_kind(
            &[NodeKind::Bookmark, NodeKind::Folder, NodeKind::Subscription],
            "set_id",
        );
        if !self.model.register_id(item_id, node) {
            warn!(id = item_id, "duplicate bookmark id ignored");
            return;
        }
        let previous = self.item_mut("set_id").id.replace(item_id.to_string());
        if let Some(previous) = previous.filter(|p| p != item_id) {
            self.model.unregister_id(&previous, node);
        }
    }

    pub fn set_description(&mut self, description: Option<&str>) {
        self.item_mut("set_description").description = description.map(str::to_string);
    }

    pub fn set_added(&mut self, added: Timestamp) {
        self.item_mut("set_added").added = added;
    }

    pub fn set_images(&mut self, icon: Option<&str>, image: Option<&str>) {
        let item = self.item_mut("set_images");
        item.icon = icon.map(str::to_string);
        item.image = image.map(str::to_string);
    }

    // ── variant setters ──────────────────────────────────────────────────

    fn bookmark_mut(&mut self, operation: &str) -> &mut Bookmark {
        let id = self.expect_kind(&[NodeKind::Bookmark], operation);
        match self.model.node_mut(id) {
            BookmarkNode::Bookmark(b) => Arc::make_mut(b),
            _ => unreachable!(),
        }
    }

    pub fn set_bookmark_href(&mut self, raw: &str) {
        self.bookmark_mut("set_bookmark_href").href = Href::intern(raw);
    }

    pub fn set_bookmark_href_value(&mut self, href: Href) {
        self.bookmark_mut("set_bookmark_href_value").href = href;
    }

    pub fn set_bookmark_visited(&mut self, visited: Timestamp) {
        self.bookmark_mut("set_bookmark_visited").visited = visited;
    }

    pub fn set_bookmark_modified(&mut self, modified: Timestamp) {
        self.bookmark_mut("set_bookmark_modified").modified = modified;
    }

    pub fn set_folder_folded(&mut self, folded: bool) {
        let id = self.expect_kind(&[NodeKind::Folder, NodeKind::Subscription], "set_folder_folded");
        if let Some(folder) = self.model.node_mut(id).as_folder_mut() {
            folder.folded = folded;
        }
    }

    pub fn set_subscription_seq_no(&mut self, seq_no: i64) {
        let id = self.expect_kind(&[NodeKind::Subscription], "set_subscription_seq_no");
        if let BookmarkNode::Subscription(s) = self.model.node_mut(id) {
            s.seq_no = seq_no;
        }
    }

    /// Marks the current sub-folder as the menu or new-item header.
    pub fn mark_header(&mut self, mark: HeaderMark) {
        let id = self.expect_kind(&[NodeKind::Folder, NodeKind::Subscription], "mark_header");
        assert!(id != self.model.root(), "the root cannot be a header folder");
        self.model.set_header(mark, id);
    }

    // ── subtree helpers for the change appliers ─────────────────────────

    /// Appends a bookmark instance, sharing it with whatever tree it came from.
    pub fn insert_bookmark(&mut self, bookmark: &Arc<Bookmark>) -> NodeId {
        let shared = match bookmark.item.id.as_deref() {
            Some(key) if self.model.find_by_id(key).is_some() => {
                let mut copy = Bookmark::clone(bookmark);
                copy.item.id = None;
                Arc::new(copy)
            }
            _ => Arc::clone(bookmark),
        };
        let key = shared.item.id.clone();
        let id = self.begin(BookmarkNode::Bookmark(shared));
        if let Some(key) = key {
            self.model.register_id(&key, id);
        }
        self.current = None;
        id
    }

    /// Copies `node` from `source` (with all descendants) into the insertion folder.
    ///
    /// Folders are copied, bookmarks are shared. Ids that already exist in
    /// the target are dropped from the copy.
    pub fn copy_subtree(&mut self, source: &BookmarkModel, node: NodeId) -> NodeId {
        let copied = match source.get(node) {
            BookmarkNode::Bookmark(b) => return self.insert_bookmark(b),
            BookmarkNode::Folder(f) => {
                let mut shell = Folder {
                    item: f.item.clone(),
                    folded: f.folded,
                    children: Vec::new(),
                };
                let key = shell.item.id.take();
                let id = self.begin(BookmarkNode::Folder(shell));
                self.adopt_id(key, id);
                id
            }
            BookmarkNode::Subscription(s) => {
                let mut shell = Subscription {
                    folder: Folder {
                        item: s.folder.item.clone(),
                        folded: s.folder.folded,
                        children: Vec::new(),
                    },
                    seq_no: s.seq_no,
                };
                let key = shell.folder.item.id.take();
                let id = self.begin(BookmarkNode::Subscription(shell));
                self.adopt_id(key, id);
                id
            }
            BookmarkNode::Separator => return self.new_separator(),
            BookmarkNode::Alias(target) => return self.new_alias(target),
        };

        self.targets.push(copied);
        for child in source.children(node) {
            self.copy_subtree(source, *child);
        }
        self.targets.pop();
        self.current = None;
        copied
    }

    fn adopt_id(&mut self, key: Option<String>, node: NodeId) {
        let Some(key) = key else { return };
        if self.model.register_id(&key, node) {
            if let Some(item) = self.model.node_mut(node).item_mut() {
                item.id = Some(key);
            }
        }
    }

    /// Removes `node` and everything below it.
    pub fn remove(&mut self, node: NodeId) {
        if self.current == Some(node) {
            self.current = None;
        }
        assert!(
            !self.targets.contains(&node),
            "cannot remove an open insertion folder"
        );
        self.model.remove_subtree(node);
    }
}
