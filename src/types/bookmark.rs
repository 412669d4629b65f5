//! Bookmark tree data model.
//!
//! A [`BookmarkModel`] is an arena of [`BookmarkNode`]s addressed by stable
//! [`NodeId`]s. The root is always a subscription folder whose sequence
//! number carries the sync token. Bookmarks are held behind `Arc`, so cloning
//! a model (or copying a subtree into another model) shares bookmark
//! instances while folders are copied.
//!
//! Mutation goes through [`crate::managers::tree_builder::TreeBuilder`]; this
//! module only exposes the crate-internal primitives it needs.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::href::Href;

/// Seconds since the UNIX epoch; `0` means unknown.
pub type Timestamp = i64;

/// Stable index of a node inside one [`BookmarkModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Attributes shared by bookmarks, folders and subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAttrs {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub added: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A saved link.
#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub item: ItemAttrs,
    pub href: Href,
    pub modified: Timestamp,
    pub visited: Timestamp,
}

impl Default for Bookmark {
    fn default() -> Self {
        Self {
            item: ItemAttrs::default(),
            href: Href::empty(),
            modified: 0,
            visited: 0,
        }
    }
}

/// An ordered container of child nodes.
#[derive(Debug, Clone, Default)]
pub struct Folder {
    pub item: ItemAttrs,
    pub folded: bool,
    pub(crate) children: Vec<NodeId>,
}

impl Folder {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A folder that also carries a server sequence number.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    pub folder: Folder,
    pub seq_no: i64,
}

/// Discriminant of a [`BookmarkNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Bookmark,
    Folder,
    Subscription,
    Separator,
    Alias,
}

/// One node of a bookmark tree.
#[derive(Debug, Clone)]
pub enum BookmarkNode {
    Bookmark(Arc<Bookmark>),
    Folder(Folder),
    Subscription(Subscription),
    Separator,
    /// Non-owning reference to another item, by id.
    Alias(String),
}

impl BookmarkNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            BookmarkNode::Bookmark(_) => NodeKind::Bookmark,
            BookmarkNode::Folder(_) => NodeKind::Folder,
            BookmarkNode::Subscription(_) => NodeKind::Subscription,
            BookmarkNode::Separator => NodeKind::Separator,
            BookmarkNode::Alias(_) => NodeKind::Alias,
        }
    }

    pub fn is_bookmark(&self) -> bool {
        matches!(self, BookmarkNode::Bookmark(_))
    }

    /// True for folders and subscriptions.
    pub fn is_folder(&self) -> bool {
        matches!(self, BookmarkNode::Folder(_) | BookmarkNode::Subscription(_))
    }

    pub fn is_separator(&self) -> bool {
        matches!(self, BookmarkNode::Separator)
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, BookmarkNode::Alias(_))
    }

    /// Common item attributes; `None` for separators and aliases.
    pub fn item(&self) -> Option<&ItemAttrs> {
        match self {
            BookmarkNode::Bookmark(b) => Some(&b.item),
            BookmarkNode::Folder(f) => Some(&f.item),
            BookmarkNode::Subscription(s) => Some(&s.folder.item),
            BookmarkNode::Separator | BookmarkNode::Alias(_) => None,
        }
    }

    /// Mutable item attributes. Shared bookmarks are copied on write.
    pub(crate) fn item_mut(&mut self) -> Option<&mut ItemAttrs> {
        match self {
            BookmarkNode::Bookmark(b) => Some(&mut Arc::make_mut(b).item),
            BookmarkNode::Folder(f) => Some(&mut f.item),
            BookmarkNode::Subscription(s) => Some(&mut s.folder.item),
            BookmarkNode::Separator | BookmarkNode::Alias(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        self.item().map(|item| item.name.as_str()).unwrap_or("")
    }

    pub fn as_bookmark(&self) -> Option<&Arc<Bookmark>> {
        match self {
            BookmarkNode::Bookmark(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            BookmarkNode::Folder(f) => Some(f),
            BookmarkNode::Subscription(s) => Some(&s.folder),
            _ => None,
        }
    }

    pub(crate) fn as_folder_mut(&mut self) -> Option<&mut Folder> {
        match self {
            BookmarkNode::Folder(f) => Some(f),
            BookmarkNode::Subscription(s) => Some(&mut s.folder),
            _ => None,
        }
    }

    /// Value equality of the node itself, ignoring children.
    pub fn shallow_eq(&self, other: &BookmarkNode) -> bool {
        match (self, other) {
            (BookmarkNode::Bookmark(a), BookmarkNode::Bookmark(b)) => Arc::ptr_eq(a, b) || a == b,
            (BookmarkNode::Folder(a), BookmarkNode::Folder(b)) => {
                a.item == b.item && a.folded == b.folded
            }
            (BookmarkNode::Subscription(a), BookmarkNode::Subscription(b)) => {
                a.seq_no == b.seq_no && a.folder.item == b.folder.item && a.folder.folded == b.folder.folded
            }
            (BookmarkNode::Separator, BookmarkNode::Separator) => true,
            (BookmarkNode::Alias(a), BookmarkNode::Alias(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: BookmarkNode,
    parent: Option<NodeId>,
}

/// Which header mark a sub-folder carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMark {
    Menu,
    NewItem,
}

/// A complete bookmark tree: root subscription, arena, id index and headers.
#[derive(Debug, Clone)]
pub struct BookmarkModel {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    root: NodeId,
    ids: HashMap<String, NodeId>,
    menu_header: Option<NodeId>,
    new_item_header: Option<NodeId>,
}

impl Default for BookmarkModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BookmarkModel {
    /// Creates an empty tree holding only the root subscription.
    pub fn new() -> Self {
        let root = Slot {
            node: BookmarkNode::Subscription(Subscription::default()),
            parent: None,
        };
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
            ids: HashMap::new(),
            menu_header: None,
            new_item_header: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the node for `id`, or `None` if it was removed.
    pub fn node(&self, id: NodeId) -> Option<&BookmarkNode> {
        self.slots.get(id.0)?.as_ref().map(|slot| &slot.node)
    }

    /// Returns the node for a live `id`.
    ///
    /// # Panics
    /// Panics if `id` does not address a live node of this model.
    pub fn get(&self, id: NodeId) -> &BookmarkNode {
        match self.node(id) {
            Some(node) => node,
            None => panic!("dangling node id {:?}", id),
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0)?.as_ref()?.parent
    }

    /// Children of a folder in insertion order; empty for other node kinds.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .and_then(BookmarkNode::as_folder)
            .map(Folder::children)
            .unwrap_or(&[])
    }

    /// The sync token carried by the root subscription.
    pub fn seq_no(&self) -> i64 {
        match self.get(self.root) {
            BookmarkNode::Subscription(s) => s.seq_no,
            _ => 0,
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Follows an alias to the node it names. Non-alias nodes resolve to themselves.
    pub fn resolve_alias(&self, node: NodeId) -> Option<NodeId> {
        match self.node(node)? {
            BookmarkNode::Alias(target) => self.find_by_id(target),
            _ => Some(node),
        }
    }

    pub fn menu_header(&self) -> Option<NodeId> {
        self.menu_header
    }

    pub fn new_item_header(&self) -> Option<NodeId> {
        self.new_item_header
    }

    pub fn header_marks(&self, node: NodeId) -> Vec<HeaderMark> {
        let mut marks = Vec::new();
        if self.menu_header == Some(node) {
            marks.push(HeaderMark::Menu);
        }
        if self.new_item_header == Some(node) {
            marks.push(HeaderMark::NewItem);
        }
        marks
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// True if the root has no children.
    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    pub fn id_count(&self) -> usize {
        self.ids.len()
    }

    /// Every node below `from` in depth-first pre-order, `from` excluded.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(from).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    pub fn bookmark_count(&self) -> usize {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.get(*id).is_bookmark())
            .count()
    }

    pub fn folder_count(&self) -> usize {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.get(*id).is_folder())
            .count()
    }

    /// First child folder named `name` (case-insensitive).
    pub fn find_child_folder(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|child| {
            let node = self.get(*child);
            node.is_folder() && eq_ignore_case(node.name(), name)
        })
    }

    /// Walks folder names from the root, first match at each level.
    pub fn find_folder_path<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.root, |at, name| self.find_child_folder(at, name.as_ref()))
    }

    /// Names of the folders from the root (excluded) down to `node` (excluded).
    pub fn path_of(&self, node: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut at = self.parent(node);
        while let Some(id) = at {
            if id == self.root {
                break;
            }
            names.push(self.get(id).name().to_string());
            at = self.parent(id);
        }
        names.reverse();
        names
    }

    /// Structural value equality of two subtrees, possibly in different models.
    pub fn subtree_eq(&self, node: NodeId, other: &BookmarkModel, other_node: NodeId) -> bool {
        let (a, b) = (self.get(node), other.get(other_node));
        if !a.shallow_eq(b) {
            return false;
        }
        if self.header_marks(node) != other.header_marks(other_node) {
            return false;
        }
        let (ca, cb) = (self.children(node), other.children(other_node));
        ca.len() == cb.len()
            && ca
                .iter()
                .zip(cb)
                .all(|(x, y)| self.subtree_eq(*x, other, *y))
    }

    /// Debug-build structural check: parent links, child kinds and id index.
    pub fn is_valid(&self) -> bool {
        if !matches!(self.node(self.root), Some(BookmarkNode::Subscription(_))) {
            return false;
        }
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let id = NodeId(index);
            if let Some(parent) = slot.parent {
                let Some(parent_node) = self.node(parent) else {
                    return false;
                };
                if !parent_node.children().contains(&id) {
                    return false;
                }
            } else if id != self.root {
                return false;
            }
            for child in self.children(id) {
                if self.parent(*child) != Some(id) {
                    return false;
                }
            }
            if let Some(item_id) = slot.node.item().and_then(|item| item.id.as_deref()) {
                if self.ids.get(item_id) != Some(&id) {
                    return false;
                }
            }
        }
        let headers_ok = [self.menu_header, self.new_item_header]
            .iter()
            .flatten()
            .all(|h| *h != self.root && self.node(*h).is_some_and(BookmarkNode::is_folder));
        headers_ok
            && self.ids.iter().all(|(key, node)| {
                self.node(*node)
                    .and_then(BookmarkNode::item)
                    .and_then(|item| item.id.as_deref())
                    == Some(key.as_str())
            })
    }

    // ── crate-internal mutation primitives (used by TreeBuilder) ─────────

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut BookmarkNode {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(slot) => &mut slot.node,
            None => panic!("dangling node id {:?}", id),
        }
    }

    /// Appends `node` as the last child of `parent`.
    pub(crate) fn append(&mut self, parent: NodeId, node: BookmarkNode) -> NodeId {
        assert!(self.get(parent).is_folder(), "append target must be a folder");
        let slot = Some(Slot {
            node,
            parent: Some(parent),
        });
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = slot;
                NodeId(index)
            }
            None => {
                self.slots.push(slot);
                NodeId(self.slots.len() - 1)
            }
        };
        if let Some(folder) = self.node_mut(parent).as_folder_mut() {
            folder.children.push(id);
        }
        id
    }

    /// Detaches `id` from its parent and frees it with all descendants.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) {
        assert!(id != self.root, "the root cannot be removed");
        if let Some(parent) = self.parent(id) {
            if let Some(folder) = self.node_mut(parent).as_folder_mut() {
                folder.children.retain(|child| *child != id);
            }
        }
        let mut doomed = self.descendants(id);
        doomed.push(id);
        for node in doomed {
            let item_id = self
                .get(node)
                .item()
                .and_then(|item| item.id.clone());
            if let Some(item_id) = item_id {
                if self.ids.get(&item_id) == Some(&node) {
                    self.ids.remove(&item_id);
                }
            }
            if self.menu_header == Some(node) {
                self.menu_header = None;
            }
            if self.new_item_header == Some(node) {
                self.new_item_header = None;
            }
            self.slots[node.0] = None;
            self.free.push(node.0);
        }
    }

    /// Maps `key` to `node`. Returns false if another node already owns the key.
    pub(crate) fn register_id(&mut self, key: &str, node: NodeId) -> bool {
        match self.ids.get(key) {
            Some(owner) if *owner != node => false,
            _ => {
                self.ids.insert(key.to_string(), node);
                true
            }
        }
    }

    pub(crate) fn unregister_id(&mut self, key: &str, node: NodeId) {
        if self.ids.get(key) == Some(&node) {
            self.ids.remove(key);
        }
    }

    pub(crate) fn set_header(&mut self, mark: HeaderMark, node: NodeId) {
        match mark {
            HeaderMark::Menu => self.menu_header = Some(node),
            HeaderMark::NewItem => self.new_item_header = Some(node),
        }
    }
}

impl BookmarkNode {
    fn children(&self) -> &[NodeId] {
        self.as_folder().map(Folder::children).unwrap_or(&[])
    }
}

impl PartialEq for BookmarkModel {
    fn eq(&self, other: &Self) -> bool {
        self.subtree_eq(self.root, other, other.root)
    }
}

/// Case-insensitive name comparison used for folder matching and diff keys.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
