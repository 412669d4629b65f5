//! Nested, serde-friendly form of a bookmark tree.
//!
//! Used for the snapshot database, the JSON file store and the remote
//! exchange body. Reading goes through [`TreeBuilder`] like every other
//! format reader.

use serde::{Deserialize, Serialize};

use crate::managers::tree_builder::TreeBuilder;
use crate::types::bookmark::{BookmarkModel, BookmarkNode, HeaderMark, ItemAttrs, NodeId};

/// Current layout version written into [`SerialTree::version`].
pub const SERIAL_VERSION: u32 = 1;

/// A whole tree: root attributes, sync token and children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialTree {
    pub version: u32,
    /// Sync token carried by the root subscription.
    pub seq_no: i64,
    #[serde(flatten)]
    pub root: ItemAttrs,
    #[serde(default)]
    pub children: Vec<SerialNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SerialNode {
    Bookmark {
        #[serde(flatten)]
        item: ItemAttrs,
        href: String,
        #[serde(default)]
        modified: i64,
        #[serde(default)]
        visited: i64,
    },
    Folder {
        #[serde(flatten)]
        item: ItemAttrs,
        #[serde(default)]
        folded: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<SerialHeader>,
        #[serde(default)]
        children: Vec<SerialNode>,
    },
    Subscription {
        #[serde(flatten)]
        item: ItemAttrs,
        #[serde(default)]
        folded: bool,
        #[serde(default)]
        seq_no: i64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<SerialHeader>,
        #[serde(default)]
        children: Vec<SerialNode>,
    },
    Separator,
    Alias {
        target: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialHeader {
    Menu,
    NewItem,
}

impl From<HeaderMark> for SerialHeader {
    fn from(mark: HeaderMark) -> Self {
        match mark {
            HeaderMark::Menu => SerialHeader::Menu,
            HeaderMark::NewItem => SerialHeader::NewItem,
        }
    }
}

impl From<SerialHeader> for HeaderMark {
    fn from(header: SerialHeader) -> Self {
        match header {
            SerialHeader::Menu => HeaderMark::Menu,
            SerialHeader::NewItem => HeaderMark::NewItem,
        }
    }
}

/// Converts a model into its nested form.
pub fn to_serial(model: &BookmarkModel) -> SerialTree {
    let root = model.root();
    SerialTree {
        version: SERIAL_VERSION,
        seq_no: model.seq_no(),
        root: model.get(root).item().cloned().unwrap_or_default(),
        children: serial_children(model, root),
    }
}

fn serial_children(model: &BookmarkModel, folder: NodeId) -> Vec<SerialNode> {
    model
        .children(folder)
        .iter()
        .map(|child| serial_node(model, *child))
        .collect()
}

fn serial_node(model: &BookmarkModel, id: NodeId) -> SerialNode {
    let headers = || {
        model
            .header_marks(id)
            .into_iter()
            .map(SerialHeader::from)
            .collect()
    };
    match model.get(id) {
        BookmarkNode::Bookmark(b) => SerialNode::Bookmark {
            item: b.item.clone(),
            href: b.href.format(),
            modified: b.modified,
            visited: b.visited,
        },
        BookmarkNode::Folder(f) => SerialNode::Folder {
            item: f.item.clone(),
            folded: f.folded,
            headers: headers(),
            children: serial_children(model, id),
        },
        BookmarkNode::Subscription(s) => SerialNode::Subscription {
            item: s.folder.item.clone(),
            folded: s.folder.folded,
            seq_no: s.seq_no,
            headers: headers(),
            children: serial_children(model, id),
        },
        BookmarkNode::Separator => SerialNode::Separator,
        BookmarkNode::Alias(target) => SerialNode::Alias {
            target: target.clone(),
        },
    }
}

/// Rebuilds a model from its nested form.
pub fn from_serial(tree: &SerialTree) -> BookmarkModel {
    let mut model = BookmarkModel::new();
    {
        let mut builder = TreeBuilder::new(&mut model);
        builder.edit_root();
        apply_item(&mut builder, &tree.root);
        builder.set_subscription_seq_no(tree.seq_no);
        builder.end_subscription();
        for node in &tree.children {
            build_node(&mut builder, node);
        }
    }
    debug_assert!(model.is_valid());
    model
}

fn apply_item(builder: &mut TreeBuilder<'_>, item: &ItemAttrs) {
    builder.set_name(&item.name);
    if let Some(id) = item.id.as_deref() {
        builder.set_id(id);
    }
    builder.set_description(item.description.as_deref());
    builder.set_added(item.added);
    builder.set_images(item.icon.as_deref(), item.image.as_deref());
}

fn build_children(builder: &mut TreeBuilder<'_>, headers: &[SerialHeader], children: &[SerialNode]) {
    for header in headers {
        builder.mark_header(HeaderMark::from(*header));
    }
    builder.push_folder();
    for child in children {
        build_node(builder, child);
    }
    builder.pop_folder();
}

fn build_node(builder: &mut TreeBuilder<'_>, node: &SerialNode) {
    match node {
        SerialNode::Bookmark {
            item,
            href,
            modified,
            visited,
        } => {
            builder.start_bookmark();
            apply_item(builder, item);
            builder.set_bookmark_href(href);
            builder.set_bookmark_modified(*modified);
            builder.set_bookmark_visited(*visited);
            builder.end_bookmark();
        }
        SerialNode::Folder {
            item,
            folded,
            headers,
            children,
        } => {
            builder.start_folder();
            apply_item(builder, item);
            builder.set_folder_folded(*folded);
            build_children(builder, headers, children);
            builder.end_folder();
        }
        SerialNode::Subscription {
            item,
            folded,
            seq_no,
            headers,
            children,
        } => {
            builder.start_subscription();
            apply_item(builder, item);
            builder.set_folder_folded(*folded);
            builder.set_subscription_seq_no(*seq_no);
            build_children(builder, headers, children);
            builder.end_subscription();
        }
        SerialNode::Separator => {
            builder.new_separator();
        }
        SerialNode::Alias { target } => {
            builder.new_alias(target);
        }
    }
}

pub fn to_json(model: &BookmarkModel) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&to_serial(model))
}

pub fn from_json(json: &str) -> Result<BookmarkModel, serde_json::Error> {
    let tree: SerialTree = serde_json::from_str(json)?;
    Ok(from_serial(&tree))
}
