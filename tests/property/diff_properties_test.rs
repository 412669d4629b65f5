//! Property-based tests for the diff engine and change applier.
//!
//! Names are drawn from a small alphabet, so sibling folders and bookmarks
//! sharing a name are common and exercise the pooling of same-named items.

use std::collections::BTreeSet;

use marksync::managers::change_applier::{self, ApplyStrategy};
use marksync::managers::tree_builder::TreeBuilder;
use marksync::services::diff_engine::DiffEngine;
use marksync::types::bookmark::BookmarkModel;
use marksync::types::href::Href;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Node {
    Bookmark(u8, u8),
    Folder(u8, Vec<Node>),
}

fn arb_level() -> impl Strategy<Value = Vec<Node>> {
    let leaf = (0u8..8, 0u8..4).prop_map(|(name, url)| Node::Bookmark(name, url));
    let node = leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (0u8..8, 0u8..4).prop_map(|(name, url)| Node::Bookmark(name, url)),
            (0u8..8, prop::collection::vec(inner, 0..4)).prop_map(|(name, kids)| Node::Folder(name, kids)),
        ]
    });
    prop::collection::vec(node, 0..6)
}

fn build(builder: &mut TreeBuilder<'_>, nodes: &[Node]) {
    for node in nodes {
        match node {
            Node::Bookmark(name, url) => {
                builder.start_bookmark();
                builder.set_name(&format!("n{}", name));
                builder.set_bookmark_href(&format!("https://h{}.example.com/", url));
                builder.end_bookmark();
            }
            Node::Folder(name, kids) => {
                builder.start_folder();
                builder.set_name(&format!("n{}", name));
                builder.push_folder();
                build(builder, kids);
                builder.pop_folder();
                builder.end_folder();
            }
        }
    }
}

fn tree(nodes: &[Node]) -> BookmarkModel {
    let mut model = BookmarkModel::new();
    build(&mut TreeBuilder::new(&mut model), nodes);
    model
}

fn arb_tree() -> impl Strategy<Value = BookmarkModel> {
    arb_level().prop_map(|nodes| tree(&nodes))
}

/// Every bookmark as (folder path, name, url).
fn placed_bookmarks(model: &BookmarkModel) -> BTreeSet<(Vec<String>, String, String)> {
    model
        .descendants(model.root())
        .into_iter()
        .filter_map(|id| {
            let node = model.get(id);
            let bookmark = node.as_bookmark()?;
            Some((model.path_of(id), node.name().to_string(), bookmark.href.format()))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Applying diff(new, old) with Edit onto a copy of old yields new.
    #[test]
    fn prop_edit_reproduces_new(old in arb_tree(), new in arb_tree()) {
        let engine = DiffEngine::new();
        let mut target = old.clone();
        change_applier::apply(&engine, ApplyStrategy::Edit, &new, &old, &mut target);

        prop_assert!(target.is_valid());
        prop_assert!(engine.equivalent(&target, &new));
    }

    /// Merge only adds, so every bookmark of old stays where it was.
    #[test]
    fn prop_merge_never_loses_bookmarks(old in arb_tree(), new in arb_tree()) {
        let engine = DiffEngine::new();
        let mut target = old.clone();
        change_applier::apply(&engine, ApplyStrategy::Merge, &new, &old, &mut target);

        prop_assert!(target.is_valid());
        let kept = placed_bookmarks(&target);
        for placed in placed_bookmarks(&old) {
            prop_assert!(kept.contains(&placed), "lost {:?}", placed);
        }
    }

    /// A tree has no edits against itself or its clone.
    #[test]
    fn prop_self_diff_is_empty(model in arb_tree()) {
        let engine = DiffEngine::new();
        prop_assert_eq!(engine.count(&model, &model), 0);
        prop_assert!(engine.equivalent(&model, &model.clone()));
    }

    /// Equivalence does not depend on the direction of the diff.
    #[test]
    fn prop_equivalence_is_symmetric(a in arb_tree(), b in arb_tree()) {
        let engine = DiffEngine::new();
        prop_assert_eq!(engine.count(&a, &b) == 0, engine.count(&b, &a) == 0);
    }

    /// Items whose names start with the hidden prefix never show up in a diff.
    #[test]
    fn prop_hidden_items_are_invisible(model in arb_tree(), names in prop::collection::vec("[a-z]{1,6}", 1..4)) {
        let engine = DiffEngine::with_hidden_prefix(Some('.'));
        let mut with_hidden = model.clone();
        {
            let mut builder = TreeBuilder::new(&mut with_hidden);
            for name in &names {
                builder.start_bookmark();
                builder.set_name(&format!(".{}", name));
                builder.set_bookmark_href(&format!("https://{}.example.org/", name));
                builder.end_bookmark();
            }
        }
        prop_assert_eq!(engine.count(&with_hidden, &model), 0);
        prop_assert_eq!(engine.count(&model, &with_hidden), 0);
    }

    /// Spellings with the same canonical form share one interned value.
    #[test]
    fn prop_equal_urls_share_instance(host in "[a-z]{1,10}", path in "[a-z]{0,8}") {
        let lower = Href::intern(&format!("https://{}.com/{}", host, path));
        let upper = Href::intern(&format!("HTTPS://{}.COM/{}", host.to_uppercase(), path));

        prop_assert_eq!(lower.format(), upper.format());
        prop_assert!(Href::ptr_eq(&lower, &upper));
    }
}
