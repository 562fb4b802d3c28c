use pretty_assertions::assert_eq;

use super::*;
use crate::chain::Chain;
use crate::testing::{frames, key, multi, names, value, KeyError, ValueError};

fn leaf_of(tree: &ErrorTree) -> &LeafError {
    tree.as_leaf().unwrap()
}

/// End-to-end chain of every leaf, in pre-order.
fn logical_chains(root: &ErrorTree) -> Vec<(String, Vec<String>)> {
    fn walk(node: &ErrorTree, inherited: &Chain, out: &mut Vec<(String, Vec<String>)>) {
        let combined = Chain::concat(inherited, &node.chain());
        match node {
            ErrorTree::Leaf(leaf) => out.push((leaf.to_string(), names(&combined))),
            ErrorTree::Multi(multi) => {
                for child in multi.children() {
                    walk(child, &combined, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(root, &Chain::new(), &mut out);
    out
}

/// `Multi[Multi[A, B], C]` with a distinct frame on every node.
fn sample() -> (ErrorTree, ErrorTree, ErrorTree, ErrorTree) {
    let a = value("A");
    let b = key("B");
    let c = value("C");
    a.set_chain(frames(&["a_raise"]));
    b.set_chain(frames(&["b_raise"]));
    c.set_chain(frames(&["c_raise"]));
    let inner = multi(vec![a.clone(), b.clone()]);
    inner.set_chain(frames(&["inner_nursery"]));
    let root = multi(vec![inner, c.clone()]);
    root.set_chain(frames(&["main", "outer_nursery"]));
    (root, a, b, c)
}

#[test]
fn test_identity_handler_returns_same_tree() {
    let (root, ..) = sample();
    let before = logical_chains(&root);
    let result = root.filter_with(Some).unwrap();
    assert!(result.ptr_eq(&root));
    assert_eq!(logical_chains(&result), before);
    // Nothing was pushed down: frames stay where they were.
    assert_eq!(names(&root.chain()), ["main", "outer_nursery"]);
}

#[test]
fn test_identity_handler_on_bare_leaf() {
    let leaf = value("alone");
    leaf.set_chain(frames(&["f"]));
    let result = leaf.filter_with(Some).unwrap();
    assert!(result.ptr_eq(&leaf));
    assert_eq!(names(&result.chain()), ["f"]);
}

#[test]
fn test_drop_everything_returns_none() {
    let (root, ..) = sample();
    assert!(root.filter_with(|_| None).is_none());
    assert!(value("x").filter_with(|_| None).is_none());
}

#[test]
fn test_drop_value_errors_collapses_to_bare_leaf() {
    let (root, _, b, _) = sample();
    let result = root
        .filter_with(|leaf| (!leaf.is::<ValueError>()).then_some(leaf))
        .unwrap();

    assert!(result.ptr_eq(&b));
    assert_eq!(
        names(&result.chain()),
        ["main", "outer_nursery", "inner_nursery", "b_raise"]
    );
}

#[test]
fn test_drop_inner_pair_keeps_identical_leaf() {
    let (root, a, b, c) = sample();
    let a_leaf = leaf_of(&a).clone();
    let b_leaf = leaf_of(&b).clone();
    let result = root
        .filter_with(|leaf| (!leaf.ptr_eq(&a_leaf) && !leaf.ptr_eq(&b_leaf)).then_some(leaf))
        .unwrap();

    assert!(result.ptr_eq(&c));
    assert_eq!(names(&result.chain()), ["main", "outer_nursery", "c_raise"]);
    // The rebuilt aggregates handed their frames down.
    assert!(root.chain().is_empty());
}

#[test]
fn test_partial_drop_preserves_end_to_end_chains() {
    let d = key("D");
    d.set_chain(frames(&["d_raise"]));
    let (inner_root, ..) = sample();
    let root = multi(vec![inner_root, d]);
    root.set_chain(frames(&["top"]));

    let before = logical_chains(&root);
    let result = root
        .filter_with(|leaf| (leaf.error().to_string() != "C").then_some(leaf))
        .unwrap();
    let after = logical_chains(&result);

    let expected: Vec<_> = before
        .into_iter()
        .filter(|(name, _)| name != "ValueError: C")
        .collect();
    assert_eq!(after, expected);
}

#[test]
fn test_preserved_subtree_takes_inherited_prefix() {
    let (root, _, _, c) = sample();
    let inner = root.as_multi().unwrap().children()[0].clone();
    let c_leaf = leaf_of(&c).clone();

    let result = root
        .filter_with(|leaf| (!leaf.ptr_eq(&c_leaf)).then_some(leaf))
        .unwrap();

    assert!(result.ptr_eq(&inner));
    assert_eq!(
        names(&result.chain()),
        ["main", "outer_nursery", "inner_nursery"]
    );
    // Leaves under the preserved aggregate are untouched.
    let first = &result.as_multi().unwrap().children()[0];
    assert_eq!(names(&first.chain()), ["a_raise"]);
}

#[test]
fn test_replacement_links_context_and_takes_chain() {
    let (root, a, ..) = sample();
    let a_leaf = leaf_of(&a).clone();
    let result = root
        .filter_with(|leaf| {
            if leaf.ptr_eq(&a_leaf) {
                Some(LeafError::new(KeyError("A replaced")))
            } else {
                Some(leaf)
            }
        })
        .unwrap();

    let outer = result.as_multi().unwrap();
    assert!(!result.ptr_eq(&root));
    let inner = outer.children()[0].as_multi().unwrap();
    let replacement = inner.children()[0].as_leaf().unwrap();
    assert_eq!(replacement.to_string(), "KeyError: A replaced");
    assert!(replacement.context().unwrap().ptr_eq(&a));
    assert_eq!(
        names(&replacement.chain()),
        ["main", "outer_nursery", "inner_nursery", "a_raise"]
    );
    // The original keeps the same end-to-end history.
    assert_eq!(
        names(&a.chain()),
        ["main", "outer_nursery", "inner_nursery", "a_raise"]
    );
}

#[test]
fn test_handler_runs_once_per_leaf_in_pre_order() {
    let tree = multi(vec![
        multi(vec![value("1"), key("2")]),
        value("3"),
        multi(vec![multi(vec![key("4"), value("5")]), key("6")]),
    ]);
    let mut seen = Vec::new();
    let result = tree.filter_with(|leaf| {
        seen.push(leaf.error().to_string());
        Some(leaf)
    });
    assert!(result.unwrap().ptr_eq(&tree));
    assert_eq!(seen, ["1", "2", "3", "4", "5", "6"]);
}

#[test]
fn test_shared_leaf_is_handled_once() {
    let shared = value("shared");
    let tree = multi(vec![
        multi(vec![shared.clone(), key("x")]),
        shared.clone(),
    ]);
    let mut calls = 0;
    let result = tree.filter_with(|leaf| {
        calls += 1;
        Some(leaf)
    });
    assert_eq!(calls, 2);
    assert!(result.unwrap().ptr_eq(&tree));
}

#[test]
fn test_handler_error_stops_the_walk() {
    #[derive(Debug, PartialEq)]
    struct HandlerBroke(String);

    let tree = multi(vec![value("ok"), key("boom"), value("never")]);
    let mut visited = Vec::new();
    let result = filter(
        |leaf: LeafError| {
            let message = leaf.error().to_string();
            visited.push(message.clone());
            if leaf.is::<KeyError>() {
                Err(HandlerBroke(message))
            } else {
                Ok(Some(leaf))
            }
        },
        &tree,
    );
    assert_eq!(result.unwrap_err(), HandlerBroke("boom".to_owned()));
    assert_eq!(visited, ["ok", "boom"]);
}

#[test]
fn test_replacement_that_would_cycle_is_left_unlinked() {
    let original = LeafError::new(ValueError("original"));
    let replacement = LeafError::new(KeyError("replacement"));
    original
        .set_context(ErrorTree::Leaf(replacement.clone()))
        .unwrap();

    let tree = ErrorTree::Leaf(original.clone());
    let result = tree.filter_with(|_| Some(replacement.clone())).unwrap();
    assert!(result.as_leaf().unwrap().ptr_eq(&replacement));
    assert!(replacement.context().is_none());
}

#[test]
fn test_deep_nesting() {
    let mut tree = multi(vec![value("bottom"), key("keep")]);
    for depth in 0..20_000 {
        tree = multi(vec![tree, value(if depth % 2 == 0 { "even" } else { "odd" })]);
    }
    let result = tree
        .filter_with(|leaf| leaf.is::<KeyError>().then_some(leaf))
        .unwrap();
    assert_eq!(result.to_string(), "KeyError: keep");
}
