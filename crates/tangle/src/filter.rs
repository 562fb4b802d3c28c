//! Leaf-wise rewriting of error trees.
//!
//! [`filter`] hands every leaf to a handler that keeps it, replaces it, or
//! drops it, then rebuilds the smallest tree that holds the survivors.
//!
//! Semantically the diagnostic chain of a leaf is the concatenation of the
//! chains met on the way down from the root to that leaf. Aggregates carry
//! the frames they gathered while propagating, and those frames are shared
//! by every leaf below them. Filtering must not change any surviving leaf's
//! end-to-end chain, but frames should stay as high in the tree as
//! possible: the shared prefix is stored once, and it reads better.
//!
//! So filtering runs in two passes:
//!
//! 1. **Shape**: rebuild the tree from the handler's answers, ignoring
//!    chains. Aggregates whose subtree came through untouched are reused as
//!    the same node and recorded as *preserved*.
//! 2. **Push-down**: walk the *original* tree carrying the chain
//!    accumulated so far. Leaves receive the full chain, aggregates hand it
//!    to their children and are cleared. A preserved subtree keeps its
//!    internal distribution and only takes the inherited prefix at its own
//!    root.
//!
//! Handlers run once per distinct leaf, in pre-order (depth first, left to
//! right), and strictly one at a time.

use rustc_hash::{FxHashMap, FxHashSet};
use tangle_stack::ensure_sufficient_stack;

use crate::chain::Chain;
use crate::tree::{ErrorTree, LeafError};

/// Apply `handler` to every leaf of `root` and rebuild the tree.
///
/// The handler returns:
/// - `Ok(Some(leaf))` with the same leaf to keep it,
/// - `Ok(Some(other))` to replace it; `other`'s context is pointed at the
///   original leaf,
/// - `Ok(None)` to drop it,
/// - `Err(e)` to abort; `e` is returned as-is and no further leaves are
///   visited.
///
/// Returns `None` when every leaf was dropped, and `root` itself (same node)
/// when nothing changed.
pub fn filter<H, E>(mut handler: H, root: &ErrorTree) -> Result<Option<ErrorTree>, E>
where
    H: FnMut(LeafError) -> Result<Option<LeafError>, E>,
{
    let mut shape = ShapePass {
        handler: &mut handler,
        results: FxHashMap::default(),
        preserved: FxHashSet::default(),
        stats: Stats::default(),
    };
    let filtered = shape.visit(root)?;

    let ShapePass {
        results,
        preserved,
        stats,
        ..
    } = shape;
    let mut push = PushDown {
        results: &results,
        preserved: &preserved,
        visited: FxHashSet::default(),
    };
    push.visit(root, &Chain::new());

    tracing::debug!(
        leaves = stats.leaves,
        kept = stats.kept,
        replaced = stats.replaced,
        dropped = stats.dropped,
        preserved = preserved.len(),
        unchanged = filtered.as_ref().is_some_and(|tree| tree.ptr_eq(root)),
        "filtered error tree"
    );
    Ok(filtered)
}

impl ErrorTree {
    /// [`filter`] for handlers that cannot fail.
    pub fn filter_with<H>(&self, mut handler: H) -> Option<ErrorTree>
    where
        H: FnMut(LeafError) -> Option<LeafError>,
    {
        let result: Result<_, std::convert::Infallible> = filter(|leaf| Ok(handler(leaf)), self);
        match result {
            Ok(tree) => tree,
            Err(never) => match never {},
        }
    }
}

#[derive(Default)]
struct Stats {
    leaves: usize,
    kept: usize,
    replaced: usize,
    dropped: usize,
}

struct ShapePass<'h, H> {
    handler: &'h mut H,
    /// Result per original node, so shared nodes are filtered once.
    results: FxHashMap<usize, Option<ErrorTree>>,
    /// Aggregates returned unchanged.
    preserved: FxHashSet<usize>,
    stats: Stats,
}

impl<H, E> ShapePass<'_, H>
where
    H: FnMut(LeafError) -> Result<Option<LeafError>, E>,
{
    fn visit(&mut self, node: &ErrorTree) -> Result<Option<ErrorTree>, E> {
        if let Some(done) = self.results.get(&node.id()) {
            return Ok(done.clone());
        }
        let result = match node {
            ErrorTree::Leaf(leaf) => self.visit_leaf(leaf)?,
            ErrorTree::Multi(multi) => {
                let mut survivors = Vec::with_capacity(multi.children().len());
                let mut changed = false;
                for child in multi.children() {
                    let filtered = ensure_sufficient_stack(|| self.visit(child))?;
                    match filtered {
                        Some(kept) if kept.ptr_eq(child) => survivors.push(kept),
                        Some(rebuilt) => {
                            changed = true;
                            survivors.push(rebuilt);
                        }
                        None => changed = true,
                    }
                }
                if changed {
                    ErrorTree::collapse(survivors)
                } else {
                    self.preserved.insert(node.id());
                    Some(node.clone())
                }
            }
        };
        self.results.insert(node.id(), result.clone());
        Ok(result)
    }

    fn visit_leaf(&mut self, leaf: &LeafError) -> Result<Option<ErrorTree>, E> {
        self.stats.leaves += 1;
        let Some(handled) = (self.handler)(leaf.clone())? else {
            self.stats.dropped += 1;
            return Ok(None);
        };
        if handled.ptr_eq(leaf) {
            self.stats.kept += 1;
        } else {
            self.stats.replaced += 1;
            if let Err(err) = handled.set_context(ErrorTree::Leaf(leaf.clone())) {
                tracing::warn!(error = %err, "not linking replacement to the error it replaces");
            }
        }
        Ok(Some(ErrorTree::Leaf(handled)))
    }
}

struct PushDown<'a> {
    results: &'a FxHashMap<usize, Option<ErrorTree>>,
    preserved: &'a FxHashSet<usize>,
    visited: FxHashSet<usize>,
}

impl PushDown<'_> {
    fn visit(&mut self, node: &ErrorTree, inherited: &Chain) {
        // A node shared between several parents takes its chain from the
        // first path only.
        if !self.visited.insert(node.id()) {
            return;
        }
        if self.preserved.contains(&node.id()) {
            if !inherited.is_empty() {
                node.set_chain(Chain::concat(inherited, &node.chain()));
            }
            return;
        }

        let combined = Chain::concat(inherited, &node.chain());
        match node {
            ErrorTree::Leaf(leaf) => {
                if let Some(Some(ErrorTree::Leaf(replacement))) = self.results.get(&leaf.id()) {
                    if !replacement.ptr_eq(leaf) {
                        replacement.set_chain(Chain::concat(&combined, &replacement.chain()));
                    }
                }
                leaf.set_chain(combined);
            }
            ErrorTree::Multi(multi) => {
                for child in multi.children() {
                    ensure_sufficient_stack(|| self.visit(child, &combined));
                }
                multi.set_chain(Chain::new());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
