//! Error trees: atomic failures at the leaves, aggregates in between.
//!
//! Nodes are `Arc` handles and are compared by identity, never by content.
//! Two leaves built from equal errors are different leaves; cloning a
//! handle yields the same node. The filter engine uses identity to spot
//! untouched subtrees and the renderer uses it to print each error once.
//!
//! Once built, a node's shape never changes. The mutable parts are the
//! diagnostic chain (every node) and the cause/context links (leaves),
//! each behind its own lock so they can be redistributed while the tree is
//! shared.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tangle_stack::ensure_sufficient_stack;

use crate::chain::{Chain, Frame};
use crate::errors::TreeError;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A node of an error tree.
#[derive(Clone)]
pub enum ErrorTree {
    /// A single atomic failure.
    Leaf(LeafError),
    /// Several failures that happened together.
    Multi(MultiError),
}

/// An atomic failure plus its diagnostic sidecars.
#[derive(Clone)]
pub struct LeafError(Arc<LeafInner>);

struct LeafInner {
    kind: &'static str,
    error: BoxError,
    chain: Mutex<Chain>,
    cause: Mutex<Option<ErrorTree>>,
    context: Mutex<Option<ErrorTree>>,
}

/// Two or more failures, in the order they were collected.
#[derive(Clone)]
pub struct MultiError(Arc<MultiInner>);

struct MultiInner {
    children: Vec<ErrorTree>,
    chain: Mutex<Chain>,
}

impl Drop for MultiInner {
    fn drop(&mut self) {
        // Unlink nested aggregates we hold the last handle to, so deep trees
        // are torn down in a loop rather than by recursion.
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let ErrorTree::Multi(MultiError(inner)) = child {
                if let Ok(mut inner) = Arc::try_unwrap(inner) {
                    pending.append(&mut inner.children);
                }
            }
        }
    }
}

/// Error carried by a panic whose payload was a plain message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PanicMessage(pub String);

/// Last path segment of a type name, without generic arguments.
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl LeafError {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        LeafError(Arc::new(LeafInner {
            kind: short_type_name(std::any::type_name::<E>()),
            error: Box::new(error),
            chain: Mutex::new(Chain::new()),
            cause: Mutex::new(None),
            context: Mutex::new(None),
        }))
    }

    /// Short type name of the wrapped error, e.g. `KeyError`.
    pub fn kind(&self) -> &'static str {
        self.0.kind
    }

    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.0.error.as_ref()
    }

    pub fn downcast_ref<T: Error + 'static>(&self) -> Option<&T> {
        self.0.error.downcast_ref::<T>()
    }

    pub fn is<T: Error + 'static>(&self) -> bool {
        self.0.error.is::<T>()
    }

    pub fn ptr_eq(&self, other: &LeafError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    pub fn chain(&self) -> Chain {
        self.0.chain.lock().clone()
    }

    pub fn set_chain(&self, chain: Chain) {
        *self.0.chain.lock() = chain;
    }

    pub fn push_frame(&self, frame: Frame) {
        self.0.chain.lock().push_outer(frame);
    }

    /// Builder form of [`LeafError::set_chain`].
    #[must_use]
    pub fn with_chain(self, chain: Chain) -> Self {
        self.set_chain(chain);
        self
    }

    /// The error this one was deliberately raised in response to.
    pub fn cause(&self) -> Option<ErrorTree> {
        self.0.cause.lock().clone()
    }

    /// The error that was being handled when this one was raised.
    pub fn context(&self) -> Option<ErrorTree> {
        self.0.context.lock().clone()
    }

    pub fn set_cause(&self, cause: ErrorTree) -> Result<(), TreeError> {
        self.check_link(&cause)?;
        *self.0.cause.lock() = Some(cause);
        Ok(())
    }

    pub fn set_context(&self, context: ErrorTree) -> Result<(), TreeError> {
        self.check_link(&context)?;
        *self.0.context.lock() = Some(context);
        Ok(())
    }

    pub fn with_cause(self, cause: ErrorTree) -> Result<Self, TreeError> {
        self.set_cause(cause)?;
        Ok(self)
    }

    pub fn with_context(self, context: ErrorTree) -> Result<Self, TreeError> {
        self.set_context(context)?;
        Ok(self)
    }

    /// Refuse links that would let this leaf reach itself.
    fn check_link(&self, target: &ErrorTree) -> Result<(), TreeError> {
        if target.reaches(self.id()) {
            return Err(TreeError::ReferenceCycle {
                target: target.to_string(),
            });
        }
        Ok(())
    }
}

impl MultiError {
    pub fn children(&self) -> &[ErrorTree] {
        &self.0.children
    }

    pub fn ptr_eq(&self, other: &MultiError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    /// Frames gathered while the aggregate itself propagated.
    pub fn chain(&self) -> Chain {
        self.0.chain.lock().clone()
    }

    pub fn set_chain(&self, chain: Chain) {
        *self.0.chain.lock() = chain;
    }

    pub fn push_frame(&self, frame: Frame) {
        self.0.chain.lock().push_outer(frame);
    }
}

impl ErrorTree {
    /// Wrap a single error as a leaf.
    pub fn leaf<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        ErrorTree::Leaf(LeafError::new(error))
    }

    /// Combine failures into one tree.
    ///
    /// A single child is returned as-is (same node, no wrapper), so a
    /// one-element aggregate never exists. An empty list is rejected.
    pub fn build(children: impl IntoIterator<Item = ErrorTree>) -> Result<ErrorTree, TreeError> {
        Self::collapse(children.into_iter().collect()).ok_or(TreeError::EMPTY)
    }

    /// [`ErrorTree::build`] without the empty check: `None` for no children.
    pub(crate) fn collapse(mut children: Vec<ErrorTree>) -> Option<ErrorTree> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(ErrorTree::Multi(MultiError(Arc::new(MultiInner {
                children,
                chain: Mutex::new(Chain::new()),
            })))),
        }
    }

    /// Recover a tree from a panic payload.
    ///
    /// Accepts trees, leaves, and the `String` / `&'static str` messages
    /// produced by `panic!`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Result<ErrorTree, TreeError> {
        Self::try_from_payload(payload).map_err(|_| TreeError::InvalidInput)
    }

    /// Like [`ErrorTree::from_panic`], handing back unrecognized payloads.
    pub(crate) fn try_from_payload(
        payload: Box<dyn Any + Send>,
    ) -> Result<ErrorTree, Box<dyn Any + Send>> {
        let payload = match payload.downcast::<ErrorTree>() {
            Ok(tree) => return Ok(*tree),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<LeafError>() {
            Ok(leaf) => return Ok(ErrorTree::Leaf(*leaf)),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<String>() {
            Ok(message) => return Ok(ErrorTree::leaf(PanicMessage(*message))),
            Err(payload) => payload,
        };
        payload
            .downcast::<&'static str>()
            .map(|message| ErrorTree::leaf(PanicMessage((*message).to_owned())))
    }

    pub fn ptr_eq(&self, other: &ErrorTree) -> bool {
        match (self, other) {
            (ErrorTree::Leaf(a), ErrorTree::Leaf(b)) => a.ptr_eq(b),
            (ErrorTree::Multi(a), ErrorTree::Multi(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Identity key for visited sets.
    pub(crate) fn id(&self) -> usize {
        match self {
            ErrorTree::Leaf(leaf) => leaf.id(),
            ErrorTree::Multi(multi) => multi.id(),
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafError> {
        match self {
            ErrorTree::Leaf(leaf) => Some(leaf),
            ErrorTree::Multi(_) => None,
        }
    }

    pub fn as_multi(&self) -> Option<&MultiError> {
        match self {
            ErrorTree::Multi(multi) => Some(multi),
            ErrorTree::Leaf(_) => None,
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            ErrorTree::Leaf(leaf) => leaf.chain(),
            ErrorTree::Multi(multi) => multi.chain(),
        }
    }

    pub fn set_chain(&self, chain: Chain) {
        match self {
            ErrorTree::Leaf(leaf) => leaf.set_chain(chain),
            ErrorTree::Multi(multi) => multi.set_chain(chain),
        }
    }

    /// Record an outer frame, as when the error propagates one level up.
    pub fn push_frame(&self, frame: Frame) {
        match self {
            ErrorTree::Leaf(leaf) => leaf.push_frame(frame),
            ErrorTree::Multi(multi) => multi.push_frame(frame),
        }
    }

    /// Leaves in pre-order (depth first, left to right).
    pub fn leaves(&self) -> Vec<LeafError> {
        let mut leaves = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                ErrorTree::Leaf(leaf) => leaves.push(leaf.clone()),
                ErrorTree::Multi(multi) => stack.extend(multi.children().iter().rev()),
            }
        }
        leaves
    }

    /// Whether the node `target` is reachable from here through children,
    /// causes or contexts.
    fn reaches(&self, target: usize) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            if node.id() == target {
                return true;
            }
            if !visited.insert(node.id()) {
                continue;
            }
            match &node {
                ErrorTree::Leaf(leaf) => {
                    stack.extend(leaf.cause());
                    stack.extend(leaf.context());
                }
                ErrorTree::Multi(multi) => stack.extend(multi.children().iter().cloned()),
            }
        }
        false
    }
}

impl From<LeafError> for ErrorTree {
    fn from(leaf: LeafError) -> Self {
        ErrorTree::Leaf(leaf)
    }
}

impl From<MultiError> for ErrorTree {
    fn from(multi: MultiError) -> Self {
        ErrorTree::Multi(multi)
    }
}

impl fmt::Display for LeafError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.0.error.to_string();
        if message.is_empty() {
            f.write_str(self.0.kind)
        } else {
            write!(f, "{}: {message}", self.0.kind)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ensure_sufficient_stack(|| {
            f.write_str("MultiError(")?;
            for (i, child) in self.children().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        })
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTree::Leaf(leaf) => fmt::Display::fmt(leaf, f),
            ErrorTree::Multi(multi) => fmt::Display::fmt(multi, f),
        }
    }
}

impl fmt::Debug for LeafError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafError")
            .field("kind", &self.0.kind)
            .field("error", &self.0.error)
            .field("frames", &self.0.chain.lock().len())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiError")
            .field("children", &self.0.children)
            .field("frames", &self.0.chain.lock().len())
            .finish()
    }
}

impl fmt::Debug for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTree::Leaf(leaf) => fmt::Debug::fmt(leaf, f),
            ErrorTree::Multi(multi) => fmt::Debug::fmt(multi, f),
        }
    }
}

impl Error for LeafError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.error.source()
    }
}

impl Error for ErrorTree {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ErrorTree::Leaf(leaf) => leaf.source(),
            ErrorTree::Multi(_) => None,
        }
    }
}
