//! Fixtures shared by the unit tests.

use crate::chain::{Chain, Frame};
use crate::tree::ErrorTree;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct ValueError(pub &'static str);

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct KeyError(pub &'static str);

pub(crate) fn value(message: &'static str) -> ErrorTree {
    ErrorTree::leaf(ValueError(message))
}

pub(crate) fn key(message: &'static str) -> ErrorTree {
    ErrorTree::leaf(KeyError(message))
}

/// Chain of frames named `names`, outermost first.
pub(crate) fn frames(names: &[&str]) -> Chain {
    names
        .iter()
        .zip(1u32..)
        .map(|(name, line)| Frame::new(*name, "tasks.rs", line))
        .collect()
}

pub(crate) fn names(chain: &Chain) -> Vec<String> {
    chain.iter().map(|frame| frame.function().to_owned()).collect()
}

pub(crate) fn multi(children: Vec<ErrorTree>) -> ErrorTree {
    match ErrorTree::build(children) {
        Ok(tree) => tree,
        Err(err) => panic!("fixture aggregate: {err}"),
    }
}
