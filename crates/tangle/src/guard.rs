//! Catch guards: filter whatever error leaves a region of code.
//!
//! A guard wraps a body. If the body fails, the failure is run through
//! [`filter`] and one of three things happens:
//!
//! - the handler changed nothing: the *same* tree propagates, untouched,
//! - every leaf was handled: the body counts as completed (`Ok(None)`),
//! - anything else: the rebuilt tree propagates in place of the original.
//!
//! Propagating a rebuilt tree records one outer frame for the guard's call
//! site. That is the only bookkeeping done on the way out; cause and
//! context links are left exactly as [`filter`] set them, so a replacement
//! still points at the leaf it replaced rather than at the tree that was
//! caught.

use std::panic::{self, AssertUnwindSafe, Location};

use crate::chain::Frame;
use crate::filter::filter;
use crate::tree::{ErrorTree, LeafError};

/// Frame name recorded when a guard propagates a rebuilt tree.
const GUARD_FRAME: &str = "tangle::catch";

/// A reusable catch guard around a leaf handler.
pub struct CatchGuard<H> {
    handler: H,
}

enum Outcome {
    Unchanged,
    Suppressed,
    Replaced(ErrorTree),
}

impl<H> CatchGuard<H> {
    pub fn new(handler: H) -> Self {
        CatchGuard { handler }
    }

    /// Run a fallible body under the guard.
    ///
    /// Returns `Ok(Some(value))` when the body succeeds and `Ok(None)` when
    /// its failure was handled away entirely. The propagated tree and the
    /// handler's own failure share the error type `E`; with `E = ErrorTree`
    /// a handler can fail by returning a tree of its own.
    #[track_caller]
    pub fn run<T, E>(&mut self, body: impl FnOnce() -> Result<T, ErrorTree>) -> Result<Option<T>, E>
    where
        H: FnMut(LeafError) -> Result<Option<LeafError>, E>,
        E: From<ErrorTree>,
    {
        let location = Location::caller();
        let caught = match body() {
            Ok(value) => return Ok(Some(value)),
            Err(caught) => caught,
        };
        match self.resolve(&caught, location)? {
            Outcome::Unchanged => Err(E::from(caught)),
            Outcome::Suppressed => Ok(None),
            Outcome::Replaced(tree) => Err(E::from(tree)),
        }
    }

    /// Run a body that fails by panicking.
    ///
    /// Panic payloads are read with [`ErrorTree::from_panic`]. Payloads that
    /// are not errors, unchanged trees and rebuilt trees continue unwinding
    /// (tree payloads as a boxed [`ErrorTree`]); a fully handled tree ends
    /// the unwind and yields `Ok(None)`. A failing handler ends the unwind
    /// with `Err`.
    #[track_caller]
    pub fn run_unwind<T, E>(&mut self, body: impl FnOnce() -> T) -> Result<Option<T>, E>
    where
        H: FnMut(LeafError) -> Result<Option<LeafError>, E>,
    {
        let location = Location::caller();
        let payload = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(value) => return Ok(Some(value)),
            Err(payload) => payload,
        };
        let caught = match ErrorTree::try_from_payload(payload) {
            Ok(tree) => tree,
            Err(payload) => panic::resume_unwind(payload),
        };
        match self.resolve(&caught, location)? {
            Outcome::Unchanged => panic::resume_unwind(Box::new(caught)),
            Outcome::Suppressed => Ok(None),
            Outcome::Replaced(tree) => panic::resume_unwind(Box::new(tree)),
        }
    }

    fn resolve<E>(
        &mut self,
        caught: &ErrorTree,
        location: &'static Location<'static>,
    ) -> Result<Outcome, E>
    where
        H: FnMut(LeafError) -> Result<Option<LeafError>, E>,
    {
        let outcome = match filter(&mut self.handler, caught)? {
            Some(tree) if tree.ptr_eq(caught) => Outcome::Unchanged,
            None => Outcome::Suppressed,
            Some(tree) => {
                tree.push_frame(Frame::at(GUARD_FRAME, location));
                Outcome::Replaced(tree)
            }
        };
        tracing::debug!(
            outcome = match &outcome {
                Outcome::Unchanged => "unchanged",
                Outcome::Suppressed => "suppressed",
                Outcome::Replaced(_) => "replaced",
            },
            at = %location,
            "catch guard resolved error"
        );
        Ok(outcome)
    }
}

/// Run `body` under a one-shot [`CatchGuard`] built from `handler`.
#[track_caller]
pub fn catch<T, E, H>(handler: H, body: impl FnOnce() -> Result<T, ErrorTree>) -> Result<Option<T>, E>
where
    H: FnMut(LeafError) -> Result<Option<LeafError>, E>,
    E: From<ErrorTree>,
{
    CatchGuard::new(handler).run(body)
}
