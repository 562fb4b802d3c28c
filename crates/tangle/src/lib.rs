//! Error trees for failures that happen together.
//!
//! When several concurrent operations fail at once (the children of a task
//! group, the members of a worker pool) there is no single error to
//! return. This crate models the result as an [`ErrorTree`]: atomic
//! [`LeafError`]s at the leaves and [`MultiError`] aggregates above them,
//! each node carrying the diagnostic [`Chain`] it gathered while
//! propagating.
//!
//! - [`ErrorTree::build`] combines failures, collapsing single-element
//!   lists.
//! - [`filter`] lets a handler keep, replace or drop each leaf and rebuilds
//!   the tree without changing any survivor's end-to-end chain.
//! - [`catch`] / [`CatchGuard`] apply a filter to whatever escapes a body.
//! - [`render`] prints a tree with every embedded error exactly once.
//! - [`install_hook`] / [`report_uncaught`] wire the renderer to a
//!   program's top level.
//!
//! ```text
//! let result = tangle::catch(
//!     |leaf| Ok(if leaf.is::<Cancelled>() { None } else { Some(leaf) }),
//!     || pool.join(),
//! );
//! ```
//!
//! # Logging
//!
//! Decisions are traced with `tracing` (`RUST_LOG=tangle=debug`); see
//! [`init_tracing`].

mod chain;
mod errors;
mod filter;
mod guard;
mod hook;
mod render;
mod tree;

#[cfg(test)]
mod testing;

use std::sync::Once;

pub use chain::{Chain, Frame, Frames};
pub use errors::{HookError, TreeError};
pub use filter::filter;
pub use guard::{catch, CatchGuard};
pub use hook::{install_hook, install_stderr_hook, report_uncaught, write_report};
pub use render::{render, render_with, Lines, RenderConfig, Report};
pub use tree::{ErrorTree, LeafError, MultiError, PanicMessage};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=tangle=debug` or `RUST_LOG=tangle=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
