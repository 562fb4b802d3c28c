//! Stack growth for recursive walks over error trees.
//!
//! Aggregates nest as deep as the code that produced them: a supervisor
//! that re-wraps the failures of its children at every level of a task
//! hierarchy can hand the engine a tree thousands of levels deep. The
//! shape pass, the chain push-down and report capture are written as plain
//! recursion, so each recursive step goes through
//! [`ensure_sufficient_stack`] instead of relying on the thread's fixed
//! stack.
//!
//! # Platform Support
//!
//! - **Native targets**: `stacker` allocates a fresh segment when the
//!   remaining stack drops below the red zone.
//! - **WASM targets**: calls straight through.
//!
//! ```text
//! fn visit(node: &ErrorTree) {
//!     ensure_sufficient_stack(|| {
//!         for child in node.children() {
//!             visit(child);
//!         }
//!     })
//! }
//! ```

/// Remaining stack below which a new segment is allocated (100KB).
const RED_ZONE: usize = 100 * 1024;

/// Size of each newly allocated stack segment (1MB).
const SEGMENT_SIZE: usize = 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
///
/// Cheap when the stack is healthy: a single comparison against the
/// current stack pointer.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
