//! Errors raised by the engine itself.
//!
//! Failures of caller-supplied handlers are never wrapped in these; they
//! reach the caller as the handler's own error type.

/// Misuse of the tree API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// An aggregate was built from a malformed child list.
    #[error("invalid aggregate: {reason}")]
    InvalidAggregate { reason: &'static str },
    /// A value that is not an error was offered where one was required.
    #[error("expected an error value, found a non-error panic payload")]
    InvalidInput,
    /// Linking a cause or context would make an error reachable from itself.
    #[error("linking `{target}` would make it its own cause or context")]
    ReferenceCycle { target: String },
}

impl TreeError {
    pub(crate) const EMPTY: TreeError = TreeError::InvalidAggregate { reason: "empty" };
}

/// Failure to register the top-level reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("an uncaught-error reporter is already installed")]
    AlreadyInstalled,
}
