//! Reporting errors that escaped every guard.
//!
//! Nothing here runs unless the host asks for it. A program registers a
//! reporter once at startup with [`install_hook`] (or
//! [`install_stderr_hook`]) and calls [`report_uncaught`] from its top
//! level, e.g. when `main`'s work returns an [`ErrorTree`].

use std::io::{self, Write};
use std::sync::OnceLock;

use crate::errors::HookError;
use crate::render::{render_with, RenderConfig};
use crate::tree::ErrorTree;

type Hook = Box<dyn Fn(&ErrorTree) + Send + Sync>;

static HOOK: OnceLock<Hook> = OnceLock::new();

/// Register the reporter used by [`report_uncaught`].
///
/// Registration happens once per process; later attempts are refused and
/// leave the first reporter in place.
pub fn install_hook(hook: impl Fn(&ErrorTree) + Send + Sync + 'static) -> Result<(), HookError> {
    HOOK.set(Box::new(hook)).map_err(|_| {
        tracing::warn!("uncaught-error reporter already installed; keeping the existing one");
        HookError::AlreadyInstalled
    })
}

/// Register a reporter that renders to stderr.
pub fn install_stderr_hook(config: RenderConfig) -> Result<(), HookError> {
    install_hook(move |tree| write_to_stderr(tree, &config))
}

/// Hand an uncaught tree to the registered reporter.
///
/// Without a registration the tree is rendered to stderr with the default
/// configuration.
pub fn report_uncaught(tree: &ErrorTree) {
    match HOOK.get() {
        Some(hook) => hook(tree),
        None => write_to_stderr(tree, &RenderConfig::default()),
    }
}

/// Render `tree` into `writer`, one line at a time.
pub fn write_report<W: Write>(writer: &mut W, tree: &ErrorTree, config: &RenderConfig) -> io::Result<()> {
    for line in render_with(tree, config) {
        writeln!(writer, "{line}")?;
    }
    writer.flush()
}

fn write_to_stderr(tree: &ErrorTree, config: &RenderConfig) {
    let stderr = io::stderr();
    let mut handle = stderr.lock();
    if let Err(err) = write_report(&mut handle, tree, config) {
        tracing::warn!(error = %err, "failed to write uncaught error report");
    }
}
