//! Text rendering of error trees.
//!
//! [`Report::capture`] snapshots a tree into a printable structure, and
//! [`Report::lines`] turns it into text lines lazily. Each error is printed
//! as:
//!
//! ```text
//! <linked cause or context, rendered the same way>
//!
//! The above error was the direct cause of the following error:
//!
//! Diagnostic chain (outermost first):
//!   at supervise (src/pool.rs:88)
//!   at fetch (src/fetch.rs:12)
//! KeyError: missing key
//! ```
//!
//! and an aggregate appends one `Details of embedded error N:` block per
//! child, indented.
//!
//! Errors are tracked by identity so nothing is printed twice:
//!
//! - every member of the tree gets exactly one embedded block, the first
//!   time it is reached;
//! - a cause or context that is itself a tree member is referenced in one
//!   line instead of being printed again;
//! - other causes and contexts are deduplicated along a single rendering
//!   path only. Whatever an embedded block marks as seen is forgotten once
//!   the block is done, so a cause shared by two siblings is shown under
//!   both.
//!
//! An aggregate's header lists its direct children; a nested aggregate
//! appears there only as `MultiError(<n> errors)`.

use std::mem;

use rustc_hash::FxHashSet;
use tangle_stack::ensure_sufficient_stack;

use crate::chain::Frame;
use crate::tree::ErrorTree;

const CAUSE_BANNER: &str = "The above error was the direct cause of the following error:";
const CONTEXT_BANNER: &str = "During handling of the above error, another error occurred:";

/// Rendering options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    /// Spaces used to indent embedded blocks.
    pub indent: usize,
    /// Render cause and context links.
    pub chain: bool,
    /// Maximum frames printed per diagnostic chain (`None` = all).
    pub frame_limit: Option<usize>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            indent: 2,
            chain: true,
            frame_limit: None,
        }
    }
}

impl RenderConfig {
    #[must_use]
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    #[must_use]
    pub fn with_chain(mut self, chain: bool) -> Self {
        self.chain = chain;
        self
    }

    #[must_use]
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkKind {
    Cause,
    Context,
}

impl LinkKind {
    fn banner(self) -> &'static str {
        match self {
            LinkKind::Cause => CAUSE_BANNER,
            LinkKind::Context => CONTEXT_BANNER,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LinkKind::Cause => "caused by",
            LinkKind::Context => "while handling",
        }
    }
}

#[derive(Clone, Debug)]
enum Linked {
    /// Rendered in full before the error it is linked from.
    Full(Box<Report>),
    /// Printed elsewhere; only its header is repeated.
    Shown(String),
}

/// Snapshot of one error and everything rendered beneath it.
#[derive(Clone, Debug)]
pub struct Report {
    header: String,
    frames: Vec<Frame>,
    omitted_frames: usize,
    link: Option<(LinkKind, Linked)>,
    embedded: Vec<Report>,
    indent: usize,
}

/// Identity sets shared by one capture.
struct Capture<'a> {
    config: &'a RenderConfig,
    /// Every node below the root; links to these are only referenced.
    members: FxHashSet<usize>,
    /// Nodes that already have an embedded block.
    placed: FxHashSet<usize>,
    seen: Seen,
}

/// Nodes rendered on the current path, with an undo log for branches.
#[derive(Default)]
struct Seen {
    set: FxHashSet<usize>,
    log: Vec<usize>,
}

impl Seen {
    fn insert(&mut self, id: usize) {
        if self.set.insert(id) {
            self.log.push(id);
        }
    }

    fn contains(&self, id: usize) -> bool {
        self.set.contains(&id)
    }

    fn mark(&self) -> usize {
        self.log.len()
    }

    /// Forget everything inserted since `mark`.
    fn rewind(&mut self, mark: usize) {
        for id in self.log.drain(mark..) {
            self.set.remove(&id);
        }
    }
}

impl Report {
    pub fn capture(root: &ErrorTree, config: &RenderConfig) -> Report {
        let mut capture = Capture {
            config,
            members: members_below(root),
            placed: FxHashSet::default(),
            seen: Seen::default(),
        };
        capture.placed.insert(root.id());
        capture.report(root)
    }

    /// The header line, e.g. `KeyError: missing key`.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Blocks for the embedded errors, in tree order.
    pub fn embedded(&self) -> &[Report] {
        &self.embedded
    }

    /// Text lines, produced on demand.
    pub fn lines(self) -> Lines {
        Lines {
            stack: vec![Pending::Report {
                column: 0,
                report: self,
            }],
        }
    }

    /// Push this report's output onto `stack`, last line first.
    ///
    /// Embedded and linked reports are pushed whole and expanded when
    /// they reach the top.
    fn expand(&mut self, column: usize, stack: &mut Vec<Pending>) {
        let line = |text: String| Pending::Line { column, text };

        let embedded = mem::take(&mut self.embedded);
        for (i, report) in embedded.into_iter().enumerate().rev() {
            stack.push(Pending::Report {
                column: column + self.indent,
                report,
            });
            stack.push(line(String::new()));
            stack.push(line(format!("Details of embedded error {}:", i + 1)));
            stack.push(line(String::new()));
        }

        stack.push(line(mem::take(&mut self.header)));

        if !self.frames.is_empty() || self.omitted_frames > 0 {
            if self.omitted_frames > 0 {
                stack.push(line(format!("  ... {} more frames", self.omitted_frames)));
            }
            for frame in self.frames.iter().rev() {
                stack.push(line(format!("  at {frame}")));
            }
            stack.push(line("Diagnostic chain (outermost first):".to_owned()));
        }

        match self.link.take() {
            None => {}
            Some((kind, Linked::Full(report))) => {
                stack.push(line(String::new()));
                stack.push(line(kind.banner().to_owned()));
                stack.push(line(String::new()));
                stack.push(Pending::Report {
                    column,
                    report: *report,
                });
            }
            Some((kind, Linked::Shown(shown))) => stack.push(line(format!(
                "{}: {shown} [shown in an embedded error]",
                kind.label()
            ))),
        }
    }
}

impl Drop for Report {
    fn drop(&mut self) {
        let mut pending = mem::take(&mut self.embedded);
        if let Some((_, Linked::Full(report))) = self.link.take() {
            pending.push(*report);
        }
        while let Some(mut report) = pending.pop() {
            pending.append(&mut report.embedded);
            if let Some((_, Linked::Full(linked))) = report.link.take() {
                pending.push(*linked);
            }
        }
    }
}

impl Capture<'_> {
    fn report(&mut self, node: &ErrorTree) -> Report {
        self.seen.insert(node.id());

        let chain = node.chain();
        let shown = self.config.frame_limit.unwrap_or(usize::MAX).min(chain.len());
        let frames: Vec<Frame> = chain.iter().take(shown).cloned().collect();

        let (header, link, embedded) = match node {
            ErrorTree::Leaf(leaf) => {
                let link = if self.config.chain {
                    match (leaf.cause(), leaf.context()) {
                        (Some(cause), _) => Some((LinkKind::Cause, cause)),
                        (None, Some(context)) => Some((LinkKind::Context, context)),
                        (None, None) => None,
                    }
                } else {
                    None
                };
                let link = link.and_then(|(kind, target)| self.link(kind, &target));
                (leaf.to_string(), link, Vec::new())
            }
            ErrorTree::Multi(multi) => {
                let mut embedded = Vec::new();
                for child in multi.children() {
                    if self.seen.contains(child.id()) || !self.placed.insert(child.id()) {
                        continue;
                    }
                    let mark = self.seen.mark();
                    embedded.push(ensure_sufficient_stack(|| self.report(child)));
                    self.seen.rewind(mark);
                }
                let members: Vec<String> = multi.children().iter().map(summary).collect();
                (format!("MultiError: {}", members.join(", ")), None, embedded)
            }
        };

        Report {
            header,
            frames,
            omitted_frames: chain.len() - shown,
            link,
            embedded,
            indent: self.config.indent,
        }
    }

    fn link(&mut self, kind: LinkKind, target: &ErrorTree) -> Option<(LinkKind, Linked)> {
        if self.members.contains(&target.id()) {
            return Some((kind, Linked::Shown(summary(target))));
        }
        if self.seen.contains(target.id()) {
            // Cycle back into this rendering path.
            return None;
        }
        let report = ensure_sufficient_stack(|| self.report(target));
        Some((kind, Linked::Full(Box::new(report))))
    }
}

/// One-line form of a node inside a header.
fn summary(node: &ErrorTree) -> String {
    match node {
        ErrorTree::Leaf(leaf) => leaf.to_string(),
        ErrorTree::Multi(multi) => format!("MultiError({} errors)", multi.children().len()),
    }
}

/// Every node strictly below `root` in the tree shape.
fn members_below(root: &ErrorTree) -> FxHashSet<usize> {
    let mut members = FxHashSet::default();
    let mut stack: Vec<&ErrorTree> = match root {
        ErrorTree::Multi(multi) => multi.children().iter().collect(),
        ErrorTree::Leaf(_) => Vec::new(),
    };
    while let Some(node) = stack.pop() {
        if !members.insert(node.id()) {
            continue;
        }
        if let ErrorTree::Multi(multi) = node {
            stack.extend(multi.children());
        }
    }
    members
}

/// Work item of [`Lines`].
enum Pending {
    Line { column: usize, text: String },
    Report { column: usize, report: Report },
}

/// Lazy line iterator returned by [`Report::lines`].
///
/// Walks an explicit stack, so nesting depth costs heap and not call stack.
pub struct Lines {
    stack: Vec<Pending>,
}

impl Iterator for Lines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            match self.stack.pop()? {
                Pending::Line { column, text } => {
                    if text.is_empty() || column == 0 {
                        return Some(text);
                    }
                    return Some(format!("{:column$}{text}", ""));
                }
                Pending::Report { column, mut report } => report.expand(column, &mut self.stack),
            }
        }
    }
}

/// Render `root` with the default configuration.
pub fn render(root: &ErrorTree) -> Lines {
    render_with(root, &RenderConfig::default())
}

pub fn render_with(root: &ErrorTree, config: &RenderConfig) -> Lines {
    Report::capture(root, config).lines()
}
