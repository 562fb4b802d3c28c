//! Diagnostic chains: the frame history an error accumulates while it
//! propagates.
//!
//! A [`Chain`] is a persistent singly-linked list ordered outermost frame
//! first. Tails are shared through `Arc`, which gives the two operations the
//! filter engine leans on their cost bounds:
//!
//! - [`Chain::push_outer`] is O(1): a propagating error gains frames at the
//!   outer end.
//! - [`Chain::concat`] is O(len(head)): the head is copied, the tail is
//!   linked in without being walked.
//!
//! Every walk here is a loop. Chain length is controlled by the caller (an
//! aggregate that bubbled through thousands of supervisors), so nothing may
//! recurse on it, including `Drop`.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// One call-frame record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame {
    function: String,
    file: String,
    line: u32,
}

impl Frame {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Frame {
            function: function.into(),
            file: file.into(),
            line,
        }
    }

    /// Frame for the caller's source location.
    #[track_caller]
    pub fn here(function: impl Into<String>) -> Self {
        Self::at(function, Location::caller())
    }

    /// Frame for an explicit source location.
    pub fn at(function: impl Into<String>, location: &Location<'_>) -> Self {
        Frame::new(function, location.file(), location.line())
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.function, self.file, self.line)
    }
}

struct Link {
    frame: Frame,
    next: Option<Arc<Link>>,
}

/// Ordered frame history, outermost first.
///
/// Cloning is O(1) and shares every link.
#[derive(Clone, Default)]
pub struct Chain {
    head: Option<Arc<Link>>,
    len: usize,
}

impl Chain {
    /// The empty chain.
    pub fn new() -> Self {
        Chain::default()
    }

    /// Build a chain from frames given outermost first.
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        let frames: Vec<Frame> = frames.into_iter().collect();
        let mut chain = Chain::new();
        for frame in frames.into_iter().rev() {
            chain.push_outer(frame);
        }
        chain
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Add a frame at the outer end.
    pub fn push_outer(&mut self, frame: Frame) {
        let next = self.head.take();
        self.head = Some(Arc::new(Link { frame, next }));
        self.len += 1;
    }

    /// Frames from outermost to innermost.
    pub fn iter(&self) -> Frames<'_> {
        Frames {
            next: self.head.as_deref(),
        }
    }

    /// Whether both chains are the very same list (not merely equal frames).
    pub fn ptr_eq(&self, other: &Chain) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// `head`'s frames followed by `tail`'s frames.
    ///
    /// `head` is copied link by link; `tail` is shared as-is and never
    /// walked.
    pub fn concat(head: &Chain, tail: &Chain) -> Chain {
        if head.is_empty() {
            return tail.clone();
        }
        if tail.is_empty() {
            return head.clone();
        }

        let head_frames: Vec<&Frame> = head.iter().collect();
        let mut current = tail.head.clone();
        for frame in head_frames.into_iter().rev() {
            current = Some(Arc::new(Link {
                frame: frame.clone(),
                next: current,
            }));
        }
        Chain {
            head: current,
            len: head.len + tail.len,
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(link) = next {
            match Arc::try_unwrap(link) {
                Ok(mut link) => next = link.next.take(),
                // Still shared by another chain, which will free it.
                Err(_) => break,
            }
        }
    }
}

impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for Chain {}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl FromIterator<Frame> for Chain {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Chain::from_frames(iter)
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Frame;
    type IntoIter = Frames<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a chain's frames, outermost first.
pub struct Frames<'a> {
    next: Option<&'a Link>,
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.next?;
        self.next = link.next.as_deref();
        Some(&link.frame)
    }
}
