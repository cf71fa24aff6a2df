//! Frame graph handles.
//!
//! Handles are plain indices into the frame graph's registries. They are only
//! meaningful for the [`FrameGraph`](super::FrameGraph) that issued them and
//! only until its next `reset()`.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of a pass, assigned in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

impl PassId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the pass in declaration order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Handle to a texture or buffer declared in the frame graph.
///
/// Every `write` returns a new handle value for the same resource with the
/// version bumped, so that a read of the written contents has to go through
/// the handle returned by the write. Equality and hashing only consider the
/// resource index.
#[derive(Clone, Copy)]
pub struct ResourceHandle {
    index: u32,
    version: u32,
}

impl ResourceHandle {
    /// A handle that never refers to a resource.
    pub const INVALID: Self = Self {
        index: u32::MAX,
        version: 0,
    };

    pub(crate) fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            version: 0,
        }
    }

    pub(crate) fn with_version(self, version: u32) -> Self {
        Self {
            index: self.index,
            version,
        }
    }

    /// Index of the resource in the registry.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Number of writes that produced this handle value.
    pub fn version(self) -> u32 {
        self.version
    }

    /// Whether the handle may refer to a resource.
    pub fn is_valid(self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for ResourceHandle {}

impl Hash for ResourceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "R{}.v{}", self.index, self.version)
        } else {
            write!(f, "R<invalid>")
        }
    }
}
