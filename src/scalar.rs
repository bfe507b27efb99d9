//! Scalar text spans.
//!
//! Node keys and values are not owned strings: they are views of bytes that
//! live either in the source buffer the tree was built from, or in the tree's
//! own arena. Arena views are stored as offset/length pairs, so growing the
//! arena never invalidates a stored span; only borrowed slices handed out by
//! accessors go stale across growth.

/// A view of scalar text.
///
/// `Source` borrows from the externally owned input buffer (lifetime `'t`);
/// `Arena` indexes the owning tree's arena. The variant tag is what the tree
/// consults when deciding whether a span must be copied into a destination
/// arena during cross-tree operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Span<'t> {
    /// Borrowed from the source buffer.
    Source(&'t [u8]),
    /// Owned by the tree's arena: `off..off + len` bytes.
    Arena { off: u32, len: u32 },
}

impl<'t> Span<'t> {
    /// Length of the viewed text in bytes.
    #[inline]
    pub fn len(self) -> usize {
        match self {
            Span::Source(s) => s.len(),
            Span::Arena { len, .. } => len as usize,
        }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Whether the span lives in the owning tree's arena.
    #[inline]
    pub fn is_arena(self) -> bool {
        matches!(self, Span::Arena { .. })
    }
}

impl Default for Span<'_> {
    #[inline]
    fn default() -> Self {
        Span::Source(&[])
    }
}

impl<'t> From<&'t [u8]> for Span<'t> {
    #[inline]
    fn from(s: &'t [u8]) -> Self {
        Span::Source(s)
    }
}

impl<'t> From<&'t str> for Span<'t> {
    #[inline]
    fn from(s: &'t str) -> Self {
        Span::Source(s.as_bytes())
    }
}

impl<'t, const N: usize> From<&'t [u8; N]> for Span<'t> {
    #[inline]
    fn from(s: &'t [u8; N]) -> Self {
        Span::Source(s)
    }
}

/// The text attached to one side (key or value) of a node.
///
/// Bundles the scalar text itself with its YAML tag and anchor name, any of
/// which may be empty. Presence of an anchor is additionally tracked by the
/// node's `KEYANCH`/`VALANCH` type bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scalar<'t> {
    /// The textual value.
    pub scalar: Span<'t>,
    /// YAML tag, possibly empty.
    pub tag: Span<'t>,
    /// Anchor name, possibly empty.
    pub anchor: Span<'t>,
}

impl<'t> Scalar<'t> {
    /// Reset all three spans to empty.
    #[inline]
    pub fn clear(&mut self) {
        *self = Scalar::default();
    }
}
