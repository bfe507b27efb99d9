//! The tree: node storage, hierarchy maintenance, and structural mutation.
//!
//! Nodes live in a flat buffer and are addressed by [`NodeId`] handles.
//! Unused records form an intrusive doubly-linked free list threaded through
//! the sibling fields, so claiming and releasing a node is O(1) and the
//! buffer grows without invalidating outstanding handles. All structural
//! operations (insert, remove, move, swap, duplicate, reorder) maintain the
//! parent / first-child / last-child / prev-sibling / next-sibling links.
//!
//! The tree operates in a trust-the-caller regime: contract violations are
//! programming errors and panic with a diagnostic. There are no recoverable
//! errors at this layer.

#[cfg(not(test))]
use alloc::vec::Vec;

use crate::node::{NodeData, NodeId};
use crate::scalar::{Scalar, Span};
use crate::types::NodeType;

/// An arena-backed YAML document tree.
///
/// `'t` is the lifetime of the externally owned source buffer that
/// [`Span::Source`] scalars borrow from. Scalars copied into the tree via
/// [`copy_to_arena`](Self::copy_to_arena) are owned by the tree itself and
/// survive for as long as the tree does.
///
/// Handles are indices: they stay valid across node-buffer growth and across
/// all mutations except [`reorder`](Self::reorder) and
/// [`clear`](Self::clear), which renumber.
///
/// # Example
///
/// ```
/// use yamltree::{NodeType, Tree};
///
/// let mut t = Tree::new();
/// let root = t.claim();
/// t.set_parent(root, None, None);
/// t.to_map(root, NodeType::NOTYPE);
///
/// let a = t.claim();
/// t.set_parent(a, Some(root), None);
/// t.to_keyval(a, "a", "1", NodeType::NOTYPE);
///
/// assert_eq!(t.num_children(root), 1);
/// assert_eq!(t.val(a), b"1");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Tree<'t> {
    nodes: Vec<NodeData<'t>>,
    size: usize,
    free_head: Option<NodeId>,
    free_tail: Option<NodeId>,
    arena: Vec<u8>,
}

impl<'t> Tree<'t> {
    /// Create an empty tree. No memory is allocated until the first claim
    /// or reserve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with room for `node_cap` nodes and `arena_cap` arena
    /// bytes.
    pub fn with_capacity(node_cap: usize, arena_cap: usize) -> Self {
        let mut t = Self::new();
        t.reserve(node_cap, arena_cap);
        t
    }

    // ------------------------------------------------------------------------
    // Node store
    // ------------------------------------------------------------------------

    /// Number of live nodes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true if the tree holds no live nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of node records (live + free).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// The used prefix of the arena.
    #[inline]
    pub fn arena(&self) -> &[u8] {
        &self.arena
    }

    /// Total arena capacity in bytes.
    #[inline]
    pub fn arena_capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Ensure capacity for at least `node_cap` nodes and `arena_cap` arena
    /// bytes. Both dimensions are monotonic; a smaller request is a no-op.
    ///
    /// Growing the node buffer may relocate it in memory, but handles are
    /// indices and remain valid.
    pub fn reserve(&mut self, node_cap: usize, arena_cap: usize) {
        if node_cap > self.nodes.len() {
            assert!(
                node_cap <= u32::MAX as usize,
                "node capacity {} exceeds the handle range",
                node_cap
            );
            let first = self.nodes.len();
            self.nodes.resize_with(node_cap, NodeData::default);
            // stitch the new records into a contiguous free sublist
            for i in first..node_cap {
                let n = &mut self.nodes[i];
                n.prev_sibling = (i > first).then(|| NodeId::new(i - 1));
                n.next_sibling = (i + 1 < node_cap).then(|| NodeId::new(i + 1));
            }
            match self.free_tail {
                Some(tail) => {
                    self.nd_mut(tail).next_sibling = Some(NodeId::new(first));
                    self.nodes[first].prev_sibling = Some(tail);
                }
                None => {
                    debug_assert!(self.free_head.is_none());
                    self.free_head = Some(NodeId::new(first));
                }
            }
            self.free_tail = Some(NodeId::new(node_cap - 1));
        }
        if arena_cap > self.arena.capacity() {
            self.arena.reserve(arena_cap - self.arena.len());
        }
    }

    /// Claim an unused node.
    ///
    /// Pops the head of the free list and returns a zeroed `NOTYPE` record.
    /// If the free list is empty the capacity doubles (minimum 16). The very
    /// first claim returns handle 0, the root; wire it with
    /// `set_parent(root, None, None)`.
    pub fn claim(&mut self) -> NodeId {
        if self.free_head.is_none() {
            let cap = (self.nodes.len() * 2).max(16);
            self.reserve(cap, 0);
        }
        let id = match self.free_head {
            Some(id) => id,
            None => unreachable!("free list empty after growth"),
        };
        self.free_head = self.nd(id).next_sibling;
        match self.free_head {
            Some(head) => self.nd_mut(head).prev_sibling = None,
            None => {
                self.free_tail = None;
                debug_assert_eq!(self.size + 1, self.nodes.len());
            }
        }
        self.size += 1;
        *self.nd_mut(id) = NodeData::default();
        if self.size == 1 {
            assert_eq!(id.index(), 0, "the first claimed node must be the root");
        }
        id
    }

    /// Release a childless node: detach it from the hierarchy and push it to
    /// the front of the free list. Use [`remove`](Self::remove) for whole
    /// subtrees.
    pub fn release(&mut self, node: NodeId) {
        debug_assert!(
            self.nd(node).first_child.is_none(),
            "release of node {} which still has children",
            node
        );
        self.detach(node);
        self.free_list_add(node);
        self.clear_record(node);
        self.size -= 1;
    }

    /// Reset every record, rebuild the free list over the whole capacity,
    /// and re-claim handle 0 as the root. The arena buffer is kept.
    ///
    /// All previously issued handles are invalidated.
    pub fn clear(&mut self) {
        self.size = 0;
        let cap = self.nodes.len();
        if cap == 0 {
            self.free_head = None;
            self.free_tail = None;
            return;
        }
        for i in 0..cap {
            let mut n = NodeData::default();
            n.prev_sibling = (i > 0).then(|| NodeId::new(i - 1));
            n.next_sibling = (i + 1 < cap).then(|| NodeId::new(i + 1));
            self.nodes[i] = n;
        }
        self.free_head = Some(NodeId::new(0));
        self.free_tail = Some(NodeId::new(cap - 1));
        let root = self.claim();
        assert_eq!(root.index(), 0, "root must reclaim handle 0");
        self.set_parent(root, None, None);
    }

    /// Append bytes to the arena and return the owning span.
    ///
    /// The arena grows as needed; growth never invalidates previously
    /// returned spans (they are offsets), only raw slices obtained from
    /// accessors.
    pub fn copy_to_arena(&mut self, bytes: &[u8]) -> Span<'t> {
        let off = self.arena.len();
        assert!(
            off + bytes.len() <= u32::MAX as usize,
            "arena would exceed the span range"
        );
        self.arena.extend_from_slice(bytes);
        Span::Arena {
            off: off as u32,
            len: bytes.len() as u32,
        }
    }

    /// Resolve a span to its bytes within this tree.
    #[inline]
    pub fn span_bytes(&self, span: Span<'t>) -> &[u8] {
        match span {
            Span::Source(s) => s,
            Span::Arena { off, len } => &self.arena[off as usize..(off + len) as usize],
        }
    }

    // ------------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------------

    /// The root handle. Valid whenever the tree is non-empty.
    #[inline]
    pub fn root_id(&self) -> NodeId {
        debug_assert!(self.size > 0, "empty tree has no root");
        NodeId::new(0)
    }

    #[inline]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nd(node).parent
    }

    #[inline]
    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.nd(node).first_child
    }

    #[inline]
    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.nd(node).last_child
    }

    #[inline]
    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.nd(node).prev_sibling
    }

    #[inline]
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.nd(node).next_sibling
    }

    #[inline]
    pub fn node_type(&self, node: NodeId) -> NodeType {
        self.nd(node).ty
    }

    /// Printable name of the node's kind.
    #[inline]
    pub fn type_str(&self, node: NodeId) -> &'static str {
        self.nd(node).ty.type_str()
    }

    /// The node's key text.
    ///
    /// # Panics
    ///
    /// Panics if the node has no key.
    #[inline]
    pub fn key(&self, node: NodeId) -> &[u8] {
        assert!(self.has_key(node), "node {} has no key", node);
        self.span_bytes(self.nd(node).key.scalar)
    }

    /// The node's value text.
    ///
    /// # Panics
    ///
    /// Panics if the node has no value.
    #[inline]
    pub fn val(&self, node: NodeId) -> &[u8] {
        assert!(self.has_val(node), "node {} has no value", node);
        self.span_bytes(self.nd(node).val.scalar)
    }

    /// The full key-side scalar (text, tag, anchor).
    #[inline]
    pub fn key_scalar(&self, node: NodeId) -> &Scalar<'t> {
        &self.nd(node).key
    }

    /// The full value-side scalar (text, tag, anchor).
    #[inline]
    pub fn val_scalar(&self, node: NodeId) -> &Scalar<'t> {
        &self.nd(node).val
    }

    /// The key's tag text, empty if untagged.
    #[inline]
    pub fn key_tag(&self, node: NodeId) -> &[u8] {
        self.span_bytes(self.nd(node).key.tag)
    }

    /// The value's tag text, empty if untagged.
    #[inline]
    pub fn val_tag(&self, node: NodeId) -> &[u8] {
        self.span_bytes(self.nd(node).val.tag)
    }

    /// The key's anchor name, empty if unanchored.
    #[inline]
    pub fn key_anchor(&self, node: NodeId) -> &[u8] {
        self.span_bytes(self.nd(node).key.anchor)
    }

    /// The value's anchor name, empty if unanchored.
    #[inline]
    pub fn val_anchor(&self, node: NodeId) -> &[u8] {
        self.span_bytes(self.nd(node).val.anchor)
    }

    #[inline]
    pub fn has_key(&self, node: NodeId) -> bool {
        self.nd(node).ty.has_key()
    }

    #[inline]
    pub fn has_val(&self, node: NodeId) -> bool {
        self.nd(node).ty.has_val()
    }

    #[inline]
    pub fn is_val(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_val()
    }

    #[inline]
    pub fn is_keyval(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_keyval()
    }

    #[inline]
    pub fn is_map(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_map()
    }

    #[inline]
    pub fn is_seq(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_seq()
    }

    #[inline]
    pub fn is_doc(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_doc()
    }

    #[inline]
    pub fn is_stream(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_stream()
    }

    #[inline]
    pub fn is_container(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_container()
    }

    #[inline]
    pub fn is_key_ref(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_key_ref()
    }

    #[inline]
    pub fn is_val_ref(&self, node: NodeId) -> bool {
        self.nd(node).ty.is_val_ref()
    }

    #[inline]
    pub fn has_key_anchor(&self, node: NodeId) -> bool {
        self.nd(node).ty.has_key_anchor()
    }

    #[inline]
    pub fn has_val_anchor(&self, node: NodeId) -> bool {
        self.nd(node).ty.has_val_anchor()
    }

    /// Whether the node defines the given anchor name on its key or value.
    pub fn has_anchor(&self, node: NodeId, name: &[u8]) -> bool {
        let n = self.nd(node);
        (n.ty.has_key_anchor() && self.span_bytes(n.key.anchor) == name)
            || (n.ty.has_val_anchor() && self.span_bytes(n.val.anchor) == name)
    }

    /// A live node with no parent: the root.
    #[inline]
    pub fn is_root(&self, node: NodeId) -> bool {
        self.nd(node).parent.is_none()
    }

    #[inline]
    pub fn has_children(&self, node: NodeId) -> bool {
        self.nd(node).first_child.is_some()
    }

    /// Whether `ch` is a direct child of `node`.
    #[inline]
    pub fn has_child(&self, node: NodeId, ch: NodeId) -> bool {
        self.nd(ch).parent == Some(node)
    }

    /// Whether `sib` shares a parent with `node`.
    #[inline]
    pub fn has_sibling(&self, node: NodeId, sib: NodeId) -> bool {
        self.nd(node).parent.is_some() && self.nd(node).parent == self.nd(sib).parent
    }

    /// Number of children, walking the sibling chain.
    pub fn num_children(&self, node: NodeId) -> usize {
        let mut count = 0;
        let mut i = self.first_child(node);
        while let Some(ch) = i {
            count += 1;
            i = self.next_sibling(ch);
        }
        count
    }

    /// The child at position `pos`, or `None` past the end.
    pub fn child(&self, node: NodeId, pos: usize) -> Option<NodeId> {
        let mut count = 0;
        let mut i = self.first_child(node);
        while let Some(ch) = i {
            if count == pos {
                return Some(ch);
            }
            count += 1;
            i = self.next_sibling(ch);
        }
        None
    }

    /// The position of `ch` among `node`'s children.
    pub fn child_pos(&self, node: NodeId, ch: NodeId) -> Option<usize> {
        let mut count = 0;
        let mut i = self.first_child(node);
        while let Some(c) = i {
            if c == ch {
                return Some(count);
            }
            count += 1;
            i = self.next_sibling(c);
        }
        None
    }

    /// Find a child of a mapping by key text.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a mapping or `name` is empty.
    pub fn find_child(&self, node: NodeId, name: &[u8]) -> Option<NodeId> {
        assert!(self.is_map(node), "find_child on non-mapping node {}", node);
        assert!(!name.is_empty(), "find_child with an empty key");
        let mut i = self.first_child(node);
        while let Some(ch) = i {
            if self.span_bytes(self.nd(ch).key.scalar) == name {
                return Some(ch);
            }
            i = self.next_sibling(ch);
        }
        None
    }

    #[inline]
    fn parent_is_map(&self, node: NodeId) -> bool {
        match self.nd(node).parent {
            Some(p) => self.is_map(p),
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Type transitions
    // ------------------------------------------------------------------------

    /// Turn the node into a keyless scalar (sequence element or document
    /// payload).
    ///
    /// # Panics
    ///
    /// Panics if the node has children or sits in a mapping.
    pub fn to_val(&mut self, node: NodeId, val: impl Into<Span<'t>>, more_flags: NodeType) {
        assert!(!self.has_children(node), "to_val on node {} with children", node);
        assert!(
            !self.parent_is_map(node),
            "keyless scalar {} cannot be a mapping child",
            node
        );
        let n = self.nd_mut(node);
        n.ty = NodeType::VAL | more_flags;
        n.key.clear();
        n.val = Scalar {
            scalar: val.into(),
            ..Scalar::default()
        };
    }

    /// Turn the node into a keyed scalar.
    ///
    /// # Panics
    ///
    /// Panics if the node has children or sits in a non-mapping parent.
    pub fn to_keyval(
        &mut self,
        node: NodeId,
        key: impl Into<Span<'t>>,
        val: impl Into<Span<'t>>,
        more_flags: NodeType,
    ) {
        assert!(!self.has_children(node), "to_keyval on node {} with children", node);
        assert!(
            self.nd(node).parent.is_none() || self.parent_is_map(node),
            "keyed scalar {} must be a mapping child",
            node
        );
        let n = self.nd_mut(node);
        n.ty = NodeType::KEYVAL | more_flags;
        n.key = Scalar {
            scalar: key.into(),
            ..Scalar::default()
        };
        n.val = Scalar {
            scalar: val.into(),
            ..Scalar::default()
        };
    }

    /// Turn the node into a keyless mapping.
    ///
    /// # Panics
    ///
    /// Panics if the node has children or sits in a mapping.
    pub fn to_map(&mut self, node: NodeId, more_flags: NodeType) {
        assert!(!self.has_children(node), "to_map on node {} with children", node);
        assert!(
            !self.parent_is_map(node),
            "keyless mapping {} cannot be a mapping child",
            node
        );
        let n = self.nd_mut(node);
        n.ty = NodeType::MAP | more_flags;
        n.key.clear();
        n.val.clear();
    }

    /// Turn the node into a keyed mapping (a mapping-valued entry of a
    /// parent mapping).
    ///
    /// # Panics
    ///
    /// Panics if the node has children, the key is empty, or the parent is
    /// not a mapping.
    pub fn to_map_keyed(&mut self, node: NodeId, key: impl Into<Span<'t>>, more_flags: NodeType) {
        assert!(!self.has_children(node), "to_map_keyed on node {} with children", node);
        let key = key.into();
        assert!(!key.is_empty(), "keyed mapping {} needs a key", node);
        assert!(
            self.nd(node).parent.is_none() || self.parent_is_map(node),
            "keyed mapping {} must be a mapping child",
            node
        );
        let n = self.nd_mut(node);
        n.ty = NodeType::KEYMAP | more_flags;
        n.key = Scalar {
            scalar: key,
            ..Scalar::default()
        };
        n.val.clear();
    }

    /// Turn the node into a keyless sequence.
    ///
    /// # Panics
    ///
    /// Panics if the node has children.
    pub fn to_seq(&mut self, node: NodeId, more_flags: NodeType) {
        assert!(!self.has_children(node), "to_seq on node {} with children", node);
        let n = self.nd_mut(node);
        n.ty = NodeType::SEQ | more_flags;
        n.key.clear();
        n.val.clear();
    }

    /// Turn the node into a keyed sequence (a sequence-valued entry of a
    /// parent mapping).
    ///
    /// # Panics
    ///
    /// Panics if the node has children or the parent is not a mapping.
    pub fn to_seq_keyed(&mut self, node: NodeId, key: impl Into<Span<'t>>, more_flags: NodeType) {
        assert!(!self.has_children(node), "to_seq_keyed on node {} with children", node);
        assert!(
            self.nd(node).parent.is_none() || self.parent_is_map(node),
            "keyed sequence {} must be a mapping child",
            node
        );
        let n = self.nd_mut(node);
        n.ty = NodeType::KEYSEQ | more_flags;
        n.key = Scalar {
            scalar: key.into(),
            ..Scalar::default()
        };
        n.val.clear();
    }

    /// Turn the node into a document.
    ///
    /// # Panics
    ///
    /// Panics if the node has children.
    pub fn to_doc(&mut self, node: NodeId, more_flags: NodeType) {
        assert!(!self.has_children(node), "to_doc on node {} with children", node);
        let n = self.nd_mut(node);
        n.ty = NodeType::DOC | more_flags;
        n.key.clear();
        n.val.clear();
    }

    /// Turn the node into a stream (a sequence of documents).
    ///
    /// # Panics
    ///
    /// Panics if the node has children.
    pub fn to_stream(&mut self, node: NodeId, more_flags: NodeType) {
        assert!(!self.has_children(node), "to_stream on node {} with children", node);
        let n = self.nd_mut(node);
        n.ty = NodeType::STREAM | more_flags;
        n.key.clear();
        n.val.clear();
    }

    /// Attach an anchor name to the node's key.
    pub fn set_key_anchor(&mut self, node: NodeId, anchor: impl Into<Span<'t>>) {
        let n = self.nd_mut(node);
        n.ty |= NodeType::KEYANCH;
        n.key.anchor = anchor.into();
    }

    /// Attach an anchor name to the node's value.
    pub fn set_val_anchor(&mut self, node: NodeId, anchor: impl Into<Span<'t>>) {
        let n = self.nd_mut(node);
        n.ty |= NodeType::VALANCH;
        n.val.anchor = anchor.into();
    }

    /// Attach a tag to the node's key.
    pub fn set_key_tag(&mut self, node: NodeId, tag: impl Into<Span<'t>>) {
        self.nd_mut(node).key.tag = tag.into();
    }

    /// Attach a tag to the node's value.
    pub fn set_val_tag(&mut self, node: NodeId, tag: impl Into<Span<'t>>) {
        self.nd_mut(node).val.tag = tag.into();
    }

    /// Strip every anchor and alias-reference mark from the node: the
    /// `KEYREF`/`VALREF`/`KEYANCH`/`VALANCH` bits and both anchor names.
    pub fn rem_anchor_ref(&mut self, node: NodeId) {
        let n = self.nd_mut(node);
        n.ty = n.ty.without_anchor_ref();
        n.key.anchor = Span::default();
        n.val.anchor = Span::default();
    }

    // ------------------------------------------------------------------------
    // Hierarchy primitives
    // ------------------------------------------------------------------------

    /// Splice a detached node into the hierarchy: under `parent`, right
    /// after `prev_sibling` (at the head when `prev_sibling` is `None`).
    ///
    /// # Panics
    ///
    /// Panics if `parent` is `None` and the child is not the root.
    pub fn set_parent(
        &mut self,
        child: NodeId,
        parent: Option<NodeId>,
        prev_sibling: Option<NodeId>,
    ) {
        {
            let c = self.nd_mut(child);
            c.parent = parent;
            c.prev_sibling = None;
            c.next_sibling = None;
        }
        let Some(parent) = parent else {
            assert_eq!(child.index(), 0, "only the root may have no parent");
            assert!(prev_sibling.is_none(), "root cannot have siblings");
            return;
        };

        let next_sibling = match prev_sibling {
            Some(prev) => self.next_sibling(prev),
            None => self.first_child(parent),
        };
        if let Some(prev) = prev_sibling {
            debug_assert_eq!(
                self.nd(prev).parent,
                Some(parent),
                "prev_sibling {} is not a child of {}",
                prev,
                parent
            );
            self.nd_mut(prev).next_sibling = Some(child);
            self.nd_mut(child).prev_sibling = Some(prev);
        }
        if let Some(next) = next_sibling {
            debug_assert_eq!(self.nd(next).prev_sibling, prev_sibling);
            self.nd_mut(next).prev_sibling = Some(child);
            self.nd_mut(child).next_sibling = Some(next);
        }

        let (pfirst, plast) = {
            let p = self.nd(parent);
            (p.first_child, p.last_child)
        };
        if pfirst.is_none() {
            debug_assert!(plast.is_none());
            let p = self.nd_mut(parent);
            p.first_child = Some(child);
            p.last_child = Some(child);
        } else {
            if self.nd(child).next_sibling == pfirst {
                self.nd_mut(parent).first_child = Some(child);
            }
            if self.nd(child).prev_sibling == plast {
                self.nd_mut(parent).last_child = Some(child);
            }
        }
    }

    /// Unlink a node from its parent and siblings. The node's own fields are
    /// left untouched; callers re-wire them via `set_parent` or the free
    /// list.
    fn detach(&mut self, node: NodeId) {
        let (parent, prev, next) = {
            let n = self.nd(node);
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        if let Some(p) = parent {
            if self.nd(p).first_child == Some(node) {
                self.nd_mut(p).first_child = next;
            }
            if self.nd(p).last_child == Some(node) {
                self.nd_mut(p).last_child = prev;
            }
        }
        if let Some(s) = prev {
            self.nd_mut(s).next_sibling = next;
        }
        if let Some(s) = next {
            self.nd_mut(s).prev_sibling = prev;
        }
    }

    /// Push a record to the front of the free list (LIFO, so recently freed
    /// slots are reused first).
    fn free_list_add(&mut self, node: NodeId) {
        {
            let n = self.nd_mut(node);
            n.parent = None;
            n.prev_sibling = None;
        }
        self.nd_mut(node).next_sibling = self.free_head;
        if let Some(head) = self.free_head {
            self.nd_mut(head).prev_sibling = Some(node);
        }
        self.free_head = Some(node);
        if self.free_tail.is_none() {
            self.free_tail = self.free_head;
        }
    }

    /// Unlink a record from anywhere in the free list.
    fn free_list_rem(&mut self, node: NodeId) {
        let (prev, next) = {
            let n = self.nd(node);
            (n.prev_sibling, n.next_sibling)
        };
        match prev {
            Some(p) => self.nd_mut(p).next_sibling = next,
            None => self.free_head = next,
        }
        match next {
            Some(n) => self.nd_mut(n).prev_sibling = prev,
            None => self.free_tail = prev,
        }
    }

    /// Reset type, scalars, and parent/child links. The sibling fields are
    /// left alone: on a freed record they carry the free-list linkage.
    fn clear_record(&mut self, node: NodeId) {
        let n = self.nd_mut(node);
        n.ty = NodeType::NOTYPE;
        n.key.clear();
        n.val.clear();
        n.parent = None;
        n.first_child = None;
        n.last_child = None;
    }

    // ------------------------------------------------------------------------
    // Property copies
    // ------------------------------------------------------------------------

    fn copy_props(&mut self, dst: NodeId, src: NodeId) {
        let (ty, key, val) = {
            let s = self.nd(src);
            (s.ty, s.key, s.val)
        };
        let d = self.nd_mut(dst);
        d.ty = ty;
        d.key = key;
        d.val = val;
    }

    /// Copy type and value, preserving the destination's key: its text and
    /// its `KEY`/`KEYREF`/`KEYANCH` bits.
    fn copy_props_wo_key(&mut self, dst: NodeId, src: NodeId) {
        let key_bits = NodeType::KEY | NodeType::KEYREF | NodeType::KEYANCH;
        let (sty, val) = {
            let s = self.nd(src);
            (s.ty, s.val)
        };
        let d = self.nd_mut(dst);
        d.ty = NodeType(d.ty.0 & key_bits.0).with(sty.without(key_bits));
        d.val = val;
    }

    /// Bring a span from another tree into this one. Arena-owned spans are
    /// copied into this tree's arena; source-buffer spans are shared.
    fn import_span(&mut self, src: &Tree<'t>, span: Span<'t>) -> Span<'t> {
        match span {
            Span::Source(s) => Span::Source(s),
            Span::Arena { .. } => {
                let bytes = src.span_bytes(span);
                self.copy_to_arena(bytes)
            }
        }
    }

    fn import_scalar(&mut self, src: &Tree<'t>, sc: Scalar<'t>) -> Scalar<'t> {
        Scalar {
            scalar: self.import_span(src, sc.scalar),
            tag: self.import_span(src, sc.tag),
            anchor: self.import_span(src, sc.anchor),
        }
    }

    fn copy_props_from(&mut self, dst: NodeId, src_tree: &Tree<'t>, src: NodeId) {
        let s = *src_tree.nd(src);
        let key = self.import_scalar(src_tree, s.key);
        let val = self.import_scalar(src_tree, s.val);
        let d = self.nd_mut(dst);
        d.ty = s.ty;
        d.key = key;
        d.val = val;
    }

    fn copy_props_wo_key_from(&mut self, dst: NodeId, src_tree: &Tree<'t>, src: NodeId) {
        let key_bits = NodeType::KEY | NodeType::KEYREF | NodeType::KEYANCH;
        let s = *src_tree.nd(src);
        let val = self.import_scalar(src_tree, s.val);
        let d = self.nd_mut(dst);
        d.ty = NodeType(d.ty.0 & key_bits.0).with(s.ty.without(key_bits));
        d.val = val;
    }

    // ------------------------------------------------------------------------
    // Structural mutations
    // ------------------------------------------------------------------------

    /// Move a node within its parent, to the position after `after` (to the
    /// head when `after` is `None`).
    ///
    /// # Panics
    ///
    /// Panics if `node` is the root.
    pub fn move_node(&mut self, node: NodeId, after: Option<NodeId>) {
        assert!(!self.is_root(node), "cannot move the root");
        debug_assert!(after.map_or(true, |a| self.has_sibling(node, a)));
        let parent = self.parent(node);
        self.detach(node);
        self.set_parent(node, parent, after);
    }

    /// Move a node under a (possibly different) parent, after `after`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is the root.
    pub fn move_to(&mut self, node: NodeId, new_parent: NodeId, after: Option<NodeId>) {
        assert!(!self.is_root(node), "cannot move the root");
        self.detach(node);
        self.set_parent(node, Some(new_parent), after);
    }

    /// Move a subtree out of `src` into this tree, after `after` under
    /// `new_parent`. Returns the handle of the transplanted copy; the
    /// original is removed from `src`.
    pub fn move_from(
        &mut self,
        src: &mut Tree<'t>,
        node: NodeId,
        new_parent: NodeId,
        after: Option<NodeId>,
    ) -> NodeId {
        let dup = self.duplicate_from(src, node, new_parent, after);
        src.remove(node);
        dup
    }

    /// Deep-copy a subtree, attaching the copy under `parent` after `after`.
    /// Returns the handle of the copy.
    ///
    /// # Panics
    ///
    /// Panics if `node` is the root.
    pub fn duplicate(&mut self, node: NodeId, parent: NodeId, after: Option<NodeId>) -> NodeId {
        assert!(!self.is_root(node), "cannot duplicate the root");
        let copy = self.claim();
        self.copy_props(copy, node);
        self.set_parent(copy, Some(parent), after);

        let mut last: Option<NodeId> = None;
        let mut child = self.first_child(node);
        while let Some(i) = child {
            last = Some(self.duplicate(i, copy, last));
            child = self.next_sibling(i);
        }
        copy
    }

    /// Deep-copy a subtree from another tree. Arena-owned scalars are copied
    /// into this tree's arena so the copy is self-contained.
    ///
    /// # Panics
    ///
    /// Panics if `node` is the root of `src`.
    pub fn duplicate_from(
        &mut self,
        src: &Tree<'t>,
        node: NodeId,
        parent: NodeId,
        after: Option<NodeId>,
    ) -> NodeId {
        assert!(!src.is_root(node), "cannot duplicate the root");
        let copy = self.claim();
        self.copy_props_from(copy, src, node);
        self.set_parent(copy, Some(parent), after);

        let mut last: Option<NodeId> = None;
        let mut child = src.first_child(node);
        while let Some(i) = child {
            last = Some(self.duplicate_from(src, i, copy, last));
            child = src.next_sibling(i);
        }
        copy
    }

    /// Duplicate every child of `node` into `parent`, appending after
    /// `after`. Returns the handle of the last duplicate (or `after` when
    /// `node` has no children).
    ///
    /// # Panics
    ///
    /// Panics if `after` is not a child of `parent`.
    pub fn duplicate_children(
        &mut self,
        node: NodeId,
        parent: NodeId,
        after: Option<NodeId>,
    ) -> Option<NodeId> {
        assert!(
            after.map_or(true, |a| self.has_child(parent, a)),
            "`after` must be a child of `parent`"
        );
        let mut prev = after;
        let mut child = self.first_child(node);
        while let Some(i) = child {
            prev = Some(self.duplicate(i, parent, prev));
            child = self.next_sibling(i);
        }
        prev
    }

    /// Cross-tree form of [`duplicate_children`](Self::duplicate_children).
    pub fn duplicate_children_from(
        &mut self,
        src: &Tree<'t>,
        node: NodeId,
        parent: NodeId,
        after: Option<NodeId>,
    ) -> Option<NodeId> {
        assert!(
            after.map_or(true, |a| self.has_child(parent, a)),
            "`after` must be a child of `parent`"
        );
        let mut prev = after;
        let mut child = src.first_child(node);
        while let Some(i) = child {
            prev = Some(self.duplicate_from(src, i, parent, prev));
            child = src.next_sibling(i);
        }
        prev
    }

    /// Copy `src`'s type, value, and children into `dst`, which keeps its
    /// own key. Used to materialize alias targets in place.
    pub fn duplicate_contents(&mut self, src: NodeId, dst: NodeId) {
        self.copy_props_wo_key(dst, src);
        self.duplicate_children(src, dst, None);
    }

    /// Cross-tree form of [`duplicate_contents`](Self::duplicate_contents).
    pub fn duplicate_contents_from(&mut self, src_tree: &Tree<'t>, src: NodeId, dst: NodeId) {
        self.copy_props_wo_key_from(dst, src_tree, src);
        self.duplicate_children_from(src_tree, src, dst, None);
    }

    /// Merge-aware child duplication, used to materialize YAML merge keys.
    ///
    /// Duplicates each child of `node` into `parent` after `after`. When
    /// `parent` is a sequence this is plain duplication. When `parent` is a
    /// mapping and it already holds an entry with the incoming key:
    ///
    /// - an entry before the insertion window is overridden: it is removed
    ///   and the incoming child duplicated in its stead;
    /// - an entry at or after the window wins: it is moved up to the
    ///   insertion cursor (if not already there) and the incoming child is
    ///   dropped.
    ///
    /// Returns the final insertion cursor.
    ///
    /// # Panics
    ///
    /// Panics if `after` is not a child of `parent`, or `parent` is neither
    /// a mapping nor a sequence.
    pub fn duplicate_children_no_rep(
        &mut self,
        node: NodeId,
        parent: NodeId,
        after: Option<NodeId>,
    ) -> Option<NodeId> {
        let after_pos = after.map(|a| {
            self.child_pos(parent, a)
                .unwrap_or_else(|| panic!("`after` ({}) must be a child of `parent` ({})", a, parent))
        });

        let mut prev = after;
        let mut child = self.first_child(node);
        while let Some(i) = child {
            child = self.next_sibling(i);
            if self.is_seq(parent) {
                prev = Some(self.duplicate(i, parent, prev));
                continue;
            }
            assert!(
                self.is_map(parent),
                "merge target {} must be a mapping or sequence",
                parent
            );

            // look for an existing entry with the same key
            let mut rep = None;
            let mut j = self.first_child(parent);
            let mut jcount = 0;
            while let Some(jj) = j {
                if self.span_bytes(self.nd(jj).key.scalar) == self.span_bytes(self.nd(i).key.scalar)
                {
                    rep = Some((jj, jcount));
                    break;
                }
                jcount += 1;
                j = self.next_sibling(jj);
            }

            match rep {
                None => {
                    prev = Some(self.duplicate(i, parent, prev));
                }
                Some((rep, rep_pos)) => {
                    if after_pos.map_or(false, |ap| rep_pos < ap) {
                        // the existing entry precedes the insertion window
                        // and is overridden by the incoming duplicate
                        self.remove(rep);
                        prev = Some(self.duplicate(i, parent, prev));
                    } else {
                        // the existing entry wins; bring it to the cursor
                        if Some(rep) != prev {
                            self.move_node(rep, prev);
                        }
                        prev = Some(rep);
                    }
                }
            }
        }
        prev
    }

    /// Remove a subtree: all descendants, then the node itself.
    pub fn remove(&mut self, node: NodeId) {
        self.remove_children(node);
        self.release(node);
    }

    /// Remove every descendant of `node`, leaving the node itself in place.
    pub fn remove_children(&mut self, node: NodeId) {
        while let Some(ch) = self.first_child(node) {
            self.remove(ch);
        }
    }

    // ------------------------------------------------------------------------
    // Reorder
    // ------------------------------------------------------------------------

    /// Rearrange records so a pre-order traversal from the root visits
    /// handles `0, 1, 2, …`. Afterwards `size - 1` is the largest live
    /// handle and iterating `0..size` is a valid pre-order walk.
    ///
    /// All previously issued handles are invalidated.
    pub fn reorder(&mut self) {
        if self.size == 0 {
            return;
        }
        let mut root = self.root_id();
        self.do_reorder(&mut root, 0);
    }

    fn do_reorder(&mut self, node: &mut NodeId, mut count: usize) -> usize {
        if node.index() != count {
            self.swap(*node, NodeId::new(count));
            *node = NodeId::new(count);
        }
        count += 1;
        let mut child = self.first_child(*node);
        while let Some(mut i) = child {
            // the child may have been relocated by the recursion
            count = self.do_reorder(&mut i, count);
            child = self.next_sibling(i);
        }
        count
    }

    /// Exchange two records, preserving the tree's shape: each node ends up
    /// in the other's former slot. Handles three cases: both live, one live
    /// and one free, and (unreachably) both free.
    fn swap(&mut self, n: NodeId, m: NodeId) {
        debug_assert!(self.nd(n).parent.is_some() || self.nd(n).ty.is_notype());
        debug_assert!(self.nd(m).parent.is_some() || self.nd(m).ty.is_notype());
        let tn = self.nd(n).ty;
        let tm = self.nd(m).ty;
        if !tn.is_notype() && !tm.is_notype() {
            self.swap_props(n, m);
            self.swap_hierarchy(n, m);
        } else if tn.is_notype() && !tm.is_notype() {
            self.copy_props(n, m);
            self.free_list_rem(n);
            self.copy_hierarchy(n, m);
            self.clear_record(m);
            self.free_list_add(m);
        } else if !tn.is_notype() && tm.is_notype() {
            self.copy_props(m, n);
            self.free_list_rem(m);
            self.copy_hierarchy(m, n);
            self.clear_record(n);
            self.free_list_add(n);
        } else {
            unreachable!("swap of two unused slots");
        }
    }

    fn swap_props(&mut self, n: NodeId, m: NodeId) {
        let a = *self.nd(n);
        let b = *self.nd(m);
        {
            let x = self.nd_mut(n);
            x.ty = b.ty;
            x.key = b.key;
            x.val = b.val;
        }
        let y = self.nd_mut(m);
        y.ty = a.ty;
        y.key = a.key;
        y.val = a.val;
    }

    /// Exchange the linkage of two live nodes so that each takes the other's
    /// place in the hierarchy. Handles adjacency (`a` next to `b`) and
    /// shared-parent head/tail cases.
    fn swap_hierarchy(&mut self, ia: NodeId, ib: NodeId) {
        if ia == ib {
            return;
        }

        // each node's children move to the other
        let mut i = self.first_child(ia);
        while let Some(ch) = i {
            i = self.next_sibling(ch);
            if ch == ia || ch == ib {
                continue;
            }
            self.nd_mut(ch).parent = Some(ib);
        }
        let mut i = self.first_child(ib);
        while let Some(ch) = i {
            i = self.next_sibling(ch);
            if ch == ia || ch == ib {
                continue;
            }
            self.nd_mut(ch).parent = Some(ia);
        }

        let ipa = match self.nd(ia).parent {
            Some(p) => p,
            None => unreachable!("swap of a live parentless node"),
        };
        let ipb = match self.nd(ib).parent {
            Some(p) => p,
            None => unreachable!("swap of a live parentless node"),
        };

        // parents' first/last pointers
        if ipa == ipb {
            let (pfirst, plast) = {
                let p = self.nd(ipa);
                (p.first_child, p.last_child)
            };
            if (pfirst == Some(ib) && plast == Some(ia))
                || (pfirst == Some(ia) && plast == Some(ib))
            {
                let p = self.nd_mut(ipa);
                core::mem::swap(&mut p.first_child, &mut p.last_child);
            } else {
                let mut changed = false;
                if pfirst == Some(ia) {
                    self.nd_mut(ipa).first_child = Some(ib);
                    changed = true;
                }
                if plast == Some(ia) {
                    self.nd_mut(ipa).last_child = Some(ib);
                    changed = true;
                }
                if !changed && self.nd(ipa).first_child == Some(ib) {
                    self.nd_mut(ipa).first_child = Some(ia);
                }
                if !changed && self.nd(ipa).last_child == Some(ib) {
                    self.nd_mut(ipa).last_child = Some(ia);
                }
            }
        } else {
            if self.nd(ipa).first_child == Some(ia) {
                self.nd_mut(ipa).first_child = Some(ib);
            }
            if self.nd(ipa).last_child == Some(ia) {
                self.nd_mut(ipa).last_child = Some(ib);
            }
            if self.nd(ipb).first_child == Some(ib) {
                self.nd_mut(ipb).first_child = Some(ia);
            }
            if self.nd(ipb).last_child == Some(ib) {
                self.nd_mut(ipb).last_child = Some(ia);
            }
        }

        // child-list heads and tails travel with the children
        {
            let a_first = self.nd(ia).first_child;
            let a_last = self.nd(ia).last_child;
            let b_first = self.nd(ib).first_child;
            let b_last = self.nd(ib).last_child;
            let a = self.nd_mut(ia);
            a.first_child = b_first;
            a.last_child = b_last;
            let b = self.nd_mut(ib);
            b.first_child = a_first;
            b.last_child = a_last;
        }

        // sibling links, with the adjacent cases handled explicitly
        let a_prev = self.nd(ia).prev_sibling;
        let a_next = self.nd(ia).next_sibling;
        let b_prev = self.nd(ib).prev_sibling;
        let b_next = self.nd(ib).next_sibling;
        if a_prev != Some(ib) && a_next != Some(ib) && b_prev != Some(ia) && b_next != Some(ia) {
            if let Some(s) = a_prev {
                self.nd_mut(s).next_sibling = Some(ib);
            }
            if let Some(s) = a_next {
                self.nd_mut(s).prev_sibling = Some(ib);
            }
            if let Some(s) = b_prev {
                self.nd_mut(s).next_sibling = Some(ia);
            }
            if let Some(s) = b_next {
                self.nd_mut(s).prev_sibling = Some(ia);
            }
            {
                let a = self.nd_mut(ia);
                a.prev_sibling = b_prev;
                a.next_sibling = b_next;
            }
            let b = self.nd_mut(ib);
            b.prev_sibling = a_prev;
            b.next_sibling = a_next;
        } else if a_next == Some(ib) {
            // a immediately precedes b; a goes after b
            debug_assert_eq!(b_prev, Some(ia));
            if let Some(s) = a_prev {
                debug_assert_ne!(s, ib);
                self.nd_mut(s).next_sibling = Some(ib);
            }
            if let Some(s) = b_next {
                debug_assert_ne!(s, ia);
                self.nd_mut(s).prev_sibling = Some(ia);
            }
            {
                let b = self.nd_mut(ib);
                b.prev_sibling = a_prev;
                b.next_sibling = Some(ia);
            }
            let a = self.nd_mut(ia);
            a.prev_sibling = Some(ib);
            a.next_sibling = b_next;
        } else if a_prev == Some(ib) {
            // b immediately precedes a; b goes after a
            debug_assert_eq!(b_next, Some(ia));
            if let Some(s) = b_prev {
                debug_assert_ne!(s, ia);
                self.nd_mut(s).next_sibling = Some(ia);
            }
            if let Some(s) = a_next {
                debug_assert_ne!(s, ib);
                self.nd_mut(s).prev_sibling = Some(ib);
            }
            {
                let a = self.nd_mut(ia);
                a.prev_sibling = b_prev;
                a.next_sibling = Some(ib);
            }
            let b = self.nd_mut(ib);
            b.prev_sibling = Some(ia);
            b.next_sibling = a_next;
        } else {
            unreachable!("inconsistent sibling adjacency between {} and {}", ia, ib);
        }
        debug_assert_ne!(self.nd(ia).prev_sibling, Some(ia));
        debug_assert_ne!(self.nd(ia).next_sibling, Some(ia));
        debug_assert_ne!(self.nd(ib).prev_sibling, Some(ib));
        debug_assert_ne!(self.nd(ib).next_sibling, Some(ib));

        // parents, handling the case where one node is the other's parent
        if ipa != ib && ipb != ia {
            self.nd_mut(ia).parent = Some(ipb);
            self.nd_mut(ib).parent = Some(ipa);
        } else if ipa == ib && ipb != ia {
            self.nd_mut(ia).parent = Some(ipb);
            self.nd_mut(ib).parent = Some(ia);
        } else if ipa != ib && ipb == ia {
            self.nd_mut(ib).parent = Some(ipa);
            self.nd_mut(ia).parent = Some(ib);
        } else {
            unreachable!("nodes {} and {} cannot be each other's parent", ia, ib);
        }
    }

    /// Copy a live node's linkage into a (formerly free) slot, patching all
    /// neighbors to point at the new slot.
    fn copy_hierarchy(&mut self, dst: NodeId, src: NodeId) {
        let (s_parent, s_first, s_last, s_prev, s_next) = {
            let s = self.nd(src);
            (
                s.parent,
                s.first_child,
                s.last_child,
                s.prev_sibling,
                s.next_sibling,
            )
        };
        let mut i = s_first;
        while let Some(ch) = i {
            i = self.next_sibling(ch);
            self.nd_mut(ch).parent = Some(dst);
        }
        if let Some(s) = s_prev {
            self.nd_mut(s).next_sibling = Some(dst);
        }
        if let Some(s) = s_next {
            self.nd_mut(s).prev_sibling = Some(dst);
        }
        if let Some(p) = s_parent {
            if self.nd(p).first_child == Some(src) {
                self.nd_mut(p).first_child = Some(dst);
            }
            if self.nd(p).last_child == Some(src) {
                self.nd_mut(p).last_child = Some(dst);
            }
        }
        let d = self.nd_mut(dst);
        d.parent = s_parent;
        d.first_child = s_first;
        d.last_child = s_last;
        d.prev_sibling = s_prev;
        d.next_sibling = s_next;
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    #[inline]
    pub(crate) fn nd(&self, id: NodeId) -> &NodeData<'t> {
        &self.nodes[id.index()]
    }

    #[inline]
    fn nd_mut(&mut self, id: NodeId) -> &mut NodeData<'t> {
        &mut self.nodes[id.index()]
    }

    #[cfg(test)]
    fn free_list_len(&self) -> usize {
        let mut count = 0;
        let mut i = self.free_head;
        while let Some(n) = i {
            count += 1;
            i = self.nd(n).next_sibling;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_map(t: &mut Tree<'static>) -> NodeId {
        let root = t.claim();
        t.set_parent(root, None, None);
        t.to_map(root, NodeType::NOTYPE);
        root
    }

    fn append_keyval(
        t: &mut Tree<'static>,
        parent: NodeId,
        key: &'static str,
        val: &'static str,
    ) -> NodeId {
        let n = t.claim();
        let after = t.last_child(parent);
        t.set_parent(n, Some(parent), after);
        t.to_keyval(n, key, val, NodeType::NOTYPE);
        n
    }

    fn keys(t: &Tree<'_>, node: NodeId) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut i = t.first_child(node);
        while let Some(ch) = i {
            out.push(t.key(ch).to_vec());
            i = t.next_sibling(ch);
        }
        out
    }

    #[test]
    fn test_first_claim_is_root() {
        let mut t = Tree::new();
        assert_eq!(t.size(), 0);
        let root = t.claim();
        assert_eq!(root.index(), 0);
        assert_eq!(t.size(), 1);
        assert_eq!(t.capacity(), 16);
        t.set_parent(root, None, None);
        assert!(t.is_root(root));
    }

    #[test]
    fn test_free_list_accounting() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let a = append_keyval(&mut t, root, "a", "1");
        let _b = append_keyval(&mut t, root, "b", "2");
        assert_eq!(t.free_list_len(), t.capacity() - t.size());

        t.remove(a);
        assert_eq!(t.size(), 2);
        assert_eq!(t.free_list_len(), t.capacity() - 2);

        // freed slots are reused LIFO
        let c = t.claim();
        assert_eq!(c, a);
    }

    #[test]
    fn test_growth_keeps_handles() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let mut ids = Vec::new();
        for i in 0..40 {
            let key: &'static str = Box::leak(format!("k{}", i).into_boxed_str());
            ids.push(append_keyval(&mut t, root, key, "v"));
        }
        assert!(t.capacity() >= 41);
        // all handles still resolve to their keys
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(t.key(*id), format!("k{}", i).as_bytes());
        }
        assert_eq!(t.free_list_len(), t.capacity() - t.size());
    }

    #[test]
    fn test_sibling_chain_symmetry() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        for k in ["a", "b", "c", "d"] {
            append_keyval(&mut t, root, k, "v");
        }
        let forward = keys(&t, root);
        let mut backward = Vec::new();
        let mut i = t.last_child(root);
        while let Some(ch) = i {
            backward.push(t.key(ch).to_vec());
            i = t.prev_sibling(ch);
        }
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_set_parent_insert_positions() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let a = append_keyval(&mut t, root, "a", "1");
        let c = append_keyval(&mut t, root, "c", "3");
        // insert at head
        let head = t.claim();
        t.set_parent(head, Some(root), None);
        t.to_keyval(head, "h", "0", NodeType::NOTYPE);
        // insert in the middle
        let b = t.claim();
        t.set_parent(b, Some(root), Some(a));
        t.to_keyval(b, "b", "2", NodeType::NOTYPE);
        assert_eq!(
            keys(&t, root),
            vec![b"h".to_vec(), b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(t.first_child(root), Some(head));
        assert_eq!(t.last_child(root), Some(c));
    }

    #[test]
    fn test_move_node_within_parent() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let a = append_keyval(&mut t, root, "a", "1");
        let _b = append_keyval(&mut t, root, "b", "2");
        let c = append_keyval(&mut t, root, "c", "3");

        t.move_node(a, Some(c));
        assert_eq!(keys(&t, root), vec![b"b".to_vec(), b"c".to_vec(), b"a".to_vec()]);

        // moving back is an inverse
        t.move_node(a, None);
        assert_eq!(keys(&t, root), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_duplicate_then_remove_is_noop() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let m = t.claim();
        t.set_parent(m, Some(root), None);
        t.to_map_keyed(m, "m", NodeType::NOTYPE);
        append_keyval(&mut t, m, "x", "1");
        append_keyval(&mut t, m, "y", "2");
        let before_size = t.size();
        let before = keys(&t, m);

        let dup = t.duplicate(m, root, Some(m));
        assert_eq!(keys(&t, dup), before);
        assert_eq!(t.size(), before_size + 3);

        t.remove(dup);
        assert_eq!(t.size(), before_size);
        assert_eq!(keys(&t, m), before);
        assert_eq!(t.num_children(root), 1);
    }

    #[test]
    fn test_duplicate_contents_keeps_key() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let src = t.claim();
        t.set_parent(src, Some(root), None);
        t.to_map_keyed(src, "src", NodeType::NOTYPE);
        append_keyval(&mut t, src, "x", "1");

        let dst = append_keyval(&mut t, root, "dst", "old");
        t.duplicate_contents(src, dst);
        assert_eq!(t.key(dst), b"dst");
        assert!(t.is_map(dst));
        assert!(t.has_key(dst));
        assert_eq!(t.num_children(dst), 1);
        let x = t.find_child(dst, b"x").unwrap();
        assert_eq!(t.val(x), b"1");
    }

    #[test]
    fn test_double_swap_is_noop() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let a = append_keyval(&mut t, root, "a", "1");
        let b = append_keyval(&mut t, root, "b", "2");
        let c = append_keyval(&mut t, root, "c", "3");
        let before: Vec<_> = [a, b, c]
            .iter()
            .map(|&n| (t.key(n).to_vec(), t.prev_sibling(n), t.next_sibling(n)))
            .collect();

        // adjacent and non-adjacent pairs
        for (x, y) in [(a, b), (a, c), (b, c)] {
            t.swap(x, y);
            t.swap(x, y);
            let after: Vec<_> = [a, b, c]
                .iter()
                .map(|&n| (t.key(n).to_vec(), t.prev_sibling(n), t.next_sibling(n)))
                .collect();
            assert_eq!(before, after, "double swap of {} and {} changed the tree", x, y);
        }
    }

    #[test]
    fn test_swap_live_with_free() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let a = append_keyval(&mut t, root, "a", "1");
        let b = append_keyval(&mut t, root, "b", "2");
        t.remove(a);

        // slot of `a` is free; swap `b` into it
        t.swap(a, b);
        assert_eq!(t.key(a), b"b");
        assert!(t.node_type(b).is_notype());
        assert_eq!(t.first_child(root), Some(a));
        assert_eq!(t.last_child(root), Some(a));
        assert_eq!(t.free_list_len(), t.capacity() - t.size());
    }

    #[test]
    fn test_reorder_compacts_preorder() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let a = append_keyval(&mut t, root, "a", "1");
        let m = t.claim();
        t.set_parent(m, Some(root), Some(a));
        t.to_map_keyed(m, "m", NodeType::NOTYPE);
        append_keyval(&mut t, m, "x", "10");
        let y = append_keyval(&mut t, m, "y", "11");
        append_keyval(&mut t, root, "z", "2");
        // punch a hole so live handles are no longer contiguous
        t.remove(a);
        t.remove(y);
        assert_eq!(t.size(), 5);

        t.reorder();

        // pre-order walk yields 0..size
        let mut expect = 0;
        fn walk(t: &Tree<'_>, n: NodeId, expect: &mut usize) {
            assert_eq!(n.index(), *expect);
            *expect += 1;
            let mut i = t.first_child(n);
            while let Some(ch) = i {
                walk(t, ch, expect);
                i = t.next_sibling(ch);
            }
        }
        walk(&t, t.root_id(), &mut expect);
        assert_eq!(expect, t.size());

        // content survived
        let root = t.root_id();
        assert_eq!(keys(&t, root), vec![b"m".to_vec(), b"z".to_vec()]);
        let m = t.find_child(root, b"m").unwrap();
        assert_eq!(keys(&t, m), vec![b"x".to_vec()]);
        assert_eq!(t.free_list_len(), t.capacity() - t.size());
    }

    #[test]
    fn test_clear_reclaims_root() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        append_keyval(&mut t, root, "a", "1");
        let cap = t.capacity();
        t.clear();
        assert_eq!(t.size(), 1);
        assert_eq!(t.capacity(), cap);
        let root = t.root_id();
        assert!(t.is_root(root));
        assert!(!t.has_children(root));
        assert_eq!(t.free_list_len(), cap - 1);
    }

    #[test]
    fn test_copy_to_arena_roundtrip() {
        let mut t: Tree<'static> = Tree::new();
        let s1 = t.copy_to_arena(b"hello");
        let s2 = t.copy_to_arena(b"world");
        assert!(s1.is_arena());
        assert_eq!(t.span_bytes(s1), b"hello");
        assert_eq!(t.span_bytes(s2), b"world");

        // spans survive arena growth
        t.reserve(0, 1 << 16);
        assert_eq!(t.span_bytes(s1), b"hello");
        assert_eq!(t.span_bytes(s2), b"world");
    }

    #[test]
    fn test_cross_tree_duplicate_copies_arena() {
        let mut t1: Tree<'static> = Tree::new();
        let root1 = root_map(&mut t1);
        let n = t1.claim();
        t1.set_parent(n, Some(root1), None);
        let key = t1.copy_to_arena(b"k");
        let val = t1.copy_to_arena(b"v");
        t1.to_keyval(n, key, val, NodeType::NOTYPE);

        let mut t2: Tree<'static> = Tree::new();
        let root2 = root_map(&mut t2);
        let dup = t2.duplicate_from(&t1, n, root2, None);
        assert_eq!(t2.key(dup), b"k");
        assert_eq!(t2.val(dup), b"v");
        assert!(t2.key_scalar(dup).scalar.is_arena());
        assert!(t2.val_scalar(dup).scalar.is_arena());
    }

    #[test]
    fn test_move_from_transfers_subtree() {
        let mut t1: Tree<'static> = Tree::new();
        let root1 = root_map(&mut t1);
        let m = t1.claim();
        t1.set_parent(m, Some(root1), None);
        t1.to_map_keyed(m, "m", NodeType::NOTYPE);
        append_keyval(&mut t1, m, "x", "1");
        append_keyval(&mut t1, m, "y", "2");
        let t1_size = t1.size();

        let mut t2: Tree<'static> = Tree::new();
        let root2 = root_map(&mut t2);
        let moved = t2.move_from(&mut t1, m, root2, None);

        assert_eq!(t1.size(), t1_size - 3);
        assert_eq!(t1.num_children(root1), 0);
        assert_eq!(t2.key(moved), b"m");
        assert_eq!(keys(&t2, moved), vec![b"x".to_vec(), b"y".to_vec()]);
    }

    #[test]
    fn test_duplicate_children_no_rep_replaces_before_window() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let dst = t.claim();
        t.set_parent(dst, Some(root), None);
        t.to_map_keyed(dst, "dst", NodeType::NOTYPE);
        append_keyval(&mut t, dst, "a", "1");
        let b = append_keyval(&mut t, dst, "b", "2");

        let src = t.claim();
        t.set_parent(src, Some(root), Some(dst));
        t.to_map_keyed(src, "src", NodeType::NOTYPE);
        append_keyval(&mut t, src, "a", "9");
        append_keyval(&mut t, src, "c", "3");

        // window opens after `b`: the existing `a` precedes it and is
        // overridden; `c` has no counterpart and is appended
        t.duplicate_children_no_rep(src, dst, Some(b));
        assert_eq!(t.num_children(dst), 3);
        assert_eq!(t.val(t.find_child(dst, b"a").unwrap()), b"9");
        assert_eq!(t.val(t.find_child(dst, b"b").unwrap()), b"2");
        assert_eq!(t.val(t.find_child(dst, b"c").unwrap()), b"3");
    }

    #[test]
    fn test_duplicate_children_no_rep_keeps_at_window_boundary() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let dst = t.claim();
        t.set_parent(dst, Some(root), None);
        t.to_map_keyed(dst, "dst", NodeType::NOTYPE);
        let a = append_keyval(&mut t, dst, "a", "1");
        append_keyval(&mut t, dst, "b", "2");

        let src = t.claim();
        t.set_parent(src, Some(root), Some(dst));
        t.to_map_keyed(src, "src", NodeType::NOTYPE);
        append_keyval(&mut t, src, "a", "9");
        append_keyval(&mut t, src, "c", "3");

        // window opens after `a` itself: the existing entry sits at the
        // cursor and wins
        t.duplicate_children_no_rep(src, dst, Some(a));
        assert_eq!(t.num_children(dst), 3);
        assert_eq!(t.val(t.find_child(dst, b"a").unwrap()), b"1");
        assert_eq!(t.val(t.find_child(dst, b"c").unwrap()), b"3");
        assert_eq!(
            keys(&t, dst),
            vec![b"a".to_vec(), b"c".to_vec(), b"b".to_vec()]
        );
    }

    #[test]
    fn test_duplicate_children_no_rep_into_seq() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let dst = t.claim();
        t.set_parent(dst, Some(root), None);
        t.to_seq_keyed(dst, "dst", NodeType::NOTYPE);
        let e0 = t.claim();
        t.set_parent(e0, Some(dst), None);
        t.to_val(e0, "0", NodeType::NOTYPE);

        let src = t.claim();
        t.set_parent(src, Some(root), Some(dst));
        t.to_seq_keyed(src, "src", NodeType::NOTYPE);
        for v in ["1", "2"] {
            let e = t.claim();
            let after = t.last_child(src);
            t.set_parent(e, Some(src), after);
            t.to_val(e, v, NodeType::NOTYPE);
        }

        t.duplicate_children_no_rep(src, dst, Some(e0));
        let vals: Vec<_> = (0..t.num_children(dst))
            .map(|i| t.val(t.child(dst, i).unwrap()).to_vec())
            .collect();
        assert_eq!(vals, vec![b"0".to_vec(), b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn test_type_transitions_and_predicates() {
        let mut t = Tree::new();
        let root = t.claim();
        t.set_parent(root, None, None);
        t.to_stream(root, NodeType::NOTYPE);
        assert!(t.is_stream(root));
        assert!(t.is_seq(root));

        let doc = t.claim();
        t.set_parent(doc, Some(root), None);
        t.to_doc(doc, NodeType::NOTYPE);
        assert!(t.is_doc(doc));
        assert_eq!(t.type_str(doc), "DOC");

        let v = t.claim();
        t.set_parent(v, Some(doc), None);
        t.to_val(v, "payload", NodeType::NOTYPE);
        assert!(t.is_val(v));
        assert!(!t.has_key(v));
        assert_eq!(t.val(v), b"payload");
    }

    #[test]
    fn test_anchor_setters_and_rem_anchor_ref() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let n = append_keyval(&mut t, root, "k", "v");
        t.set_val_anchor(n, "x");
        assert!(t.has_val_anchor(n));
        assert!(t.has_anchor(n, b"x"));
        assert_eq!(t.val_anchor(n), b"x");

        t.rem_anchor_ref(n);
        assert!(!t.has_val_anchor(n));
        assert!(!t.has_anchor(n, b"x"));
        assert!(t.val_anchor(n).is_empty());
        assert_eq!(t.node_type(n), NodeType::KEYVAL);
    }

    #[test]
    fn test_clone_preserves_structure() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        let n = t.claim();
        t.set_parent(n, Some(root), None);
        let key = t.copy_to_arena(b"k");
        t.to_keyval(n, key, "v", NodeType::NOTYPE);

        let u = t.clone();
        assert_eq!(u.size(), t.size());
        assert_eq!(u.key(n), b"k");
        assert_eq!(u.val(n), b"v");
    }

    #[test]
    #[should_panic(expected = "with children")]
    fn test_to_map_on_parent_panics() {
        let mut t = Tree::new();
        let root = root_map(&mut t);
        append_keyval(&mut t, root, "a", "1");
        t.to_map(root, NodeType::NOTYPE);
    }
}
