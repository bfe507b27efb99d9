//! Node type bitmask.
//!
//! Every node carries a `NodeType`: a bitmask classifying its kind (scalar,
//! mapping, sequence, document, stream) together with modifier bits for keys,
//! anchors, and alias references. The bitmask replaces what would otherwise be
//! an enum-of-variants; a node changes kind in place via the `Tree::to_*`
//! transitions without being reallocated.

use core::fmt;

/// Bitmask classifying a node's kind and modifiers.
///
/// The low bits encode the kind; `KEYREF`/`VALREF` mark the key or value as
/// an unresolved alias (`*name`), and `KEYANCH`/`VALANCH` mark the presence
/// of an anchor (`&name`) on the key or value.
///
/// A zeroed `NodeType` is [`NOTYPE`](Self::NOTYPE): the node is unused and
/// sits on the free list.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeType(pub u16);

impl NodeType {
    /// Unused node (free-list member or freshly cleared).
    pub const NOTYPE: NodeType = NodeType(0);
    /// The node has a scalar value.
    pub const VAL: NodeType = NodeType(1 << 0);
    /// The node has a key (it is a child of a mapping).
    pub const KEY: NodeType = NodeType(1 << 1);
    /// The node is a mapping.
    pub const MAP: NodeType = NodeType(1 << 2);
    /// The node is a sequence.
    pub const SEQ: NodeType = NodeType(1 << 3);
    /// The node is a document.
    pub const DOC: NodeType = NodeType(1 << 4);
    /// The node is a stream: a sequence of documents.
    pub const STREAM: NodeType = NodeType(1 << 5 | Self::SEQ.0);
    /// The node's key is an alias reference.
    pub const KEYREF: NodeType = NodeType(1 << 6);
    /// The node's value is an alias reference.
    pub const VALREF: NodeType = NodeType(1 << 7);
    /// The node's key carries an anchor.
    pub const KEYANCH: NodeType = NodeType(1 << 8);
    /// The node's value carries an anchor.
    pub const VALANCH: NodeType = NodeType(1 << 9);

    /// Keyed scalar: a child of a mapping with a scalar value.
    pub const KEYVAL: NodeType = NodeType(Self::KEY.0 | Self::VAL.0);
    /// Keyed mapping: a mapping appearing as a value in a parent mapping.
    pub const KEYMAP: NodeType = NodeType(Self::KEY.0 | Self::MAP.0);
    /// Keyed sequence: a sequence appearing as a value in a parent mapping.
    pub const KEYSEQ: NodeType = NodeType(Self::KEY.0 | Self::SEQ.0);
    /// Document whose payload is a mapping.
    pub const DOCMAP: NodeType = NodeType(Self::DOC.0 | Self::MAP.0);
    /// Document whose payload is a sequence.
    pub const DOCSEQ: NodeType = NodeType(Self::DOC.0 | Self::SEQ.0);

    /// Mask selecting the kind bits (everything below the modifier bits).
    const KIND_MASK: u16 = (1 << 6) - 1;
    /// Mask selecting the alias-reference bits.
    const REF_MASK: u16 = Self::KEYREF.0 | Self::VALREF.0;
    /// Mask selecting the anchor-presence bits.
    const ANCH_MASK: u16 = Self::KEYANCH.0 | Self::VALANCH.0;

    /// The kind bits alone, with modifiers stripped.
    #[inline]
    pub fn kind(self) -> NodeType {
        NodeType(self.0 & Self::KIND_MASK)
    }

    /// Check whether all bits of `flags` are set.
    #[inline]
    pub fn has_all(self, flags: NodeType) -> bool {
        self.0 & flags.0 == flags.0
    }

    /// Check whether any bit of `flags` is set.
    #[inline]
    pub fn has_any(self, flags: NodeType) -> bool {
        self.0 & flags.0 != 0
    }

    /// Union of the two masks.
    #[inline]
    pub fn with(self, flags: NodeType) -> NodeType {
        NodeType(self.0 | flags.0)
    }

    /// This mask with all bits of `flags` removed.
    #[inline]
    pub fn without(self, flags: NodeType) -> NodeType {
        NodeType(self.0 & !flags.0)
    }

    #[inline]
    pub fn is_notype(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn has_key(self) -> bool {
        self.has_all(Self::KEY)
    }

    #[inline]
    pub fn has_val(self) -> bool {
        self.has_all(Self::VAL)
    }

    /// A keyless scalar (sequence element or document payload).
    #[inline]
    pub fn is_val(self) -> bool {
        self.0 & Self::KEYVAL.0 == Self::VAL.0
    }

    /// A keyed scalar inside a mapping.
    #[inline]
    pub fn is_keyval(self) -> bool {
        self.has_all(Self::KEYVAL)
    }

    #[inline]
    pub fn is_map(self) -> bool {
        self.has_any(Self::MAP)
    }

    #[inline]
    pub fn is_seq(self) -> bool {
        self.has_any(Self::SEQ)
    }

    #[inline]
    pub fn is_doc(self) -> bool {
        self.has_any(Self::DOC)
    }

    #[inline]
    pub fn is_stream(self) -> bool {
        self.has_all(Self::STREAM)
    }

    /// Mapping, sequence, document, or stream: anything that holds children.
    #[inline]
    pub fn is_container(self) -> bool {
        self.has_any(NodeType(
            Self::MAP.0 | Self::SEQ.0 | Self::DOC.0 | Self::STREAM.0,
        ))
    }

    #[inline]
    pub fn is_key_ref(self) -> bool {
        self.has_any(Self::KEYREF)
    }

    #[inline]
    pub fn is_val_ref(self) -> bool {
        self.has_any(Self::VALREF)
    }

    #[inline]
    pub fn is_ref(self) -> bool {
        self.0 & Self::REF_MASK != 0
    }

    #[inline]
    pub fn has_key_anchor(self) -> bool {
        self.has_any(Self::KEYANCH)
    }

    #[inline]
    pub fn has_val_anchor(self) -> bool {
        self.has_any(Self::VALANCH)
    }

    #[inline]
    pub fn has_anchor(self) -> bool {
        self.0 & Self::ANCH_MASK != 0
    }

    /// Strip every anchor and alias-reference bit.
    #[inline]
    pub(crate) fn without_anchor_ref(self) -> NodeType {
        NodeType(self.0 & !(Self::REF_MASK | Self::ANCH_MASK))
    }

    /// Printable name for the kind encoded in this mask.
    ///
    /// Modifier-only masks (just reference bits set) print as `"REF"`.
    pub fn type_str(self) -> &'static str {
        const VAL: u16 = NodeType::VAL.0;
        const MAP: u16 = NodeType::MAP.0;
        const SEQ: u16 = NodeType::SEQ.0;
        const KEYVAL: u16 = NodeType::KEYVAL.0;
        const KEYMAP: u16 = NodeType::KEYMAP.0;
        const KEYSEQ: u16 = NodeType::KEYSEQ.0;
        const DOC: u16 = NodeType::DOC.0;
        const DOCSEQ: u16 = NodeType::DOCSEQ.0;
        const DOCMAP: u16 = NodeType::DOCMAP.0;
        const STREAM: u16 = NodeType::STREAM.0;
        match self.0 & Self::KIND_MASK {
            0 => {
                if self.is_ref() {
                    "REF"
                } else {
                    "NOTYPE"
                }
            }
            VAL => "VAL",
            MAP => "MAP",
            SEQ => "SEQ",
            KEYVAL => "KEYVAL",
            KEYMAP => "KEYMAP",
            KEYSEQ => "KEYSEQ",
            DOC => "DOC",
            DOCSEQ => "DOCSEQ",
            DOCMAP => "DOCMAP",
            STREAM => "STREAM",
            _ => {
                if self.is_ref() {
                    "REF"
                } else {
                    "(unknown?)"
                }
            }
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeType({}|{:#x})", self.type_str(), self.0)
    }
}

impl core::ops::BitOr for NodeType {
    type Output = NodeType;

    #[inline]
    fn bitor(self, rhs: NodeType) -> NodeType {
        NodeType(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for NodeType {
    #[inline]
    fn bitor_assign(&mut self, rhs: NodeType) {
        self.0 |= rhs.0;
    }
}
