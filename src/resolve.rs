//! Anchor and alias resolution.
//!
//! After parsing, the tree holds anchor-bearing nodes (`&name`), alias nodes
//! (`*name`), and merge entries (key `<<`). [`Tree::resolve`] materializes
//! every alias into a copy of its target and removes the alias nodes, leaving
//! a pure value tree.
//!
//! Resolution is two-pass: a pre-order collection pass records anchors and
//! references in serialization order, then each alias is looked up against
//! the anchors that precede it. Per YAML 1.2, "an alias node refers to the
//! most recent node in the serialization having the specified anchor"
//! (<https://yaml.org/spec/1.2/spec.html#id2765878>), so the lookup walks
//! backward from the alias.

#[cfg(not(test))]
use alloc::string::String;
#[cfg(not(test))]
use alloc::vec::Vec;

use crate::node::NodeId;
use crate::tree::Tree;

/// One collected anchor definition or alias reference.
#[derive(Debug)]
struct RefRecord {
    /// True for aliases and merge entries, false for anchor definitions.
    is_ref: bool,
    /// The node carrying the anchor or reference.
    node: NodeId,
    /// Index of the nearest earlier anchor record.
    prev_anchor: Option<usize>,
    /// The anchor node this reference resolves to (references only).
    target: Option<NodeId>,
    /// For elements of a merge sequence (`<<: [*a, *b]`): the sequence node.
    parent_ref: Option<NodeId>,
    /// The merge sequence's next sibling at collection time.
    #[allow(dead_code)]
    parent_ref_sibling: Option<NodeId>,
}

/// Collects anchors and references in serialization order and resolves each
/// reference to its target.
struct ReferenceResolver {
    refs: Vec<RefRecord>,
}

impl ReferenceResolver {
    fn new(t: &Tree<'_>) -> Self {
        let mut rr = ReferenceResolver { refs: Vec::new() };
        let nrefs = Self::count(t, t.root_id());
        if nrefs == 0 {
            return rr;
        }
        rr.refs.reserve(nrefs);
        rr.store(t, t.root_id());

        // connect each record to the nearest earlier anchor
        let mut prev_anchor = None;
        for (i, rd) in rr.refs.iter_mut().enumerate() {
            rd.prev_anchor = prev_anchor;
            if !rd.is_ref {
                prev_anchor = Some(i);
            }
        }

        for i in 0..rr.refs.len() {
            if !rr.refs[i].is_ref {
                continue;
            }
            let target = rr.lookup(t, i);
            check_not_cyclic(t, rr.refs[i].node, target);
            rr.refs[i].target = Some(target);
        }
        rr
    }

    /// Upper bound on the number of records, for a single allocation.
    fn count(t: &Tree<'_>, n: NodeId) -> usize {
        let mut c = 0;
        if t.is_key_ref(n)
            || t.is_val_ref(n)
            || t.has_key_anchor(n)
            || t.has_val_anchor(n)
            || is_merge_key(t, n)
        {
            c += 1;
        }
        let mut ch = t.first_child(n);
        while let Some(i) = ch {
            c += Self::count(t, i);
            ch = t.next_sibling(i);
        }
        c
    }

    /// Depth-first pre-order collection of anchors and references.
    fn store(&mut self, t: &Tree<'_>, n: NodeId) {
        if t.is_key_ref(n) || t.is_val_ref(n) || is_merge_key(t, n) {
            if t.is_seq(n) {
                // merge sequence: record each element, tied to the sequence
                // node so materialization repeats the merge per element
                let sib = t.next_sibling(n);
                let mut ch = t.first_child(n);
                while let Some(i) = ch {
                    debug_assert_eq!(t.num_children(i), 0);
                    self.refs.push(RefRecord {
                        is_ref: true,
                        node: i,
                        prev_anchor: None,
                        target: None,
                        parent_ref: Some(n),
                        parent_ref_sibling: sib,
                    });
                    ch = t.next_sibling(i);
                }
                return;
            } else if t.has_val(n) {
                self.refs.push(RefRecord {
                    is_ref: true,
                    node: n,
                    prev_anchor: None,
                    target: None,
                    parent_ref: None,
                    parent_ref_sibling: None,
                });
            } else {
                unreachable!("alias node {} has neither a value nor sequence elements", n);
            }
        }
        if t.has_key_anchor(n) || t.has_val_anchor(n) {
            self.refs.push(RefRecord {
                is_ref: false,
                node: n,
                prev_anchor: None,
                target: None,
                parent_ref: None,
                parent_ref_sibling: None,
            });
        }
        let mut ch = t.first_child(n);
        while let Some(i) = ch {
            self.store(t, i);
            ch = t.next_sibling(i);
        }
    }

    /// Find the most recent preceding anchor matching the reference's name.
    fn lookup(&self, t: &Tree<'_>, idx: usize) -> NodeId {
        let node = self.refs[idx].node;
        // a pure key reference names its anchor in the key text; everything
        // else carries the alias in the value
        let raw = if t.is_key_ref(node) && !t.is_val_ref(node) {
            t.key(node)
        } else {
            t.val(node)
        };
        assert_eq!(
            raw.first(),
            Some(&b'*'),
            "alias on node {} must start with '*'",
            node
        );
        let name = &raw[1..];

        let mut ra = idx;
        while let Some(prev) = self.refs[ra].prev_anchor {
            ra = prev;
            if t.has_anchor(self.refs[ra].node, name) {
                return self.refs[ra].node;
            }
        }
        panic!(
            "no anchor named '{}' precedes the alias on node {}",
            String::from_utf8_lossy(name),
            node
        );
    }
}

#[inline]
fn is_merge_key(t: &Tree<'_>, n: NodeId) -> bool {
    t.has_key(n) && t.key(n) == b"<<"
}

/// Inlining an anchor whose subtree contains the alias itself would copy
/// without bound; detect it up front.
fn check_not_cyclic(t: &Tree<'_>, alias: NodeId, target: NodeId) {
    let mut p = t.parent(alias);
    while let Some(anc) = p {
        assert_ne!(
            anc, target,
            "cannot resolve cyclic reference: the target of the alias on node {} contains the alias itself",
            alias
        );
        p = t.parent(anc);
    }
}

impl<'t> Tree<'t> {
    /// Materialize all anchors, aliases, and merge keys.
    ///
    /// Every alias node is rewritten to a copy of the most recent preceding
    /// node carrying the referenced anchor. `<<` merge entries (single
    /// aliases or sequences of aliases) contribute their target's children to
    /// the enclosing mapping, with existing entries winning over merged-in
    /// ones and earlier merges winning over later ones. Afterwards no
    /// reference or anchor marks remain anywhere in the tree.
    ///
    /// # Panics
    ///
    /// Panics if an alias names an anchor that does not precede it, or if a
    /// reference is cyclic.
    pub fn resolve(&mut self) {
        if self.is_empty() {
            return;
        }
        let rr = ReferenceResolver::new(self);

        // materialize references in serialization order
        let mut prev_parent_ref: Option<NodeId> = None;
        let mut prev_parent_ref_after: Option<NodeId> = None;
        for rd in &rr.refs {
            if !rd.is_ref {
                continue;
            }
            let target = match rd.target {
                Some(tgt) => tgt,
                None => unreachable!("reference target was resolved in the lookup pass"),
            };
            if let Some(pref) = rd.parent_ref {
                // merge-sequence element: extend the merge into the
                // grandparent mapping, keeping one insertion cursor per
                // sequence across its elements
                assert!(self.is_seq(pref), "merge container {} must be a sequence", pref);
                let p = match self.parent(pref) {
                    Some(p) => p,
                    None => unreachable!("merge sequence {} has no parent mapping", pref),
                };
                let after = if prev_parent_ref != Some(pref) {
                    Some(pref)
                } else {
                    prev_parent_ref_after
                };
                prev_parent_ref = Some(pref);
                prev_parent_ref_after = self.duplicate_children_no_rep(target, p, after);
                self.remove(rd.node);
            } else if is_merge_key(self, rd.node) {
                debug_assert!(self.is_keyval(rd.node));
                let p = match self.parent(rd.node) {
                    Some(p) => p,
                    None => unreachable!("merge entry {} has no parent mapping", rd.node),
                };
                let after = self.prev_sibling(rd.node);
                self.duplicate_children_no_rep(target, p, after);
                self.remove(rd.node);
            } else {
                // plain value or key alias: the node keeps its key and takes
                // on the target's type, value, and children
                self.duplicate_contents(target, rd.node);
            }
        }

        // drop merge-sequence containers that are still live
        for rd in &rr.refs {
            if let Some(pref) = rd.parent_ref {
                if !self.node_type(pref).is_notype() {
                    self.remove(pref);
                }
            }
        }

        // strip every remaining anchor/reference mark, including those on
        // freshly duplicated subtrees
        for i in 0..self.capacity() {
            let id = NodeId::new(i);
            if self.node_type(id).is_notype() {
                continue;
            }
            self.rem_anchor_ref(id);
        }
    }
}
