//! B-tree index - ordered lookups over one column of one page.
//!
//! Nodes live in an arena (`Vec<Node>`, children addressed by index),
//! so the whole tree frees in one drop and serialization can walk it
//! without touching raw pointers. Insertion is top-down with pre-emptive
//! splits; equal keys are inserted after their duplicates, which makes
//! an in-order traversal return duplicate positions in insertion order.
//!
//! [`BTreeIndex::to_c_source`] emits the same tree as a forest of
//! `static const` nodes plus `find_by_{col}_exact` / `find_by_{col}_range`
//! functions whose traversal mirrors the in-memory one step for step.

use std::cmp::Ordering;
use std::fmt::Write as _;

use crate::common::config::BTREE_ORDER;
use crate::index::key::{IndexKey, KeyType};
use crate::storage::codegen;

type NodeId = usize;

#[derive(Debug, Clone)]
struct Node {
    keys: Vec<IndexKey>,
    /// Record slot of each key, parallel to `keys`.
    positions: Vec<u32>,
    /// Empty for leaves, `keys.len() + 1` entries otherwise.
    children: Vec<NodeId>,
    leaf: bool,
}

impl Node {
    fn leaf() -> Self {
        Self {
            keys: Vec::new(),
            positions: Vec::new(),
            children: Vec::new(),
            leaf: true,
        }
    }
}

/// A fixed-order B-tree keyed by one column.
#[derive(Debug, Clone)]
pub struct BTreeIndex {
    column: String,
    key_type: KeyType,
    nodes: Vec<Node>,
    root: NodeId,
    order: usize,
}

impl BTreeIndex {
    /// An empty tree for `column`.
    pub fn new(column: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            column: column.into(),
            key_type,
            nodes: vec![Node::leaf()],
            root: 0,
            order: BTREE_ORDER,
        }
    }

    /// Build by inserting pre-sorted `(key, position)` pairs in order.
    ///
    /// Sorting must be stable with respect to positions so duplicate
    /// keys keep their original order.
    pub fn build_from_sorted(
        column: impl Into<String>,
        key_type: KeyType,
        pairs: &[(IndexKey, u32)],
    ) -> Self {
        let mut tree = Self::new(column, key_type);
        for (key, position) in pairs {
            tree.insert(key.clone(), *position);
        }
        tree
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Total number of keys.
    pub fn len(&self) -> usize {
        self.nodes.iter().map(|n| n.keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[self.root].keys.is_empty()
    }

    /// Number of allocated nodes (all reachable from the root).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Levels from root to leaf; 1 for a lone root.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = self.root;
        while !self.nodes[node].leaf {
            node = self.nodes[node].children[0];
            height += 1;
        }
        height
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert one `(key, position)` pair.
    pub fn insert(&mut self, key: IndexKey, position: u32) {
        if self.nodes[self.root].keys.len() == self.max_keys() {
            // grow upward: fresh root over the old one, then split
            let old_root = self.root;
            let new_root = self.alloc(Node {
                keys: Vec::new(),
                positions: Vec::new(),
                children: vec![old_root],
                leaf: false,
            });
            self.root = new_root;
            self.split_child(new_root, 0);
        }
        self.insert_nonfull(self.root, key, position);
    }

    fn insert_nonfull(&mut self, node: NodeId, key: IndexKey, position: u32) {
        if self.nodes[node].leaf {
            let i = upper_bound(&self.nodes[node].keys, &key);
            self.nodes[node].keys.insert(i, key);
            self.nodes[node].positions.insert(i, position);
            return;
        }

        let mut i = upper_bound(&self.nodes[node].keys, &key);
        let child = self.nodes[node].children[i];
        if self.nodes[child].keys.len() == self.max_keys() {
            self.split_child(node, i);
            // the promoted median now sits at i; equal keys go right of it
            if key.compare(&self.nodes[node].keys[i]) != Ordering::Less {
                i += 1;
            }
        }
        let child = self.nodes[node].children[i];
        self.insert_nonfull(child, key, position);
    }

    /// Split the full child at `parent.children[idx]`, promoting the
    /// median key into the parent.
    fn split_child(&mut self, parent: NodeId, idx: usize) {
        let t = self.order / 2;
        let child_id = self.nodes[parent].children[idx];

        let child = &mut self.nodes[child_id];
        let mut right_keys = child.keys.split_off(t);
        let mut right_positions = child.positions.split_off(t);
        let median_key = right_keys.remove(0);
        let median_position = right_positions.remove(0);
        let right_children = if child.leaf {
            Vec::new()
        } else {
            child.children.split_off(t + 1)
        };
        let leaf = child.leaf;

        let right_id = self.alloc(Node {
            keys: right_keys,
            positions: right_positions,
            children: right_children,
            leaf,
        });

        let parent_node = &mut self.nodes[parent];
        parent_node.keys.insert(idx, median_key);
        parent_node.positions.insert(idx, median_position);
        parent_node.children.insert(idx + 1, right_id);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// All positions whose key equals `key`, capped at `max`.
    ///
    /// Duplicates come back contiguously, in insertion order.
    pub fn find_exact(&self, key: &IndexKey, max: usize) -> Vec<u32> {
        let mut out = Vec::new();
        self.exact_walk(self.root, key, max, &mut out);
        out
    }

    fn exact_walk(&self, node: NodeId, key: &IndexKey, max: usize, out: &mut Vec<u32>) {
        let n = &self.nodes[node];
        let mut i = n
            .keys
            .partition_point(|k| k.compare(key) == Ordering::Less);
        if !n.leaf {
            self.exact_walk(n.children[i], key, max, out);
        }
        while i < n.keys.len() && n.keys[i].compare(key) == Ordering::Equal {
            if out.len() >= max {
                return;
            }
            out.push(n.positions[i]);
            if !n.leaf {
                self.exact_walk(n.children[i + 1], key, max, out);
            }
            i += 1;
        }
    }

    /// All positions whose key lies in the inclusive range `[lo, hi]`.
    ///
    /// `None` bounds are unbounded; `lo > hi` yields nothing. Results
    /// arrive in key order (insertion order among duplicates).
    pub fn find_range(
        &self,
        lo: Option<&IndexKey>,
        hi: Option<&IndexKey>,
        max: usize,
    ) -> Vec<u32> {
        let mut out = Vec::new();
        self.range_walk(self.root, lo, hi, max, &mut out);
        out
    }

    fn range_walk(
        &self,
        node: NodeId,
        lo: Option<&IndexKey>,
        hi: Option<&IndexKey>,
        max: usize,
        out: &mut Vec<u32>,
    ) {
        let n = &self.nodes[node];
        let mut i = match lo {
            Some(lo) => n
                .keys
                .partition_point(|k| k.compare(lo) == Ordering::Less),
            None => 0,
        };
        if !n.leaf {
            self.range_walk(n.children[i], lo, hi, max, out);
        }
        while i < n.keys.len() {
            if out.len() >= max {
                return;
            }
            if let Some(hi) = hi {
                if n.keys[i].compare(hi) == Ordering::Greater {
                    return;
                }
            }
            out.push(n.positions[i]);
            if !n.leaf {
                self.range_walk(n.children[i + 1], lo, hi, max, out);
            }
            i += 1;
        }
    }

    // ========================================================================
    // Structural checks (used by the property tests)
    // ========================================================================

    /// Verify key ordering, occupancy bounds, separator bounds and
    /// uniform leaf depth. Panics on violation with a description.
    pub fn check_invariants(&self) {
        self.check_node(self.root, true, None, None);
    }

    fn check_node(
        &self,
        id: NodeId,
        is_root: bool,
        lo: Option<&IndexKey>,
        hi: Option<&IndexKey>,
    ) -> usize {
        let n = &self.nodes[id];
        assert!(
            n.keys.len() <= self.max_keys(),
            "node {id} holds {} keys, max is {}",
            n.keys.len(),
            self.max_keys()
        );
        if !is_root {
            assert!(
                n.keys.len() >= self.min_keys(),
                "node {id} holds {} keys, min is {}",
                n.keys.len(),
                self.min_keys()
            );
        }
        for pair in n.keys.windows(2) {
            assert!(
                pair[0].compare(&pair[1]) != Ordering::Greater,
                "node {id} keys out of order"
            );
        }
        for key in &n.keys {
            if let Some(lo) = lo {
                assert!(
                    lo.compare(key) != Ordering::Greater,
                    "node {id} key below subtree bound"
                );
            }
            if let Some(hi) = hi {
                assert!(
                    key.compare(hi) != Ordering::Greater,
                    "node {id} key above subtree bound"
                );
            }
        }
        assert_eq!(n.keys.len(), n.positions.len(), "node {id} parallel arrays");

        if n.leaf {
            assert!(n.children.is_empty(), "leaf {id} has children");
            return 1;
        }
        assert_eq!(
            n.children.len(),
            n.keys.len() + 1,
            "node {id} child count"
        );
        let mut depth = None;
        for (c, &child) in n.children.iter().enumerate() {
            let child_lo = if c == 0 { lo } else { Some(&n.keys[c - 1]) };
            let child_hi = if c == n.keys.len() {
                hi
            } else {
                Some(&n.keys[c])
            };
            let d = self.check_node(child, false, child_lo, child_hi);
            match depth {
                None => depth = Some(d),
                Some(prev) => assert_eq!(prev, d, "node {id} uneven leaf depth"),
            }
        }
        depth.unwrap_or(0) + 1
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Emit the tree as a self-contained C source exposing
    /// `find_by_{column}_exact` and `find_by_{column}_range`.
    pub fn to_c_source(&self, table: &str) -> String {
        let max_keys = self.max_keys();
        let order = self.order;
        let col = &self.column;
        let scalar = self.key_type.c_scalar_type();
        let key_ptr = self.key_type.c_key_pointer();

        let mut out = codegen::banner(&format!(
            "b-tree index on {table}.{col} (order {order})"
        ));
        if self.key_type.is_string() {
            out.push_str("#include <string.h>\n");
        }

        let keys_decl = match self.key_type {
            KeyType::Str { length } => format!("char keys[{max_keys}][{}]", length + 1),
            _ => format!("{scalar} keys[{max_keys}]"),
        };
        let _ = write!(
            out,
            "\ntypedef struct Node {{\n\
             \x20   int num_keys;\n\
             \x20   int is_leaf;\n\
             \x20   {keys_decl};\n\
             \x20   int positions[{max_keys}];\n\
             \x20   const struct Node *children[{order}];\n\
             }} Node;\n\n"
        );

        self.emit_nodes(&mut out);

        let _ = write!(
            out,
            "static const Node *const btree_root = &node_{};\n\n\
             enum {{ btree_height = {}, btree_node_count = {}, btree_key_count = {} }};\n\n",
            self.root,
            self.height(),
            self.node_count(),
            self.len()
        );

        // comparator
        if self.key_type.is_string() {
            out.push_str(
                "static int key_cmp(const char *a, const char *b)\n\
                 {\n\
                 \x20   return strcmp(a, b);\n\
                 }\n\n",
            );
        } else {
            let _ = write!(
                out,
                "static int key_cmp({key_ptr}a, {key_ptr}b)\n\
                 {{\n\
                 \x20   if (*a < *b) return -1;\n\
                 \x20   if (*a > *b) return 1;\n\
                 \x20   return 0;\n\
                 }}\n\n"
            );
        }

        let key_ref = if self.key_type.is_string() {
            "n->keys[i]"
        } else {
            "&n->keys[i]"
        };
        let walk_key_type = if self.key_type.is_string() {
            "const char *".to_string()
        } else {
            key_ptr.to_string()
        };

        let _ = write!(
            out,
            "static int exact_walk(const Node *n, {walk_key_type}key, int *out, int max, int found)\n\
             {{\n\
             \x20   int i = 0;\n\
             \x20   if (!n) {{\n\
             \x20       return found;\n\
             \x20   }}\n\
             \x20   while (i < n->num_keys && key_cmp({key_ref}, key) < 0) {{\n\
             \x20       i++;\n\
             \x20   }}\n\
             \x20   if (!n->is_leaf) {{\n\
             \x20       found = exact_walk(n->children[i], key, out, max, found);\n\
             \x20   }}\n\
             \x20   while (i < n->num_keys && key_cmp({key_ref}, key) == 0) {{\n\
             \x20       if (found >= max) {{\n\
             \x20           return found;\n\
             \x20       }}\n\
             \x20       out[found++] = n->positions[i];\n\
             \x20       if (!n->is_leaf) {{\n\
             \x20           found = exact_walk(n->children[i + 1], key, out, max, found);\n\
             \x20       }}\n\
             \x20       i++;\n\
             \x20   }}\n\
             \x20   return found;\n\
             }}\n\n"
        );

        let _ = write!(
            out,
            "static int range_walk(const Node *n, {walk_key_type}lo, {walk_key_type}hi, int *out, int max, int found)\n\
             {{\n\
             \x20   int i = 0;\n\
             \x20   if (!n) {{\n\
             \x20       return found;\n\
             \x20   }}\n\
             \x20   if (lo) {{\n\
             \x20       while (i < n->num_keys && key_cmp({key_ref}, lo) < 0) {{\n\
             \x20           i++;\n\
             \x20       }}\n\
             \x20   }}\n\
             \x20   if (!n->is_leaf) {{\n\
             \x20       found = range_walk(n->children[i], lo, hi, out, max, found);\n\
             \x20   }}\n\
             \x20   for (; i < n->num_keys; i++) {{\n\
             \x20       if (found >= max) {{\n\
             \x20           return found;\n\
             \x20       }}\n\
             \x20       if (hi && key_cmp({key_ref}, hi) > 0) {{\n\
             \x20           return found;\n\
             \x20       }}\n\
             \x20       out[found++] = n->positions[i];\n\
             \x20       if (!n->is_leaf) {{\n\
             \x20           found = range_walk(n->children[i + 1], lo, hi, out, max, found);\n\
             \x20       }}\n\
             \x20   }}\n\
             \x20   return found;\n\
             }}\n\n"
        );

        let cast = walk_key_type.trim_end().to_string();
        let _ = write!(
            out,
            "int find_by_{col}_exact(const void *key, int *positions, int max)\n\
             {{\n\
             \x20   return exact_walk(btree_root, ({cast})key, positions, max, 0);\n\
             }}\n\n\
             int find_by_{col}_range(const void *lo, const void *hi, int *positions, int max)\n\
             {{\n\
             \x20   return range_walk(btree_root, ({cast})lo, ({cast})hi, positions, max, 0);\n\
             }}\n"
        );

        out
    }

    /// Emit one `static const Node` per in-memory node, children first
    /// so every reference points at an already-defined node.
    fn emit_nodes(&self, out: &mut String) {
        let mut order_list = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, visited)) = stack.pop() {
            if visited {
                order_list.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in &self.nodes[id].children {
                stack.push((child, false));
            }
        }

        let max_keys = self.max_keys();
        let pad_key = match self.key_type {
            KeyType::Str { .. } => "\"\"".to_string(),
            _ => "0".to_string(),
        };
        for id in order_list {
            let n = &self.nodes[id];
            let keys: Vec<String> = (0..max_keys)
                .map(|i| {
                    n.keys
                        .get(i)
                        .map(|k| k.c_literal())
                        .unwrap_or_else(|| pad_key.clone())
                })
                .collect();
            let positions: Vec<String> = (0..max_keys)
                .map(|i| n.positions.get(i).map_or("0".to_string(), |p| p.to_string()))
                .collect();
            let children: Vec<String> = (0..self.order)
                .map(|i| {
                    n.children
                        .get(i)
                        .map_or("0".to_string(), |c| format!("&node_{c}"))
                })
                .collect();
            let _ = write!(
                out,
                "static const Node node_{id} = {{\n\
                 \x20   {}, {},\n\
                 \x20   {{ {} }},\n\
                 \x20   {{ {} }},\n\
                 \x20   {{ {} }}\n\
                 }};\n",
                n.keys.len(),
                n.leaf as u8,
                keys.join(", "),
                positions.join(", "),
                children.join(", ")
            );
        }
        out.push('\n');
    }

    fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Non-root occupancy floor maintained by the pre-emptive split.
    fn min_keys(&self) -> usize {
        self.order / 2 - 1
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// First index whose key orders strictly after `key`, so equal keys are
/// passed over and duplicates land in insertion order.
fn upper_bound(keys: &[IndexKey], key: &IndexKey) -> usize {
    keys.partition_point(|k| k.compare(key) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_tree(values: &[i32]) -> BTreeIndex {
        let mut tree = BTreeIndex::new("id", KeyType::Int);
        for (pos, &v) in values.iter().enumerate() {
            tree.insert(IndexKey::Int(v), pos as u32);
        }
        tree
    }

    #[test]
    fn test_empty_tree() {
        let tree = BTreeIndex::new("id", KeyType::Int);
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        assert!(tree.find_exact(&IndexKey::Int(1), 10).is_empty());
        assert!(tree.find_range(None, None, 10).is_empty());
        tree.check_invariants();
    }

    #[test]
    fn test_single_key() {
        let tree = int_tree(&[42]);
        assert_eq!(tree.find_exact(&IndexKey::Int(42), 10), vec![0]);
        assert!(tree.find_exact(&IndexKey::Int(41), 10).is_empty());
        assert_eq!(tree.find_range(None, None, 10), vec![0]);
        tree.check_invariants();
    }

    #[test]
    fn test_split_grows_height() {
        // order 5: the fifth insert splits the root
        let tree = int_tree(&[1, 2, 3, 4]);
        assert_eq!(tree.height(), 1);
        let tree = int_tree(&[1, 2, 3, 4, 5]);
        assert_eq!(tree.height(), 2);
        tree.check_invariants();
    }

    #[test]
    fn test_exact_with_duplicates_in_insertion_order() {
        let mut tree = BTreeIndex::new("id", KeyType::Int);
        for (pos, v) in [5, 3, 5, 9, 5, 1, 5].into_iter().enumerate() {
            tree.insert(IndexKey::Int(v), pos as u32);
        }
        tree.check_invariants();
        assert_eq!(tree.find_exact(&IndexKey::Int(5), 10), vec![0, 2, 4, 6]);
        // contiguous in a range scan too
        assert_eq!(
            tree.find_range(None, None, 10),
            vec![5, 1, 0, 2, 4, 6, 3]
        );
    }

    #[test]
    fn test_exact_respects_buffer_cap() {
        let mut tree = BTreeIndex::new("id", KeyType::Int);
        for pos in 0..20u32 {
            tree.insert(IndexKey::Int(7), pos);
        }
        assert_eq!(tree.find_exact(&IndexKey::Int(7), 3).len(), 3);
    }

    #[test]
    fn test_range_lookup() {
        let tree = int_tree(&[10, 20, 30, 40, 50, 60, 70]);
        let keys = |positions: Vec<u32>| -> Vec<i32> {
            positions.iter().map(|&p| (p as i32 + 1) * 10).collect()
        };
        assert_eq!(
            keys(tree.find_range(
                Some(&IndexKey::Int(20)),
                Some(&IndexKey::Int(50)),
                10
            )),
            vec![20, 30, 40, 50]
        );
        // unbounded ends
        assert_eq!(
            keys(tree.find_range(None, Some(&IndexKey::Int(30)), 10)),
            vec![10, 20, 30]
        );
        assert_eq!(
            keys(tree.find_range(Some(&IndexKey::Int(60)), None, 10)),
            vec![60, 70]
        );
        // inverted range is empty
        assert!(tree
            .find_range(Some(&IndexKey::Int(50)), Some(&IndexKey::Int(20)), 10)
            .is_empty());
        // cap
        assert_eq!(tree.find_range(None, None, 4).len(), 4);
    }

    #[test]
    fn test_range_spans_many_nodes() {
        // enough keys for height 3; the range must traverse past the
        // first leaf
        let values: Vec<i32> = (0..100).collect();
        let tree = int_tree(&values);
        tree.check_invariants();
        assert!(tree.height() >= 3);

        let positions = tree.find_range(Some(&IndexKey::Int(10)), Some(&IndexKey::Int(90)), 200);
        let got: Vec<i32> = positions.iter().map(|&p| p as i32).collect();
        assert_eq!(got, (10..=90).collect::<Vec<_>>());
    }

    #[test]
    fn test_string_keys() {
        let mut tree = BTreeIndex::new("name", KeyType::Str { length: 10 });
        for (pos, name) in ["mallory", "alice", "bob", "carol", "alice"]
            .into_iter()
            .enumerate()
        {
            tree.insert(IndexKey::Str(name.to_string()), pos as u32);
        }
        tree.check_invariants();
        assert_eq!(tree.find_exact(&IndexKey::Str("alice".into()), 10), vec![1, 4]);
        assert_eq!(
            tree.find_range(
                Some(&IndexKey::Str("alice".into())),
                Some(&IndexKey::Str("carol".into())),
                10
            ),
            vec![1, 4, 2, 3]
        );
    }

    #[test]
    fn test_build_from_sorted() {
        let pairs: Vec<(IndexKey, u32)> =
            (0..50).map(|i| (IndexKey::Int(i * 2), i as u32)).collect();
        let tree = BTreeIndex::build_from_sorted("id", KeyType::Int, &pairs);
        tree.check_invariants();
        assert_eq!(tree.len(), 50);
        assert_eq!(tree.find_exact(&IndexKey::Int(48), 10), vec![24]);
        assert!(tree.find_exact(&IndexKey::Int(49), 10).is_empty());
    }

    #[test]
    fn test_c_source_shape() {
        let tree = int_tree(&[1, 2, 3, 4, 5, 6, 7]);
        let source = tree.to_c_source("Customers");
        assert!(source.contains("typedef struct Node"));
        assert!(source.contains("int keys[4]"));
        assert!(source.contains("const struct Node *children[5]"));
        assert!(source.contains("static const Node *const btree_root"));
        assert!(source.contains("int find_by_id_exact(const void *key, int *positions, int max)"));
        assert!(source.contains("int find_by_id_range(const void *lo, const void *hi, int *positions, int max)"));
        // children are emitted before the nodes that reference them
        let root_def = source.find(&format!("static const Node node_{} ", tree.root));
        let ref_pos = source.find("&node_");
        assert!(root_def.is_some() && ref_pos.is_some());
    }

    #[test]
    fn test_c_source_string_keys_use_strcmp() {
        let mut tree = BTreeIndex::new("name", KeyType::Str { length: 8 });
        tree.insert(IndexKey::Str("bob".into()), 0);
        let source = tree.to_c_source("T");
        assert!(source.contains("#include <string.h>"));
        assert!(source.contains("char keys[4][9]"));
        assert!(source.contains("strcmp(a, b)"));
        assert!(source.contains("\"bob\""));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        proptest! {
            /// Structural invariants hold after any insertion sequence.
            #[test]
            fn invariants_hold_under_inserts(values in prop::collection::vec(-50i32..50, 0..200)) {
                let mut tree = BTreeIndex::new("id", KeyType::Int);
                for (pos, &v) in values.iter().enumerate() {
                    tree.insert(IndexKey::Int(v), pos as u32);
                    tree.check_invariants();
                }
            }

            /// Exact lookup returns the same multiset as a linear scan.
            #[test]
            fn exact_matches_oracle(values in prop::collection::vec(-20i32..20, 0..150), probe in -25i32..25) {
                let tree = int_tree(&values);
                let mut got = tree.find_exact(&IndexKey::Int(probe), values.len().max(1));
                let mut expected: Vec<u32> = values
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v == probe)
                    .map(|(p, _)| p as u32)
                    .collect();
                got.sort_unstable();
                expected.sort_unstable();
                prop_assert_eq!(got, expected);
            }

            /// Range lookup returns exactly the pairs inside [lo, hi].
            #[test]
            fn range_matches_oracle(values in prop::collection::vec(-30i32..30, 0..150), a in -35i32..35, b in -35i32..35) {
                let tree = int_tree(&values);
                let (lo, hi) = (a.min(b), a.max(b));
                let mut got = tree.find_range(
                    Some(&IndexKey::Int(lo)),
                    Some(&IndexKey::Int(hi)),
                    values.len().max(1),
                );
                let mut expected: Vec<u32> = values
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v >= lo && v <= hi)
                    .map(|(p, _)| p as u32)
                    .collect();
                got.sort_unstable();
                expected.sort_unstable();
                prop_assert_eq!(got, expected);
            }

            /// Range results come back in key order.
            #[test]
            fn range_is_key_ordered(values in prop::collection::vec(-30i32..30, 0..120)) {
                let tree = int_tree(&values);
                let positions = tree.find_range(None, None, values.len().max(1));
                let keys: Vec<i32> = positions.iter().map(|&p| values[p as usize]).collect();
                let mut sorted = keys.clone();
                sorted.sort_unstable();
                prop_assert_eq!(keys, sorted);
            }

            /// build_from_sorted agrees with a map-based oracle.
            #[test]
            fn build_from_sorted_matches_map(values in prop::collection::vec(0i32..40, 0..120)) {
                let mut pairs: Vec<(IndexKey, u32)> = values
                    .iter()
                    .enumerate()
                    .map(|(p, &v)| (IndexKey::Int(v), p as u32))
                    .collect();
                pairs.sort_by(|a, b| a.0.compare(&b.0));
                let tree = BTreeIndex::build_from_sorted("id", KeyType::Int, &pairs);
                tree.check_invariants();

                let mut oracle: BTreeMap<i32, Vec<u32>> = BTreeMap::new();
                for (p, &v) in values.iter().enumerate() {
                    oracle.entry(v).or_default().push(p as u32);
                }
                for (k, expected) in oracle {
                    let mut got = tree.find_exact(&IndexKey::Int(k), values.len());
                    got.sort_unstable();
                    let mut expected = expected;
                    expected.sort_unstable();
                    prop_assert_eq!(got, expected);
                }
            }
        }
    }
}
