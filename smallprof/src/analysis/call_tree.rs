//! Weighted call tree aggregated from traces
//!
//! # Layout
//!
//! Nodes live in a flat arena and refer to their children by index. The root
//! (index 0) is a synthetic node labelled `"main"`:
//!
//! ```text
//! arena[0] main (5)
//!   ├─ arena[1] Main.main() (5)
//!   │    ├─ arena[2] Foo.foo() (3)
//!   │    └─ arena[3] Bar.bar() (2)
//! ```
//!
//! Every insertion adds its weight to each node on its path, root included, so
//! a node's count is always at least the sum of its children's counts and the
//! root's count is the sum of all inserted weights.
//!
//! # Concurrency
//!
//! One `parking_lot::Mutex` guards the whole arena. An insertion holds it for
//! the full path, so a concurrent `serialize` never sees half a trace.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Label of the synthetic root node
pub const ROOT_LABEL: &str = "main";

const ROOT: usize = 0;

#[derive(Debug)]
struct Node {
    label: Arc<str>,
    count: u64,
    children: HashMap<Arc<str>, usize>,
}

impl Node {
    fn new(label: Arc<str>) -> Self {
        Self { label, count: 0, children: HashMap::new() }
    }
}

#[derive(Debug)]
struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn child(&mut self, parent: usize, label: &str) -> usize {
        if let Some(&index) = self.nodes[parent].children.get(label) {
            return index;
        }
        let index = self.nodes.len();
        let label: Arc<str> = Arc::from(label);
        self.nodes.push(Node::new(Arc::clone(&label)));
        self.nodes[parent].children.insert(label, index);
        index
    }

    fn depth_below(&self, index: usize) -> usize {
        // Iterative, traces can be hundreds of frames deep
        let mut deepest = 0;
        let mut stack = vec![(index, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(self.nodes[node].children.values().map(|&c| (c, depth + 1)));
        }
        deepest
    }

    fn export(&self, index: usize, max_depth: usize, min_value: u64) -> FlameNode {
        let node = &self.nodes[index];
        let mut children = Vec::new();
        if max_depth > 1 {
            let mut ordered: Vec<usize> = node
                .children
                .values()
                .copied()
                .filter(|&c| self.nodes[c].count >= min_value)
                .collect();
            ordered.sort_unstable_by(|&a, &b| {
                let (a, b) = (&self.nodes[a], &self.nodes[b]);
                b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label))
            });
            children = ordered
                .into_iter()
                .map(|child| self.export(child, max_depth - 1, min_value))
                .collect();
        }
        FlameNode { name: node.label.to_string(), value: node.count, children }
    }
}

/// Call tree shared between the sampler and readers
#[derive(Debug)]
pub struct CallTree {
    arena: Mutex<Arena>,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    #[must_use]
    pub fn new() -> Self {
        Self { arena: Mutex::new(Arena { nodes: vec![Node::new(Arc::from(ROOT_LABEL))] }) }
    }

    /// Merge one trace, ordered outermost to innermost, with the given weight
    ///
    /// Missing nodes are created; every node on the path (and the root) gains
    /// `weight`. A zero weight is ignored.
    pub fn add_trace<I, S>(&self, labels: I, weight: u64)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if weight == 0 {
            return;
        }
        let mut arena = self.arena.lock();
        arena.nodes[ROOT].count += weight;
        let mut current = ROOT;
        for label in labels {
            current = arena.child(current, label.as_ref());
            arena.nodes[current].count += weight;
        }
    }

    /// Sum of all merged weights
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.arena.lock().nodes[ROOT].count
    }

    /// Number of nodes, root included
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.arena.lock().nodes.len()
    }

    /// Levels in the tree, root included (1 for an empty tree)
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.arena.lock().depth_below(ROOT)
    }

    /// Export at most `max_depth` levels (root = level 1)
    ///
    /// Children are ordered by descending value, ties by label. A depth of
    /// 0 is treated as 1.
    #[must_use]
    pub fn serialize(&self, max_depth: usize) -> FlameNode {
        self.serialize_filtered(max_depth, 0)
    }

    /// Like [`serialize`](Self::serialize), omitting subtrees whose value is
    /// below `min_value`
    #[must_use]
    pub fn serialize_filtered(&self, max_depth: usize, min_value: u64) -> FlameNode {
        self.arena.lock().export(ROOT, max_depth.max(1), min_value)
    }
}

/// Exported tree node in d3-flame-graph layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlameNode {
    pub name: String,
    pub value: u64,
    pub children: Vec<FlameNode>,
}

impl FlameNode {
    /// Find a direct child by name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&FlameNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follow a path of child names
    #[must_use]
    pub fn path<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Option<&FlameNode> {
        names.into_iter().try_fold(self, |node, name| node.child(name))
    }

    /// Levels below and including this node
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(FlameNode::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sorted(node: &FlameNode) {
        for pair in node.children.windows(2) {
            assert!(pair[0].value >= pair[1].value, "{} before {}", pair[0].name, pair[1].name);
        }
        node.children.iter().for_each(assert_sorted);
    }

    #[test]
    fn test_root_counts_all_weights() {
        let tree = CallTree::new();
        tree.add_trace(["a", "b"], 3);
        tree.add_trace(["a", "c"], 2);
        tree.add_trace(["d"], 1);
        assert_eq!(tree.total_samples(), 6);
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.max_depth(), 3);
    }

    #[test]
    fn test_repeated_trace_equals_summed_weight() {
        let split = CallTree::new();
        split.add_trace(["a", "b", "c"], 2);
        split.add_trace(["a", "b", "c"], 5);

        let merged = CallTree::new();
        merged.add_trace(["a", "b", "c"], 7);

        assert_eq!(split.serialize(10), merged.serialize(10));
        assert_eq!(split.node_count(), 4);
    }

    #[test]
    fn test_depth_one_is_root_only() {
        let tree = CallTree::new();
        tree.add_trace(["a", "b"], 4);
        let root = tree.serialize(1);
        assert_eq!(root.name, ROOT_LABEL);
        assert_eq!(root.value, 4);
        assert!(root.children.is_empty());
        assert_eq!(tree.serialize(0), root);
    }

    #[test]
    fn test_depth_limit_on_deep_tree() {
        let tree = CallTree::new();
        tree.add_trace(["a", "b", "c"], 1);

        let root = tree.serialize(2);
        assert_eq!(root.depth(), 2);
        let a = root.child("a").unwrap();
        assert_eq!(a.value, 1);
        assert!(a.children.is_empty());
    }

    #[test]
    fn test_children_sorted_by_value_then_label() {
        let tree = CallTree::new();
        tree.add_trace(["x", "low"], 1);
        tree.add_trace(["x", "high"], 5);
        tree.add_trace(["x", "tie-b"], 2);
        tree.add_trace(["x", "tie-a"], 2);
        tree.add_trace(["y"], 9);

        let root = tree.serialize(10);
        assert_sorted(&root);
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
        let under_x: Vec<&str> = root.children[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(under_x, ["high", "tie-a", "tie-b", "low"]);
    }

    #[test]
    fn test_min_value_filters_small_children() {
        let tree = CallTree::new();
        tree.add_trace(["a", "big"], 5);
        tree.add_trace(["a", "small"], 1);
        tree.add_trace(["b"], 1);

        let root = tree.serialize_filtered(10, 2);
        assert_eq!(root.value, 7);
        assert!(root.child("b").is_none());
        let a = root.child("a").unwrap();
        assert!(a.child("big").is_some());
        assert!(a.child("small").is_none());
    }

    #[test]
    fn test_zero_weight_is_ignored() {
        let tree = CallTree::new();
        tree.add_trace(["a"], 0);
        assert_eq!(tree.total_samples(), 0);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_empty_trace_counts_at_root() {
        let tree = CallTree::new();
        tree.add_trace(Vec::<&str>::new(), 2);
        assert_eq!(tree.total_samples(), 2);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_concurrent_inserts_keep_totals() {
        let tree = CallTree::new();
        std::thread::scope(|scope| {
            for t in 0..8u64 {
                let tree = &tree;
                scope.spawn(move || {
                    for i in 0..500u64 {
                        let leaf = format!("leaf{}", (t + i) % 7);
                        tree.add_trace(["main", "work", leaf.as_str()], 1 + i % 3);
                    }
                });
            }
        });

        // Each thread adds sum_{i<500} (1 + i % 3)
        let per_thread: u64 = (0..500u64).map(|i| 1 + i % 3).sum();
        assert_eq!(tree.total_samples(), per_thread * 8);

        let root = tree.serialize(10);
        let work = root.path(["main", "work"]).unwrap();
        assert_eq!(work.value, per_thread * 8);
        assert_eq!(work.children.iter().map(|c| c.value).sum::<u64>(), work.value);
        assert_sorted(&root);
    }

    #[test]
    fn test_flame_node_json_shape() {
        let tree = CallTree::new();
        tree.add_trace(["a"], 1);
        let json = serde_json::to_string(&tree.serialize(5)).unwrap();
        assert_eq!(
            json,
            r#"{"name":"main","value":1,"children":[{"name":"a","value":1,"children":[]}]}"#
        );
    }
}
