//! Immutable branch snapshots and the forest they form.
//!
//! A [`BranchTree`] is the value handed to renderers. Its JSON shape is
//!
//! ```json
//! { "name": "p(a)", "truth": "success", "children": [ ... ] }
//! ```
//!
//! with `children` omitted for leaves.

use serde::{Deserialize, Serialize, Serializer};

use super::types::{TraceSpan, Truth};
use crate::error::Result;

/// Owned snapshot of a derivation (sub)tree.
///
/// Traversal, comparison, cloning and dropping all work on an explicit stack,
/// and JSON conversion grows the stack on demand, so trees as deep as the
/// traced recursion are safe to handle.
#[derive(Debug, Serialize, Deserialize)]
pub struct BranchTree {
    /// Goal text.
    pub name: String,
    /// Recorded outcome.
    pub truth: Truth,
    /// Child goals in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BranchTree>,
}

impl BranchTree {
    /// Create a leaf.
    pub fn leaf(name: impl Into<String>, truth: Truth) -> Self {
        Self {
            name: name.into(),
            truth,
            children: Vec::new(),
        }
    }

    /// Add a child, builder style.
    pub fn with_child(mut self, child: BranchTree) -> Self {
        self.children.push(child);
        self
    }

    /// Assemble a tree from nodes listed in depth-first pre-order, each with
    /// the position of its parent in the list. The first entry is the root.
    pub(crate) fn from_preorder(nodes: Vec<(String, Truth, Option<usize>)>) -> Option<Self> {
        let parents: Vec<Option<usize>> = nodes.iter().map(|(_, _, parent)| *parent).collect();
        let mut built: Vec<Option<BranchTree>> = nodes
            .into_iter()
            .map(|(name, truth, _)| Some(BranchTree::leaf(name, truth)))
            .collect();

        // Descendants follow their ancestor in pre-order, so walking backwards
        // completes every child list before its owner is attached.
        for slot in (1..built.len()).rev() {
            let mut node = built[slot].take()?;
            node.children.reverse();
            let parent = parents[slot]?;
            built.get_mut(parent)?.as_mut()?.children.push(node);
        }

        let mut root = built.into_iter().next()??;
        root.children.reverse();
        Some(root)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Total number of nodes, self included.
    pub fn node_count(&self) -> usize {
        self.iter_dfs().count()
    }

    /// Length of the longest root-to-leaf path in edges.
    pub fn max_depth(&self) -> usize {
        self.iter_with_depth()
            .map(|(depth, _)| depth)
            .max()
            .unwrap_or(0)
    }

    /// Iterate over nodes in depth-first pre-order.
    pub fn iter_dfs(&self) -> impl Iterator<Item = &BranchTree> {
        self.iter_with_depth().map(|(_, node)| node)
    }

    /// Iterate over nodes in depth-first pre-order, paired with their depth
    /// below `self`.
    pub fn iter_with_depth(&self) -> impl Iterator<Item = (usize, &BranchTree)> {
        DfsIterator {
            stack: vec![(0, self)],
        }
    }

    /// First node in depth-first order whose name equals `name`.
    pub fn find(&self, name: &str) -> Option<&BranchTree> {
        self.iter_dfs().find(|n| n.name == name)
    }

    /// Export as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&Stacked(self))?)
    }

    /// Export as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Stacked(self))?)
    }

    /// Parse a tree from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        from_json_unbounded(json)
    }
}

impl Clone for BranchTree {
    fn clone(&self) -> Self {
        let mut nodes = Vec::new();
        let mut stack: Vec<(&BranchTree, Option<usize>)> = vec![(self, None)];
        while let Some((node, parent)) = stack.pop() {
            let slot = nodes.len();
            nodes.push((node.name.clone(), node.truth, parent));
            stack.extend(node.children.iter().rev().map(|c| (c, Some(slot))));
        }
        Self::from_preorder(nodes)
            .unwrap_or_else(|| BranchTree::leaf(self.name.clone(), self.truth))
    }
}

impl PartialEq for BranchTree {
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if a.name != b.name || a.truth != b.truth || a.children.len() != b.children.len() {
                return false;
            }
            stack.extend(a.children.iter().zip(&b.children));
        }
        true
    }
}

impl Eq for BranchTree {}

impl Drop for BranchTree {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl std::fmt::Display for BranchTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (depth, node) in self.iter_with_depth() {
            writeln!(f, "{}- {} [{}]", "  ".repeat(depth), node.name, node.truth)?;
        }
        Ok(())
    }
}

struct DfsIterator<'a> {
    stack: Vec<(usize, &'a BranchTree)>,
}

impl<'a> Iterator for DfsIterator<'a> {
    type Item = (usize, &'a BranchTree);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        // Reverse so the first child is visited first
        self.stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        Some((depth, node))
    }
}

/// Serializes the wrapped value on a stack that grows with nesting depth.
struct Stacked<'a, T: ?Sized>(&'a T);

impl<T: Serialize + ?Sized> Serialize for Stacked<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serde_stacker::Serializer::new(serializer))
    }
}

/// Parse JSON without serde_json's nesting limit, growing the stack as needed.
fn from_json_unbounded<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    let mut de = serde_json::Deserializer::from_str(json);
    de.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// One attempted resolution path, captured at a backtracking boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Position in the forest (0-based).
    pub index: usize,
    /// Snapshot of the whole tree.
    pub tree: BranchTree,
    /// Goal text of the redo that closed this attempt, when known.
    pub redo_goal: Option<String>,
    /// Whether this snapshot was taken after the last trace line.
    #[serde(default)]
    pub final_snapshot: bool,
    /// Input lines covered by this attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<TraceSpan>,
}

impl Branch {
    /// Whether this is the snapshot taken after the last trace line.
    pub fn is_final(&self) -> bool {
        self.final_snapshot
    }

    /// Whether the first goal under the root succeeded.
    pub fn is_successful(&self) -> bool {
        self.tree
            .children
            .first()
            .map(|c| c.truth == Truth::Success)
            .unwrap_or(false)
    }
}

/// Counters collected while replaying a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStats {
    /// Events consumed by the builder.
    pub events: usize,
    /// Redo events seen.
    pub redos: usize,
    /// Redos whose target matched by exact text.
    pub exact_redos: usize,
    /// Redos resolved by the signature fallback.
    pub fallback_redos: usize,
    /// Redos with no matching goal in the tree.
    pub unmatched_redos: usize,
    /// Redo snapshots dropped because of `max_branches`.
    pub dropped_snapshots: usize,
}

/// Ordered branches produced from one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationForest {
    pub branches: Vec<Branch>,
    pub stats: ReplayStats,
}

impl DerivationForest {
    /// Build a forest from bare trees, e.g. ones read back from JSON.
    pub fn from_trees(trees: Vec<BranchTree>) -> Self {
        let count = trees.len();
        let branches = trees
            .into_iter()
            .enumerate()
            .map(|(index, tree)| Branch {
                index,
                tree,
                redo_goal: None,
                final_snapshot: index + 1 == count,
                span: None,
            })
            .collect();
        Self {
            branches,
            stats: ReplayStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Branch> {
        self.branches.get(index)
    }

    /// The snapshot taken after the last trace line.
    pub fn final_branch(&self) -> Option<&Branch> {
        self.branches.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Branch> {
        self.branches.iter()
    }

    /// Branch trees in order.
    pub fn trees(&self) -> Vec<&BranchTree> {
        self.branches.iter().map(|b| &b.tree).collect()
    }

    /// Export the branch trees as a JSON array.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&Stacked(&self.trees()))?)
    }

    /// Export the branch trees as a pretty-printed JSON array.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Stacked(&self.trees()))?)
    }

    /// Read a JSON array of branch trees.
    pub fn from_json(json: &str) -> Result<Self> {
        let trees: Vec<BranchTree> = from_json_unbounded(json)?;
        Ok(Self::from_trees(trees))
    }
}

impl<'a> IntoIterator for &'a DerivationForest {
    type Item = &'a Branch;
    type IntoIter = std::slice::Iter<'a, Branch>;

    fn into_iter(self) -> Self::IntoIter {
        self.branches.iter()
    }
}
