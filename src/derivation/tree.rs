//! Arena-backed mutable derivation tree.
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]. Children
//! are owned index lists; the parent link is a plain index used for ascent.
//! Nodes cut off by backtrack repair stay in the arena but are unreachable
//! from the root, so every traversal starts at the root.

use std::collections::VecDeque;

use super::branch::BranchTree;
use super::types::Truth;

/// Stable index of a node in a [`DerivationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A goal in the derivation tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationNode {
    /// Goal text as it appeared in the trace; may be overwritten by a redo.
    pub text: String,
    /// Outcome recorded so far.
    pub truth: Truth,
    /// Children in call order.
    pub children: Vec<NodeId>,
    /// Parent node; `None` only for the root.
    pub parent: Option<NodeId>,
    /// Nesting level (root is 0).
    pub depth: usize,
}

/// The tree under reconstruction.
#[derive(Debug, Clone)]
pub struct DerivationTree {
    nodes: Vec<DerivationNode>,
    root: NodeId,
}

impl DerivationTree {
    /// Create a tree holding only a synthetic root.
    pub fn new(root_label: impl Into<String>) -> Self {
        Self {
            nodes: vec![DerivationNode {
                text: root_label.into(),
                truth: Truth::Unresolved,
                children: Vec::new(),
                parent: None,
                depth: 0,
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// Get a node by ID.
    ///
    /// IDs are only minted by this tree, so indexing cannot go out of bounds.
    pub fn node(&self, id: NodeId) -> &DerivationNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut DerivationNode {
        &mut self.nodes[id.0]
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.node(id).text
    }

    pub fn truth(&self, id: NodeId) -> Truth {
        self.node(id).truth
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Append a new node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, text: impl Into<String>, truth: Truth) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = self.node(parent).depth + 1;
        self.nodes.push(DerivationNode {
            text: text.into(),
            truth,
            children: Vec::new(),
            parent: Some(parent),
            depth,
        });
        self.node_mut(parent).children.push(id);
        id
    }

    pub fn set_truth(&mut self, id: NodeId, truth: Truth) {
        self.node_mut(id).truth = truth;
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.node_mut(id).text = text.into();
    }

    /// Keep only the first `len` children of `id`.
    pub fn truncate_children(&mut self, id: NodeId, len: usize) {
        self.node_mut(id).children.truncate(len);
    }

    /// Index of `id` within its parent's children.
    pub fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Iterate from `id` up to, but not including, the root.
    pub fn path_to_root(&self, id: NodeId) -> PathToRoot<'_> {
        PathToRoot {
            tree: self,
            next: Some(id),
        }
    }

    /// Reachable nodes in breadth-first order, starting at the root.
    pub fn bfs(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.children(id).iter().copied());
        }
        order
    }

    /// Number of nodes reachable from the root, root included.
    pub fn reachable_count(&self) -> usize {
        self.bfs().len()
    }

    /// Number of nodes ever allocated, including ones cut off by repair.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Deep copy of the subtree reachable from the root.
    pub fn snapshot(&self) -> BranchTree {
        self.snapshot_from(self.root)
    }

    /// Deep copy of the subtree rooted at `id`.
    pub fn snapshot_from(&self, id: NodeId) -> BranchTree {
        let mut nodes = Vec::new();
        let mut stack: Vec<(NodeId, Option<usize>)> = vec![(id, None)];
        while let Some((next, parent)) = stack.pop() {
            let node = self.node(next);
            let slot = nodes.len();
            nodes.push((node.text.clone(), node.truth, parent));
            stack.extend(node.children.iter().rev().map(|&c| (c, Some(slot))));
        }
        BranchTree::from_preorder(nodes)
            .unwrap_or_else(|| BranchTree::leaf(self.text(id), self.truth(id)))
    }
}

/// Ascent iterator returned by [`DerivationTree::path_to_root`].
pub struct PathToRoot<'a> {
    tree: &'a DerivationTree,
    next: Option<NodeId>,
}

impl Iterator for PathToRoot<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        if self.tree.is_root(id) {
            self.next = None;
            return None;
        }
        self.next = self.tree.parent(id);
        Some(id)
    }
}
