//! Analysis over reconstructed forests.
//!
//! Extracts root-to-leaf reasoning chains, summary statistics and
//! branch-to-branch comparisons for downstream consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::branch::{Branch, BranchTree, DerivationForest};
use super::types::{GoalSignature, Truth};

/// A root-to-leaf path through one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningChain {
    /// Goal texts from the first goal under the root down to the leaf.
    pub goals: Vec<String>,
    /// Truth of each goal, aligned with `goals`.
    pub truths: Vec<Truth>,
    /// Whether the leaf succeeded.
    pub is_successful: bool,
}

impl ReasoningChain {
    /// The leaf goal.
    pub fn leaf(&self) -> Option<&str> {
        self.goals.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.goals.len()
    }

    /// Whether a goal matching `signature` succeeded somewhere on this chain.
    pub fn achieves(&self, signature: &GoalSignature) -> bool {
        self.goals
            .iter()
            .zip(&self.truths)
            .any(|(goal, truth)| *truth == Truth::Success && signature.matches(goal))
    }

    /// One-line summary, e.g. `p(X) -> q(a) [success]`.
    pub fn summary(&self) -> String {
        let status = if self.is_successful {
            "success"
        } else {
            "failure"
        };
        format!("{} [{}]", self.goals.join(" -> "), status)
    }
}

/// Aggregate counts over a forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestStats {
    pub branch_count: usize,
    pub successful_branches: usize,
    /// Nodes across all branches, roots included.
    pub total_nodes: usize,
    /// Deepest branch, in edges below the root.
    pub max_depth: usize,
    pub success_nodes: usize,
    pub failure_nodes: usize,
    pub unresolved_nodes: usize,
}

/// Analyzer for extracting insights from a derivation forest.
pub struct TraceAnalyzer<'a> {
    forest: &'a DerivationForest,
}

impl<'a> TraceAnalyzer<'a> {
    /// Create an analyzer for a forest.
    pub fn new(forest: &'a DerivationForest) -> Self {
        Self { forest }
    }

    /// Branches whose first goal under the root succeeded.
    pub fn successful_branches(&self) -> Vec<&'a Branch> {
        self.forest
            .iter()
            .filter(|b| b.is_successful())
            .collect()
    }

    /// Root-to-leaf chains of one branch, in depth-first order.
    ///
    /// The synthetic root is not part of any chain.
    pub fn chains(&self, branch: &Branch) -> Vec<ReasoningChain> {
        let mut chains = Vec::new();
        let mut goals: Vec<String> = Vec::new();
        let mut truths: Vec<Truth> = Vec::new();

        for (depth, node) in branch.tree.iter_with_depth().skip(1) {
            goals.truncate(depth - 1);
            truths.truncate(depth - 1);
            goals.push(node.name.clone());
            truths.push(node.truth);

            if node.is_leaf() {
                chains.push(ReasoningChain {
                    goals: goals.clone(),
                    truths: truths.clone(),
                    is_successful: node.truth == Truth::Success,
                });
            }
        }
        chains
    }

    /// Successful chains across every branch.
    pub fn successful_chains(&self) -> Vec<ReasoningChain> {
        self.forest
            .iter()
            .flat_map(|b| self.chains(b))
            .filter(|c| c.is_successful)
            .collect()
    }

    /// Successful chains that pass through a succeeded goal with the same
    /// functor and arity as `goal`.
    pub fn goal_chains(&self, goal: &str) -> Vec<ReasoningChain> {
        let signature = GoalSignature::of(goal);
        self.successful_chains()
            .into_iter()
            .filter(|chain| chain.achieves(&signature))
            .collect()
    }

    /// Whether any attempt proved `goal`.
    pub fn solution_found(&self, goal: &str) -> bool {
        !self.goal_chains(goal).is_empty()
    }

    /// Summary statistics.
    pub fn stats(&self) -> ForestStats {
        let mut stats = ForestStats {
            branch_count: self.forest.len(),
            ..Default::default()
        };

        for branch in self.forest {
            if branch.is_successful() {
                stats.successful_branches += 1;
            }
            stats.max_depth = stats.max_depth.max(branch.tree.max_depth());
            for node in branch.tree.iter_dfs() {
                stats.total_nodes += 1;
                match node.truth {
                    Truth::Success => stats.success_nodes += 1,
                    Truth::Failure => stats.failure_nodes += 1,
                    Truth::Unresolved => stats.unresolved_nodes += 1,
                }
            }
        }

        stats
    }

    /// Generate a narrative summary of the attempts.
    pub fn narrative(&self) -> String {
        let mut narrative = String::new();

        for branch in self.forest {
            let verdict = if branch.is_successful() {
                "succeeded"
            } else {
                "failed"
            };
            let goal = branch
                .tree
                .children
                .first()
                .map(|c| c.name.as_str())
                .unwrap_or("(no goal)");
            narrative.push_str(&format!(
                "Attempt {}: {} {}",
                branch.index + 1,
                goal,
                verdict
            ));
            if let Some(redo) = &branch.redo_goal {
                narrative.push_str(&format!(", backtracked into {}", redo));
            }
            narrative.push('\n');
        }

        narrative
    }
}

/// Goal-level difference between two branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchComparison {
    /// Goal texts present in both.
    pub common: Vec<String>,
    /// Goal texts only in the first branch.
    pub only_in_a: Vec<String>,
    /// Goal texts only in the second branch.
    pub only_in_b: Vec<String>,
    /// Goals present in both whose truth differs.
    pub changed_truth: Vec<String>,
}

/// Compare two branches by the goal texts they contain.
pub fn compare_branches(a: &BranchTree, b: &BranchTree) -> BranchComparison {
    let names_a: BTreeSet<&str> = a.iter_dfs().map(|n| n.name.as_str()).collect();
    let names_b: BTreeSet<&str> = b.iter_dfs().map(|n| n.name.as_str()).collect();

    let changed_truth = names_a
        .intersection(&names_b)
        .filter(|name| {
            let truth_a = a.find(name).map(|n| n.truth);
            let truth_b = b.find(name).map(|n| n.truth);
            truth_a != truth_b
        })
        .map(|name| name.to_string())
        .collect();

    BranchComparison {
        common: names_a
            .intersection(&names_b)
            .map(|s| s.to_string())
            .collect(),
        only_in_a: names_a.difference(&names_b).map(|s| s.to_string()).collect(),
        only_in_b: names_b.difference(&names_a).map(|s| s.to_string()).collect(),
        changed_truth,
    }
}
