//! Derivation tree reconstruction from trace events.
//!
//! [`ReplayState`] is the state machine: a tree, a cursor on the goal being
//! executed, and the branches collected so far. [`TraceBuilder`] drives it
//! over a whole trace.
//!
//! Call/exit/fail map directly onto descending and ascending the tree. Redo
//! is the hard case: the tracer names the goal being retried but not where it
//! sits, so the builder snapshots the current attempt, searches the tree for
//! the goal and cuts away everything recorded after it.

use std::io::Read;
use std::iter::Peekable;
use std::path::Path;

use tracing::{debug, warn};

use super::branch::{Branch, DerivationForest, ReplayStats};
use super::lexer::TraceLexer;
use super::tree::{DerivationTree, NodeId};
use super::types::{BuilderConfig, GoalSignature, Port, TraceEvent, TraceSpan, Truth};
use crate::error::{Error, Result};

/// How a redo located the goal it retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedoMatch {
    /// A node with identical goal text.
    Exact(NodeId),
    /// A node with the same functor and arity; its text was overwritten.
    Signature(NodeId),
    /// Nothing in the tree has that signature.
    Unmatched,
}

impl RedoMatch {
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Self::Exact(id) | Self::Signature(id) => Some(*id),
            Self::Unmatched => None,
        }
    }
}

/// Effect of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The event named an ignored goal.
    Ignored,
    /// A new goal was entered.
    Called(NodeId),
    /// The current goal was resolved.
    Resolved(NodeId, Truth),
    /// A backtracking step.
    Retried(RedoMatch),
}

/// Mutable reconstruction state for a single trace.
#[derive(Debug)]
pub struct ReplayState<'c> {
    config: &'c BuilderConfig,
    tree: DerivationTree,
    current: NodeId,
    branches: Vec<Branch>,
    stats: ReplayStats,
    span_start: usize,
    last_line: usize,
}

impl<'c> ReplayState<'c> {
    pub fn new(config: &'c BuilderConfig) -> Self {
        let tree = DerivationTree::new(config.root_label.clone());
        let current = tree.root();
        Self {
            config,
            tree,
            current,
            branches: Vec::new(),
            stats: ReplayStats::default(),
            span_start: 1,
            last_line: 0,
        }
    }

    pub fn tree(&self) -> &DerivationTree {
        &self.tree
    }

    /// The goal currently executing.
    pub fn current(&self) -> NodeId {
        self.current
    }

    /// Branches captured so far, excluding the final snapshot.
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Apply one event. `next` is the following event, consulted by redo.
    pub fn apply(&mut self, event: &TraceEvent, next: Option<&TraceEvent>) -> StepOutcome {
        self.stats.events += 1;
        self.last_line = self.last_line.max(event.line);

        match event.port {
            Port::Call => self.call(&event.goal),
            Port::Exit => self.resolve(&event.goal, Truth::Success),
            Port::Fail if self.config.is_ignored(&event.goal) => StepOutcome::Ignored,
            Port::Fail => self.resolve(&event.goal, Truth::Failure),
            Port::Redo => StepOutcome::Retried(self.redo(event, next)),
        }
    }

    fn call(&mut self, goal: &str) -> StepOutcome {
        if self.config.is_ignored(goal) {
            return StepOutcome::Ignored;
        }
        self.current = self
            .tree
            .append_child(self.current, goal, Truth::Unresolved);
        StepOutcome::Called(self.current)
    }

    fn resolve(&mut self, goal: &str, truth: Truth) -> StepOutcome {
        let node = self.current;
        // A goal resolved without any deeper call is a fact or built-in;
        // record what the tracer reported as its only child.
        if self.tree.children(node).is_empty() {
            self.tree.append_child(node, goal, truth);
        }
        self.tree.set_truth(node, truth);
        if let Some(parent) = self.tree.parent(node) {
            self.current = parent;
        }
        StepOutcome::Resolved(node, truth)
    }

    fn redo(&mut self, event: &TraceEvent, next: Option<&TraceEvent>) -> RedoMatch {
        self.stats.redos += 1;

        // The whole active call stack is being abandoned.
        let active: Vec<NodeId> = self.tree.path_to_root(self.current).collect();
        for id in active {
            self.tree.set_truth(id, Truth::Failure);
        }

        self.capture(Some(event));

        let found = self.locate(&event.goal);
        let target = match found {
            RedoMatch::Exact(id) => {
                self.stats.exact_redos += 1;
                id
            }
            RedoMatch::Signature(id) => {
                self.stats.fallback_redos += 1;
                warn!(
                    line = event.line,
                    goal = %event.goal,
                    replaced = %self.tree.text(id),
                    "redo matched by signature only"
                );
                self.tree.set_text(id, event.goal.clone());
                id
            }
            RedoMatch::Unmatched => {
                self.stats.unmatched_redos += 1;
                warn!(line = event.line, goal = %event.goal, "redo target not found in tree");
                return found;
            }
        };

        if let Some(next) = next {
            self.trim_retried_children(target, &next.signature());
        }
        self.tree.set_truth(target, Truth::Unresolved);

        // Later siblings along the path were alternatives recorded before
        // the engine backtracked into `target`.
        let path: Vec<NodeId> = self.tree.path_to_root(target).collect();
        for id in path {
            let parent = self.tree.parent(id);
            if let (Some(parent), Some(idx)) = (parent, self.tree.position_in_parent(id)) {
                self.tree.truncate_children(parent, idx + 1);
            }
        }

        debug!(
            line = event.line,
            goal = %event.goal,
            target = %target,
            branch = self.branches.len(),
            "redo repaired tree"
        );
        self.current = target;
        found
    }

    /// Breadth-first search for the goal a redo retries.
    ///
    /// Exact text wins; otherwise the last node in BFS order with the same
    /// signature. The synthetic root never matches.
    fn locate(&self, goal: &str) -> RedoMatch {
        let signature = GoalSignature::of(goal);
        let mut exact = None;
        let mut similar = None;

        for id in self.tree.bfs() {
            if self.tree.is_root(id) {
                continue;
            }
            let text = self.tree.text(id);
            if text == goal {
                exact = Some(id);
            }
            if signature.matches(text) {
                similar = Some(id);
            }
        }

        match (exact, similar) {
            (Some(id), _) => RedoMatch::Exact(id),
            (None, Some(id)) => RedoMatch::Signature(id),
            (None, None) => RedoMatch::Unmatched,
        }
    }

    /// Keep the children of `target` up to the first one the next event
    /// continues, or drop them all if none does.
    fn trim_retried_children(&mut self, target: NodeId, next: &GoalSignature) {
        let children = self.tree.children(target);
        if children.is_empty() {
            return;
        }
        let keep = children
            .iter()
            .position(|&c| next.matches(self.tree.text(c)))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.tree.truncate_children(target, keep);
    }

    fn capture(&mut self, redo: Option<&TraceEvent>) {
        let is_final = redo.is_none();
        if !is_final {
            if let Some(max) = self.config.max_branches {
                if self.branches.len() >= max {
                    self.stats.dropped_snapshots += 1;
                    self.span_start = self.last_line + 1;
                    return;
                }
            }
        }

        let span = self.config.record_spans.then(|| TraceSpan {
            start: self.span_start,
            end: self.last_line.max(self.span_start),
            redo_line: redo.map(|e| e.line),
        });
        self.branches.push(Branch {
            index: self.branches.len(),
            tree: self.tree.snapshot(),
            redo_goal: redo.map(|e| e.goal.clone()),
            final_snapshot: is_final,
            span,
        });
        self.span_start = self.last_line + 1;
    }

    /// Take the final snapshot and hand back the forest.
    pub fn finish(mut self) -> DerivationForest {
        self.capture(None);
        debug!(
            events = self.stats.events,
            branches = self.branches.len(),
            nodes = self.tree.reachable_count(),
            "trace replay finished"
        );
        DerivationForest {
            branches: self.branches,
            stats: self.stats,
        }
    }
}

/// Rebuilds derivation forests from tracer output.
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    config: BuilderConfig,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a validated configuration.
    pub fn with_config(config: BuilderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Rebuild the forest for a trace string.
    pub fn build(&self, trace: &str) -> DerivationForest {
        self.build_events(TraceLexer::new(trace))
    }

    /// Rebuild the forest from already-lexed events.
    pub fn build_events<I>(&self, events: I) -> DerivationForest
    where
        I: IntoIterator<Item = TraceEvent>,
    {
        let mut events: Peekable<I::IntoIter> = events.into_iter().peekable();
        let mut state = ReplayState::new(&self.config);
        while let Some(event) = events.next() {
            state.apply(&event, events.peek());
        }
        state.finish()
    }

    /// Read a whole trace from `reader` and rebuild it.
    pub fn build_from_reader<R: Read>(&self, mut reader: R) -> Result<DerivationForest> {
        let mut trace = String::new();
        reader
            .read_to_string(&mut trace)
            .map_err(|e| Error::io("reading trace", e))?;
        Ok(self.build(&trace))
    }

    /// Read a trace file and rebuild it.
    pub fn build_from_path(&self, path: impl AsRef<Path>) -> Result<DerivationForest> {
        let path = path.as_ref();
        let trace = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        Ok(self.build(&trace))
    }
}

/// Rebuild a trace with the default configuration.
pub fn parse_trace(trace: &str) -> DerivationForest {
    TraceBuilder::new().build(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::branch::BranchTree;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn leaf(name: &str, truth: Truth) -> BranchTree {
        BranchTree::leaf(name, truth)
    }

    fn root() -> BranchTree {
        leaf("root", Truth::Unresolved)
    }

    #[test]
    fn test_exit_records_fact() {
        let forest = parse_trace("call: p(a)\nexit: p(a)");
        assert_eq!(forest.len(), 1);
        let expected = root().with_child(
            leaf("p(a)", Truth::Success).with_child(leaf("p(a)", Truth::Success)),
        );
        assert_eq!(forest.branches[0].tree, expected);
        assert!(forest.branches[0].is_successful());
    }

    #[test]
    fn test_fail_records_failure() {
        let forest = parse_trace("call: p(a)\nfail: p(a)");
        assert_eq!(forest.len(), 1);
        let tree = &forest.branches[0].tree;
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "p(a)");
        assert_eq!(tree.children[0].truth, Truth::Failure);
    }

    #[test]
    fn test_backtrack_then_succeed() {
        let forest = parse_trace("call: p(X)\nfail: p(X)\nredo: p(X)\nexit: p(b)");
        assert_eq!(forest.len(), 2);

        let first = &forest.branches[0];
        assert_eq!(first.redo_goal.as_deref(), Some("p(X)"));
        assert_eq!(first.tree.children[0].truth, Truth::Failure);

        let last = &forest.branches[1].tree;
        let retried = &last.children[0].children[0];
        assert_eq!(retried.name, "p(X)");
        assert_eq!(retried.truth, Truth::Success);
        assert_eq!(retried.children, vec![leaf("p(b)", Truth::Success)]);
        assert_eq!(forest.stats.exact_redos, 1);
    }

    #[test]
    fn test_unmatched_redo_is_noop() {
        let config = BuilderConfig::default();
        let mut state = ReplayState::new(&config);
        let call = TraceEvent::new(Port::Call, "p(a)", 1);
        let redo = TraceEvent::new(Port::Redo, "q(z)", 2);

        state.apply(&call, Some(&redo));
        let before = state.current();
        let outcome = state.apply(&redo, None);

        assert_eq!(outcome, StepOutcome::Retried(RedoMatch::Unmatched));
        assert_eq!(state.current(), before);
        assert_eq!(state.branches().len(), 1);

        let forest = state.finish();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.stats.unmatched_redos, 1);
    }

    #[test]
    fn test_ignored_fail_goal() {
        let trace = "call: solve(X)\nexit: solve(a)\ncall: fail\nfail: fail";
        let forest = parse_trace(trace);
        let tree = &forest.branches[0].tree;
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.children[0].truth, Truth::Success);
    }

    #[test]
    fn test_strict_config_keeps_fail_goal() {
        let builder = TraceBuilder::with_config(BuilderConfig::strict()).unwrap();
        let forest = builder.build("call: fail\nfail: fail");
        let tree = &forest.branches[0].tree;
        assert_eq!(tree.children[0].name, "fail");
        assert_eq!(tree.children[0].truth, Truth::Failure);
    }

    #[test]
    fn test_nested_calls() {
        let trace = "\
call: grandparent(tom, Z)
  call: parent(tom, Y)
  exit: parent(tom, bob)
  call: parent(bob, Z)
  exit: parent(bob, ann)
exit: grandparent(tom, ann)";
        let forest = parse_trace(trace);
        assert_eq!(forest.len(), 1);

        let expected = root().with_child(
            leaf("grandparent(tom, Z)", Truth::Success)
                .with_child(
                    leaf("parent(tom, Y)", Truth::Success)
                        .with_child(leaf("parent(tom, bob)", Truth::Success)),
                )
                .with_child(
                    leaf("parent(bob, Z)", Truth::Success)
                        .with_child(leaf("parent(bob, ann)", Truth::Success)),
                ),
        );
        assert_eq!(forest.branches[0].tree, expected);
    }

    #[test]
    fn test_redo_truncates_later_siblings() {
        let trace = "\
call: solve(X, Y)
  call: member(X, [a,b])
  exit: member(a, [a,b])
  call: member(Y, [c,d])
  exit: member(c, [c,d])
  call: check(a, c)
  fail: check(a, c)
  redo: member(Y, [c,d])
  exit: member(d, [c,d])";
        let forest = parse_trace(trace);
        assert_eq!(forest.len(), 2);

        let abandoned = &forest.branches[0].tree.children[0];
        assert_eq!(abandoned.truth, Truth::Failure);
        assert_eq!(abandoned.children.len(), 3);

        let retried = &forest.branches[1].tree.children[0];
        let names: Vec<_> = retried.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["member(X, [a,b])", "member(Y, [c,d])"]);
        // The retried goal is unresolved until its exit, then succeeds.
        assert_eq!(retried.children[1].truth, Truth::Success);
        assert_eq!(retried.truth, Truth::Failure);
    }

    #[test]
    fn test_redo_keeps_child_continued_by_next_event() {
        let trace = "\
call: outer(X)
  call: inner(X)
    call: step(1)
    exit: step(1)
    call: other(1)
    exit: other(1)
  exit: inner(1)
exit: outer(1)
redo: inner(X)
    redo: step(1)
    exit: step(2)";
        let forest = parse_trace(trace);
        assert_eq!(forest.len(), 3);

        // After the first redo only `step(1)` survives under `inner(X)`,
        // because the next event continues it.
        let second = &forest.branches[1].tree;
        let inner = &second.children[0].children[0];
        assert_eq!(inner.name, "inner(X)");
        assert_eq!(inner.children.len(), 1);
        assert_eq!(inner.children[0].name, "step(1)");
    }

    #[test]
    fn test_redo_clears_children_without_continuation() {
        let trace = "\
call: outer(X)
  call: inner(X)
    call: step(1)
    exit: step(1)
  exit: inner(1)
exit: outer(1)
redo: inner(X)
  exit: inner(2)";
        let forest = parse_trace(trace);
        let inner = &forest.branches[1].tree.children[0].children[0];
        assert_eq!(inner.truth, Truth::Success);
        assert_eq!(inner.children, vec![leaf("inner(2)", Truth::Success)]);
    }

    #[test]
    fn test_signature_fallback_renames_last_match() {
        let trace = "\
call: top
  call: pick(X, 1)
  exit: pick(a, 1)
  call: pick(Y, 2)
  exit: pick(b, 2)
redo: pick(_G1, 2)
exit: pick(c, 2)";
        let config = BuilderConfig::default();
        let mut state = ReplayState::new(&config);
        let events = TraceLexer::tokenize(trace);
        let mut outcomes = Vec::new();
        for (i, event) in events.iter().enumerate() {
            outcomes.push(state.apply(event, events.get(i + 1)));
        }

        let target = match outcomes[5] {
            StepOutcome::Retried(RedoMatch::Signature(id)) => id,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(state.tree().text(target), "pick(_G1, 2)");

        let forest = state.finish();
        assert_eq!(forest.stats.fallback_redos, 1);
        // The deepest pick/2 in BFS order is the synthetic `pick(b, 2)` leaf.
        assert!(forest.branches[1].tree.find("pick(_G1, 2)").is_some());
        assert!(forest.branches[0].tree.find("pick(_G1, 2)").is_none());
    }

    #[test]
    fn test_redo_invalidates_active_path() {
        let trace = "\
call: a
  call: b
    call: c
redo: b";
        let forest = parse_trace(trace);
        let snapshot = &forest.branches[0].tree;
        assert_eq!(snapshot.truth, Truth::Unresolved);
        assert!(snapshot
            .iter_dfs()
            .skip(1)
            .all(|n| n.truth == Truth::Failure));

        // With no following event there is nothing to match children
        // against, so they are kept.
        let repaired = &forest.branches[1].tree;
        let b = repaired.find("b").unwrap();
        assert_eq!(b.truth, Truth::Unresolved);
        assert_eq!(b.children, vec![leaf("c", Truth::Failure)]);
    }

    #[test]
    fn test_empty_trace() {
        let forest = parse_trace("");
        assert_eq!(forest.len(), 1);
        assert_eq!(forest.branches[0].tree, root());
        assert!(forest.branches[0].is_final());
    }

    #[test]
    fn test_spans() {
        let trace = "call: p(X)\nfail: p(X)\nredo: p(X)\n\nexit: p(b)";
        let forest = parse_trace(trace);
        assert_eq!(
            forest.branches[0].span,
            Some(TraceSpan {
                start: 1,
                end: 3,
                redo_line: Some(3)
            })
        );
        assert_eq!(
            forest.branches[1].span,
            Some(TraceSpan {
                start: 4,
                end: 5,
                redo_line: None
            })
        );
    }

    #[test]
    fn test_spans_disabled() {
        let builder = TraceBuilder::with_config(BuilderConfig::default().with_spans(false)).unwrap();
        let forest = builder.build("call: p(a)\nexit: p(a)");
        assert!(forest.branches[0].span.is_none());
    }

    #[test]
    fn test_max_branches_keeps_final_snapshot() {
        let builder =
            TraceBuilder::with_config(BuilderConfig::default().with_max_branches(1)).unwrap();
        let trace = "call: p(X)\nfail: p(X)\nredo: p(X)\nfail: p(X)\nredo: p(X)\nexit: p(c)";
        let forest = builder.build(trace);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.stats.redos, 2);
        assert_eq!(forest.stats.dropped_snapshots, 1);
        assert!(forest.final_branch().unwrap().is_final());
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let err = TraceBuilder::with_config(BuilderConfig::default().with_root_label(""));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_exit_at_root_stays_at_root() {
        let forest = parse_trace("exit: stray");
        let tree = &forest.branches[0].tree;
        assert_eq!(tree.truth, Truth::Success);
        assert_eq!(tree.children, vec![leaf("stray", Truth::Success)]);
    }

    #[test]
    fn test_build_from_reader_and_path() {
        let trace = "call: p(a)\nexit: p(a)\n";
        let builder = TraceBuilder::new();

        let from_reader = builder.build_from_reader(trace.as_bytes()).unwrap();
        assert_eq!(from_reader.len(), 1);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(trace.as_bytes()).unwrap();
        let from_path = builder.build_from_path(file.path()).unwrap();
        assert_eq!(from_path.trees(), from_reader.trees());
    }

    #[test]
    fn test_build_from_missing_path() {
        let err = TraceBuilder::new()
            .build_from_path("/nonexistent/trace.log")
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    fn nested_trace(depth: usize) -> String {
        let mut trace = String::new();
        for i in 0..depth {
            trace.push_str(&format!("call: count({})\n", i));
        }
        for i in (0..depth).rev() {
            trace.push_str(&format!("exit: count({})\n", i));
        }
        trace
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let depth = 5_000;
        let forest = parse_trace(&nested_trace(depth));
        assert_eq!(forest.len(), 1);

        let tree = &forest.branches[0].tree;
        // The innermost goal records its exit as a leaf.
        assert_eq!(tree.max_depth(), depth + 1);
        assert_eq!(tree.node_count(), depth + 2);
        assert_eq!(tree.to_string().lines().count(), depth + 2);

        let copy = tree.clone();
        assert!(copy == *tree);

        let json = forest.to_json().unwrap();
        assert!(json.starts_with(r#"[{"name":"root""#));
        drop(forest);
        drop(copy);
    }

    #[test]
    fn test_deep_forest_json_roundtrip() {
        let forest = parse_trace(&nested_trace(1_000));
        let json = forest.to_json().unwrap();
        let back = DerivationForest::from_json(&json).unwrap();
        assert!(back.trees() == forest.trees());
        assert_eq!(back.branches[0].tree.max_depth(), 1_001);
    }

    #[test]
    fn test_classic_dialect() {
        let trace = "\
   Call: (12) problema(_1, _2)
   Call: (13) _1=tweedledum
   Exit: (13) tweedledum=tweedledum
   Exit: (12) problema(tweedledum, _2)";
        let forest = parse_trace(trace);
        let problema = &forest.branches[0].tree.children[0];
        assert_eq!(problema.name, "problema(_1, _2)");
        assert_eq!(problema.truth, Truth::Success);
        assert_eq!(problema.children[0].name, "_1=tweedledum");
    }
}
