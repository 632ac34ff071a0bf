//! Derivation tree reconstruction from resolution traces.
//!
//! A backward-chaining engine run under a tracer prints one line per port
//! event (`call`, `exit`, `fail`, `redo`). This module turns that flat log
//! back into the search tree it came from, and into the sequence of
//! attempts ("branches") the engine abandoned at each backtracking point.
//!
//! ## Core Concepts
//!
//! - **TraceLexer**: turns raw lines into [`TraceEvent`]s, skipping noise
//! - **TraceBuilder**: replays events over an arena tree, snapshotting on redo
//! - **DerivationForest**: the ordered branch snapshots, ready for rendering
//! - **TraceAnalyzer**: chains, statistics and narratives over a forest
//!
//! ## Example
//!
//! ```rust
//! use derivation_trace::derivation::{parse_trace, Truth};
//!
//! let forest = parse_trace("call: p(X)\nfail: p(X)\nredo: p(X)\nexit: p(b)");
//! assert_eq!(forest.len(), 2);
//! assert_eq!(forest.branches[0].tree.children[0].truth, Truth::Failure);
//!
//! let json = forest.to_json().unwrap();
//! assert!(json.contains("\"truth\":\"success\""));
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use derivation_trace::derivation::{BuilderConfig, TraceBuilder};
//!
//! let config = BuilderConfig::default()
//!     .with_root_label("query")
//!     .with_max_branches(100);
//! let builder = TraceBuilder::with_config(config).unwrap();
//! let forest = builder.build("call: p(a)\nexit: p(a)");
//! assert_eq!(forest.branches[0].tree.name, "query");
//! ```

mod branch;
mod builder;
mod lexer;
mod proptest;
mod query;
mod tree;
mod types;

// Re-export main types
pub use branch::{Branch, BranchTree, DerivationForest, ReplayStats};
pub use builder::{parse_trace, RedoMatch, ReplayState, StepOutcome, TraceBuilder};
pub use lexer::{lex_line, TraceLexer};
pub use query::{compare_branches, BranchComparison, ForestStats, ReasoningChain, TraceAnalyzer};
pub use tree::{DerivationNode, DerivationTree, NodeId, PathToRoot};
pub use types::{BuilderConfig, GoalSignature, Port, TraceEvent, TraceSpan, Truth};
