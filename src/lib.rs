//! # derivation-trace
//!
//! Rebuilds derivation trees from the port trace (`call`/`exit`/`fail`/`redo`)
//! of a backtracking resolution engine.
//!
//! ## Core Components
//!
//! - **Lexer**: trace lines to structured events
//! - **Builder**: event replay with backtrack repair and branch snapshots
//! - **Forest**: serializable branch trees for renderers and analysis
//!
//! ## Example
//!
//! ```rust
//! use derivation_trace::{parse_trace, TraceAnalyzer};
//!
//! let trace = "\
//! call: member(X, [a,b])
//! exit: member(a, [a,b])
//! redo: member(X, [a,b])
//! exit: member(b, [a,b])";
//!
//! let forest = parse_trace(trace);
//! assert_eq!(forest.len(), 2);
//!
//! let stats = TraceAnalyzer::new(&forest).stats();
//! assert_eq!(stats.branch_count, 2);
//! ```

pub mod derivation;
pub mod error;
#[cfg(feature = "python")]
pub mod pybind;

// Re-exports for convenience
pub use derivation::{
    compare_branches, lex_line, parse_trace, Branch, BranchComparison, BranchTree,
    BuilderConfig, DerivationForest, DerivationNode, DerivationTree, ForestStats, GoalSignature,
    NodeId, Port, ReasoningChain, RedoMatch, ReplayState, ReplayStats, StepOutcome, TraceAnalyzer,
    TraceBuilder, TraceEvent, TraceLexer, TraceSpan, Truth,
};
pub use error::{Error, Result};
