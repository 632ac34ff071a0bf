//! Property-based tests for trace reconstruction using proptest.
//!
//! These tests check invariants that must hold for any trace, well-formed
//! or not:
//!
//! - One branch per redo, plus the final snapshot
//! - Replaying the same text gives the same forest
//! - Branch JSON round-trips without losing nodes or truth values
//! - Without redo, the tree mirrors the call/exit nesting
