//! Type definitions for resolution traces and derivation trees.
//!
//! Covers the lexer's event model, goal signatures, the tri-state truth value
//! carried by every node, and the builder configuration.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// One of the four tracer ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    /// A goal is entered.
    Call,
    /// A goal succeeded.
    Exit,
    /// A goal failed.
    Fail,
    /// Execution resumes at a choice point.
    Redo,
}

impl Port {
    /// Parse a port name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "call" => Some(Self::Call),
            "exit" => Some(Self::Exit),
            "fail" => Some(Self::Fail),
            "redo" => Some(Self::Redo),
            _ => None,
        }
    }
}

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Exit => write!(f, "exit"),
            Self::Fail => write!(f, "fail"),
            Self::Redo => write!(f, "redo"),
        }
    }
}

/// A single structured event produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Which port fired.
    pub port: Port,
    /// Goal text, trimmed and without the location suffix.
    pub goal: String,
    /// Choice-point id (or classic tracer depth), when present.
    pub choice_id: Option<u32>,
    /// Source locator after `@`, when present.
    pub location: Option<String>,
    /// 1-based line number in the input.
    pub line: usize,
}

impl TraceEvent {
    /// Create an event without optional metadata.
    pub fn new(port: Port, goal: impl Into<String>, line: usize) -> Self {
        Self {
            port,
            goal: goal.into(),
            choice_id: None,
            location: None,
            line,
        }
    }

    /// Attach a choice-point id.
    pub fn with_choice_id(mut self, id: u32) -> Self {
        self.choice_id = Some(id);
        self
    }

    /// Attach a source location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Signature of the event's goal.
    pub fn signature(&self) -> GoalSignature {
        GoalSignature::of(&self.goal)
    }
}

/// Coarse goal identity: functor name and argument count.
///
/// Backtracking rebinds variables, so two goal texts with the same signature
/// are treated as the same goal during redo repair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalSignature {
    pub functor: String,
    pub arity: usize,
}

impl GoalSignature {
    /// Derive the signature of a goal text.
    ///
    /// The functor is everything before the first `(`. Arguments run up to
    /// the last `)` and are split on top-level commas only, so nested terms,
    /// lists and quoted atoms count as a single argument.
    pub fn of(goal: &str) -> Self {
        let goal = goal.trim();
        let Some(open) = goal.find('(') else {
            return Self {
                functor: goal.to_string(),
                arity: 0,
            };
        };

        let functor = goal[..open].trim().to_string();
        let rest = &goal[open + 1..];
        let args = match rest.rfind(')') {
            Some(close) => &rest[..close],
            None => rest,
        };

        Self {
            functor,
            arity: count_arguments(args),
        }
    }

    /// Whether a goal text has this signature.
    pub fn matches(&self, goal: &str) -> bool {
        &Self::of(goal) == self
    }
}

impl std::fmt::Display for GoalSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.functor, self.arity)
    }
}

fn count_arguments(args: &str) -> usize {
    if args.trim().is_empty() {
        return 0;
    }

    let mut nesting = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut commas = 0;

    for c in args.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => nesting += 1,
            ')' | ']' | '}' => nesting = nesting.saturating_sub(1),
            ',' if nesting == 0 => commas += 1,
            _ => {}
        }
    }

    commas + 1
}

/// Outcome recorded on a derivation node.
///
/// Serializes as `""`, `"success"` or `"failure"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Truth {
    /// No exit or fail reported yet.
    #[default]
    Unresolved,
    /// The goal exited.
    Success,
    /// The goal failed or was abandoned by backtracking.
    Failure,
}

impl Truth {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unresolved => "",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => Some(Self::Unresolved),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

impl std::fmt::Display for Truth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl Serialize for Truth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Truth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Truth::parse(&s).ok_or_else(|| {
            serde::de::Error::unknown_variant(&s, &["", "success", "failure"])
        })
    }
}

/// Input lines covered by one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSpan {
    /// First line of the attempt (1-based).
    pub start: usize,
    /// Last line of the attempt (1-based).
    pub end: usize,
    /// The redo line that closed the attempt; `None` for the final snapshot.
    pub redo_line: Option<usize>,
}

/// Configuration for [`TraceBuilder`](super::TraceBuilder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Display text of the synthetic root node.
    pub root_label: String,
    /// Goals skipped on call and fail ports.
    pub ignored_goals: Vec<String>,
    /// Whether branches carry their input line spans.
    pub record_spans: bool,
    /// Maximum number of redo snapshots kept (the final snapshot is extra).
    pub max_branches: Option<usize>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            root_label: "root".to_string(),
            // The tracer wraps queries as `(Goal, fail)` to force exploration
            // of every solution.
            ignored_goals: vec!["fail".to_string()],
            record_spans: true,
            max_branches: None,
        }
    }
}

impl BuilderConfig {
    /// Configuration that treats every goal as real, including `fail`.
    pub fn strict() -> Self {
        Self {
            ignored_goals: Vec::new(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the builder cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.root_label.trim().is_empty() {
            return Err(Error::config("root_label must not be empty"));
        }
        if self.max_branches == Some(0) {
            return Err(Error::config("max_branches must be at least 1"));
        }
        Ok(())
    }

    /// Set the root label.
    pub fn with_root_label(mut self, label: impl Into<String>) -> Self {
        self.root_label = label.into();
        self
    }

    /// Add a goal to skip on call and fail.
    pub fn with_ignored_goal(mut self, goal: impl Into<String>) -> Self {
        self.ignored_goals.push(goal.into());
        self
    }

    /// Toggle line span recording.
    pub fn with_spans(mut self, record: bool) -> Self {
        self.record_spans = record;
        self
    }

    /// Cap the number of redo snapshots.
    pub fn with_max_branches(mut self, max: usize) -> Self {
        self.max_branches = Some(max);
        self
    }

    pub fn is_ignored(&self, goal: &str) -> bool {
        self.ignored_goals.iter().any(|g| g == goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_parse_is_case_insensitive() {
        assert_eq!(Port::parse("call"), Some(Port::Call));
        assert_eq!(Port::parse("Exit"), Some(Port::Exit));
        assert_eq!(Port::parse("REDO"), Some(Port::Redo));
        assert_eq!(Port::parse("unify"), None);
    }

    #[test]
    fn test_signature_simple() {
        let sig = GoalSignature::of("likes(mary, X)");
        assert_eq!(sig.functor, "likes");
        assert_eq!(sig.arity, 2);
        assert_eq!(sig.to_string(), "likes/2");
    }

    #[test]
    fn test_signature_atom() {
        let sig = GoalSignature::of("  halt ");
        assert_eq!(sig.functor, "halt");
        assert_eq!(sig.arity, 0);
        assert_eq!(GoalSignature::of("p()").arity, 0);
    }

    #[test]
    fn test_signature_nested_arguments() {
        let sig = GoalSignature::of("lists:member(cofre(a,_15586),[cofre(a,b),cofre(b,c)])");
        assert_eq!(sig.functor, "lists:member");
        assert_eq!(sig.arity, 2);

        let quoted = GoalSignature::of("format(user_error,'~w, ~w',[X,Y])");
        assert_eq!(quoted.arity, 3);
    }

    #[test]
    fn test_signature_ignores_bindings() {
        assert!(GoalSignature::of("p(X)").matches("p(b)"));
        assert!(!GoalSignature::of("p(X)").matches("p(a, b)"));
        assert!(!GoalSignature::of("p(X)").matches("q(X)"));
    }

    #[test]
    fn test_truth_wire_format() {
        assert_eq!(serde_json::to_string(&Truth::Unresolved).unwrap(), "\"\"");
        assert_eq!(serde_json::to_string(&Truth::Success).unwrap(), "\"success\"");
        let parsed: Truth = serde_json::from_str("\"failure\"").unwrap();
        assert_eq!(parsed, Truth::Failure);
        assert!(serde_json::from_str::<Truth>("\"verde\"").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = BuilderConfig::default();
        assert_eq!(config.root_label, "root");
        assert!(config.is_ignored("fail"));
        assert!(config.record_spans);
        assert!(BuilderConfig::strict().ignored_goals.is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let config = BuilderConfig::from_json(r#"{"root_label": "query", "max_branches": 3}"#)
            .unwrap();
        assert_eq!(config.root_label, "query");
        assert_eq!(config.max_branches, Some(3));
        assert!(config.is_ignored("fail"));
    }

    #[test]
    fn test_config_validation() {
        let err = BuilderConfig::from_json(r#"{"root_label": "  "}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = BuilderConfig::default().with_max_branches(0).validate();
        assert!(err.is_err());
    }
}
