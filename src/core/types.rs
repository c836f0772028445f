//! SK-001: Value model shared by the registry, the matcher and the interpreter.
//!
//! Semantic types are registered at runtime, so values are dynamic: a [`Value`]
//! pairs the exact [`TypeId`] it was produced as with a structural [`Datum`].

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Types and values
// ============================================================================

/// Handle of a registered semantic type.
///
/// The wrapped index is the registration rank: lower ranks were registered
/// earlier and win ties between ambiguous matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Registration rank of this type.
    pub fn rank(self) -> usize {
        self.0 as usize
    }
}

/// Structural payload of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Datum {
    /// Numeric view of the datum, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            // Debug formatting keeps the fractional marker ("5.0") so the
            // printed form parses back to a float.
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A runtime value tagged with its exact semantic type.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    ty: TypeId,
    datum: Datum,
}

impl Value {
    pub fn new(ty: TypeId, datum: Datum) -> Self {
        Self { ty, datum }
    }

    /// Exact type this value was produced as.
    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn datum(&self) -> &Datum {
        &self.datum
    }

    pub fn into_datum(self) -> Datum {
        self.datum
    }
}

// ============================================================================
// Relations and change modes
// ============================================================================

/// Result of comparing two values, or the relation a condition asks for.
///
/// Comparators only ever produce `Equal`, `NotEqual`, `Greater` and `Smaller`;
/// the `…OrEqual` variants exist for conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Smaller,
    SmallerOrEqual,
}

impl Relation {
    /// Relation seen from the other operand (`a > b` ⇔ `b < a`).
    pub fn switched(self) -> Self {
        match self {
            Self::Greater => Self::Smaller,
            Self::GreaterOrEqual => Self::SmallerOrEqual,
            Self::Smaller => Self::Greater,
            Self::SmallerOrEqual => Self::GreaterOrEqual,
            other => other,
        }
    }

    /// Logical negation (`a > b` ⇔ `!(a <= b)`).
    pub fn negated(self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
            Self::Greater => Self::SmallerOrEqual,
            Self::GreaterOrEqual => Self::Smaller,
            Self::Smaller => Self::GreaterOrEqual,
            Self::SmallerOrEqual => Self::Greater,
        }
    }

    /// Whether a comparator result satisfies this (wanted) relation.
    pub fn is_satisfied_by(self, actual: Relation) -> bool {
        match self {
            Self::Equal => actual == Self::Equal,
            Self::NotEqual => actual != Self::Equal,
            Self::Greater => actual == Self::Greater,
            Self::GreaterOrEqual => matches!(actual, Self::Greater | Self::Equal),
            Self::Smaller => actual == Self::Smaller,
            Self::SmallerOrEqual => matches!(actual, Self::Smaller | Self::Equal),
        }
    }

    /// Whether this relation needs an ordering comparator.
    pub fn is_ordering(self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }

    /// Relation for a standard ordering.
    pub fn from_ordering(ordering: std::cmp::Ordering) -> Self {
        match ordering {
            std::cmp::Ordering::Less => Self::Smaller,
            std::cmp::Ordering::Equal => Self::Equal,
            std::cmp::Ordering::Greater => Self::Greater,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal to"),
            Self::NotEqual => write!(f, "not equal to"),
            Self::Greater => write!(f, "greater than"),
            Self::GreaterOrEqual => write!(f, "greater than or equal to"),
            Self::Smaller => write!(f, "smaller than"),
            Self::SmallerOrEqual => write!(f, "smaller than or equal to"),
        }
    }
}

/// How an expression is mutated by a change effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeMode {
    Set,
    Add,
    Remove,
    Clear,
}

impl fmt::Display for ChangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// What a mutable expression accepts as delta for one change mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSpec {
    pub ty: TypeId,
    pub plural: bool,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Rank of a parse diagnostic; higher ranks replace lower ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorQuality {
    #[default]
    None,
    NotParseable,
    WrongType,
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A pre-formatted message for the logging collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub quality: ErrorQuality,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn error(quality: ErrorQuality, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            quality,
            message: message.into(),
            line: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            quality: ErrorQuality::None,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: Option<usize>) -> Self {
        if self.line.is_none() {
            self.line = line;
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", kind, line, self.message),
            None => write!(f, "{}: {}", kind, self.message),
        }
    }
}

/// Canonical form of an event name: trimmed, Unicode-lowercased.
pub fn event_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// "a number", "an object".
pub fn with_article(noun: &str) -> String {
    let vowel = noun
        .chars()
        .next()
        .is_some_and(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'));
    if vowel {
        format!("an {}", noun)
    } else {
        format!("a {}", noun)
    }
}
