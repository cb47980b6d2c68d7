//! Syntax tree for compiled search text.
//!
//! A line of typed text becomes a sequence of [`SearchToken`]s, which the
//! compiler turns into a [`QueryExpression`]: an `And` of per-token `Or`
//! groups whose leaves are field [`Match`](QueryExpression::Match)es.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One token of typed search text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchToken {
    /// Token text with any surrounding quotes or brackets stripped.
    pub text: String,
    /// Came from `[...]`: an exact tag match.
    pub bracketed: bool,
    /// Came from `"..."`: a phrase.
    pub quoted: bool,
}

impl SearchToken {
    /// A bare word.
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bracketed: false,
            quoted: false,
        }
    }

    /// A `"quoted phrase"`.
    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bracketed: false,
            quoted: true,
        }
    }

    /// A `[bracketed tag]`.
    pub fn bracketed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bracketed: true,
            quoted: false,
        }
    }
}

impl fmt::Display for SearchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bracketed {
            write!(f, "[{}]", self.text)
        } else if self.quoted {
            write!(f, "\"{}\"", self.text)
        } else {
            write!(f, "{}", self.text)
        }
    }
}

/// Whether typed text is a broad query or a refinement of committed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Query,
    Filter,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Query => write!(f, "query"),
            SearchMode::Filter => write!(f, "filter"),
        }
    }
}

/// How a single field is matched against a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    /// Case-insensitive substring match on the column text.
    Like,
    /// Exact element equality against a JSON array of tags.
    Tag,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Like => write!(f, "~"),
            MatchKind::Tag => write!(f, "#"),
        }
    }
}

/// Boolean predicate over indexed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryExpression {
    And(Vec<QueryExpression>),
    Or(Vec<QueryExpression>),
    Match {
        /// Field name as registered.
        field: String,
        /// Column the field is stored in.
        column: String,
        kind: MatchKind,
        token: SearchToken,
    },
}

impl QueryExpression {
    /// Whether some record could satisfy this expression.
    ///
    /// An empty `Or` has no way to match, and it poisons every `And` above it.
    pub fn is_satisfiable(&self) -> bool {
        match self {
            QueryExpression::And(children) => children.iter().all(Self::is_satisfiable),
            QueryExpression::Or(children) => children.iter().any(Self::is_satisfiable),
            QueryExpression::Match { .. } => true,
        }
    }

    /// Number of `Match` leaves.
    pub fn match_count(&self) -> usize {
        match self {
            QueryExpression::And(children) | QueryExpression::Or(children) => {
                children.iter().map(Self::match_count).sum()
            }
            QueryExpression::Match { .. } => 1,
        }
    }
}

impl fmt::Display for QueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryExpression::And(children) | QueryExpression::Or(children) => {
                let (name, sep) = match self {
                    QueryExpression::And(_) => ("AND", " & "),
                    _ => ("OR", " | "),
                };
                if children.is_empty() {
                    return write!(f, "{}()", name);
                }
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            QueryExpression::Match { field, kind, token, .. } => {
                write!(f, "{}{}{}", field, kind, token)
            }
        }
    }
}

/// Non-fatal findings reported while compiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// No registered field can match this token in the current mode, so the
    /// whole expression is unsatisfiable.
    NoEligibleFieldsForToken { token: SearchToken, mode: SearchMode },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::NoEligibleFieldsForToken { token, mode } => {
                write!(f, "no field can match '{}' in {} mode", token, mode)
            }
        }
    }
}
