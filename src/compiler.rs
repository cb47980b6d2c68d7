//! Predicate compiler.
//!
//! Every token must find a home: the compiled expression is an `And` with
//! one `Or` per token, and each `Or` lists every field able to match that
//! token in the current mode.
//!
//! Eligibility per field:
//!
//! | Token      | Field                                    | Match |
//! |------------|------------------------------------------|-------|
//! | `[tag]`    | `TagMatchTerm`                           | Tag   |
//! | `[tag]`    | anything else                            | none  |
//! | bare/quoted| `TagMatchTerm` + eligible in mode        | Tag   |
//! | bare/quoted| `LikeOrContains`, or eligible in mode    | Like  |
//!
//! A bare word may be taken as a tag, but a bracketed tag never falls back
//! to a substring match.

use serde::{Deserialize, Serialize};

use crate::ast::{Diagnostic, MatchKind, QueryExpression, SearchMode, SearchToken};
use crate::index::{EntityTypeIndex, FieldIndexSpec};
use crate::tokenizer::tokenize;
use crate::transpiler::{Dialect, SqlFragment, ToSql};

/// Output of one compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub mode: SearchMode,
    pub tokens: Vec<SearchToken>,
    pub expression: QueryExpression,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledQuery {
    /// False when some token has nowhere to match; the store need not be asked.
    pub fn is_satisfiable(&self) -> bool {
        self.expression.is_satisfiable()
    }

    /// No tokens at all.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Lower the expression for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> SqlFragment {
        self.expression.to_sql(dialect)
    }
}

/// Compile tokens against an index.
pub fn compile(tokens: &[SearchToken], index: &EntityTypeIndex, mode: SearchMode) -> CompiledQuery {
    let mut diagnostics = Vec::new();
    let groups: Vec<QueryExpression> = tokens
        .iter()
        .map(|token| {
            let matches: Vec<QueryExpression> = index
                .searchable()
                .filter_map(|field| match_kind(field, token, mode).map(|kind| leaf(field, kind, token)))
                .collect();
            if matches.is_empty() {
                diagnostics.push(Diagnostic::NoEligibleFieldsForToken {
                    token: token.clone(),
                    mode,
                });
            }
            QueryExpression::Or(matches)
        })
        .collect();

    let compiled = CompiledQuery {
        mode,
        tokens: tokens.to_vec(),
        expression: QueryExpression::And(groups),
        diagnostics,
    };
    tracing::trace!(expression = %compiled.expression, %mode, "compiled search text");
    compiled
}

/// Tokenize and compile in one step.
pub fn compile_text(text: &str, index: &EntityTypeIndex, mode: SearchMode) -> CompiledQuery {
    compile(&tokenize(text), index, mode)
}

fn match_kind(field: &FieldIndexSpec, token: &SearchToken, mode: SearchMode) -> Option<MatchKind> {
    if token.bracketed {
        return field.is_tag_field().then_some(MatchKind::Tag);
    }
    if field.bare_tag_eligible(mode) {
        Some(MatchKind::Tag)
    } else if field.like_eligible(mode) {
        Some(MatchKind::Like)
    } else {
        None
    }
}

fn leaf(field: &FieldIndexSpec, kind: MatchKind, token: &SearchToken) -> QueryExpression {
    QueryExpression::Match {
        field: field.name().to_string(),
        column: field.column_name().to_string(),
        kind,
        token: token.clone(),
    }
}
