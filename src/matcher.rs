//! Matching strategies, one per indexing mode.
//!
//! A matcher lowers a single `Match(field, kind, token)` leaf into a SQL
//! predicate, pushing the token text as a bind parameter. Token text never
//! reaches the SQL string itself.

use crate::ast::{MatchKind, SearchToken};
use crate::transpiler::{Dialect, FragmentBuilder, quote_ident};

/// Lowers one field match to SQL.
pub trait Matcher: Send + Sync {
    /// The match kind this strategy implements.
    fn kind(&self) -> MatchKind;

    /// Render a predicate testing `column` against `token`.
    fn lower(&self, column: &str, token: &SearchToken, out: &mut FragmentBuilder) -> String;
}

/// Case-insensitive substring match: `column LIKE '%token%'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LikeMatcher;

impl Matcher for LikeMatcher {
    fn kind(&self) -> MatchKind {
        MatchKind::Like
    }

    fn lower(&self, column: &str, token: &SearchToken, out: &mut FragmentBuilder) -> String {
        let op = match out.dialect() {
            Dialect::Sqlite => "LIKE",
            Dialect::Postgres => "ILIKE",
        };
        let pattern = format!("%{}%", escape_like(&token.text));
        let placeholder = out.bind(pattern);
        format!("{} {} {} ESCAPE '\\'", quote_ident(column), op, placeholder)
    }
}

/// Exact element match against a JSON array of strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagMatcher;

impl Matcher for TagMatcher {
    fn kind(&self) -> MatchKind {
        MatchKind::Tag
    }

    fn lower(&self, column: &str, token: &SearchToken, out: &mut FragmentBuilder) -> String {
        let placeholder = out.bind(token.text.clone());
        let column = quote_ident(column);
        match out.dialect() {
            Dialect::Sqlite => format!(
                "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value = {})",
                column, placeholder
            ),
            Dialect::Postgres => format!(
                "{}::jsonb @> jsonb_build_array({}::text)",
                column, placeholder
            ),
        }
    }
}

/// The strategy for a match kind.
pub fn matcher_for(kind: MatchKind) -> &'static dyn Matcher {
    match kind {
        MatchKind::Like => &LikeMatcher,
        MatchKind::Tag => &TagMatcher,
    }
}

/// Escape LIKE wildcards so they match literally under `ESCAPE '\'`.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
