//! SQL lowering for compiled search expressions.
//!
//! Converts a [`QueryExpression`] into a parameterized WHERE-clause fragment.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ast::QueryExpression;
use crate::matcher::matcher_for;

/// SQL flavour of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `?` placeholders, `LIKE`, `json_each` containment.
    #[default]
    Sqlite,
    /// `$n` placeholders, `ILIKE`, `jsonb` containment.
    Postgres,
}

impl Dialect {
    /// Pick the dialect from a connection URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") {
            Some(Dialect::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Dialect::Postgres)
        } else {
            None
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

/// A WHERE-clause fragment and its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<String>,
}

/// Quote a table or column name so reserved words like `order` are usable.
///
/// Both dialects use standard double quotes. PostgreSQL treats a quoted
/// name case-sensitively, so it must match the name as stored.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Accumulates bind parameters while a fragment is rendered.
#[derive(Debug)]
pub struct FragmentBuilder {
    dialect: Dialect,
    params: Vec<String>,
}

impl FragmentBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Push a bind value and return its placeholder.
    pub fn bind(&mut self, value: String) -> String {
        self.params.push(value);
        match self.dialect {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", self.params.len()),
        }
    }

    pub fn finish(self, sql: String) -> SqlFragment {
        SqlFragment {
            sql,
            params: self.params,
        }
    }
}

/// Trait for lowering expression nodes to SQL.
pub trait ToSql {
    /// Render this node as a parameterized fragment.
    fn to_sql(&self, dialect: Dialect) -> SqlFragment {
        let mut out = FragmentBuilder::new(dialect);
        let sql = self.write_sql(&mut out);
        out.finish(sql)
    }

    /// Render into an existing builder, returning the SQL text.
    fn write_sql(&self, out: &mut FragmentBuilder) -> String;
}

impl ToSql for QueryExpression {
    fn write_sql(&self, out: &mut FragmentBuilder) -> String {
        match self {
            QueryExpression::And(children) if children.is_empty() => "1=1".to_string(),
            QueryExpression::Or(children) if children.is_empty() => "1=0".to_string(),
            QueryExpression::And(children) | QueryExpression::Or(children) => {
                let joiner = match self {
                    QueryExpression::And(_) => " AND ",
                    _ => " OR ",
                };
                let parts: Vec<String> = children.iter().map(|c| c.write_sql(out)).collect();
                format!("({})", parts.join(joiner))
            }
            QueryExpression::Match {
                column, kind, token, ..
            } => matcher_for(*kind).lower(column, token, out),
        }
    }
}
