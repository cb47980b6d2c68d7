//! Field Index Registry.
//!
//! Every searchable record type declares, once, which of its fields take
//! part in free-text search and how each one matches. The declaration is
//! validated into an immutable [`EntityTypeIndex`] and cached for the life
//! of the process, so the compiler never re-inspects a type.
//!
//! ```
//! use sift::index::{register, FieldIndexSpec, Indexed, IndexingMode, PersistenceMode};
//!
//! struct Note;
//!
//! impl Indexed for Note {
//!     const TABLE: &'static str = "notes";
//!
//!     fn fields() -> Vec<FieldIndexSpec> {
//!         vec![
//!             FieldIndexSpec::new("title", IndexingMode::QUERY_OR_FILTER, PersistenceMode::Plain),
//!             FieldIndexSpec::new(
//!                 "tags",
//!                 IndexingMode::QUERY_LIKE_TERM | IndexingMode::TAG_MATCH_TERM,
//!                 PersistenceMode::Json,
//!             ),
//!         ]
//!     }
//! }
//!
//! let index = register::<Note>().unwrap();
//! assert_eq!(index.fields().len(), 2);
//! ```

use bitflags::bitflags;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::ast::SearchMode;
use crate::error::ConfigurationError;

bitflags! {
    /// How free text may match a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IndexingMode: u8 {
        /// Plain substring match, eligible in both modes.
        const LIKE_OR_CONTAINS = 1 << 0;
        /// Eligible while in Query mode.
        const QUERY_LIKE_TERM = 1 << 1;
        /// Eligible while in Filter mode.
        const FILTER_LIKE_TERM = 1 << 2;
        /// Exact match of a bracketed token against a JSON array of tags.
        const TAG_MATCH_TERM = 1 << 3;
        /// Eligible in both modes.
        const QUERY_OR_FILTER = Self::QUERY_LIKE_TERM.bits() | Self::FILTER_LIKE_TERM.bits();
    }
}

impl IndexingMode {
    /// Whether a field with these flags takes unbracketed tokens in `mode`.
    pub fn eligible_in(self, mode: SearchMode) -> bool {
        match mode {
            SearchMode::Query => self.contains(IndexingMode::QUERY_LIKE_TERM),
            SearchMode::Filter => self.contains(IndexingMode::FILTER_LIKE_TERM),
        }
    }
}

impl FromStr for IndexingMode {
    type Err = String;

    /// Parses a single flag name, e.g. `QueryLikeTerm` or `query_like_term`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "likeorcontains" => Ok(IndexingMode::LIKE_OR_CONTAINS),
            "queryliketerm" => Ok(IndexingMode::QUERY_LIKE_TERM),
            "filterliketerm" => Ok(IndexingMode::FILTER_LIKE_TERM),
            "tagmatchterm" => Ok(IndexingMode::TAG_MATCH_TERM),
            "queryorfilter" => Ok(IndexingMode::QUERY_OR_FILTER),
            _ => Err(format!("unknown indexing mode '{}'", s)),
        }
    }
}

/// How a field is laid out in its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Scalar text.
    #[default]
    Plain,
    /// A JSON array of strings in a single text column.
    Json,
}

/// Matching capabilities of one indexed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIndexSpec {
    name: String,
    column: String,
    modes: IndexingMode,
    persistence: PersistenceMode,
}

impl FieldIndexSpec {
    /// Declare a field stored in a column of the same name.
    pub fn new(name: impl Into<String>, modes: IndexingMode, persistence: PersistenceMode) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            modes,
            persistence,
        }
    }

    /// Store the field under a different column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    pub fn modes(&self) -> IndexingMode {
        self.modes
    }

    pub fn persistence(&self) -> PersistenceMode {
        self.persistence
    }

    /// A field with no mode never matches anything.
    pub fn is_searchable(&self) -> bool {
        !self.modes.is_empty()
    }

    pub fn is_tag_field(&self) -> bool {
        self.modes.contains(IndexingMode::TAG_MATCH_TERM)
    }

    /// Whether an unbracketed token may substring-match this field in `mode`.
    pub fn like_eligible(&self, mode: SearchMode) -> bool {
        !self.is_tag_field()
            && (self.modes.contains(IndexingMode::LIKE_OR_CONTAINS) || self.modes.eligible_in(mode))
    }

    /// Whether an unbracketed token may be treated as a tag for this field in `mode`.
    pub fn bare_tag_eligible(&self, mode: SearchMode) -> bool {
        self.is_tag_field() && self.modes.eligible_in(mode)
    }
}

/// Implemented by record types that take part in free-text search.
///
/// This is the declarative stand-in for attribute scanning: `fields()` is
/// called once per type and the result cached by [`register`].
pub trait Indexed: 'static {
    /// Table holding the records.
    const TABLE: &'static str;

    /// Column whose value identifies a record.
    const KEY_COLUMN: &'static str = "id";

    /// Field declarations, in search order.
    fn fields() -> Vec<FieldIndexSpec>;
}

/// Ordered, validated field declarations for one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeIndex {
    name: String,
    table: String,
    key_column: String,
    fields: Vec<FieldIndexSpec>,
}

impl EntityTypeIndex {
    /// Validate field declarations into an index.
    ///
    /// Fails if a tag field is not JSON-persisted, if two fields share a
    /// column, or if any table or column name is not a plain identifier.
    pub fn build(
        name: impl Into<String>,
        table: impl Into<String>,
        key_column: impl Into<String>,
        fields: Vec<FieldIndexSpec>,
    ) -> Result<Self, ConfigurationError> {
        let table = table.into();
        let key_column = key_column.into();
        for ident in [&table, &key_column] {
            if !is_identifier(ident) {
                return Err(ConfigurationError::InvalidTableName(ident.clone()));
            }
        }

        // SQLite resolves column names case-insensitively, quoted or not.
        let mut columns: HashMap<String, &str> = HashMap::new();
        for field in &fields {
            if field.is_tag_field() && field.persistence != PersistenceMode::Json {
                return Err(ConfigurationError::TagRequiresJson {
                    field: field.name.clone(),
                });
            }
            if !is_identifier(&field.column) {
                return Err(ConfigurationError::InvalidColumnName {
                    field: field.name.clone(),
                    column: field.column.clone(),
                });
            }
            if let Some(first) = columns.insert(field.column.to_ascii_lowercase(), &field.name) {
                return Err(ConfigurationError::DuplicateColumn {
                    column: field.column.clone(),
                    first: first.to_string(),
                    second: field.name.clone(),
                });
            }
        }

        Ok(Self {
            name: name.into(),
            table,
            key_column,
            fields,
        })
    }

    /// Record type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// All declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldIndexSpec] {
        &self.fields
    }

    /// Fields that can match anything at all.
    pub fn searchable(&self) -> impl Iterator<Item = &FieldIndexSpec> {
        self.fields.iter().filter(|f| f.is_searchable())
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldIndexSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

static REGISTRY: Lazy<DashMap<TypeId, Arc<EntityTypeIndex>>> = Lazy::new(DashMap::new);

/// Build and cache the index for `T`.
///
/// Idempotent: the first successful call wins and every later call returns
/// the same shared index. A failed build is not cached.
pub fn register<T: Indexed>() -> Result<Arc<EntityTypeIndex>, ConfigurationError> {
    let key = TypeId::of::<T>();
    if let Some(index) = REGISTRY.get(&key) {
        return Ok(Arc::clone(index.value()));
    }

    let entry = REGISTRY.entry(key).or_try_insert_with(|| {
        tracing::debug!(entity = std::any::type_name::<T>(), "building search index");
        EntityTypeIndex::build(std::any::type_name::<T>(), T::TABLE, T::KEY_COLUMN, T::fields())
            .map(Arc::new)
    })?;
    Ok(Arc::clone(entry.value()))
}

/// Plain SQL identifier: ASCII letters, digits and `_`, not starting with a digit.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
