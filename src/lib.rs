//! # sift — incremental search-box filtering
//!
//! > **Type to query. Keep typing to narrow.**
//!
//! sift turns a line of typed text into a parameterized SQL predicate over a
//! record type's *self-indexed* fields, and sequences when that predicate is
//! (re)evaluated as the user types.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sift::prelude::*;
//!
//! let index = sift::register::<Animal>()?;
//! let store = SqlStore::connect("sqlite://zoo.db", index.table(), index.key_column()).await?;
//! let mut session = FilterSession::new(index, Arc::new(store), SessionConfig::default());
//!
//! session.set_input_text("red [mammal]");
//! session.run_until_idle().await;
//! println!("{:?}", session.results());
//! ```
//!
//! ## Search Syntax
//!
//! | Input          | Token          | Matches                                  |
//! |----------------|----------------|------------------------------------------|
//! | `word`         | bare           | substring of any eligible field          |
//! | `"two words"`  | quoted phrase  | substring of any eligible field          |
//! | `[tag]`        | bracketed tag  | exact element of a JSON tag array        |
//!
//! Every token must match some field (AND); a token may match any eligible
//! field (OR).

pub mod ast;
pub mod compiler;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod matcher;
pub mod session;
pub mod snapshot;
pub mod tokenizer;
pub mod transpiler;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::compiler::{CompiledQuery, compile, compile_text};
    pub use crate::config::{SessionConfig, SiftConfig};
    pub use crate::engine::{RecordId, SqlStore, Store};
    pub use crate::error::*;
    pub use crate::events::{CollectionAction, CollectionChanged, PropertyChanged, SessionEvent};
    pub use crate::index::{
        EntityTypeIndex, FieldIndexSpec, Indexed, IndexingMode, PersistenceMode, register,
    };
    pub use crate::session::{FilterSession, FilteringState, SearchEntryState};
    pub use crate::tokenizer::tokenize;
    pub use crate::transpiler::{Dialect, SqlFragment, ToSql};
}

pub use index::register;

/// Split search text into tokens.
///
/// # Example
///
/// ```
/// let tokens = sift::tokenize("red \"light blue\" [color]");
/// assert_eq!(tokens.len(), 3);
/// assert!(tokens[2].bracketed);
/// ```
pub fn tokenize(text: &str) -> Vec<ast::SearchToken> {
    tokenizer::tokenize(text)
}
