//! SQLite persistence for `kl-core` dictionaries.
//!
//! A trie is rendered to a five-table SQL script (`config`,
//! `reading_mappings`, `nodes`, `entries`, `keychain_id_map`) and read back
//! through [`SqlTrie`], which answers the same queries as the in-memory trie.

pub mod error;
pub mod files;
pub mod schema;
pub mod sql_trie;

pub use error::{Result, StoreError};
pub use files::{
    Dictionary, read_binary, write_binary, write_database, write_sql_script,
};
pub use schema::{DictionaryInfo, SCHEMA_VERSION, generate_sql_script};
pub use sql_trie::SqlTrie;
