use std::fmt::Write;

use rusqlite::Connection;

use kl_core::{Trie, validate_separator};

use crate::error::{Result, StoreError};

pub const SCHEMA_VERSION: i64 = 1;

/// Every table a dictionary database must carry.
pub const TABLES: [&str; 5] = [
    "config",
    "reading_mappings",
    "nodes",
    "entries",
    "keychain_id_map",
];

const DDL: &str = "
CREATE TABLE config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE reading_mappings (
    id      INTEGER PRIMARY KEY,
    reading TEXT NOT NULL UNIQUE
);

CREATE TABLE nodes (
    id         INTEGER PRIMARY KEY,
    parent_id  INTEGER REFERENCES nodes(id),
    reading_id INTEGER REFERENCES reading_mappings(id)
);

CREATE TABLE entries (
    id          INTEGER PRIMARY KEY,
    node_id     INTEGER NOT NULL REFERENCES nodes(id),
    value       TEXT NOT NULL,
    type_id     INTEGER NOT NULL,
    probability REAL NOT NULL,
    previous    TEXT
);

CREATE TABLE keychain_id_map (
    keychain TEXT PRIMARY KEY,
    node_id  INTEGER NOT NULL REFERENCES nodes(id)
);

CREATE INDEX idx_nodes_parent ON nodes(parent_id);
CREATE INDEX idx_entries_node ON entries(node_id);
";

/// Quote a text literal, doubling embedded single quotes.
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn quote_opt(text: Option<&str>) -> String {
    text.map_or_else(|| "NULL".to_string(), quote)
}

fn int_opt(value: Option<usize>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| v.to_string())
}

/// Render `trie` as a self-contained script that creates and fills the
/// dictionary tables inside one transaction.
///
/// Node ids are pre-order positions with the root at 0, so a scan of any
/// subtree ordered by `node_id` visits nodes in the trie's own order.
/// Probabilities use Rust's shortest round-trip float formatting.
pub fn generate_sql_script(trie: &Trie) -> String {
    let views = trie.preorder();
    let mut out = String::from("BEGIN TRANSACTION;\n");
    out.push_str(DDL);
    out.push('\n');

    for (key, value) in [
        ("separator", trie.separator().to_string()),
        ("schema_version", SCHEMA_VERSION.to_string()),
        ("entry_count", trie.entry_count().to_string()),
        ("node_count", trie.node_count().to_string()),
    ] {
        let _ = writeln!(
            out,
            "INSERT INTO config (key, value) VALUES ({}, {});",
            quote(key),
            quote(&value)
        );
    }

    for (id, reading) in trie.vocabulary().iter().enumerate() {
        let _ = writeln!(
            out,
            "INSERT INTO reading_mappings (id, reading) VALUES ({id}, {});",
            quote(reading)
        );
    }

    let mut entry_id = 0usize;
    for view in &views {
        let _ = writeln!(
            out,
            "INSERT INTO nodes (id, parent_id, reading_id) VALUES ({}, {}, {});",
            view.order,
            int_opt(view.parent),
            int_opt(view.reading_id.map(|r| r as usize))
        );
        for gram in view.grams {
            let _ = writeln!(
                out,
                "INSERT INTO entries (id, node_id, value, type_id, probability, previous) \
                 VALUES ({entry_id}, {}, {}, {}, {:?}, {});",
                view.order,
                quote(&gram.value),
                gram.type_id,
                gram.probability,
                quote_opt(gram.previous.as_deref())
            );
            entry_id += 1;
        }
    }

    for view in views.iter().filter(|v| v.parent.is_some()) {
        let _ = writeln!(
            out,
            "INSERT INTO keychain_id_map (keychain, node_id) VALUES ({}, {});",
            quote(&view.keychain),
            view.order
        );
    }

    out.push_str("COMMIT;\n");
    tracing::info!(
        entries = trie.entry_count(),
        nodes = trie.node_count(),
        bytes = out.len(),
        "generated SQL dictionary script"
    );
    out
}

/// What the `config` table declares about the dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DictionaryInfo {
    pub separator: String,
    pub entry_count: usize,
    pub node_count: usize,
    pub vocabulary_size: usize,
}

fn config_value(conn: &Connection, key: &str) -> Result<String> {
    let mut stmt = conn.prepare("SELECT value FROM config WHERE key = ?1")?;
    let value: Option<String> = stmt.query_row([key], |row| row.get(0)).ok();
    value.ok_or_else(|| StoreError::CorruptData(format!("config is missing {key:?}")))
}

fn config_count(conn: &Connection, key: &str) -> Result<usize> {
    let raw = config_value(conn, key)?;
    raw.parse()
        .map_err(|_| StoreError::CorruptData(format!("config {key:?} is not a count: {raw:?}")))
}

fn row_count(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

/// Check that `conn` holds a complete dictionary and read its header.
pub fn verify(conn: &Connection) -> Result<DictionaryInfo> {
    for table in TABLES {
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(StoreError::CorruptData(format!("missing table {table}")));
        }
    }

    let version = config_value(conn, "schema_version")?;
    if version != SCHEMA_VERSION.to_string() {
        return Err(StoreError::CorruptData(format!(
            "unsupported schema version {version}"
        )));
    }

    let separator = config_value(conn, "separator")?;
    validate_separator(&separator).map_err(|e| StoreError::CorruptData(e.to_string()))?;

    let root: Option<(i64, Option<i64>)> = conn
        .query_row("SELECT id, parent_id FROM nodes WHERE id = 0", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .ok();
    if !matches!(root, Some((0, None))) {
        return Err(StoreError::CorruptData("nodes has no root row".into()));
    }

    let entry_count = config_count(conn, "entry_count")?;
    let node_count = config_count(conn, "node_count")?;
    for (table, declared) in [("entries", entry_count), ("nodes", node_count)] {
        let actual = row_count(conn, table)?;
        if actual != declared {
            return Err(StoreError::CorruptData(format!(
                "{table} holds {actual} rows, config declares {declared}"
            )));
        }
    }
    if entry_count > 0 {
        for table in ["reading_mappings", "keychain_id_map"] {
            if row_count(conn, table)? == 0 {
                return Err(StoreError::CorruptData(format!("{table} is empty")));
            }
        }
    }

    Ok(DictionaryInfo {
        separator,
        entry_count,
        node_count,
        vocabulary_size: row_count(conn, "reading_mappings")?,
    })
}
