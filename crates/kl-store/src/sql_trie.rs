use std::path::Path;

use rusqlite::{Connection, OpenFlags, Row, params};

use kl_core::{CoreError, Gram, GramQuerier};

use crate::error::{Result, StoreError};
use crate::schema::{self, DictionaryInfo};

const EXACT_QUERY: &str = "
    SELECT k.keychain, e.value, e.type_id, e.probability, e.previous
    FROM keychain_id_map k
    JOIN entries e ON e.node_id = k.node_id
    WHERE k.keychain = ?1 AND (?2 IS NULL OR e.type_id = ?2)
    ORDER BY e.id";

// Node ids are pre-order, so ordering by node_id replays the trie walk.
const PARTIAL_QUERY: &str = "
    WITH RECURSIVE subtree(id) AS (
        SELECT node_id FROM keychain_id_map WHERE keychain = ?1
        UNION ALL
        SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id
    )
    SELECT k.keychain, e.value, e.type_id, e.probability, e.previous
    FROM subtree s
    JOIN entries e ON e.node_id = s.id
    JOIN keychain_id_map k ON k.node_id = s.id
    WHERE ?2 IS NULL OR e.type_id = ?2
    ORDER BY e.node_id, e.id";

const EXACT_EXISTS: &str = "
    SELECT EXISTS (
        SELECT 1 FROM keychain_id_map k
        JOIN entries e ON e.node_id = k.node_id
        WHERE k.keychain = ?1 AND (?2 IS NULL OR e.type_id = ?2)
    )";

const PARTIAL_EXISTS: &str = "
    WITH RECURSIVE subtree(id) AS (
        SELECT node_id FROM keychain_id_map WHERE keychain = ?1
        UNION ALL
        SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id
    )
    SELECT EXISTS (
        SELECT 1 FROM subtree s
        JOIN entries e ON e.node_id = s.id
        WHERE ?2 IS NULL OR e.type_id = ?2
    )";

/// Read-only dictionary answering gram queries straight from the
/// generated SQLite tables.
pub struct SqlTrie {
    conn: Connection,
    info: DictionaryInfo,
}

impl SqlTrie {
    /// Execute a generated script into a private in-memory database.
    pub fn from_script(script: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(script)
            .map_err(|e| StoreError::CorruptData(format!("script failed: {e}")))?;
        Self::from_connection(conn)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let trie = Self::from_connection(conn)?;
        tracing::info!(
            path = %path.display(),
            entries = trie.info.entry_count,
            "opened SQL dictionary"
        );
        Ok(trie)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        let info = schema::verify(&conn).map_err(|e| match e {
            StoreError::Sqlite(inner) => StoreError::CorruptData(inner.to_string()),
            other => other,
        })?;
        Ok(Self { conn, info })
    }

    pub fn info(&self) -> &DictionaryInfo {
        &self.info
    }

    pub fn separator(&self) -> &str {
        &self.info.separator
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The keychain for `readings`, or `None` when no stored key can match.
    /// Stored keychains always split back into their own readings, so a
    /// join that splits differently (an empty token, a token holding the
    /// separator, or `["a:", "b"]` under `::`) names some other key.
    fn keychain(&self, readings: &[String]) -> Result<Option<String>> {
        if readings.is_empty() {
            return Err(CoreError::EmptyKey.into());
        }
        let separator = self.separator();
        let keychain = readings.join(separator);
        if !keychain.split(separator).eq(readings.iter().map(String::as_str)) {
            return Ok(None);
        }
        Ok(Some(keychain))
    }

    pub fn has_grams(
        &self,
        readings: &[String],
        partially_match: bool,
        filter_type: Option<u32>,
    ) -> Result<bool> {
        let Some(keychain) = self.keychain(readings)? else {
            return Ok(false);
        };
        let sql = if partially_match {
            PARTIAL_EXISTS
        } else {
            EXACT_EXISTS
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let found: bool = stmt.query_row(params![keychain, filter_type], |row| row.get(0))?;
        Ok(found)
    }

    pub fn query_grams(
        &self,
        readings: &[String],
        partially_match: bool,
        filter_type: Option<u32>,
    ) -> Result<Vec<Gram>> {
        let Some(keychain) = self.keychain(readings)? else {
            return Ok(Vec::new());
        };
        let sql = if partially_match {
            PARTIAL_QUERY
        } else {
            EXACT_QUERY
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![keychain, filter_type], |row| {
            self.gram_from_row(row)
        })?;

        let mut grams = Vec::new();
        for row in rows {
            grams.push(row??);
        }
        tracing::debug!(
            keychain = %keychain,
            partially_match,
            found = grams.len(),
            "SQL gram query"
        );
        Ok(grams)
    }

    /// Row decoding runs inside rusqlite's closure, so data problems are
    /// carried out as an inner `Result`.
    fn gram_from_row(&self, row: &Row<'_>) -> rusqlite::Result<Result<Gram>> {
        let keychain: String = row.get(0)?;
        let value: String = row.get(1)?;
        let type_id: i64 = row.get(2)?;
        let probability: f64 = row.get(3)?;
        let previous: Option<String> = row.get(4)?;

        let Ok(type_id) = u32::try_from(type_id) else {
            return Ok(Err(StoreError::CorruptData(format!(
                "type_id {type_id} out of range for {keychain:?}"
            ))));
        };
        if !probability.is_finite() {
            return Ok(Err(StoreError::CorruptData(format!(
                "non-finite probability for {keychain:?}"
            ))));
        }
        Ok(Ok(Gram {
            readings: keychain
                .split(self.separator())
                .map(str::to_string)
                .collect(),
            value,
            type_id,
            probability,
            previous,
        }))
    }
}

impl GramQuerier for SqlTrie {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        self.query_grams(readings, partially_match, None)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, ?readings, "SQL dictionary query failed");
                Vec::new()
            })
    }

    fn exists(&self, readings: &[String], partially_match: bool) -> bool {
        self.has_grams(readings, partially_match, None)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, ?readings, "SQL dictionary lookup failed");
                false
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::generate_sql_script;
    use kl_core::Trie;

    fn keys(readings: &[&str]) -> Vec<String> {
        readings.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Trie {
        let mut trie = Trie::new("-").unwrap();
        trie.insert("liu2", Gram::new(&[], "留", -4.0)).unwrap();
        trie.insert("liu2-yi4", Gram::new(&[], "留意", -3.0)).unwrap();
        trie.insert("liu2-yi4", Gram::new(&[], "流易", -6.0).with_type(1))
            .unwrap();
        trie.insert("yi4", Gram::new(&[], "一", -4.0)).unwrap();
        trie.insert("yi4", Gram::new(&[], "意", -5.0).with_previous("留"))
            .unwrap();
        trie
    }

    fn sql(trie: &Trie) -> SqlTrie {
        SqlTrie::from_script(&generate_sql_script(trie)).unwrap()
    }

    #[test]
    fn test_exact_query_matches_trie() {
        let trie = sample();
        let db = sql(&trie);
        let key = keys(&["yi4"]);
        assert_eq!(
            db.query_grams(&key, false, None).unwrap(),
            trie.query_grams(&key, false, None).unwrap()
        );
        assert_eq!(db.query_grams(&key, false, None).unwrap()[1].previous.as_deref(), Some("留"));
    }

    #[test]
    fn test_partial_query_keeps_trie_order() {
        let trie = sample();
        let db = sql(&trie);
        let key = keys(&["liu2"]);
        let values: Vec<String> = db
            .query_grams(&key, true, None)
            .unwrap()
            .into_iter()
            .map(|g| g.value)
            .collect();
        assert_eq!(values, vec!["留", "留意", "流易"]);
        assert_eq!(
            db.query_grams(&key, true, None).unwrap(),
            trie.query_grams(&key, true, None).unwrap()
        );
    }

    #[test]
    fn test_type_filter() {
        let db = sql(&sample());
        let grams = db.query_grams(&keys(&["liu2"]), true, Some(1)).unwrap();
        assert_eq!(grams.len(), 1);
        assert_eq!(grams[0].readings, keys(&["liu2", "yi4"]));
        assert!(!db.has_grams(&keys(&["yi4"]), false, Some(1)).unwrap());
        assert!(db.has_grams(&keys(&["liu2"]), true, Some(1)).unwrap());
        assert!(!db.has_grams(&keys(&["liu2"]), false, Some(1)).unwrap());
    }

    #[test]
    fn test_misses_and_empty_key() {
        let db = sql(&sample());
        assert!(db.query_grams(&keys(&["zzz"]), true, None).unwrap().is_empty());
        assert!(db.query_grams(&keys(&["liu2-yi4"]), false, None).unwrap().is_empty());
        assert!(!db.exists(&keys(&["liu2", ""]), true));
        assert!(matches!(
            db.query_grams(&[], false, None),
            Err(StoreError::Core(CoreError::EmptyKey))
        ));
    }

    #[test]
    fn test_multi_char_separator_does_not_alias() {
        let mut trie = Trie::new("::").unwrap();
        trie.insert("a:::b", Gram::new(&[], "X", -1.0)).unwrap();
        let db = sql(&trie);

        let stored = keys(&["a", ":b"]);
        assert_eq!(db.query_grams(&stored, false, None).unwrap(), trie.query(&stored, false));
        assert_eq!(db.query(&stored, false).len(), 1);

        for probe in [keys(&["a:", "b"]), keys(&["a:::b"]), keys(&["a::", ":b"])] {
            for partial in [false, true] {
                assert!(trie.query(&probe, partial).is_empty());
                assert!(db.query_grams(&probe, partial, None).unwrap().is_empty());
                assert!(!db.has_grams(&probe, partial, None).unwrap());
            }
        }
        assert!(db.exists(&keys(&["a"]), true));
    }

    #[test]
    fn test_malformed_script_is_corrupt_data() {
        for script in ["", "CREATE TABLE config (", "CREATE TABLE config (key TEXT, value TEXT);"] {
            assert!(matches!(
                SqlTrie::from_script(script),
                Err(StoreError::CorruptData(_))
            ));
        }
    }

    #[test]
    fn test_truncated_script_is_rejected() {
        let script = generate_sql_script(&sample());
        let cut = script.find("INSERT INTO keychain_id_map").unwrap();
        let truncated = format!("{}COMMIT;\n", &script[..cut]);
        assert!(matches!(
            SqlTrie::from_script(&truncated),
            Err(StoreError::CorruptData(_))
        ));
    }

    #[test]
    fn test_querier_swallows_errors() {
        let db = sql(&sample());
        db.conn().execute_batch("DROP TABLE entries;").unwrap();
        assert!(db.query(&keys(&["yi4"]), false).is_empty());
        assert!(!db.exists(&keys(&["yi4"]), true));
    }
}
