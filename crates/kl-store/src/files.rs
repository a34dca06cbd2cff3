use std::fs;
use std::io::Write;
use std::path::Path;

use rusqlite::Connection;
use tempfile::NamedTempFile;

use kl_core::{Gram, GramQuerier, Trie, deserialize, parse_dictionary, serialize};

use crate::error::{Result, StoreError};
use crate::schema::{DictionaryInfo, generate_sql_script};
use crate::sql_trie::SqlTrie;

/// Temp file next to `path`, so the final rename stays on one filesystem.
fn sibling_temp(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    Ok(NamedTempFile::new_in(dir)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = sibling_temp(path)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_binary(trie: &Trie, path: &Path) -> Result<()> {
    let bytes = serialize(trie)?;
    write_atomic(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote binary dictionary");
    Ok(())
}

pub fn read_binary(path: &Path) -> Result<Trie> {
    let bytes = fs::read(path)?;
    Ok(deserialize(&bytes)?)
}

pub fn write_sql_script(trie: &Trie, path: &Path) -> Result<()> {
    let script = generate_sql_script(trie);
    write_atomic(path, script.as_bytes())?;
    tracing::info!(path = %path.display(), "wrote SQL dictionary script");
    Ok(())
}

/// Materialize the generated script into an SQLite database file,
/// replacing whatever was at `path`.
pub fn write_database(trie: &Trie, path: &Path) -> Result<()> {
    let script = generate_sql_script(trie);
    let tmp = sibling_temp(path)?;
    let conn = Connection::open(tmp.path())?;
    conn.execute_batch(&script)?;
    conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
    tmp.persist(path).map_err(|e| e.error)?;
    tracing::info!(path = %path.display(), entries = trie.entry_count(), "wrote SQL dictionary database");
    Ok(())
}

/// A dictionary loaded from disk, backed by whichever encoding the file holds.
pub enum Dictionary {
    Memory(Trie),
    Sql(SqlTrie),
}

impl Dictionary {
    /// Pick the backend from the extension: `.bin` is the binary blob,
    /// `.sql` a generated script, `.db`/`.sqlite` a database file; anything
    /// else is parsed as a text dictionary using `separator`.
    pub fn open(path: &Path, separator: &str) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let dictionary = match ext.as_deref() {
            Some("bin") => Dictionary::Memory(read_binary(path)?),
            Some("sql") => Dictionary::Sql(SqlTrie::from_script(&fs::read_to_string(path)?)?),
            Some("db" | "sqlite") => Dictionary::Sql(SqlTrie::open(path)?),
            _ => Dictionary::Memory(parse_dictionary(&fs::read_to_string(path)?, separator)?),
        };
        tracing::debug!(path = %path.display(), backend = dictionary.backend(), "loaded dictionary");
        Ok(dictionary)
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Dictionary::Memory(_) => "memory",
            Dictionary::Sql(_) => "sql",
        }
    }

    pub fn separator(&self) -> &str {
        match self {
            Dictionary::Memory(trie) => trie.separator(),
            Dictionary::Sql(db) => db.separator(),
        }
    }

    pub fn info(&self) -> DictionaryInfo {
        match self {
            Dictionary::Memory(trie) => DictionaryInfo {
                separator: trie.separator().to_string(),
                entry_count: trie.entry_count(),
                node_count: trie.node_count(),
                vocabulary_size: trie.vocabulary().len(),
            },
            Dictionary::Sql(db) => db.info().clone(),
        }
    }

    pub fn query_grams(
        &self,
        readings: &[String],
        partially_match: bool,
        filter_type: Option<u32>,
    ) -> Result<Vec<Gram>> {
        match self {
            Dictionary::Memory(trie) => Ok(trie.query_grams(readings, partially_match, filter_type)?),
            Dictionary::Sql(db) => db.query_grams(readings, partially_match, filter_type),
        }
    }
}

impl GramQuerier for Dictionary {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        match self {
            Dictionary::Memory(trie) => trie.query(readings, partially_match),
            Dictionary::Sql(db) => db.query(readings, partially_match),
        }
    }

    fn exists(&self, readings: &[String], partially_match: bool) -> bool {
        match self {
            Dictionary::Memory(trie) => trie.exists(readings, partially_match),
            Dictionary::Sql(db) => db.exists(readings, partially_match),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Trie {
        let mut trie = Trie::new("-").unwrap();
        trie.insert("lv3", Gram::new(&[], "呂", -4.0)).unwrap();
        trie.insert("lv3-fang1", Gram::new(&[], "呂方", -3.0)).unwrap();
        trie
    }

    fn keys(readings: &[&str]) -> Vec<String> {
        readings.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_every_encoding_reopens() {
        let dir = TempDir::new().unwrap();
        let trie = sample();
        write_binary(&trie, &dir.path().join("d.bin")).unwrap();
        write_sql_script(&trie, &dir.path().join("d.sql")).unwrap();
        write_database(&trie, &dir.path().join("d.db")).unwrap();

        let probe = keys(&["lv3"]);
        let expected = trie.query_grams(&probe, true, None).unwrap();
        for name in ["d.bin", "d.sql", "d.db"] {
            let dict = Dictionary::open(&dir.path().join(name), "-").unwrap();
            assert_eq!(dict.query_grams(&probe, true, None).unwrap(), expected, "{name}");
            assert_eq!(dict.info().entry_count, 2, "{name}");
        }
    }

    #[test]
    fn test_write_database_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("d.db");
        write_database(&sample(), &path).unwrap();
        let mut bigger = sample();
        bigger.insert("fang1", Gram::new(&[], "方", -4.0)).unwrap();
        write_database(&bigger, &path).unwrap();
        assert_eq!(SqlTrie::open(&path).unwrap().info().entry_count, 3);
    }

    #[test]
    fn test_text_dictionary_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, "lv3\t呂\t-4\nlv3_fang1\t呂方\t-3\n").unwrap();
        let dict = Dictionary::open(&path, "_").unwrap();
        assert_eq!(dict.backend(), "memory");
        assert_eq!(dict.separator(), "_");
        assert_eq!(dict.query(&keys(&["lv3", "fang1"]), false).len(), 1);
    }

    #[test]
    fn test_corrupt_binary_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.bin");
        fs::write(&path, b"not a dictionary").unwrap();
        assert!(matches!(
            Dictionary::open(&path, "-"),
            Err(StoreError::Core(kl_core::CoreError::CorruptData(_)))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_binary(&dir.path().join("absent.bin")),
            Err(StoreError::Io(_))
        ));
    }
}
