//! CSV-backed record store
//!
//! Ids are file names relative to the store root (absolute paths are used
//! as-is). Every cell is read as a string; writes go through a temporary
//! sibling file that is renamed over the destination.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use kula_core::{KulaError, RecordStore, Result, Table};

use crate::{with_csv_extension, CSV_EXTENSION};

/// Record store over a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    root: PathBuf,
}

impl CsvRecordStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an id onto a file path
    pub fn resolve(&self, id: &str) -> PathBuf {
        let name = with_csv_extension(id);
        let path = Path::new(&name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Check whether an id exists
    pub fn exists(&self, id: &str) -> bool {
        self.resolve(id).is_file()
    }

    /// Names of the CSV files in the root, sorted
    ///
    /// A missing root yields an empty list.
    pub fn list_candidates(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(anyhow::Error::from(e).into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(anyhow::Error::from)?.path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION))
                .unwrap_or(false);
            if !is_csv || !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_table(path: &Path, source_id: &str) -> Result<Table> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => KulaError::StoreNotFound(path.display().to_string()),
            _ => KulaError::schema(source_id, e.to_string()),
        })?;

        let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| KulaError::schema(source_id, e.to_string()))?
            .iter()
            .map(String::from)
            .collect();

        let mut table = Table::new(headers);
        for (line, result) in reader.records().enumerate() {
            let record = result.map_err(|e| KulaError::schema(source_id, e.to_string()))?;
            if record.len() > table.headers.len() {
                return Err(KulaError::schema(
                    source_id,
                    format!(
                        "row {} has {} cells but the header has {}",
                        line + 1,
                        record.len(),
                        table.headers.len()
                    ),
                ));
            }
            table.add_row(record.iter().map(String::from).collect());
        }

        Ok(table)
    }

    fn write_table(table: &Table, path: &Path) -> std::result::Result<(), anyhow::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        replace_file(path, |tmp_path| {
            let mut writer = WriterBuilder::new().flexible(true).from_path(tmp_path)?;
            if !table.headers.is_empty() {
                writer.write_record(&table.headers)?;
            }
            for row in &table.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
            Ok(())
        })
    }
}

/// Write `path` through a sibling `.tmp` file that is renamed over it
///
/// The temporary file is removed whenever `write` or the rename fails, and
/// the previous contents of `path` are left untouched.
fn replace_file<F>(path: &Path, write: F) -> std::result::Result<(), anyhow::Error>
where
    F: FnOnce(&Path) -> std::result::Result<(), anyhow::Error>,
{
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = write(&tmp_path).and_then(|()| Ok(fs::rename(&tmp_path, path)?));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

impl RecordStore for CsvRecordStore {
    fn load(&self, source_id: &str) -> Result<Table> {
        let path = self.resolve(source_id);
        if !path.is_file() {
            return Err(KulaError::StoreNotFound(path.display().to_string()));
        }

        let table = Self::read_table(&path, source_id)?;
        tracing::debug!(
            "Loaded {} rows ({} columns) from {}",
            table.num_rows(),
            table.headers.len(),
            path.display()
        );
        Ok(table)
    }

    fn save(&self, table: &Table, destination_id: &str) -> Result<()> {
        let path = self.resolve(destination_id);
        Self::write_table(table, &path)
            .map_err(|e| KulaError::write_failed(path.display().to_string(), e))?;

        tracing::debug!("Wrote {} rows to {}", table.num_rows(), path.display());
        Ok(())
    }

    fn name(&self) -> &str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kula_core::Record;

    fn store() -> (tempfile::TempDir, CsvRecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRecordStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_load_missing_file() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load("nope.csv"),
            Err(KulaError::StoreNotFound(_))
        ));
    }

    #[test]
    fn test_load_coerces_cells_to_strings() {
        let (dir, store) = store();
        fs::write(
            dir.path().join("candidates.csv"),
            "sentence,entity1,score\n\"Alice, from Acme.\",Alice,0.93\nBob left.,,\n",
        )
        .unwrap();

        let table = store.load("candidates").unwrap();
        assert_eq!(table.headers, vec!["sentence", "entity1", "score"]);
        assert_eq!(table.rows[0][0], "Alice, from Acme.");
        assert_eq!(table.rows[0][2], "0.93");

        let records = table.to_records("candidates").unwrap();
        assert_eq!(records[1], Record::new("Bob left."));
    }

    #[test]
    fn test_load_rejects_long_rows() {
        let (dir, store) = store();
        fs::write(dir.path().join("bad.csv"), "sentence\na,b\n").unwrap();

        assert!(matches!(
            store.load("bad.csv"),
            Err(KulaError::SchemaError { .. })
        ));
    }

    #[test]
    fn test_load_rejects_invalid_utf8() {
        let (dir, store) = store();
        fs::write(dir.path().join("latin1.csv"), b"sentence\ncaf\xe9\n").unwrap();

        assert!(matches!(
            store.load("latin1.csv"),
            Err(KulaError::SchemaError { .. })
        ));
    }

    #[test]
    fn test_save_overwrites() {
        let (_dir, store) = store();
        let first = Table::from_records([&Record::new("one"), &Record::new("two")]);
        let second = Table::from_records([&Record::new("three")]);

        store.save(&first, "out.csv").unwrap();
        store.save(&second, "out.csv").unwrap();

        let loaded = store.load("out.csv").unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn test_save_empty_writes_header_only() {
        let (dir, store) = store();
        let empty = Table::from_records(std::iter::empty::<&Record>());

        store.save(&empty, "nested/empty.csv").unwrap();

        let content = fs::read_to_string(dir.path().join("nested/empty.csv")).unwrap();
        assert_eq!(
            content,
            "sentence,entity1,entity1_label,entity2,entity2_label,relation\n"
        );
        assert!(store.load("nested/empty").unwrap().is_empty());
    }

    #[test]
    fn test_save_to_unwritable_destination() {
        let (dir, store) = store();
        // A directory squatting on the destination name makes the rename fail
        fs::create_dir_all(dir.path().join("taken.csv")).unwrap();

        let table = Table::from_records([&Record::new("x")]);
        assert!(matches!(
            store.save(&table, "taken.csv"),
            Err(KulaError::StoreWriteFailed { .. })
        ));
        assert!(!dir.path().join("taken.csv.tmp").exists());
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let (dir, _store) = store();
        let path = dir.path().join("out.csv");
        fs::write(&path, "sentence\nkept\n").unwrap();

        let result = replace_file(&path, |tmp_path| {
            fs::write(tmp_path, "sentence\npartial")?;
            anyhow::bail!("disk full")
        });

        assert!(result.is_err());
        assert!(!dir.path().join("out.csv.tmp").exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "sentence\nkept\n");
    }

    #[test]
    fn test_list_candidates() {
        let (dir, store) = store();
        fs::write(dir.path().join("b.csv"), "sentence\n").unwrap();
        fs::write(dir.path().join("a.csv"), "sentence\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list_candidates().unwrap(), vec!["a.csv", "b.csv"]);
        assert!(CsvRecordStore::new(dir.path().join("missing"))
            .list_candidates()
            .unwrap()
            .is_empty());
    }
}
