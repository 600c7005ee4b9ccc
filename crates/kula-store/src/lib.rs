//! Kula Store - Record stores for candidate and annotated tables
//!
//! Provides two implementations of `kula_core::RecordStore`:
//! - `CsvRecordStore` reads and writes CSV files under a root directory
//! - `MemoryRecordStore` keeps tables in memory, for tests and embedding
//!
//! Both use overwrite semantics: a save always replaces the destination with
//! the full table, and an empty table still writes its header.

pub mod csv_store;
pub mod memory;

pub use csv_store::CsvRecordStore;
pub use memory::MemoryRecordStore;

/// File extension used for tabular files
pub const CSV_EXTENSION: &str = "csv";

/// Append the `.csv` extension unless the name already carries it
pub fn with_csv_extension(name: &str) -> String {
    let has_ext = std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION))
        .unwrap_or(false);

    if has_ext {
        name.to_string()
    } else {
        format!("{name}.{CSV_EXTENSION}")
    }
}
