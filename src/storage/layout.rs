//! Directory layout - deterministic paths for every generated artifact.
//!
//! A database is one directory:
//! ```text
//! {db}/tables/{T}/{T}.h                  record struct header
//! {db}/tables/{T}/metadata/schema.json   schema document
//! {db}/tables/{T}/metadata/indices.dat   packed index definitions
//! {db}/tables/{T}/metadata/rowcount.dat  live record count
//! {db}/tables/{T}/data/{T}Data.{p}.dat.h textual record lines
//! {db}/tables/{T}/src/{T}Data_{p}.c      page source
//! {db}/compiled/{T}Data_{p}.so           compiled page
//! {db}/compiled/{T}_{kind}_index_{c}_{p}.so  compiled index page
//! {db}/kernels/{symbol}_{T}[_{p}].c      kernel sources
//! {db}/scripts/                          emitted build scripts
//! {db}/permissions/                      reserved
//! ```
//!
//! The layout is compatibility-significant: older databases must keep
//! resolving to the same paths and symbol names.

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{PageId, Result};

/// Path oracle for one database directory.
#[derive(Debug, Clone)]
pub struct DatabaseLayout {
    root: PathBuf,
}

impl DatabaseLayout {
    /// Wrap a database root. No filesystem access.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create the database directory skeleton if missing.
    pub fn init(&self) -> Result<()> {
        for dir in [
            self.tables_dir(),
            self.compiled_dir(),
            self.scripts_dir(),
            self.kernels_dir(),
            self.permissions_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Create the per-table subdirectories.
    pub fn init_table(&self, table: &str) -> Result<()> {
        for dir in [
            self.metadata_dir(table),
            self.data_dir(table),
            self.src_dir(table),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.root.join("tables")
    }

    pub fn compiled_dir(&self) -> PathBuf {
        self.root.join("compiled")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn kernels_dir(&self) -> PathBuf {
        self.root.join("kernels")
    }

    pub fn permissions_dir(&self) -> PathBuf {
        self.root.join("permissions")
    }

    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.tables_dir().join(table)
    }

    pub fn metadata_dir(&self, table: &str) -> PathBuf {
        self.table_dir(table).join("metadata")
    }

    pub fn data_dir(&self, table: &str) -> PathBuf {
        self.table_dir(table).join("data")
    }

    pub fn src_dir(&self, table: &str) -> PathBuf {
        self.table_dir(table).join("src")
    }

    /// `tables/{T}/{T}.h` - the generated record struct header.
    pub fn table_header(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(format!("{table}.h"))
    }

    pub fn schema_path(&self, table: &str) -> PathBuf {
        self.metadata_dir(table).join("schema.json")
    }

    pub fn indices_path(&self, table: &str) -> PathBuf {
        self.metadata_dir(table).join("indices.dat")
    }

    pub fn rowcount_path(&self, table: &str) -> PathBuf {
        self.metadata_dir(table).join("rowcount.dat")
    }

    /// `tables/{T}/data/{T}Data.{p}.dat.h` - one record per line.
    pub fn page_data(&self, table: &str, page: PageId) -> PathBuf {
        self.data_dir(table)
            .join(format!("{table}Data.{}.dat.h", page.0))
    }

    /// `tables/{T}/src/{T}Data_{p}.c` - includes the data file.
    pub fn page_source(&self, table: &str, page: PageId) -> PathBuf {
        self.src_dir(table).join(format!("{table}Data_{}.c", page.0))
    }

    /// `compiled/{T}Data_{p}.so` - the loadable page.
    pub fn page_object(&self, table: &str, page: PageId) -> PathBuf {
        self.compiled_dir().join(format!("{table}Data_{}.so", page.0))
    }

    /// `compiled/{T}_{kind}_index_{col}_{p}.so` - a compiled index page.
    ///
    /// `kind` is the lowercase artifact tag, `"btree"` or `"hash"`.
    pub fn index_object(&self, table: &str, kind: &str, column: &str, page: PageId) -> PathBuf {
        self.compiled_dir()
            .join(format!("{table}_{kind}_index_{column}_{}.so", page.0))
    }

    /// `tables/{T}/src/{T}_{kind}_index_{col}_{p}.c` - a serialized index.
    pub fn index_source(&self, table: &str, kind: &str, column: &str, page: PageId) -> PathBuf {
        self.src_dir(table)
            .join(format!("{table}_{kind}_index_{column}_{}.c", page.0))
    }

    /// `kernels/{symbol}_{T}[_{p}].c` - a kernel source blob.
    pub fn kernel_source(&self, symbol: &str, table: &str, page: Option<PageId>) -> PathBuf {
        self.kernels_dir().join(kernel_stem(symbol, table, page) + ".c")
    }

    /// `compiled/{symbol}_{T}[_{p}].so` - the loadable kernel.
    pub fn kernel_object(&self, symbol: &str, table: &str, page: Option<PageId>) -> PathBuf {
        self.compiled_dir().join(kernel_stem(symbol, table, page) + ".so")
    }

    /// Number of pages a table has, derived from the compiled artifacts.
    ///
    /// Pages are numbered densely, so the count is the highest compiled
    /// page number plus one. A table with no compiled pages has zero.
    pub fn page_count(&self, table: &str) -> Result<u32> {
        let prefix = format!("{table}Data_");
        let dir = self.compiled_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut max: Option<u32> = None;
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix(&prefix).and_then(|s| s.strip_suffix(".so")) {
                if let Ok(p) = rest.parse::<u32>() {
                    max = Some(max.map_or(p, |m: u32| m.max(p)));
                }
            }
        }
        Ok(max.map_or(0, |m| m + 1))
    }

    /// Every table with a directory under `tables/`.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let dir = self.tables_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a table's directory and all of its compiled artifacts.
    pub fn remove_table(&self, table: &str) -> Result<()> {
        let dir = self.table_dir(table);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        let page_prefix = format!("{table}Data_");
        let index_prefix = format!("{table}_");
        for entry in fs::read_dir(self.compiled_dir())? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            if name.starts_with(&page_prefix) || name.starts_with(&index_prefix) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

fn kernel_stem(symbol: &str, table: &str, page: Option<PageId>) -> String {
    match page {
        Some(p) => format!("{symbol}_{table}_{}", p.0),
        None => format!("{symbol}_{table}"),
    }
}
