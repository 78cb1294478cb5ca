//! Page store - the textual record files behind every table page.
//!
//! A page is a `.dat.h` file of C initializer lines, one record per
//! line, wrapped by a generated source file and compiled to a shared
//! object exposing `count`/`read`. The store mutates only the text
//! file; [`Self::recompile`] re-materializes the loadable artifact and
//! drops any cached handle to the old one.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::common::{EngineConfig, Error, PageId, Result};
use crate::compile::{ArtifactCompiler, ArtifactLoader, LoadedPage};
use crate::schema::TableSchema;
use crate::storage::codegen;
use crate::storage::DatabaseLayout;

/// Creates, appends to, and recompiles table pages.
pub struct PageStore {
    layout: DatabaseLayout,
    compiler: Arc<ArtifactCompiler>,
    loader: Arc<ArtifactLoader>,
    max_records_per_page: usize,
}

impl PageStore {
    pub fn new(
        layout: DatabaseLayout,
        compiler: Arc<ArtifactCompiler>,
        loader: Arc<ArtifactLoader>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            layout,
            compiler,
            loader,
            max_records_per_page: config.max_records_per_page,
        }
    }

    /// Records a page may hold before the next insert splits.
    pub fn max_records_per_page(&self) -> usize {
        self.max_records_per_page
    }

    /// Write the record struct header for a table.
    pub fn write_header(&self, schema: &TableSchema) -> Result<()> {
        fs::write(
            self.layout.table_header(&schema.name),
            codegen::render_header(schema),
        )?;
        Ok(())
    }

    /// Create a new, empty page: banner-only data file plus source.
    ///
    /// # Errors
    /// `InvalidArgument` if the page's data file already exists.
    pub fn generate_page(&self, schema: &TableSchema, page: PageId) -> Result<()> {
        self.layout.init_table(&schema.name)?;
        let data_path = self.layout.page_data(&schema.name, page);
        if data_path.exists() {
            return Err(Error::InvalidArgument(format!(
                "page {page} of table '{}' already exists",
                schema.name
            )));
        }
        fs::write(&data_path, codegen::data_file_banner(&schema.name, page))?;
        fs::write(
            self.layout.page_source(&schema.name, page),
            codegen::render_page_source(schema, page),
        )?;
        debug!(table = %schema.name, %page, "generated empty page");
        Ok(())
    }

    /// Append one record line and return its generated `_uuid`.
    ///
    /// `values` are the textual user-column values in schema order;
    /// `None` is NULL and falls back to the column default, then to the
    /// type's zero literal. The page artifact is stale until
    /// [`Self::recompile`] runs.
    pub fn append(
        &self,
        schema: &TableSchema,
        page: PageId,
        values: &[Option<String>],
    ) -> Result<String> {
        let user_columns = schema.user_columns();
        if values.len() != user_columns.len() {
            return Err(Error::InvalidArgument(format!(
                "table '{}' has {} columns, got {} values",
                schema.name,
                user_columns.len(),
                values.len()
            )));
        }

        let mut effective: Vec<Option<&str>> = Vec::with_capacity(schema.columns.len());
        for (col, value) in user_columns.iter().zip(values) {
            let value = value.as_deref().or(col.default_value.as_deref());
            if value.is_none() && !col.nullable {
                return Err(Error::Validation(format!(
                    "column '{}' of table '{}' is not nullable",
                    col.name, schema.name
                )));
            }
            effective.push(value);
        }
        let uuid = Uuid::new_v4().to_string();
        effective.push(Some(&uuid));

        let line = codegen::render_record_line(schema, &effective)?;

        let data_path = self.layout.page_data(&schema.name, page);
        if !data_path.exists() {
            return Err(Error::not_found(
                "page",
                format!("{}.{page}", schema.name),
            ));
        }
        let mut file = OpenOptions::new().append(true).open(&data_path)?;
        file.write_all(line.as_bytes())?;
        debug!(table = %schema.name, %page, %uuid, "appended record");
        Ok(uuid)
    }

    /// Number of record lines currently in the page's data file.
    pub fn record_count(&self, schema: &TableSchema, page: PageId) -> Result<usize> {
        let data_path = self.layout.page_data(&schema.name, page);
        let text = fs::read_to_string(&data_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found("page", format!("{}.{page}", schema.name))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(count_record_lines(&text))
    }

    /// Whether the page is at (or beyond) its record capacity.
    pub fn is_full(&self, schema: &TableSchema, page: PageId) -> Result<bool> {
        Ok(self.record_count(schema, page)? >= self.max_records_per_page)
    }

    /// Rebuild the page's shared object from its current data file.
    ///
    /// Invalidates the loader's cached handle so the next load maps the
    /// fresh artifact.
    pub fn recompile(&self, schema: &TableSchema, page: PageId) -> Result<()> {
        let source = self.layout.page_source(&schema.name, page);
        let object = self.layout.page_object(&schema.name, page);
        self.loader.invalidate(&object);
        let includes: Vec<PathBuf> = vec![self.layout.table_dir(&schema.name)];
        self.compiler.compile(&source, &object, &includes)?;
        debug!(table = %schema.name, %page, "recompiled page");
        Ok(())
    }

    /// Load the compiled artifact for a page.
    pub fn load(&self, table: &str, page: PageId) -> Result<LoadedPage> {
        LoadedPage::open(&self.loader, &self.layout.page_object(table, page))
    }

    // ========================================================================
    // Row-count metadata
    // ========================================================================

    /// The table's live record count from `metadata/rowcount.dat`.
    pub fn row_count(&self, table: &str) -> Result<u64> {
        let path = self.layout.rowcount_path(table);
        if !path.exists() {
            return Ok(0);
        }
        let text = fs::read_to_string(&path)?;
        text.trim()
            .parse()
            .map_err(|_| Error::Parse(format!("rowcount.dat of '{table}' holds '{}'", text.trim())))
    }

    pub fn set_row_count(&self, table: &str, count: u64) -> Result<()> {
        fs::write(self.layout.rowcount_path(table), count.to_string())?;
        Ok(())
    }

    /// Apply a signed delta to the row count, saturating at zero.
    pub fn adjust_row_count(&self, table: &str, delta: i64) -> Result<u64> {
        let current = self.row_count(table)? as i64;
        let next = (current + delta).max(0) as u64;
        self.set_row_count(table, next)?;
        Ok(next)
    }
}

/// Count the `},`-terminated record lines in a data file.
pub(crate) fn count_record_lines(text: &str) -> usize {
    text.lines()
        .filter(|line| line.trim_end().ends_with("},"))
        .count()
}
