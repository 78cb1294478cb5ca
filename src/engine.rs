//! The database engine facade.
//!
//! [`Database`] is the surface the SQL layer drives: it owns the
//! directory layout, the toolchain, the loader cache, the page store
//! and the index manager, and it sequences every statement-level
//! operation (insert with split and index rebuild, kernel-driven
//! select, the update and delete rewrite protocols, index DDL).
//!
//! The engine is single-writer and runs every operation to completion
//! on the caller's thread; the filesystem is the only serialization.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::common::{EngineConfig, Error, PageId, Result};
use crate::compile::{ArtifactCompiler, ArtifactLoader, KernelPipeline, KernelSpec};
use crate::index::{IndexDefinition, IndexKey, IndexKind, IndexManager, KeyType};
use crate::schema::{RecordLayout, RecordView, Row, TableSchema};
use crate::storage::{
    Assignment, Cursor, DatabaseLayout, DeleteRewriter, PageStore, UpdateRewriter,
};
use crate::types;

/// A single-node database rooted at one directory.
pub struct Database {
    layout: DatabaseLayout,
    config: EngineConfig,
    loader: Arc<ArtifactLoader>,
    store: PageStore,
    indexes: IndexManager,
    kernels: KernelPipeline,
}

impl Database {
    /// Create the database directory skeleton and open it.
    pub fn create<P: AsRef<Path>>(dir: P, config: EngineConfig) -> Result<Self> {
        let layout = DatabaseLayout::new(dir);
        layout.init()?;
        Ok(Self::assemble(layout, config))
    }

    /// Open an existing database directory.
    ///
    /// # Errors
    /// `NotFound` when the directory has no `tables/` subdirectory.
    pub fn open<P: AsRef<Path>>(dir: P, config: EngineConfig) -> Result<Self> {
        let layout = DatabaseLayout::new(dir);
        if !layout.tables_dir().is_dir() {
            return Err(Error::not_found(
                "database",
                layout.root().display().to_string(),
            ));
        }
        Ok(Self::assemble(layout, config))
    }

    /// Open the directory, creating the skeleton when missing.
    pub fn open_or_create<P: AsRef<Path>>(dir: P, config: EngineConfig) -> Result<Self> {
        let layout = DatabaseLayout::new(&dir);
        if layout.tables_dir().is_dir() {
            Ok(Self::assemble(layout, config))
        } else {
            Self::create(dir, config)
        }
    }

    fn assemble(layout: DatabaseLayout, config: EngineConfig) -> Self {
        let compiler = Arc::new(ArtifactCompiler::new(layout.scripts_dir(), &config));
        let loader = Arc::new(ArtifactLoader::new());
        let store = PageStore::new(
            layout.clone(),
            Arc::clone(&compiler),
            Arc::clone(&loader),
            &config,
        );
        let indexes = IndexManager::new(
            layout.clone(),
            Arc::clone(&compiler),
            Arc::clone(&loader),
        );
        let kernels = KernelPipeline::new(layout.clone(), compiler, Arc::clone(&loader));
        Self {
            layout,
            config,
            loader,
            store,
            indexes,
            kernels,
        }
    }

    pub fn layout(&self) -> &DatabaseLayout {
        &self.layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Table DDL
    // ========================================================================

    /// Create a table: schema document, record header, and a compiled
    /// empty page 0.
    pub fn create_table(&self, schema: &TableSchema) -> Result<()> {
        if self.layout.schema_path(&schema.name).exists() {
            return Err(Error::InvalidArgument(format!(
                "table '{}' already exists",
                schema.name
            )));
        }
        self.layout.init_table(&schema.name)?;
        schema.save(&self.layout.schema_path(&schema.name))?;
        self.store.write_header(schema)?;
        self.store.generate_page(schema, PageId::new(0))?;
        self.store.recompile(schema, PageId::new(0))?;
        self.store.set_row_count(&schema.name, 0)?;
        info!(table = %schema.name, "created table");
        Ok(())
    }

    /// Drop a table: its directory, pages, indices and artifacts.
    pub fn drop_table(&self, table: &str) -> Result<()> {
        self.schema(table)?;
        self.layout.remove_table(table)?;
        info!(table, "dropped table");
        Ok(())
    }

    /// Load a table's schema.
    pub fn schema(&self, table: &str) -> Result<TableSchema> {
        TableSchema::load(&self.layout.schema_path(table))
    }

    /// Names of all tables.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.layout.table_names()
    }

    /// Live record count from the table metadata.
    pub fn row_count(&self, table: &str) -> Result<u64> {
        self.schema(table)?;
        self.store.row_count(table)
    }

    // ========================================================================
    // DML
    // ========================================================================

    /// Insert one record; returns its generated `_uuid`.
    ///
    /// `values` are the textual user-column values in schema order,
    /// `None` for NULL. Primary-key uniqueness is enforced before the
    /// page file is touched; a full tail page splits off an empty
    /// successor; the touched page is recompiled and its index
    /// artifacts rebuilt.
    pub fn insert(&self, table: &str, values: &[Option<String>]) -> Result<String> {
        let schema = self.schema(table)?;
        self.check_primary_key(&schema, values)?;

        let page_count = self.layout.page_count(table)?;
        let mut tail = if page_count == 0 {
            self.store.generate_page(&schema, PageId::new(0))?;
            PageId::new(0)
        } else {
            PageId::new(page_count - 1)
        };
        if self.store.is_full(&schema, tail)? {
            // append-only split: the full page keeps its records
            tail = tail.next();
            self.store.generate_page(&schema, tail)?;
        }

        let uuid = self.store.append(&schema, tail, values)?;
        self.store.recompile(&schema, tail)?;
        self.indexes.rebuild_for_page(&schema, tail)?;
        self.store.adjust_row_count(table, 1)?;
        Ok(uuid)
    }

    /// Delete records matching the kernel (all records when `None`).
    /// Returns the number of rows removed.
    pub fn delete(&self, table: &str, kernel: Option<&KernelSpec>) -> Result<u64> {
        let schema = self.schema(table)?;
        let loaded = kernel
            .map(|spec| self.kernels.build(spec, table, None))
            .transpose()?;

        let rewriter = DeleteRewriter::new(&self.layout, &self.store);
        let outcome = rewriter.run(&schema, loaded.as_ref())?;
        for &page in &outcome.pages_rewritten {
            self.indexes.rebuild_for_page(&schema, page)?;
        }
        Ok(outcome.deleted)
    }

    /// Apply `SET` assignments to records matching the kernel (all
    /// records when `None`). Returns the number of rows rewritten.
    pub fn update(
        &self,
        table: &str,
        kernel: Option<&KernelSpec>,
        assignments: &[Assignment],
    ) -> Result<u64> {
        let schema = self.schema(table)?;
        let loaded = kernel
            .map(|spec| self.kernels.build(spec, table, None))
            .transpose()?;

        let rewriter = UpdateRewriter::new(&self.layout, &self.store);
        let outcome = rewriter.run(&schema, loaded.as_ref(), assignments)?;
        for &page in &outcome.pages_rewritten {
            self.indexes.rebuild_for_page(&schema, page)?;
        }
        Ok(outcome.updated)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// A cursor over the table in insertion order.
    pub fn scan(&self, table: &str) -> Result<Cursor> {
        let schema = self.schema(table)?;
        Cursor::open(self.layout.clone(), Arc::clone(&self.loader), &schema)
    }

    /// Run a kernel over every page (or copy everything when `None`)
    /// and return the matching records as owned rows.
    pub fn select(&self, table: &str, kernel: Option<&KernelSpec>) -> Result<Vec<Row>> {
        let schema = self.schema(table)?;
        let layout = Arc::new(RecordLayout::of(&schema));

        let Some(spec) = kernel else {
            return self.collect_all(&schema, &layout);
        };
        let kernel = self.kernels.build(spec, table, None)?;

        let mut rows = Vec::new();
        let pages = self.layout.page_count(table)?;
        for p in 0..pages {
            let page = self.store.load(table, PageId::new(p))?;
            let count = page.count();
            let Some(data) = page.data_ptr() else {
                continue;
            };
            let mut results = vec![0u8; count * layout.size];
            let matches = kernel.execute(data, count, results.as_mut_ptr(), count)?;
            for i in 0..matches {
                let bytes = results[i * layout.size..(i + 1) * layout.size].to_vec();
                rows.push(Row::new(bytes, Arc::clone(&layout))?);
            }
        }
        Ok(rows)
    }

    /// Exact index lookup: rows whose `column` equals `key_text`.
    ///
    /// Uses whichever index exists on the column (B-tree or hash).
    pub fn lookup_exact(&self, table: &str, column: &str, key_text: &str) -> Result<Vec<Row>> {
        let schema = self.schema(table)?;
        let (_, col) = schema.column_required(column)?;
        let definition = self.index_on(table, column)?;
        let key = IndexKey::from_text(key_text, KeyType::of(col))?;
        self.collect_by_positions(&schema, &definition, |index, max| {
            index.find_exact(&key, max)
        })
    }

    /// Range index lookup over a B-tree index, bounds inclusive and
    /// optional.
    pub fn lookup_range(
        &self,
        table: &str,
        column: &str,
        lo: Option<&str>,
        hi: Option<&str>,
    ) -> Result<Vec<Row>> {
        let schema = self.schema(table)?;
        let (_, col) = schema.column_required(column)?;
        let definition = self.index_on(table, column)?;
        if definition.kind != IndexKind::BTree {
            return Err(Error::InvalidArgument(format!(
                "index '{}' cannot answer range queries",
                definition.name
            )));
        }
        let key_type = KeyType::of(col);
        let lo = lo.map(|t| IndexKey::from_text(t, key_type)).transpose()?;
        let hi = hi.map(|t| IndexKey::from_text(t, key_type)).transpose()?;
        self.collect_by_positions(&schema, &definition, |index, max| {
            index.find_range(lo.as_ref(), hi.as_ref(), max)
        })
    }

    // ========================================================================
    // Index DDL
    // ========================================================================

    pub fn create_index(
        &self,
        table: &str,
        column: &str,
        kind: IndexKind,
    ) -> Result<IndexDefinition> {
        let schema = self.schema(table)?;
        self.indexes.create_index(&schema, column, kind)
    }

    pub fn drop_index(&self, table: &str, name: &str) -> Result<IndexDefinition> {
        self.schema(table)?;
        self.indexes.drop_index(table, name)
    }

    pub fn indexes(&self, table: &str) -> Result<Vec<IndexDefinition>> {
        self.schema(table)?;
        self.indexes.list(table)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn index_on(&self, table: &str, column: &str) -> Result<IndexDefinition> {
        self.indexes
            .list(table)?
            .into_iter()
            .find(|d| d.column == column)
            .ok_or_else(|| Error::not_found("index", format!("{table}.{column}")))
    }

    fn collect_all(&self, schema: &TableSchema, layout: &Arc<RecordLayout>) -> Result<Vec<Row>> {
        let mut cursor = Cursor::open(self.layout.clone(), Arc::clone(&self.loader), schema)?;
        let mut rows = Vec::new();
        while let Some(record) = cursor.current()? {
            rows.push(Row::new(record.raw().to_vec(), Arc::clone(layout))?);
            cursor.next()?;
        }
        Ok(rows)
    }

    /// Consult a per-page index for positions, then read those records
    /// out of the loaded page.
    fn collect_by_positions<F>(
        &self,
        schema: &TableSchema,
        definition: &IndexDefinition,
        mut find: F,
    ) -> Result<Vec<Row>>
    where
        F: FnMut(&crate::index::LoadedIndex, usize) -> Result<Vec<u32>>,
    {
        let layout = Arc::new(RecordLayout::of(schema));
        let mut rows = Vec::new();
        let pages = self.layout.page_count(&schema.name)?;
        for p in 0..pages {
            let page_id = PageId::new(p);
            let page = self.store.load(&schema.name, page_id)?;
            if page.count() == 0 {
                continue;
            }
            let index =
                self.indexes
                    .load_for_page(&schema.name, &definition.column, definition.kind, page_id)?;
            for position in find(&index, page.count())? {
                let ptr = page.record_ptr(position as usize)?;
                let view = unsafe { RecordView::from_ptr(ptr, &layout) };
                rows.push(Row::new(view.raw().to_vec(), Arc::clone(&layout))?);
            }
        }
        Ok(rows)
    }

    /// Reject a duplicate primary key before any file is touched.
    ///
    /// Probes the primary-key index when one exists; otherwise falls
    /// back to a full scan comparing the key columns.
    fn check_primary_key(&self, schema: &TableSchema, values: &[Option<String>]) -> Result<()> {
        if schema.primary_key.is_empty() {
            return Ok(());
        }
        let user_columns = schema.user_columns();
        if values.len() != user_columns.len() {
            return Err(Error::InvalidArgument(format!(
                "table '{}' has {} columns, got {} values",
                schema.name,
                user_columns.len(),
                values.len()
            )));
        }

        // textual key values, defaults applied
        let mut key_texts = Vec::with_capacity(schema.primary_key.len());
        for &pk in &schema.primary_key {
            let col = &schema.columns[pk];
            let value = values[pk].as_deref().or(col.default_value.as_deref());
            match value {
                Some(text) => key_texts.push((col, text)),
                None => {
                    return Err(Error::Validation(format!(
                        "primary key column '{}' of table '{}' cannot be NULL",
                        col.name, schema.name
                    )))
                }
            }
        }

        // fast path: single-column key with an index on it
        if let [(col, text)] = key_texts.as_slice() {
            if let Some(definition) = self
                .indexes
                .list(&schema.name)?
                .into_iter()
                .find(|d| d.column == col.name && d.unique)
            {
                let key = IndexKey::from_text(text, KeyType::of(col))?;
                let pages = self.layout.page_count(&schema.name)?;
                for p in 0..pages {
                    let index = self.indexes.load_for_page(
                        &schema.name,
                        &definition.column,
                        definition.kind,
                        PageId::new(p),
                    )?;
                    if !index.find_exact(&key, 1)?.is_empty() {
                        return Err(Error::Validation(format!(
                            "duplicate primary key '{text}' in table '{}'",
                            schema.name
                        )));
                    }
                }
                return Ok(());
            }
        }

        // slow path: scan and compare every key column
        let parsed: Vec<(&str, Vec<u8>)> = key_texts
            .iter()
            .map(|(col, text)| {
                types::parse(text, col.data_type, col.length)
                    .map(|bytes| (col.name.as_str(), bytes))
            })
            .collect::<Result<_>>()?;

        let mut cursor = Cursor::open(self.layout.clone(), Arc::clone(&self.loader), schema)?;
        while let Some(record) = cursor.current()? {
            let mut all_equal = true;
            for (name, bytes) in &parsed {
                let field = record.field_bytes(name)?;
                let data_type = schema.column_required(name)?.1.data_type;
                if types::compare(field, bytes, data_type)? != std::cmp::Ordering::Equal {
                    all_equal = false;
                    break;
                }
            }
            if all_equal {
                return Err(Error::Validation(format!(
                    "duplicate primary key in table '{}'",
                    schema.name
                )));
            }
            cursor.next()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::types::DataType;
    use tempfile::tempdir;

    fn customers_schema() -> TableSchema {
        TableSchema::new(
            "Customers",
            vec![
                Column::new("id", DataType::Int).primary_key(),
                Column::new("name", DataType::Varchar).with_length(100),
                Column::new("active", DataType::Boolean).with_default("true"),
            ],
        )
        .unwrap()
    }

    fn db(dir: &std::path::Path) -> Database {
        Database::create(dir, EngineConfig::default()).unwrap()
    }

    fn row(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_create_table_materializes_page_zero() {
        let dir = tempdir().unwrap();
        let db = db(dir.path());
        db.create_table(&customers_schema()).unwrap();

        assert!(db.layout().schema_path("Customers").exists());
        assert!(db.layout().table_header("Customers").exists());
        assert!(db.layout().page_object("Customers", PageId::new(0)).exists());
        assert_eq!(db.row_count("Customers").unwrap(), 0);
        assert_eq!(db.table_names().unwrap(), vec!["Customers".to_string()]);

        // twice is an error
        assert!(db.create_table(&customers_schema()).is_err());
    }

    #[test]
    fn test_insert_and_scan() {
        let dir = tempdir().unwrap();
        let db = db(dir.path());
        db.create_table(&customers_schema()).unwrap();

        for (id, name) in [("1", "ann"), ("2", "bob")] {
            db.insert("Customers", &row(&[Some(id), Some(name), None]))
                .unwrap();
        }
        assert_eq!(db.row_count("Customers").unwrap(), 2);

        let mut cursor = db.scan("Customers").unwrap();
        let mut seen = Vec::new();
        while let Some(record) = cursor.current().unwrap() {
            seen.push((
                record.get_int("id").unwrap(),
                record.get_str("name").unwrap().to_string(),
                record.get_bool("active").unwrap(),
            ));
            cursor.next().unwrap();
        }
        assert_eq!(seen, vec![(1, "ann".into(), true), (2, "bob".into(), true)]);
    }

    #[test]
    fn test_insert_splits_full_page() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            max_records_per_page: 2,
            ..EngineConfig::default()
        };
        let db = Database::create(dir.path(), config).unwrap();
        db.create_table(&customers_schema()).unwrap();

        for id in 1..=5 {
            db.insert(
                "Customers",
                &row(&[Some(&id.to_string()), Some("x"), None]),
            )
            .unwrap();
        }
        // 2 + 2 + 1 across three pages
        assert_eq!(db.layout().page_count("Customers").unwrap(), 3);

        let rows = db.select("Customers", None).unwrap();
        let ids: Vec<i32> = rows
            .iter()
            .map(|r| r.view().get_int("id").unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_duplicate_primary_key_without_index() {
        let dir = tempdir().unwrap();
        let db = db(dir.path());
        db.create_table(&customers_schema()).unwrap();

        db.insert("Customers", &row(&[Some("1"), Some("ann"), None]))
            .unwrap();
        let err = db
            .insert("Customers", &row(&[Some("1"), Some("imposter"), None]))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(db.row_count("Customers").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_primary_key_with_index() {
        let dir = tempdir().unwrap();
        let db = db(dir.path());
        db.create_table(&customers_schema()).unwrap();
        db.create_index("Customers", "id", IndexKind::BTree).unwrap();

        db.insert("Customers", &row(&[Some("5"), Some("ann"), None]))
            .unwrap();
        let err = db
            .insert("Customers", &row(&[Some("5"), Some("imposter"), None]))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // a different key is fine
        db.insert("Customers", &row(&[Some("6"), Some("bob"), None]))
            .unwrap();
    }

    #[test]
    fn test_null_primary_key_rejected() {
        let dir = tempdir().unwrap();
        let db = db(dir.path());
        db.create_table(&customers_schema()).unwrap();
        let err = db
            .insert("Customers", &row(&[None, Some("ann"), None]))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_unknown_table_is_not_found() {
        let dir = tempdir().unwrap();
        let db = db(dir.path());
        assert!(matches!(
            db.insert("Ghosts", &[]).unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            db.scan("Ghosts").unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[test]
    fn test_drop_table_removes_everything() {
        let dir = tempdir().unwrap();
        let db = db(dir.path());
        db.create_table(&customers_schema()).unwrap();
        db.insert("Customers", &row(&[Some("1"), Some("ann"), None]))
            .unwrap();

        db.drop_table("Customers").unwrap();
        assert!(db.table_names().unwrap().is_empty());
        assert!(matches!(
            db.schema("Customers").unwrap_err(),
            Error::NotFound { .. }
        ));
        assert_eq!(db.layout().page_count("Customers").unwrap(), 0);
    }
}
