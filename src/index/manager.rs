//! Index manager - the per-table index registry and its lifecycle.
//!
//! Definitions persist in `tables/{T}/metadata/indices.dat` as a packed
//! array (host endianness, fixed-size records) for compatibility with
//! databases written by older builds. Every index is materialized per
//! page: built from that page's records, serialized to C, compiled, and
//! loaded on demand. A page recompile triggers a rebuild of all of its
//! index artifacts.

use std::fs;
use std::os::raw::{c_int, c_void};
use std::path::PathBuf;
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info};

use crate::common::{Error, PageId, Result};
use crate::compile::{ArtifactCompiler, ArtifactLoader, LoadedPage};
use crate::index::btree::BTreeIndex;
use crate::index::hash::HashIndex;
use crate::index::key::{IndexKey, KeyType};
use crate::schema::{Column, RecordLayout, RecordView, TableSchema};
use crate::storage::DatabaseLayout;

/// The two index shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Hash,
}

impl IndexKind {
    /// The lowercase tag used in artifact file names.
    pub fn artifact_tag(&self) -> &'static str {
        match self {
            IndexKind::BTree => "btree",
            IndexKind::Hash => "hash",
        }
    }

    /// The integer code stored in `indices.dat`.
    pub fn code(&self) -> i32 {
        match self {
            IndexKind::BTree => 0,
            IndexKind::Hash => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(IndexKind::BTree),
            1 => Ok(IndexKind::Hash),
            other => Err(Error::Parse(format!("unknown index kind code {other}"))),
        }
    }
}

/// One persisted index definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub table: String,
    pub column: String,
    /// Always `idx_{table}_{column}`.
    pub name: String,
    pub kind: IndexKind,
    pub unique: bool,
    pub primary: bool,
}

impl IndexDefinition {
    /// The canonical name for an index on `table.column`.
    pub fn name_for(table: &str, column: &str) -> String {
        format!("idx_{table}_{column}")
    }
}

// Packed record: table[64] column[64] name[128] i32 kind, u8 unique,
// u8 primary, 2 pad bytes. Host endianness, not portable.
const NAME_64: usize = 64;
const NAME_128: usize = 128;
const RECORD_STRIDE: usize = NAME_64 + NAME_64 + NAME_128 + 4 + 1 + 1 + 2;

fn pack_definition(def: &IndexDefinition, out: &mut Vec<u8>) -> Result<()> {
    pack_name(&def.table, NAME_64, out)?;
    pack_name(&def.column, NAME_64, out)?;
    pack_name(&def.name, NAME_128, out)?;
    out.extend_from_slice(&def.kind.code().to_ne_bytes());
    out.push(def.unique as u8);
    out.push(def.primary as u8);
    out.extend_from_slice(&[0u8; 2]);
    Ok(())
}

fn pack_name(name: &str, width: usize, out: &mut Vec<u8>) -> Result<()> {
    if name.len() >= width {
        return Err(Error::InvalidArgument(format!(
            "name '{name}' exceeds {} bytes",
            width - 1
        )));
    }
    out.extend_from_slice(name.as_bytes());
    out.resize(out.len() + width - name.len(), 0);
    Ok(())
}

fn unpack_definition(record: &[u8]) -> Result<IndexDefinition> {
    let table = unpack_name(&record[..NAME_64])?;
    let column = unpack_name(&record[NAME_64..2 * NAME_64])?;
    let name = unpack_name(&record[2 * NAME_64..2 * NAME_64 + NAME_128])?;
    let mut code = [0u8; 4];
    code.copy_from_slice(&record[256..260]);
    Ok(IndexDefinition {
        table,
        column,
        name,
        kind: IndexKind::from_code(i32::from_ne_bytes(code))?,
        unique: record[260] != 0,
        primary: record[261] != 0,
    })
}

fn unpack_name(bytes: &[u8]) -> Result<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|_| Error::Parse("non-UTF-8 name in indices.dat".into()))
}

/// Tracks, builds, compiles and loads the indices of every table.
pub struct IndexManager {
    layout: DatabaseLayout,
    compiler: Arc<ArtifactCompiler>,
    loader: Arc<ArtifactLoader>,
}

impl IndexManager {
    pub fn new(
        layout: DatabaseLayout,
        compiler: Arc<ArtifactCompiler>,
        loader: Arc<ArtifactLoader>,
    ) -> Self {
        Self {
            layout,
            compiler,
            loader,
        }
    }

    /// The definitions registered for a table.
    pub fn list(&self, table: &str) -> Result<Vec<IndexDefinition>> {
        let path = self.layout.indices_path(table);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        if bytes.len() < 4 {
            return Err(Error::Parse(format!(
                "indices.dat of '{table}' is truncated"
            )));
        }
        let mut count_buf = [0u8; 4];
        count_buf.copy_from_slice(&bytes[..4]);
        let count = i32::from_ne_bytes(count_buf);
        if count < 0 || bytes.len() != 4 + count as usize * RECORD_STRIDE {
            return Err(Error::Parse(format!(
                "indices.dat of '{table}' has {} bytes for {count} entries",
                bytes.len()
            )));
        }
        let mut definitions = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let start = 4 + i * RECORD_STRIDE;
            definitions.push(unpack_definition(&bytes[start..start + RECORD_STRIDE])?);
        }
        Ok(definitions)
    }

    fn save_list(&self, table: &str, definitions: &[IndexDefinition]) -> Result<()> {
        let mut bytes = Vec::with_capacity(4 + definitions.len() * RECORD_STRIDE);
        bytes.extend_from_slice(&(definitions.len() as i32).to_ne_bytes());
        for def in definitions {
            pack_definition(def, &mut bytes)?;
        }
        fs::write(self.layout.indices_path(table), bytes)?;
        Ok(())
    }

    /// Create an index on `schema.column` and build it for every
    /// existing page.
    ///
    /// Indices on primary-key columns are forced unique and primary.
    pub fn create_index(
        &self,
        schema: &TableSchema,
        column: &str,
        kind: IndexKind,
    ) -> Result<IndexDefinition> {
        let (_, col) = schema.column_required(column)?;
        let name = IndexDefinition::name_for(&schema.name, column);
        if name.len() >= NAME_128 {
            return Err(Error::InvalidArgument(format!(
                "index name '{name}' exceeds {} bytes",
                NAME_128 - 1
            )));
        }

        let mut definitions = self.list(&schema.name)?;
        if definitions.iter().any(|d| d.name == name) {
            return Err(Error::InvalidArgument(format!(
                "index '{name}' already exists"
            )));
        }

        let definition = IndexDefinition {
            table: schema.name.clone(),
            column: column.to_string(),
            name,
            kind,
            unique: col.is_primary_key,
            primary: col.is_primary_key,
        };

        let pages = self.layout.page_count(&schema.name)?;
        for p in 0..pages {
            self.build_page_index(schema, col, kind, PageId::new(p))?;
        }

        definitions.push(definition.clone());
        self.save_list(&schema.name, &definitions)?;
        info!(
            table = %schema.name,
            index = %definition.name,
            kind = kind.artifact_tag(),
            pages,
            "created index"
        );
        Ok(definition)
    }

    /// Remove a definition and its per-page artifacts.
    pub fn drop_index(&self, table: &str, name: &str) -> Result<IndexDefinition> {
        let mut definitions = self.list(table)?;
        let at = definitions
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| Error::not_found("index", name.to_string()))?;
        let definition = definitions.remove(at);
        self.save_list(table, &definitions)?;

        let pages = self.layout.page_count(table)?;
        for p in 0..pages {
            let page = PageId::new(p);
            let tag = definition.kind.artifact_tag();
            let object = self
                .layout
                .index_object(table, tag, &definition.column, page);
            self.loader.invalidate(&object);
            // artifact removal is best-effort; a missing file is fine
            let _ = fs::remove_file(object);
            let _ = fs::remove_file(self.layout.index_source(
                table,
                tag,
                &definition.column,
                page,
            ));
        }
        info!(table, index = name, "dropped index");
        Ok(definition)
    }

    /// Rebuild every index artifact covering `page`.
    ///
    /// Called after the page was mutated and recompiled, because index
    /// positions refer to the page snapshot they were built from.
    pub fn rebuild_for_page(&self, schema: &TableSchema, page: PageId) -> Result<()> {
        for definition in self.list(&schema.name)? {
            let (_, col) = schema.column_required(&definition.column)?;
            self.build_page_index(schema, col, definition.kind, page)?;
        }
        Ok(())
    }

    /// Load the compiled index for one page and resolve its lookup
    /// symbols.
    pub fn load_for_page(
        &self,
        table: &str,
        column: &str,
        kind: IndexKind,
        page: PageId,
    ) -> Result<LoadedIndex> {
        let path = self
            .layout
            .index_object(table, kind.artifact_tag(), column, page);
        let library = self.loader.load(&path)?;
        LoadedIndex::resolve(library, column, kind)
    }

    /// Build, serialize and compile one page's index.
    fn build_page_index(
        &self,
        schema: &TableSchema,
        column: &Column,
        kind: IndexKind,
        page: PageId,
    ) -> Result<()> {
        let pairs = self.page_pairs(schema, column, page)?;
        let key_type = KeyType::of(column);
        let source = match kind {
            IndexKind::BTree => {
                let mut sorted = pairs;
                // stable by key: duplicate keys keep record order
                sorted.sort_by(|a, b| a.0.compare(&b.0));
                BTreeIndex::build_from_sorted(&column.name, key_type, &sorted)
                    .to_c_source(&schema.name)
            }
            IndexKind::Hash => {
                HashIndex::build_from_pairs(&column.name, key_type, &pairs)
                    .to_c_source(&schema.name)
            }
        };

        let tag = kind.artifact_tag();
        let source_path = self
            .layout
            .index_source(&schema.name, tag, &column.name, page);
        let object_path = self
            .layout
            .index_object(&schema.name, tag, &column.name, page);
        fs::write(&source_path, source)?;
        self.loader.invalidate(&object_path);
        let includes: Vec<PathBuf> = Vec::new();
        self.compiler
            .compile(&source_path, &object_path, &includes)?;
        debug!(
            table = %schema.name,
            column = %column.name,
            kind = tag,
            %page,
            "built index page artifact"
        );
        Ok(())
    }

    /// Snapshot `(key, position)` pairs from a compiled page.
    fn page_pairs(
        &self,
        schema: &TableSchema,
        column: &Column,
        page: PageId,
    ) -> Result<Vec<(IndexKey, u32)>> {
        let loaded = LoadedPage::open(
            &self.loader,
            &self.layout.page_object(&schema.name, page),
        )?;
        let layout = RecordLayout::of(schema);
        let mut pairs = Vec::with_capacity(loaded.count());
        for pos in 0..loaded.count() {
            let view = unsafe { RecordView::from_ptr(loaded.record_ptr(pos)?, &layout) };
            pairs.push((IndexKey::from_record(&view, column)?, pos as u32));
        }
        Ok(pairs)
    }
}

type ExactFn = unsafe extern "C" fn(*const c_void, *mut c_int, c_int) -> c_int;
type RangeFn = unsafe extern "C" fn(*const c_void, *const c_void, *mut c_int, c_int) -> c_int;

/// A loaded per-page index artifact with its symbols resolved.
pub struct LoadedIndex {
    column: String,
    kind: IndexKind,
    exact: ExactFn,
    range: Option<RangeFn>,
    _library: Arc<Library>,
}

impl LoadedIndex {
    fn resolve(library: Arc<Library>, column: &str, kind: IndexKind) -> Result<Self> {
        let (exact, range) = unsafe {
            match kind {
                IndexKind::BTree => {
                    let exact: ExactFn =
                        *library.get(format!("find_by_{column}_exact").as_bytes())?;
                    let range: RangeFn =
                        *library.get(format!("find_by_{column}_range").as_bytes())?;
                    (exact, Some(range))
                }
                IndexKind::Hash => {
                    let exact: ExactFn = *library.get(format!("find_by_{column}").as_bytes())?;
                    (exact, None)
                }
            }
        };
        Ok(Self {
            column: column.to_string(),
            kind,
            exact,
            range,
            _library: library,
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Positions of records whose key equals `key`.
    pub fn find_exact(&self, key: &IndexKey, max: usize) -> Result<Vec<u32>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let key_bytes = key.ffi_bytes();
        let mut positions = vec![0 as c_int; max];
        let n = unsafe {
            (self.exact)(
                key_bytes.as_ptr() as *const c_void,
                positions.as_mut_ptr(),
                max as c_int,
            )
        };
        collect_positions(n, max, &positions, &self.column)
    }

    /// Positions of records whose key lies in `[lo, hi]` (inclusive,
    /// `None` = unbounded). B-tree only.
    pub fn find_range(
        &self,
        lo: Option<&IndexKey>,
        hi: Option<&IndexKey>,
        max: usize,
    ) -> Result<Vec<u32>> {
        let range = self.range.ok_or_else(|| {
            Error::InvalidArgument(format!(
                "hash index on '{}' does not support range lookups",
                self.column
            ))
        })?;
        if max == 0 {
            return Ok(Vec::new());
        }
        let lo_bytes = lo.map(|k| k.ffi_bytes());
        let hi_bytes = hi.map(|k| k.ffi_bytes());
        let mut positions = vec![0 as c_int; max];
        let n = unsafe {
            range(
                lo_bytes
                    .as_ref()
                    .map_or(std::ptr::null(), |b| b.as_ptr() as *const c_void),
                hi_bytes
                    .as_ref()
                    .map_or(std::ptr::null(), |b| b.as_ptr() as *const c_void),
                positions.as_mut_ptr(),
                max as c_int,
            )
        };
        collect_positions(n, max, &positions, &self.column)
    }
}

fn collect_positions(n: c_int, max: usize, buffer: &[c_int], column: &str) -> Result<Vec<u32>> {
    if n < 0 || n as usize > max {
        return Err(Error::Internal(format!(
            "index on '{column}' returned {n} positions for max {max}"
        )));
    }
    Ok(buffer[..n as usize].iter().map(|&p| p as u32).collect())
}
