//! forgedb - a relational database that compiles its storage to native code.
//!
//! Every data page, every index and every query kernel is emitted as C
//! source, compiled to a shared object, and loaded at query time. SQL
//! parsing and kernel synthesis live outside this crate; the engine
//! consumes parsed schemas and opaque kernel blobs and owns everything
//! below them.
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     SQL layer (external)                      │
//! │        parser → AST → kernel source synthesis                 │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                ↓
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Database (engine)                          │
//! │   DDL / insert / select / delete / index lifecycle            │
//! ├───────────────┬──────────────────────────┬────────────────────┤
//! │ storage/      │ index/                   │ compile/           │
//! │ PageStore     │ BTreeIndex · HashIndex   │ ArtifactCompiler   │
//! │ Cursor        │ IndexManager             │ ArtifactLoader     │
//! │ DeleteRewriter│ LoadedIndex              │ KernelPipeline     │
//! ├───────────────┴──────────────────────────┴────────────────────┤
//! │ schema/ (TableSchema, RecordLayout)   types (values)          │
//! │ common/ (config, PageId, Error)                               │
//! └───────────────────────────────────────────────────────────────┘
//!                                ↓
//!            {db}/tables  {db}/compiled  {db}/kernels  {db}/scripts
//! ```
//!
//! # Modules
//! - [`common`] - shared primitives (config, `PageId`, `Error`)
//! - [`types`] - the SQL data types and value conversions
//! - [`schema`] - table schemas and the record memory layout
//! - [`storage`] - paged record files, cursors, the DELETE rewriter
//! - [`compile`] - the compile-and-load pipeline for all artifacts
//! - [`index`] - B-tree and hash indices plus their manager
//! - [`engine`] - the [`Database`] facade the SQL layer drives
//!
//! # Quick start
//! ```no_run
//! use forgedb::{Column, Database, DataType, EngineConfig, TableSchema};
//!
//! let db = Database::create("./mydb", EngineConfig::default())?;
//! let schema = TableSchema::new(
//!     "Customers",
//!     vec![
//!         Column::new("id", DataType::Int).primary_key(),
//!         Column::new("name", DataType::Varchar).with_length(100),
//!     ],
//! )?;
//! db.create_table(&schema)?;
//! db.insert("Customers", &[Some("1".into()), Some("Ada".into())])?;
//! # Ok::<(), forgedb::Error>(())
//! ```

pub mod common;
pub mod compile;
pub mod engine;
pub mod index;
pub mod schema;
pub mod storage;
pub mod types;

// Re-export the surface most callers need at the crate root.
pub use common::{EngineConfig, Error, PageId, Result};
pub use engine::Database;
pub use types::DataType;

pub use compile::KernelSpec;
pub use index::{IndexDefinition, IndexKind};
pub use schema::{Column, Row, TableSchema};
pub use storage::Cursor;
