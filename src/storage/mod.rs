//! Storage layer - paged record files, cursors, and the DELETE rewriter.
//!
//! This module owns everything under the database directory:
//! - [`DatabaseLayout`] - deterministic paths for every artifact
//! - [`codegen`] - emission of record headers, page sources and data lines
//! - [`PageStore`] - append/count/split/recompile over the textual pages
//! - [`Cursor`] - forward iteration across a table's pages
//! - [`DeleteRewriter`] / [`UpdateRewriter`] - kernel-driven textual
//!   rewrites of page files

pub mod codegen;
mod cursor;
mod delete;
mod layout;
mod page_store;
mod update;

pub use cursor::Cursor;
pub use delete::{DeleteOutcome, DeleteRewriter};
pub use layout::DatabaseLayout;
pub use page_store::PageStore;
pub use update::{Assignment, UpdateOutcome, UpdateRewriter};
