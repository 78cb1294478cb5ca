//! DELETE rewriter - removes matching records by rewriting page files.
//!
//! Deletion never edits compiled artifacts directly. A kernel (compiled
//! once per statement, covering all pages) selects the doomed records,
//! their `_uuid` values identify the corresponding text lines, and each
//! affected `.dat.h` is rewritten without them. Dirty pages are
//! recompiled afterwards; a toolchain failure at that point leaves the
//! rewritten data file as the source of truth.

use std::fs;

use tracing::{debug, info};

use crate::common::{PageId, Result};
use crate::compile::LoadedKernel;
use crate::schema::{RecordLayout, RecordView, TableSchema};
use crate::storage::page_store::count_record_lines;
use crate::storage::{codegen, DatabaseLayout, PageStore};

/// What a delete run did.
#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    /// Records removed across all pages.
    pub deleted: u64,
    /// Pages whose data file was rewritten (already recompiled).
    pub pages_rewritten: Vec<PageId>,
}

/// Executes the delete protocol for one table.
pub struct DeleteRewriter<'a> {
    layout: &'a DatabaseLayout,
    store: &'a PageStore,
}

impl<'a> DeleteRewriter<'a> {
    pub fn new(layout: &'a DatabaseLayout, store: &'a PageStore) -> Self {
        Self { layout, store }
    }

    /// Delete every record matching `kernel`, or all records when no
    /// kernel is given (an unfiltered `DELETE FROM t`).
    ///
    /// Zero matches is a successful outcome with `deleted == 0`.
    pub fn run(
        &self,
        schema: &TableSchema,
        kernel: Option<&LoadedKernel>,
    ) -> Result<DeleteOutcome> {
        let record_layout = RecordLayout::of(schema);
        let page_count = self.layout.page_count(&schema.name)?;

        let mut outcome = DeleteOutcome::default();
        for p in 0..page_count {
            let page = PageId::new(p);
            let removed = match kernel {
                None => self.truncate_page(schema, page)?,
                Some(kernel) => {
                    let uuids = self.matching_uuids(schema, &record_layout, page, kernel)?;
                    if uuids.is_empty() {
                        continue;
                    }
                    self.rewrite_page(schema, page, &uuids)?
                }
            };
            // an unfiltered delete marks every page dirty, even ones
            // that were already empty
            if removed > 0 || kernel.is_none() {
                outcome.pages_rewritten.push(page);
                outcome.deleted += removed as u64;
            }
        }

        // all page handles are dropped by now; safe to recompile
        for &page in &outcome.pages_rewritten {
            self.store.recompile(schema, page)?;
        }
        if outcome.deleted > 0 {
            self.store
                .adjust_row_count(&schema.name, -(outcome.deleted as i64))?;
        }
        info!(
            table = %schema.name,
            deleted = outcome.deleted,
            pages = outcome.pages_rewritten.len(),
            "delete finished"
        );
        Ok(outcome)
    }

    /// Run the kernel over one loaded page and collect the `_uuid`s of
    /// the matches. The page handle is dropped before returning.
    fn matching_uuids(
        &self,
        schema: &TableSchema,
        record_layout: &RecordLayout,
        page: PageId,
        kernel: &LoadedKernel,
    ) -> Result<Vec<String>> {
        let loaded = self.store.load(&schema.name, page)?;
        let count = loaded.count();
        let data = match loaded.data_ptr() {
            Some(ptr) => ptr,
            None => return Ok(Vec::new()),
        };

        let mut results = vec![0u8; count * record_layout.size];
        let matches = kernel.execute(data, count, results.as_mut_ptr(), count)?;

        let mut uuids = Vec::with_capacity(matches);
        for i in 0..matches {
            let record = &results[i * record_layout.size..(i + 1) * record_layout.size];
            uuids.push(RecordView::new(record, record_layout)?.uuid()?.to_string());
        }
        debug!(table = %schema.name, %page, matches, "kernel selected records");
        Ok(uuids)
    }

    /// Drop every record line whose `_uuid` field is in `uuids`.
    ///
    /// Matching is field-aware: only the line's trailing quoted field
    /// counts, so a payload that happens to contain a UUID byte pattern
    /// cannot shadow another row.
    fn rewrite_page(&self, schema: &TableSchema, page: PageId, uuids: &[String]) -> Result<usize> {
        let path = self.layout.page_data(&schema.name, page);
        let text = fs::read_to_string(&path)?;

        let mut kept = String::with_capacity(text.len());
        let mut removed = 0usize;
        for line in text.lines() {
            let doomed = line.trim_end().ends_with("},")
                && line_uuid(line).is_some_and(|u| uuids.iter().any(|m| m == u));
            if doomed {
                removed += 1;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }
        if removed > 0 {
            fs::write(&path, kept)?;
            debug!(table = %schema.name, %page, removed, "rewrote page data file");
        }
        Ok(removed)
    }

    /// Reset the page's data file to its banner, returning how many
    /// records it held.
    fn truncate_page(&self, schema: &TableSchema, page: PageId) -> Result<usize> {
        let path = self.layout.page_data(&schema.name, page);
        let had = count_record_lines(&fs::read_to_string(&path)?);
        fs::write(&path, codegen::data_file_banner(&schema.name, page))?;
        Ok(had)
    }
}

/// The trailing quoted field of a record line - the `_uuid` column.
pub(crate) fn line_uuid(line: &str) -> Option<&str> {
    let t = line.trim_end().strip_suffix("},")?.trim_end();
    let t = t.strip_suffix('"')?;
    let start = t.rfind('"')?;
    Some(&t[start + 1..])
}
