//! UPDATE rewriter - replaces column values by rewriting page files.
//!
//! Follows the same shape as deletion: a kernel selects the affected
//! records, their `_uuid` values identify the text lines, and each
//! matched line is re-rendered with the assigned columns replaced and
//! every other column carried over from the record snapshot. Dirty
//! pages are recompiled afterwards.

use std::collections::HashMap;
use std::fs;

use tracing::{debug, info};

use crate::common::{Error, PageId, Result};
use crate::compile::LoadedKernel;
use crate::schema::{RecordLayout, RecordView, TableSchema};
use crate::storage::delete::line_uuid;
use crate::storage::{codegen, DatabaseLayout, PageStore};

/// One `SET column = value` assignment; `None` is NULL.
pub type Assignment = (String, Option<String>);

/// What an update run did.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    /// Records rewritten across all pages.
    pub updated: u64,
    /// Pages whose data file was rewritten (already recompiled).
    pub pages_rewritten: Vec<PageId>,
}

/// Executes the update protocol for one table.
pub struct UpdateRewriter<'a> {
    layout: &'a DatabaseLayout,
    store: &'a PageStore,
}

impl<'a> UpdateRewriter<'a> {
    pub fn new(layout: &'a DatabaseLayout, store: &'a PageStore) -> Self {
        Self { layout, store }
    }

    /// Apply `assignments` to every record matching `kernel` (all
    /// records when `None`). Returns what was rewritten.
    pub fn run(
        &self,
        schema: &TableSchema,
        kernel: Option<&LoadedKernel>,
        assignments: &[Assignment],
    ) -> Result<UpdateOutcome> {
        self.validate_assignments(schema, assignments)?;
        let record_layout = RecordLayout::of(schema);
        let page_count = self.layout.page_count(&schema.name)?;

        let mut outcome = UpdateOutcome::default();
        for p in 0..page_count {
            let page = PageId::new(p);
            let replacements =
                self.replacement_lines(schema, &record_layout, page, kernel, assignments)?;
            if replacements.is_empty() {
                continue;
            }
            let rewritten = self.rewrite_page(schema, page, &replacements)?;
            if rewritten > 0 {
                outcome.pages_rewritten.push(page);
                outcome.updated += rewritten as u64;
            }
        }

        // all page handles are dropped by now; safe to recompile
        for &page in &outcome.pages_rewritten {
            self.store.recompile(schema, page)?;
        }
        info!(
            table = %schema.name,
            updated = outcome.updated,
            pages = outcome.pages_rewritten.len(),
            "update finished"
        );
        Ok(outcome)
    }

    fn validate_assignments(
        &self,
        schema: &TableSchema,
        assignments: &[Assignment],
    ) -> Result<()> {
        if assignments.is_empty() {
            return Err(Error::InvalidArgument(
                "update needs at least one assignment".into(),
            ));
        }
        for (column, value) in assignments {
            let (_, col) = schema.column_required(column)?;
            if column == crate::common::config::UUID_COLUMN {
                return Err(Error::InvalidArgument(
                    "the row identity column cannot be assigned".into(),
                ));
            }
            if value.is_none() && !col.nullable {
                return Err(Error::Validation(format!(
                    "column '{}' of table '{}' is not nullable",
                    col.name, schema.name
                )));
            }
        }
        Ok(())
    }

    /// Run the kernel over one loaded page and render the replacement
    /// line for every match, keyed by `_uuid`. The page handle is
    /// dropped before returning.
    fn replacement_lines(
        &self,
        schema: &TableSchema,
        record_layout: &RecordLayout,
        page: PageId,
        kernel: Option<&LoadedKernel>,
        assignments: &[Assignment],
    ) -> Result<HashMap<String, String>> {
        let loaded = self.store.load(&schema.name, page)?;
        let count = loaded.count();
        let data = match loaded.data_ptr() {
            Some(ptr) => ptr,
            None => return Ok(HashMap::new()),
        };

        let mut matched = vec![0u8; count * record_layout.size];
        let matches = match kernel {
            Some(kernel) => kernel.execute(data, count, matched.as_mut_ptr(), count)?,
            None => {
                // no predicate: every record on the page is affected
                for pos in 0..count {
                    let src = unsafe {
                        std::slice::from_raw_parts(loaded.record_ptr(pos)?, record_layout.size)
                    };
                    matched[pos * record_layout.size..(pos + 1) * record_layout.size]
                        .copy_from_slice(src);
                }
                count
            }
        };

        let mut replacements = HashMap::with_capacity(matches);
        for i in 0..matches {
            let record = &matched[i * record_layout.size..(i + 1) * record_layout.size];
            let view = RecordView::new(record, record_layout)?;
            let uuid = view.uuid()?.to_string();
            replacements.insert(uuid, self.render_updated_line(schema, &view, assignments)?);
        }
        debug!(table = %schema.name, %page, matches, "kernel selected records for update");
        Ok(replacements)
    }

    /// Re-render one record line: assigned columns take their new
    /// value, the rest carry over from the snapshot.
    fn render_updated_line(
        &self,
        schema: &TableSchema,
        record: &RecordView<'_>,
        assignments: &[Assignment],
    ) -> Result<String> {
        let mut texts: Vec<Option<String>> = Vec::with_capacity(schema.columns.len());
        for col in &schema.columns {
            let assigned = assignments.iter().find(|(name, _)| name == &col.name);
            match assigned {
                Some((_, value)) => texts.push(value.clone()),
                None => texts.push(Some(record.format_field(&col.name)?)),
            }
        }
        let refs: Vec<Option<&str>> = texts.iter().map(|t| t.as_deref()).collect();
        codegen::render_record_line(schema, &refs)
    }

    /// Swap matched record lines for their replacements.
    fn rewrite_page(
        &self,
        schema: &TableSchema,
        page: PageId,
        replacements: &HashMap<String, String>,
    ) -> Result<usize> {
        let path = self.layout.page_data(&schema.name, page);
        let text = fs::read_to_string(&path)?;

        let mut out = String::with_capacity(text.len());
        let mut rewritten = 0usize;
        for line in text.lines() {
            let replacement = line
                .trim_end()
                .ends_with("},")
                .then(|| line_uuid(line))
                .flatten()
                .and_then(|uuid| replacements.get(uuid));
            match replacement {
                Some(new_line) => {
                    out.push_str(new_line);
                    rewritten += 1;
                }
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        if rewritten > 0 {
            fs::write(&path, out)?;
            debug!(table = %schema.name, %page, rewritten, "rewrote page data file");
        }
        Ok(rewritten)
    }
}
