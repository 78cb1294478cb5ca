//! Cursor - forward-only iteration over a table's records.
//!
//! A cursor walks the compiled pages in order, one loaded page at a
//! time. Moving past the last record of a page drops that page's handle
//! and loads the next one; empty pages are skipped. The page count is
//! snapshotted at open, so pages created afterwards are not visited.

use std::sync::Arc;

use crate::common::{Error, PageId, Result};
use crate::compile::{ArtifactLoader, LoadedPage};
use crate::schema::{RecordLayout, RecordView, TableSchema};
use crate::storage::DatabaseLayout;

/// Forward-only record iterator.
///
/// Records returned by [`Self::current`] borrow the currently loaded
/// page; they are invalidated by the next [`Self::next`], by
/// [`Self::reset`], and by dropping the cursor.
#[derive(Debug)]
pub struct Cursor {
    layout: DatabaseLayout,
    loader: Arc<ArtifactLoader>,
    table: String,
    record_layout: Arc<RecordLayout>,
    /// Page count snapshot taken at open.
    page_count: u32,
    page_index: u32,
    position: usize,
    page: Option<LoadedPage>,
    at_end: bool,
}

impl Cursor {
    /// Open a cursor positioned on the table's first record.
    ///
    /// A table with no pages (or only empty pages) opens at end.
    pub fn open(
        layout: DatabaseLayout,
        loader: Arc<ArtifactLoader>,
        schema: &TableSchema,
    ) -> Result<Self> {
        let record_layout = Arc::new(RecordLayout::of(schema));
        let page_count = layout.page_count(&schema.name)?;
        let mut cursor = Self {
            layout,
            loader,
            table: schema.name.clone(),
            record_layout,
            page_count,
            page_index: 0,
            position: 0,
            page: None,
            at_end: page_count == 0,
        };
        if !cursor.at_end {
            cursor.load_page(PageId::new(0))?;
            cursor.settle()?;
        }
        Ok(cursor)
    }

    /// Advance to the next record.
    ///
    /// Returns `Ok(true)` while positioned on a record, `Ok(false)` at
    /// end of table.
    pub fn next(&mut self) -> Result<bool> {
        if self.at_end {
            return Ok(false);
        }
        self.position += 1;
        self.settle()?;
        Ok(!self.at_end)
    }

    /// The record under the cursor, `None` at end.
    pub fn current(&self) -> Result<Option<RecordView<'_>>> {
        if self.at_end {
            return Ok(None);
        }
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| Error::Internal("cursor has no loaded page".into()))?;
        let ptr = page.record_ptr(self.position)?;
        // the pointer stays valid while `page` keeps its library alive
        Ok(Some(unsafe {
            RecordView::from_ptr(ptr, &self.record_layout)
        }))
    }

    /// Reposition on the first record.
    pub fn reset(&mut self) -> Result<()> {
        self.page = None;
        self.page_index = 0;
        self.position = 0;
        self.at_end = self.page_count == 0;
        if !self.at_end {
            self.load_page(PageId::new(0))?;
            self.settle()?;
        }
        Ok(())
    }

    /// Whether the cursor has run off the table.
    pub fn at_end(&self) -> bool {
        self.at_end
    }

    /// Drop the loaded page and the cursor.
    pub fn close(self) {}

    /// The record layout records are read under.
    pub fn record_layout(&self) -> &Arc<RecordLayout> {
        &self.record_layout
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn load_page(&mut self, page: PageId) -> Result<()> {
        let path = self.layout.page_object(&self.table, page);
        // replacing the option drops the previous page's handle first
        self.page = Some(LoadedPage::open(&self.loader, &path)?);
        self.page_index = page.0;
        self.position = 0;
        Ok(())
    }

    /// Skip forward until the position lands on a record or the table
    /// is exhausted.
    fn settle(&mut self) -> Result<()> {
        loop {
            let count = match &self.page {
                Some(page) => page.count(),
                None => 0,
            };
            if self.position < count {
                return Ok(());
            }
            let next_page = self.page_index + 1;
            if next_page >= self.page_count {
                self.page = None;
                self.at_end = true;
                return Ok(());
            }
            self.load_page(PageId::new(next_page))?;
        }
    }
}
