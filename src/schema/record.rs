//! Record layout and typed access to raw record memory.
//!
//! [`RecordLayout`] computes the field offsets of the generated C struct
//! for a schema. The same layout drives code generation (the emitted
//! struct fields) and runtime access (reading fields out of records that
//! a loaded page or kernel hands back), so the two can never disagree.

use std::sync::Arc;

use crate::common::config::UUID_COLUMN;
use crate::common::{Error, Result};
use crate::schema::TableSchema;
use crate::types::{self, DataType};

/// Offset and size of one field inside a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub data_type: DataType,
    /// Declared VARCHAR length (0 for other types).
    pub length: usize,
    pub offset: usize,
    pub size: usize,
}

/// The complete memory layout of one record.
///
/// Mirrors the C compiler's layout of the generated struct: fields in
/// declaration order, each aligned to its natural alignment, the total
/// size padded to the struct alignment so records can be indexed as an
/// array.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    pub fields: Vec<FieldLayout>,
    /// sizeof the record struct, including tail padding.
    pub size: usize,
    /// Alignment of the record struct (max field alignment).
    pub align: usize,
}

impl RecordLayout {
    /// Compute the layout for a schema, `_uuid` column included.
    pub fn of(schema: &TableSchema) -> Self {
        let mut fields = Vec::with_capacity(schema.columns.len());
        let mut offset = 0usize;
        let mut align = 1usize;

        for col in &schema.columns {
            let field_align = types::alignment_of(col.data_type);
            let size = types::size_of(col.data_type, col.length);
            offset = round_up(offset, field_align);
            fields.push(FieldLayout {
                name: col.name.clone(),
                data_type: col.data_type,
                length: col.length,
                offset,
                size,
            });
            offset += size;
            align = align.max(field_align);
        }

        Self {
            fields,
            size: round_up(offset, align),
            align,
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Like [`Self::field`] but surfacing a `NotFound` error.
    pub fn field_required(&self, name: &str) -> Result<&FieldLayout> {
        self.field(name)
            .ok_or_else(|| Error::not_found("column", name.to_string()))
    }
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// A borrowed, typed view over one record's bytes.
///
/// The bytes usually live inside a loaded page artifact; the view is
/// valid only while that artifact stays loaded (the cursor and the
/// engine tie the lifetimes together).
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    bytes: &'a [u8],
    layout: &'a RecordLayout,
}

impl<'a> RecordView<'a> {
    /// Wrap a record slice. The slice must be exactly one record long.
    pub fn new(bytes: &'a [u8], layout: &'a RecordLayout) -> Result<Self> {
        if bytes.len() != layout.size {
            return Err(Error::Internal(format!(
                "record slice is {} bytes, layout says {}",
                bytes.len(),
                layout.size
            )));
        }
        Ok(Self { bytes, layout })
    }

    /// Wrap a raw record pointer returned by a loaded artifact.
    ///
    /// # Safety
    /// `ptr` must point at `layout.size` readable bytes that outlive `'a`.
    pub unsafe fn from_ptr(ptr: *const u8, layout: &'a RecordLayout) -> Self {
        Self {
            bytes: std::slice::from_raw_parts(ptr, layout.size),
            layout,
        }
    }

    /// The raw record bytes.
    pub fn raw(&self) -> &'a [u8] {
        self.bytes
    }

    /// The bytes of one field.
    pub fn field_bytes(&self, name: &str) -> Result<&'a [u8]> {
        let field = self.layout.field_required(name)?;
        Ok(&self.bytes[field.offset..field.offset + field.size])
    }

    pub fn get_int(&self, name: &str) -> Result<i32> {
        let bytes = self.typed_field(name, DataType::Int)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        Ok(i32::from_ne_bytes(buf))
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        let bytes = self.typed_field(name, DataType::Float)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        Ok(f64::from_ne_bytes(buf))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        let bytes = self.typed_field(name, DataType::Boolean)?;
        Ok(bytes[0] != 0)
    }

    /// DATE as epoch seconds.
    pub fn get_date(&self, name: &str) -> Result<i64> {
        let bytes = self.typed_field(name, DataType::Date)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        Ok(i64::from_ne_bytes(buf))
    }

    /// VARCHAR/TEXT content up to the NUL.
    pub fn get_str(&self, name: &str) -> Result<&'a str> {
        let field = self.layout.field_required(name)?;
        if !field.data_type.is_string() {
            return Err(Error::InvalidArgument(format!(
                "column '{name}' is {}, not a string type",
                field.data_type
            )));
        }
        let bytes = &self.bytes[field.offset..field.offset + field.size];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end])
            .map_err(|_| Error::Internal(format!("column '{name}' holds non-UTF-8 bytes")))
    }

    /// The implicit row identity.
    pub fn uuid(&self) -> Result<&'a str> {
        self.get_str(UUID_COLUMN)
    }

    /// Textual form of one field, via the type system's formatter.
    pub fn format_field(&self, name: &str) -> Result<String> {
        let field = self.layout.field_required(name)?;
        types::format(
            &self.bytes[field.offset..field.offset + field.size],
            field.data_type,
        )
    }

    fn typed_field(&self, name: &str, expected: DataType) -> Result<&'a [u8]> {
        let field = self.layout.field_required(name)?;
        if field.data_type != expected {
            return Err(Error::InvalidArgument(format!(
                "column '{name}' is {}, not {expected}",
                field.data_type
            )));
        }
        Ok(&self.bytes[field.offset..field.offset + field.size])
    }
}

/// An owned record, detached from any loaded artifact.
///
/// Query results copy matching records out of the kernel's result buffer
/// into `Row`s so they survive page reloads and recompiles.
#[derive(Debug, Clone)]
pub struct Row {
    bytes: Vec<u8>,
    layout: Arc<RecordLayout>,
}

impl Row {
    /// Copy a record into an owned row.
    pub fn new(bytes: Vec<u8>, layout: Arc<RecordLayout>) -> Result<Self> {
        if bytes.len() != layout.size {
            return Err(Error::Internal(format!(
                "row is {} bytes, layout says {}",
                bytes.len(),
                layout.size
            )));
        }
        Ok(Self { bytes, layout })
    }

    /// A typed view over the owned bytes.
    pub fn view(&self) -> RecordView<'_> {
        RecordView {
            bytes: &self.bytes,
            layout: &self.layout,
        }
    }

    /// The record layout this row was read under.
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::types::parse;

    fn schema() -> TableSchema {
        TableSchema::new(
            "Customers",
            vec![
                Column::new("id", DataType::Int).primary_key(),
                Column::new("name", DataType::Varchar).with_length(100),
                Column::new("score", DataType::Float),
                Column::new("active", DataType::Boolean),
                Column::new("joined", DataType::Date),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_layout_alignment() {
        let layout = RecordLayout::of(&schema());

        // id @ 0, name @ 4 (101 bytes), score aligned up to 8,
        // active right after, joined aligned to 8, uuid inline,
        // total padded to 8.
        let id = layout.field("id").unwrap();
        assert_eq!((id.offset, id.size), (0, 4));

        let name = layout.field("name").unwrap();
        assert_eq!((name.offset, name.size), (4, 101));

        let score = layout.field("score").unwrap();
        assert_eq!(score.offset % 8, 0);
        assert_eq!(score.offset, 112); // 105 rounded up

        let active = layout.field("active").unwrap();
        assert_eq!(active.offset, 120);

        let joined = layout.field("joined").unwrap();
        assert_eq!(joined.offset, 128);

        let uuid = layout.field("_uuid").unwrap();
        assert_eq!((uuid.offset, uuid.size), (136, 37));

        assert_eq!(layout.align, 8);
        assert_eq!(layout.size, 176); // 173 padded to 8
    }

    #[test]
    fn test_record_view_typed_reads() {
        let layout = RecordLayout::of(&schema());
        let mut bytes = vec![0u8; layout.size];

        let put = |bytes: &mut Vec<u8>, layout: &RecordLayout, name: &str, value: Vec<u8>| {
            let f = layout.field(name).unwrap();
            bytes[f.offset..f.offset + value.len()].copy_from_slice(&value);
        };
        put(&mut bytes, &layout, "id", parse("7", DataType::Int, 0).unwrap());
        put(
            &mut bytes,
            &layout,
            "name",
            parse("Ada", DataType::Varchar, 100).unwrap(),
        );
        put(
            &mut bytes,
            &layout,
            "score",
            parse("2.5", DataType::Float, 0).unwrap(),
        );
        put(
            &mut bytes,
            &layout,
            "active",
            parse("true", DataType::Boolean, 0).unwrap(),
        );
        put(
            &mut bytes,
            &layout,
            "_uuid",
            parse(
                "00000000-0000-4000-8000-000000000001",
                DataType::Varchar,
                36,
            )
            .unwrap(),
        );

        let view = RecordView::new(&bytes, &layout).unwrap();
        assert_eq!(view.get_int("id").unwrap(), 7);
        assert_eq!(view.get_str("name").unwrap(), "Ada");
        assert_eq!(view.get_float("score").unwrap(), 2.5);
        assert!(view.get_bool("active").unwrap());
        assert_eq!(view.uuid().unwrap(), "00000000-0000-4000-8000-000000000001");
        assert_eq!(view.format_field("id").unwrap(), "7");
    }

    #[test]
    fn test_record_view_type_mismatch() {
        let layout = RecordLayout::of(&schema());
        let bytes = vec![0u8; layout.size];
        let view = RecordView::new(&bytes, &layout).unwrap();
        assert!(view.get_int("name").is_err());
        assert!(view.get_str("id").is_err());
        assert!(view.get_int("missing").is_err());
    }

    #[test]
    fn test_record_view_wrong_size() {
        let layout = RecordLayout::of(&schema());
        let bytes = vec![0u8; layout.size - 1];
        assert!(RecordView::new(&bytes, &layout).is_err());
    }

    #[test]
    fn test_row_owns_bytes() {
        let layout = Arc::new(RecordLayout::of(&schema()));
        let mut bytes = vec![0u8; layout.size];
        let f = layout.field("id").unwrap();
        bytes[f.offset..f.offset + 4].copy_from_slice(&42i32.to_ne_bytes());

        let row = Row::new(bytes, Arc::clone(&layout)).unwrap();
        assert_eq!(row.view().get_int("id").unwrap(), 42);
    }
}
