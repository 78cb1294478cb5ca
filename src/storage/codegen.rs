//! Emission of generated C sources: record headers, page sources, and
//! the textual record lines the data files are made of.
//!
//! Everything emitted here is part of the on-disk contract: the struct
//! field order mirrors [`RecordLayout`], the page accessors are named
//! `count`/`read`, and every record line ends in `},` so the page store
//! and the DELETE rewriter can treat the data file line-by-line.

use std::fmt::Write;

use crate::common::{Error, PageId, Result};
use crate::schema::TableSchema;
use crate::types::{self, DataType};

/// Name of the generated record struct for a table.
pub fn record_struct_name(table: &str) -> String {
    format!("{table}Record")
}

/// The banner line opening every generated file.
pub fn banner(what: &str) -> String {
    format!("/* Auto-generated by forgedb: {what}. Do not edit. */\n")
}

/// Render `tables/{T}/{T}.h` - the record struct definition.
///
/// Field order and types follow the schema exactly; the C compiler's
/// struct layout of these declarations is what
/// [`crate::schema::RecordLayout`] computes on the Rust side.
pub fn render_header(schema: &TableSchema) -> String {
    let table = &schema.name;
    let guard = format!("FORGEDB_TABLE_{}_H", table.to_uppercase());
    let mut out = banner(&format!("record struct for table {table}"));
    let _ = write!(out, "#ifndef {guard}\n#define {guard}\n\ntypedef struct {{\n");
    for col in &schema.columns {
        let c_type = types::c_scalar_type(col.data_type);
        if col.data_type.is_string() {
            let dim = types::size_of(col.data_type, col.length);
            let _ = writeln!(out, "    {c_type} {}[{dim}];", col.name);
        } else {
            let _ = writeln!(out, "    {c_type} {};", col.name);
        }
    }
    let _ = write!(
        out,
        "}} {};\n\n#endif /* {guard} */\n",
        record_struct_name(table)
    );
    out
}

/// Render `tables/{T}/src/{T}Data_{p}.c` - the page source.
///
/// The page's records are pulled in as an initializer list from the
/// `.dat.h` data file; the exported `count`/`read` pair is the page ABI.
pub fn render_page_source(schema: &TableSchema, page: PageId) -> String {
    let table = &schema.name;
    let record = record_struct_name(table);
    let mut out = banner(&format!("page {} of table {table}", page.0));
    let _ = write!(
        out,
        "#include \"../{table}.h\"\n\
         \n\
         static {record} page_data[] = {{\n\
         #include \"../data/{table}Data.{page}.dat.h\"\n\
         }};\n\
         \n\
         int count(void)\n\
         {{\n\
         \x20   return (int)(sizeof(page_data) / sizeof({record}));\n\
         }}\n\
         \n\
         const void *read(int pos)\n\
         {{\n\
         \x20   if (pos < 0 || pos >= count()) {{\n\
         \x20       return 0;\n\
         \x20   }}\n\
         \x20   return &page_data[pos];\n\
         }}\n",
        page = page.0,
    );
    out
}

/// The banner line a fresh (or truncated) data file contains.
pub fn data_file_banner(table: &str, page: PageId) -> String {
    banner(&format!("data for page {} of table {table}", page.0))
}

/// Render one record line: `{ v1, v2, ... },` terminated by a newline.
///
/// `values` holds the textual form per schema column (the `_uuid` value
/// included); `None` is a NULL and renders as the type's zero literal.
pub fn render_record_line(schema: &TableSchema, values: &[Option<&str>]) -> Result<String> {
    if values.len() != schema.columns.len() {
        return Err(Error::InvalidArgument(format!(
            "table '{}' has {} columns, got {} values",
            schema.name,
            schema.columns.len(),
            values.len()
        )));
    }
    let mut parts = Vec::with_capacity(values.len());
    for (col, value) in schema.columns.iter().zip(values) {
        let literal = match value {
            Some(text) => value_literal(text, col.data_type, col.length, &col.name)?,
            None => zero_literal(col.data_type),
        };
        parts.push(literal);
    }
    Ok(format!("{{ {} }},\n", parts.join(", ")))
}

/// One value as a C initializer literal.
fn value_literal(text: &str, data_type: DataType, length: usize, column: &str) -> Result<String> {
    if !types::validate(text, data_type, length) {
        return Err(Error::Validation(format!(
            "value '{text}' is not a valid {data_type} for column '{column}'"
        )));
    }
    match data_type {
        DataType::Int | DataType::Float => Ok(text.to_string()),
        DataType::Boolean => {
            let truthy = matches!(text.to_ascii_lowercase().as_str(), "true" | "1");
            Ok(if truthy { "1" } else { "0" }.to_string())
        }
        DataType::Date => {
            // stored as epoch seconds; reuse the type parser
            let bytes = types::parse(text, data_type, length)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            Ok(i64::from_ne_bytes(buf).to_string())
        }
        DataType::Varchar | DataType::Text => Ok(quote_c_string(text)),
    }
}

fn zero_literal(data_type: DataType) -> String {
    match data_type {
        DataType::Varchar | DataType::Text => "\"\"".to_string(),
        _ => "0".to_string(),
    }
}

fn quote_c_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn schema() -> TableSchema {
        TableSchema::new(
            "Customers",
            vec![
                Column::new("id", DataType::Int).primary_key(),
                Column::new("name", DataType::Varchar).with_length(100),
                Column::new("score", DataType::Float).nullable(),
                Column::new("active", DataType::Boolean),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_header_declares_all_fields() {
        let header = render_header(&schema());
        assert!(header.contains("#ifndef FORGEDB_TABLE_CUSTOMERS_H"));
        assert!(header.contains("typedef struct {"));
        assert!(header.contains("    int id;"));
        assert!(header.contains("    char name[101];"));
        assert!(header.contains("    double score;"));
        assert!(header.contains("    unsigned char active;"));
        assert!(header.contains("    char _uuid[37];"));
        assert!(header.contains("} CustomersRecord;"));
    }

    #[test]
    fn test_page_source_shape() {
        let source = render_page_source(&schema(), PageId::new(2));
        assert!(source.contains("#include \"../Customers.h\""));
        assert!(source.contains("#include \"../data/CustomersData.2.dat.h\""));
        assert!(source.contains("int count(void)"));
        assert!(source.contains("const void *read(int pos)"));
        assert!(source.contains("static CustomersRecord page_data[]"));
    }

    #[test]
    fn test_record_line() {
        let line = render_record_line(
            &schema(),
            &[
                Some("7"),
                Some("Ada"),
                Some("2.5"),
                Some("true"),
                Some("00000000-0000-4000-8000-000000000001"),
            ],
        )
        .unwrap();
        assert_eq!(
            line,
            "{ 7, \"Ada\", 2.5, 1, \"00000000-0000-4000-8000-000000000001\" },\n"
        );
    }

    #[test]
    fn test_record_line_nulls_use_zero_literals() {
        let line = render_record_line(
            &schema(),
            &[Some("1"), None, None, None, Some("u")],
        )
        .unwrap();
        assert_eq!(line, "{ 1, \"\", 0, 0, \"u\" },\n");
    }

    #[test]
    fn test_record_line_validates_values() {
        let err = render_record_line(
            &schema(),
            &[Some("x"), Some("Ada"), None, Some("true"), Some("u")],
        )
        .unwrap_err();
        assert!(format!("{err}").contains("'x'"));

        // arity mismatch
        assert!(render_record_line(&schema(), &[Some("1")]).is_err());
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(quote_c_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }
}
