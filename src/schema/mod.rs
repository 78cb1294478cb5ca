//! Table schemas and their on-disk JSON form.
//!
//! A [`TableSchema`] is the single source of truth for a table: the
//! generated record struct, the textual data files, the indices and the
//! query kernels are all derived from it. Every table carries an implicit
//! trailing `_uuid` column (VARCHAR(36)) used as row identity by the
//! DELETE rewriter.

mod record;

pub use record::{RecordLayout, RecordView, Row};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::config::{MAX_NAME_LEN, UUID_COLUMN, UUID_LEN};
use crate::common::{Error, Result};
use crate::types::DataType;

/// One column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    /// Declared length for VARCHAR; unused by the other types.
    pub length: usize,
    pub nullable: bool,
    /// Textual default literal applied when an insert passes NULL.
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

impl Column {
    /// A non-null column with no default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            length: 0,
            nullable: false,
            default_value: None,
            is_primary_key: false,
        }
    }

    /// Set the declared VARCHAR length.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Allow NULLs.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Attach a default literal.
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default_value = Some(literal.into());
        self
    }

    /// Mark as part of the primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(self.name.as_str())?;
        if self.data_type == DataType::Varchar && self.length == 0 {
            return Err(Error::InvalidArgument(format!(
                "VARCHAR column '{}' needs a length",
                self.name
            )));
        }
        Ok(())
    }
}

/// An ordered set of columns plus the primary-key column indices.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    /// Indices into `columns`, in declaration order.
    pub primary_key: Vec<usize>,
}

impl TableSchema {
    /// Build a schema from user columns.
    ///
    /// Appends the implicit `_uuid` row-identity column and derives the
    /// primary-key index list from the column flags.
    ///
    /// # Errors
    /// `InvalidArgument` on bad identifiers, duplicate column names, a
    /// reserved `_uuid` column, or a VARCHAR without a length.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        if columns.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "table '{name}' needs at least one column"
            )));
        }

        let mut all = columns;
        for (i, col) in all.iter().enumerate() {
            col.validate()?;
            if col.name == UUID_COLUMN {
                return Err(Error::InvalidArgument(format!(
                    "column name '{UUID_COLUMN}' is reserved"
                )));
            }
            if all[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate column '{}' in table '{name}'",
                    col.name
                )));
            }
        }
        all.push(Column::new(UUID_COLUMN, DataType::Varchar).with_length(UUID_LEN));

        let primary_key = all
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary_key)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            name,
            columns: all,
            primary_key,
        })
    }

    /// Look up a column (including `_uuid`) by name.
    pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }

    /// Like [`Self::column`] but surfacing a `NotFound` error.
    pub fn column_required(&self, name: &str) -> Result<(usize, &Column)> {
        self.column(name)
            .ok_or_else(|| Error::not_found("column", format!("{}.{}", self.name, name)))
    }

    /// The user-declared columns, without the implicit `_uuid`.
    pub fn user_columns(&self) -> &[Column] {
        &self.columns[..self.columns.len() - 1]
    }

    /// Serialize to the on-disk JSON document.
    pub fn to_json(&self) -> Result<String> {
        let doc = SchemaJson {
            name: self.name.clone(),
            column_count: self.columns.len(),
            columns: self
                .columns
                .iter()
                .map(|c| ColumnJson {
                    name: c.name.clone(),
                    data_type: c.data_type.as_str().to_string(),
                    length: c.length,
                    nullable: c.nullable,
                    has_default: c.default_value.is_some(),
                    default_value: c.default_value.clone(),
                    is_primary_key: c.is_primary_key,
                })
                .collect(),
            primary_key_column_count: self.primary_key.len(),
            primary_key_columns: self.primary_key.clone(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Parse the on-disk JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: SchemaJson = serde_json::from_str(text)?;
        if doc.column_count != doc.columns.len() {
            return Err(Error::Parse(format!(
                "schema '{}': column_count {} does not match {} columns",
                doc.name,
                doc.column_count,
                doc.columns.len()
            )));
        }
        let columns = doc
            .columns
            .into_iter()
            .map(|c| {
                Ok(Column {
                    name: c.name,
                    data_type: DataType::from_name(&c.data_type)?,
                    length: c.length,
                    nullable: c.nullable,
                    default_value: if c.has_default { c.default_value } else { None },
                    is_primary_key: c.is_primary_key,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        for &pk in &doc.primary_key_columns {
            if pk >= columns.len() {
                return Err(Error::Parse(format!(
                    "schema '{}': primary key column {pk} out of range",
                    doc.name
                )));
            }
        }
        Ok(Self {
            name: doc.name,
            columns,
            primary_key: doc.primary_key_columns,
        })
    }

    /// Write `schema.json`.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read `schema.json`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found("schema", path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_json(&text)
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "identifier '{name}' must be 1..={MAX_NAME_LEN} characters"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('0');
    if !(first.is_ascii_alphabetic() || first == '_')
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::InvalidArgument(format!(
            "identifier '{name}' may only contain [A-Za-z0-9_] and must not start with a digit"
        )));
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct SchemaJson {
    name: String,
    column_count: usize,
    columns: Vec<ColumnJson>,
    primary_key_column_count: usize,
    primary_key_columns: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct ColumnJson {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    length: usize,
    nullable: bool,
    has_default: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    default_value: Option<String>,
    is_primary_key: bool,
}
