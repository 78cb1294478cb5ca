//! Error types for forgedb.

use thiserror::Error;

/// Convenient Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in forgedb.
///
/// One variant per error kind; every variant carries enough context (the
/// offending name, value, or toolchain output) to be user-actionable at
/// the outermost surface. There is no global error state: every fallible
/// operation returns one of these.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument was malformed (bad identifier, bad
    /// buffer size, value count mismatch).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A named table, column, page or index does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What kind of thing was looked up ("table", "column", ...).
        kind: &'static str,
        /// The name or id that failed to resolve.
        name: String,
    },

    /// Stored metadata (schema JSON, index registry) failed to parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O error from file or directory operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The native toolchain failed to produce a shared object.
    #[error("compile failed for {artifact}: {detail}")]
    Compile {
        /// Path of the artifact that failed to build.
        artifact: String,
        /// Toolchain diagnostics (captured stderr or a description).
        detail: String,
    },

    /// A shared object could not be opened or a symbol was missing.
    #[error("load error: {0}")]
    Load(String),

    /// A value failed type, length, or uniqueness validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A broken internal invariant. Indicates a bug in forgedb.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }
}

impl From<libloading::Error> for Error {
    fn from(err: libloading::Error) -> Self {
        Error::Load(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("table", "Customers");
        assert_eq!(format!("{}", err), "table not found: Customers");

        let err = Error::Validation("value 'abc' is not a valid INT".into());
        assert_eq!(
            format!("{}", err),
            "validation error: value 'abc' is not a valid INT"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_compile_error_carries_artifact() {
        let err = Error::Compile {
            artifact: "compiled/CustomersData_0.so".into(),
            detail: "gcc exited with status 1".into(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("CustomersData_0.so"));
        assert!(msg.contains("status 1"));
    }
}
