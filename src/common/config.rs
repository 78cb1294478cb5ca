//! Configuration constants and tunables for forgedb.

/// Default maximum number of records a page may hold before the next
/// insert opens a successor page.
///
/// Deliberately small: every page is recompiled to a shared object on
/// mutation, so a page is a unit of recompilation as much as a unit of
/// storage. Override per database via [`EngineConfig`].
pub const MAX_RECORDS_PER_PAGE: usize = 5;

/// B-tree order M: the maximum number of children per node.
///
/// A node holds at most `M - 1` keys. Fixed at compile time because the
/// serialized index source embeds the node arrays with this dimension.
pub const BTREE_ORDER: usize = 5;

/// Default bucket count for hash indices.
///
/// A build from an existing page snapshot uses `max(2 * pairs, 101)`
/// instead, keeping chains short without runtime resizing.
pub const DEFAULT_HASH_BUCKETS: usize = 101;

/// Maximum length of a table or column identifier.
pub const MAX_NAME_LEN: usize = 63;

/// Inline buffer size of the TEXT type, in bytes (including the NUL).
pub const TEXT_SIZE: usize = 4096;

/// Length of a canonical UUID string (36 chars, no NUL).
pub const UUID_LEN: usize = 36;

/// Name of the implicit row-identity column appended to every table.
pub const UUID_COLUMN: &str = "_uuid";

/// Per-database engine knobs.
///
/// `Default` matches the documented engine defaults; tests shrink
/// `max_records_per_page` to force page splits early.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records per page before a split creates a successor page.
    pub max_records_per_page: usize,

    /// C compiler binary. `None` falls back to `$CC`, then `gcc`.
    pub compiler: Option<String>,

    /// Extra flags appended to every toolchain invocation.
    pub extra_cflags: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_records_per_page: MAX_RECORDS_PER_PAGE,
            compiler: None,
            extra_cflags: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Resolve the C compiler to invoke: explicit setting, `$CC`, or `gcc`.
    pub fn resolved_compiler(&self) -> String {
        if let Some(cc) = &self.compiler {
            return cc.clone();
        }
        std::env::var("CC").unwrap_or_else(|_| "gcc".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_records_per_page, 5);
        assert!(config.extra_cflags.is_empty());
    }

    #[test]
    fn test_explicit_compiler_wins() {
        let config = EngineConfig {
            compiler: Some("clang".to_string()),
            ..EngineConfig::default()
        };
        assert_eq!(config.resolved_compiler(), "clang");
    }

    #[test]
    fn test_order_and_buckets() {
        // The serialized index sources are dimensioned by these.
        assert_eq!(BTREE_ORDER, 5);
        assert_eq!(DEFAULT_HASH_BUCKETS, 101);
    }
}
