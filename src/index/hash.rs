//! Chained hash index - exact lookups over one column of one page.
//!
//! A fixed array of bucket heads, each a singly linked chain of
//! `(key, position)` entries. Entries live in an arena and insertion is
//! head-of-chain, so a chain lists newest first; the serialized C form
//! reproduces the same chains and the same djb2 bucket function, so
//! both sides return identical position sequences.

use std::fmt::Write as _;

use crate::common::config::DEFAULT_HASH_BUCKETS;
use crate::index::key::{IndexKey, KeyType};
use crate::storage::codegen;

#[derive(Debug, Clone)]
struct Entry {
    key: IndexKey,
    position: u32,
    next: Option<usize>,
}

/// A chained hash index with a fixed bucket count.
#[derive(Debug, Clone)]
pub struct HashIndex {
    column: String,
    key_type: KeyType,
    buckets: Vec<Option<usize>>,
    entries: Vec<Entry>,
}

impl HashIndex {
    /// An empty index with the default bucket count.
    pub fn new(column: impl Into<String>, key_type: KeyType) -> Self {
        Self::with_buckets(column, key_type, DEFAULT_HASH_BUCKETS)
    }

    /// An empty index with an explicit bucket count.
    pub fn with_buckets(
        column: impl Into<String>,
        key_type: KeyType,
        buckets: usize,
    ) -> Self {
        Self {
            column: column.into(),
            key_type,
            buckets: vec![None; buckets.max(1)],
            entries: Vec::new(),
        }
    }

    /// Build from a page snapshot, sized `max(2 * pairs, default)`.
    ///
    /// There is no runtime resize; the next rebuild (on page recompile)
    /// picks a new size.
    pub fn build_from_pairs(
        column: impl Into<String>,
        key_type: KeyType,
        pairs: &[(IndexKey, u32)],
    ) -> Self {
        let buckets = (pairs.len() * 2).max(DEFAULT_HASH_BUCKETS);
        let mut index = Self::with_buckets(column, key_type, buckets);
        for (key, position) in pairs {
            index.insert(key.clone(), *position);
        }
        index
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Insert at the head of the key's chain.
    pub fn insert(&mut self, key: IndexKey, position: u32) {
        let bucket = self.bucket_of(&key);
        let entry = Entry {
            key,
            position,
            next: self.buckets[bucket],
        };
        self.entries.push(entry);
        self.buckets[bucket] = Some(self.entries.len() - 1);
    }

    /// All positions whose key equals `key`, capped at `max`.
    ///
    /// Chain order: most recently inserted first.
    pub fn find(&self, key: &IndexKey, max: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = self.buckets[self.bucket_of(key)];
        while let Some(id) = cursor {
            if out.len() >= max {
                break;
            }
            let entry = &self.entries[id];
            if entry.key.compare(key) == std::cmp::Ordering::Equal {
                out.push(entry.position);
            }
            cursor = entry.next;
        }
        out
    }

    fn bucket_of(&self, key: &IndexKey) -> usize {
        (key.djb2() % self.buckets.len() as u64) as usize
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Emit the index as a self-contained C source exposing
    /// `find_by_{column}`.
    pub fn to_c_source(&self, table: &str) -> String {
        let col = &self.column;
        let buckets = self.buckets.len();
        let key_ptr = self.key_type.c_key_pointer();
        let key_ptr_cast = if self.key_type.is_string() {
            "const char *"
        } else {
            key_ptr
        };

        let mut out = codegen::banner(&format!(
            "hash index on {table}.{col} ({buckets} buckets)"
        ));
        out.push_str("#include <stddef.h>\n");
        if self.key_type.is_string() {
            out.push_str("#include <string.h>\n");
        }

        let _ = write!(
            out,
            "\ntypedef struct Entry {{\n\
             \x20   {};\n\
             \x20   int position;\n\
             \x20   const struct Entry *next;\n\
             }} Entry;\n\n",
            self.key_type.c_field("key")
        );

        // head insertion means an entry only ever points at an
        // earlier-allocated one, so arena order is definition order
        for (id, entry) in self.entries.iter().enumerate() {
            let next = match entry.next {
                Some(n) => format!("&entry_{n}"),
                None => "0".to_string(),
            };
            let _ = writeln!(
                out,
                "static const Entry entry_{id} = {{ {}, {}, {} }};",
                entry.key.c_literal(),
                entry.position,
                next
            );
        }

        let _ = write!(out, "\nstatic const Entry *const buckets[{buckets}] = {{\n");
        for (b, head) in self.buckets.iter().enumerate() {
            if let Some(id) = head {
                let _ = writeln!(out, "    [{b}] = &entry_{id},");
            }
        }
        out.push_str("};\n\n");

        // djb2 over the key's canonical bytes
        if self.key_type.is_string() {
            out.push_str(
                "static unsigned long hash_key(const char *key)\n\
                 {\n\
                 \x20   const unsigned char *p = (const unsigned char *)key;\n\
                 \x20   unsigned long h = 5381;\n\
                 \x20   while (*p) {\n\
                 \x20       h = h * 33 + *p++;\n\
                 \x20   }\n\
                 \x20   return h;\n\
                 }\n\n\
                 static int key_eq(const char *a, const char *b)\n\
                 {\n\
                 \x20   return strcmp(a, b) == 0;\n\
                 }\n\n",
            );
        } else {
            let scalar = self.key_type.c_scalar_type();
            let _ = write!(
                out,
                "static unsigned long hash_key({key_ptr}key)\n\
                 {{\n\
                 \x20   const unsigned char *p = (const unsigned char *)key;\n\
                 \x20   unsigned long h = 5381;\n\
                 \x20   size_t i;\n\
                 \x20   for (i = 0; i < sizeof({scalar}); i++) {{\n\
                 \x20       h = h * 33 + p[i];\n\
                 \x20   }}\n\
                 \x20   return h;\n\
                 }}\n\n\
                 static int key_eq({key_ptr}a, {key_ptr}b)\n\
                 {{\n\
                 \x20   return *a == *b;\n\
                 }}\n\n"
            );
        }

        let key_ref = if self.key_type.is_string() {
            "e->key"
        } else {
            "&e->key"
        };
        let _ = write!(
            out,
            "int find_by_{col}(const void *key, int *positions, int max)\n\
             {{\n\
             \x20   {key_ptr_cast}k = ({key_ptr_cast})key;\n\
             \x20   const Entry *e = buckets[hash_key(k) % {buckets}];\n\
             \x20   int found = 0;\n\
             \x20   while (e && found < max) {{\n\
             \x20       if (key_eq({key_ref}, k)) {{\n\
             \x20           positions[found++] = e->position;\n\
             \x20       }}\n\
             \x20       e = e->next;\n\
             \x20   }}\n\
             \x20   return found;\n\
             }}\n"
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index() {
        let index = HashIndex::new("id", KeyType::Int);
        assert!(index.is_empty());
        assert_eq!(index.bucket_count(), DEFAULT_HASH_BUCKETS);
        assert!(index.find(&IndexKey::Int(1), 10).is_empty());
    }

    #[test]
    fn test_insert_and_find() {
        let mut index = HashIndex::new("id", KeyType::Int);
        index.insert(IndexKey::Int(7), 0);
        index.insert(IndexKey::Int(3), 1);
        index.insert(IndexKey::Int(7), 2);

        // head insertion: newest duplicate first
        assert_eq!(index.find(&IndexKey::Int(7), 10), vec![2, 0]);
        assert_eq!(index.find(&IndexKey::Int(3), 10), vec![1]);
        assert!(index.find(&IndexKey::Int(9), 10).is_empty());
    }

    #[test]
    fn test_find_respects_buffer_cap() {
        let mut index = HashIndex::new("id", KeyType::Int);
        for pos in 0..10u32 {
            index.insert(IndexKey::Int(1), pos);
        }
        assert_eq!(index.find(&IndexKey::Int(1), 4).len(), 4);
    }

    #[test]
    fn test_single_bucket_degenerates_to_a_list() {
        // all keys collide by construction
        let mut index = HashIndex::with_buckets("id", KeyType::Int, 1);
        for (pos, v) in [4, 8, 15, 16, 23, 42].into_iter().enumerate() {
            index.insert(IndexKey::Int(v), pos as u32);
        }
        assert_eq!(index.find(&IndexKey::Int(23), 10), vec![4]);
        assert_eq!(index.find(&IndexKey::Int(4), 10), vec![0]);
        assert!(index.find(&IndexKey::Int(99), 10).is_empty());
    }

    #[test]
    fn test_build_from_pairs_sizing() {
        let pairs: Vec<(IndexKey, u32)> =
            (0..80).map(|i| (IndexKey::Int(i), i as u32)).collect();
        let index = HashIndex::build_from_pairs("id", KeyType::Int, &pairs);
        assert_eq!(index.bucket_count(), 160);
        assert_eq!(index.len(), 80);

        let small = HashIndex::build_from_pairs("id", KeyType::Int, &pairs[..3]);
        assert_eq!(small.bucket_count(), DEFAULT_HASH_BUCKETS);
    }

    #[test]
    fn test_string_keys() {
        let mut index = HashIndex::new("name", KeyType::Str { length: 20 });
        index.insert(IndexKey::Str("alice".into()), 0);
        index.insert(IndexKey::Str("bob".into()), 1);
        assert_eq!(index.find(&IndexKey::Str("bob".into()), 10), vec![1]);
        assert!(index.find(&IndexKey::Str("carol".into()), 10).is_empty());
    }

    #[test]
    fn test_c_source_shape() {
        let mut index = HashIndex::with_buckets("active", KeyType::Bool, 7);
        index.insert(IndexKey::Bool(true), 0);
        index.insert(IndexKey::Bool(false), 1);
        index.insert(IndexKey::Bool(true), 2);

        let source = index.to_c_source("Customers");
        assert!(source.contains("typedef struct Entry"));
        assert!(source.contains("unsigned char key;"));
        assert!(source.contains("static const Entry *const buckets[7]"));
        assert!(source.contains("int find_by_active(const void *key, int *positions, int max)"));
        assert!(source.contains("h = h * 33 + p[i];"));
        // chained duplicate: entry_2 points at entry_0
        assert!(source.contains("static const Entry entry_2 = { 1, 2, &entry_0 };"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// find() returns the same multiset as a linear scan.
            #[test]
            fn find_matches_linear_scan(values in prop::collection::vec(-20i32..20, 0..150), probe in -25i32..25) {
                let pairs: Vec<(IndexKey, u32)> = values
                    .iter()
                    .enumerate()
                    .map(|(p, &v)| (IndexKey::Int(v), p as u32))
                    .collect();
                let index = HashIndex::build_from_pairs("id", KeyType::Int, &pairs);

                let mut got = index.find(&IndexKey::Int(probe), values.len().max(1));
                let mut expected: Vec<u32> = values
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v == probe)
                    .map(|(p, _)| p as u32)
                    .collect();
                got.sort_unstable();
                expected.sort_unstable();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
