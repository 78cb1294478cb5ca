//! Dynamic loader - opens compiled artifacts and resolves their symbols.
//!
//! Shared objects are opened with immediate symbol resolution and
//! process-local scope, so a page's `count`/`read` never collides with
//! another page's. Handles are cached per path; a recompile invalidates
//! the cache entry and outstanding handles keep the old mapping alive
//! until their owners drop.

use std::collections::HashMap;
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::debug;

use crate::common::{Error, Result};

/// Opens and caches shared-object handles.
#[derive(Default)]
#[derive(Debug)]
pub struct ArtifactLoader {
    cache: Mutex<HashMap<PathBuf, Arc<Library>>>,
}

impl ArtifactLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path`, reusing a cached handle when one exists.
    pub fn load(&self, path: &Path) -> Result<Arc<Library>> {
        let mut cache = self.cache.lock();
        if let Some(library) = cache.get(path) {
            return Ok(Arc::clone(library));
        }
        if !path.exists() {
            return Err(Error::not_found("artifact", path.display().to_string()));
        }
        debug!(path = %path.display(), "loading shared object");
        let library = Arc::new(open_library(path)?);
        cache.insert(path.to_path_buf(), Arc::clone(&library));
        Ok(library)
    }

    /// Drop the cached handle for `path`.
    ///
    /// Called after a recompile: the next `load` maps the new object,
    /// while holders of the old handle stay valid until they drop.
    pub fn invalidate(&self, path: &Path) {
        if self.cache.lock().remove(path).is_some() {
            debug!(path = %path.display(), "invalidated cached artifact");
        }
    }

    /// Number of cached handles (diagnostics and tests).
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library> {
    use libloading::os::unix;
    // RTLD_NOW | RTLD_LOCAL: fail on load, keep symbols page-private
    let library = unsafe { unix::Library::open(Some(path), unix::RTLD_NOW | unix::RTLD_LOCAL)? };
    Ok(library.into())
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library> {
    Ok(unsafe { Library::new(path)? })
}

type CountFn = unsafe extern "C" fn() -> c_int;
type ReadFn = unsafe extern "C" fn(c_int) -> *const c_void;

/// A loaded page artifact with its `count`/`read` accessors resolved.
///
/// The raw function pointers stay valid for as long as the `Arc`'d
/// library mapping is held, which this struct guarantees by owning one.
#[derive(Debug)]
pub struct LoadedPage {
    path: PathBuf,
    count_fn: CountFn,
    read_fn: ReadFn,
    _library: Arc<Library>,
}

impl LoadedPage {
    /// Load a page object and resolve its accessors.
    pub fn open(loader: &ArtifactLoader, path: &Path) -> Result<Self> {
        let library = loader.load(path)?;
        let (count_fn, read_fn) = unsafe {
            let count: CountFn = *library.get(b"count")?;
            let read: ReadFn = *library.get(b"read")?;
            (count, read)
        };
        Ok(Self {
            path: path.to_path_buf(),
            count_fn,
            read_fn,
            _library: library,
        })
    }

    /// Number of records in the page.
    pub fn count(&self) -> usize {
        let n = unsafe { (self.count_fn)() };
        n.max(0) as usize
    }

    /// Pointer to record `pos`.
    ///
    /// # Errors
    /// `NotFound` when `pos` is outside the page.
    pub fn record_ptr(&self, pos: usize) -> Result<*const u8> {
        let ptr = unsafe { (self.read_fn)(pos as c_int) };
        if ptr.is_null() {
            return Err(Error::not_found(
                "record",
                format!("{} position {pos}", self.path.display()),
            ));
        }
        Ok(ptr as *const u8)
    }

    /// Pointer to the start of the record array, `None` when empty.
    ///
    /// Kernels take this together with [`Self::count`].
    pub fn data_ptr(&self) -> Option<*const u8> {
        if self.count() == 0 {
            None
        } else {
            self.record_ptr(0).ok()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EngineConfig;
    use crate::compile::ArtifactCompiler;
    use std::fs;
    use tempfile::tempdir;

    fn build_fixture(dir: &Path, name: &str, source: &str) -> PathBuf {
        let compiler = ArtifactCompiler::new(dir.join("scripts"), &EngineConfig::default());
        let c_path = dir.join(format!("{name}.c"));
        let so_path = dir.join(format!("{name}.so"));
        fs::write(&c_path, source).unwrap();
        compiler.compile(&c_path, &so_path, &[]).unwrap();
        so_path
    }

    const PAGE_FIXTURE: &str = "\
static int data[3] = {10, 20, 30};\n\
int count(void) { return 3; }\n\
const void *read(int pos) {\n\
    if (pos < 0 || pos >= 3) return 0;\n\
    return &data[pos];\n\
}\n";

    #[test]
    fn test_load_missing_artifact() {
        let dir = tempdir().unwrap();
        let loader = ArtifactLoader::new();
        let err = loader.load(&dir.path().join("absent.so")).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "artifact", .. }));
    }

    #[test]
    fn test_load_caches_by_path() {
        let dir = tempdir().unwrap();
        let so = build_fixture(dir.path(), "cached", PAGE_FIXTURE);

        let loader = ArtifactLoader::new();
        let a = loader.load(&so).unwrap();
        let b = loader.load(&so).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.cached_count(), 1);

        loader.invalidate(&so);
        assert_eq!(loader.cached_count(), 0);
        let c = loader.load(&so).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_loaded_page_accessors() {
        let dir = tempdir().unwrap();
        let so = build_fixture(dir.path(), "page", PAGE_FIXTURE);

        let loader = ArtifactLoader::new();
        let page = LoadedPage::open(&loader, &so).unwrap();
        assert_eq!(page.count(), 3);

        let ptr = page.record_ptr(1).unwrap();
        let value = unsafe { *(ptr as *const i32) };
        assert_eq!(value, 20);

        assert!(page.record_ptr(3).is_err());
        assert!(page.data_ptr().is_some());
    }

    #[test]
    fn test_missing_symbol_is_load_error() {
        let dir = tempdir().unwrap();
        let so = build_fixture(dir.path(), "nosyms", "int unrelated(void) { return 1; }\n");

        let loader = ArtifactLoader::new();
        let err = LoadedPage::open(&loader, &so).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }
}
