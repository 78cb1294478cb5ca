//! Kernel pipeline - from an opaque source blob to a callable routine.
//!
//! A kernel is synthesized by the SQL layer (the engine never inspects
//! its body) and obeys one ABI:
//!
//! ```c
//! int {symbol}(void *data, int count, void *results, int max_results);
//! ```
//!
//! `data` points at `count` records of the table's record type; the
//! kernel copies at most `max_results` matching records into `results`
//! and returns how many it wrote. Kernels are reentrant and do not
//! mutate `data`.

use std::fs;
use std::os::raw::{c_int, c_void};
use std::path::PathBuf;
use std::sync::Arc;

use libloading::Library;
use tracing::debug;

use crate::common::{Error, PageId, Result};
use crate::compile::{ArtifactCompiler, ArtifactLoader};
use crate::storage::DatabaseLayout;

/// An opaque kernel handed over by the SQL layer.
#[derive(Debug, Clone)]
pub struct KernelSpec {
    /// Entry symbol; also names the emitted artifacts.
    pub symbol: String,
    /// Complete C source, including the record-header include.
    pub source: String,
}

impl KernelSpec {
    pub fn new(symbol: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
        }
    }
}

type KernelFn = unsafe extern "C" fn(*const c_void, c_int, *mut c_void, c_int) -> c_int;

/// A compiled, loaded, resolved kernel.
#[derive(Debug)]
pub struct LoadedKernel {
    symbol: String,
    entry: KernelFn,
    _library: Arc<Library>,
}

impl LoadedKernel {
    /// Run the kernel over an in-memory record block.
    ///
    /// `data` holds `count` records; at most `max_results` records are
    /// written into `results`. Returns the number of matches.
    ///
    /// # Safety contract
    /// The pointers must describe buffers of the table's record size
    /// times `count` / `max_results` bytes; the engine derives both from
    /// the same [`crate::schema::RecordLayout`] the kernel was compiled
    /// against.
    pub fn execute(
        &self,
        data: *const u8,
        count: usize,
        results: *mut u8,
        max_results: usize,
    ) -> Result<usize> {
        if count == 0 || max_results == 0 {
            return Ok(0);
        }
        let n = unsafe {
            (self.entry)(
                data as *const c_void,
                count as c_int,
                results as *mut c_void,
                max_results as c_int,
            )
        };
        if n < 0 || n as usize > max_results.min(count) {
            return Err(Error::Internal(format!(
                "kernel '{}' returned {n} matches for count={count} max={max_results}",
                self.symbol
            )));
        }
        Ok(n as usize)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

/// Builds kernels: write source, compile, load, resolve.
pub struct KernelPipeline {
    layout: DatabaseLayout,
    compiler: Arc<ArtifactCompiler>,
    loader: Arc<ArtifactLoader>,
}

impl KernelPipeline {
    pub fn new(
        layout: DatabaseLayout,
        compiler: Arc<ArtifactCompiler>,
        loader: Arc<ArtifactLoader>,
    ) -> Self {
        Self {
            layout,
            compiler,
            loader,
        }
    }

    /// Materialize a kernel for `table` (optionally one page of it).
    ///
    /// The source lands under `kernels/`, the object under `compiled/`.
    /// A crc32 sidecar next to the source lets an unchanged blob reuse
    /// the existing object without touching the toolchain.
    pub fn build(
        &self,
        spec: &KernelSpec,
        table: &str,
        page: Option<PageId>,
    ) -> Result<LoadedKernel> {
        validate_symbol(&spec.symbol)?;
        let source_path = self.layout.kernel_source(&spec.symbol, table, page);
        let object_path = self.layout.kernel_object(&spec.symbol, table, page);
        let crc_path = source_path.with_extension("crc");

        let checksum = crc32fast::hash(spec.source.as_bytes()).to_string();
        let unchanged = source_path.exists()
            && fs::read_to_string(&crc_path)
                .map(|stored| stored == checksum)
                .unwrap_or(false);
        if !unchanged {
            fs::create_dir_all(self.layout.kernels_dir())?;
            fs::write(&source_path, &spec.source)?;
            fs::write(&crc_path, &checksum)?;
            // stale object must not satisfy the freshness check
            self.loader.invalidate(&object_path);
        }
        debug!(symbol = %spec.symbol, table, unchanged, "building kernel");

        let includes: Vec<PathBuf> = vec![self.layout.table_dir(table)];
        self.compiler
            .compile(&source_path, &object_path, &includes)?;

        let library = self.loader.load(&object_path)?;
        let entry: KernelFn = unsafe { *library.get(spec.symbol.as_bytes())? };
        Ok(LoadedKernel {
            symbol: spec.symbol.clone(),
            entry,
            _library: library,
        })
    }
}

fn validate_symbol(symbol: &str) -> Result<()> {
    let ok = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !symbol.starts_with(|c: char| c.is_ascii_digit());
    if !ok {
        return Err(Error::InvalidArgument(format!(
            "kernel symbol '{symbol}' is not a valid C identifier"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EngineConfig;
    use tempfile::tempdir;

    fn pipeline(dir: &std::path::Path) -> KernelPipeline {
        let layout = DatabaseLayout::new(dir);
        layout.init().unwrap();
        layout.init_table("Nums").unwrap();
        let compiler = Arc::new(ArtifactCompiler::new(
            layout.scripts_dir(),
            &EngineConfig::default(),
        ));
        KernelPipeline::new(layout, compiler, Arc::new(ArtifactLoader::new()))
    }

    /// Copies every int greater than 5 into the result buffer.
    const FILTER_KERNEL: &str = "\
int pick_gt5(void *data, int count, void *results, int max_results) {\n\
    int *in = (int *)data;\n\
    int *out = (int *)results;\n\
    int found = 0;\n\
    for (int i = 0; i < count && found < max_results; i++) {\n\
        if (in[i] > 5) {\n\
            out[found++] = in[i];\n\
        }\n\
    }\n\
    return found;\n\
}\n";

    #[test]
    fn test_build_and_execute() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let kernel = pipeline
            .build(&KernelSpec::new("pick_gt5", FILTER_KERNEL), "Nums", None)
            .unwrap();

        let data: [i32; 6] = [1, 9, 3, 7, 5, 6];
        let mut results = [0i32; 6];
        let n = kernel
            .execute(
                data.as_ptr() as *const u8,
                data.len(),
                results.as_mut_ptr() as *mut u8,
                results.len(),
            )
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(&results[..n], &[9, 7, 6]);
    }

    #[test]
    fn test_execute_empty_input_short_circuits() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let kernel = pipeline
            .build(&KernelSpec::new("pick_gt5", FILTER_KERNEL), "Nums", None)
            .unwrap();
        let mut results = [0i32; 1];
        let n = kernel
            .execute(std::ptr::null(), 0, results.as_mut_ptr() as *mut u8, 1)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_unchanged_source_reuses_object() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let spec = KernelSpec::new("pick_gt5", FILTER_KERNEL);

        pipeline.build(&spec, "Nums", None).unwrap();
        let object = pipeline.layout.kernel_object("pick_gt5", "Nums", None);
        let first_mtime = std::fs::metadata(&object).unwrap().modified().unwrap();

        pipeline.build(&spec, "Nums", None).unwrap();
        let second_mtime = std::fs::metadata(&object).unwrap().modified().unwrap();
        assert_eq!(first_mtime, second_mtime);
    }

    #[test]
    fn test_changed_source_rebuilds() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline
            .build(&KernelSpec::new("pick_gt5", FILTER_KERNEL), "Nums", None)
            .unwrap();
        // same symbol, different predicate
        let changed = FILTER_KERNEL.replace("> 5", "> 100");
        let kernel = pipeline
            .build(&KernelSpec::new("pick_gt5", changed), "Nums", None)
            .unwrap();

        let data: [i32; 3] = [1, 9, 7];
        let mut results = [0i32; 3];
        let n = kernel
            .execute(
                data.as_ptr() as *const u8,
                3,
                results.as_mut_ptr() as *mut u8,
                3,
            )
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_bad_symbol_rejected() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let err = pipeline
            .build(&KernelSpec::new("1bad-name", "int x;"), "Nums", None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
