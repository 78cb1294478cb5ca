//! Artifact compiler - turns one generated C source into a shared object.
//!
//! Every build is materialized as a small shell script under `scripts/`
//! before it runs, so a failing build can be re-run by hand. A build is
//! skipped entirely when the output is already newer than the source.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{EngineConfig, Error, Result};

/// Outcome of a successful [`ArtifactCompiler::compile`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compiled {
    /// The existing output was newer than the source; nothing ran.
    Fresh,
    /// The toolchain ran and produced a new output.
    Rebuilt,
}

/// Drives the C toolchain for page, index and kernel artifacts.
pub struct ArtifactCompiler {
    scripts_dir: PathBuf,
    compiler: String,
    extra_cflags: Vec<String>,
    /// Monotonic sequence for script file names.
    script_seq: Mutex<u64>,
}

impl ArtifactCompiler {
    /// Create a compiler writing its build scripts under `scripts_dir`.
    pub fn new(scripts_dir: PathBuf, config: &EngineConfig) -> Self {
        Self {
            scripts_dir,
            compiler: config.resolved_compiler(),
            extra_cflags: config.extra_cflags.clone(),
            script_seq: Mutex::new(0),
        }
    }

    /// Compile `source` into the shared object `output`.
    ///
    /// Idempotent: an output newer than its source is accepted as-is and
    /// reported as [`Compiled::Fresh`].
    ///
    /// # Errors
    /// `Compile` when the source is missing, the toolchain exits
    /// non-zero (stderr captured in the error), or no output appears.
    pub fn compile(&self, source: &Path, output: &Path, includes: &[PathBuf]) -> Result<Compiled> {
        if !source.exists() {
            return Err(Error::Compile {
                artifact: output.display().to_string(),
                detail: format!("source {} does not exist", source.display()),
            });
        }
        if is_up_to_date(source, output) {
            debug!(output = %output.display(), "artifact up to date, skipping build");
            return Ok(Compiled::Fresh);
        }

        let script = self.write_script(source, output, includes)?;
        debug!(
            source = %source.display(),
            output = %output.display(),
            script = %script.display(),
            "compiling artifact"
        );

        let run = Command::new("sh").arg(&script).output().map_err(|e| Error::Compile {
            artifact: output.display().to_string(),
            detail: format!("failed to spawn build script: {e}"),
        })?;
        if !run.status.success() {
            return Err(Error::Compile {
                artifact: output.display().to_string(),
                detail: String::from_utf8_lossy(&run.stderr).into_owned(),
            });
        }
        if !output.exists() {
            return Err(Error::Compile {
                artifact: output.display().to_string(),
                detail: "toolchain exited successfully but produced no output".into(),
            });
        }
        Ok(Compiled::Rebuilt)
    }

    /// Emit the per-build shell script and return its path.
    fn write_script(&self, source: &Path, output: &Path, includes: &[PathBuf]) -> Result<PathBuf> {
        fs::create_dir_all(&self.scripts_dir)?;
        let seq = {
            let mut guard = self.script_seq.lock();
            *guard += 1;
            *guard
        };
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let path = self.scripts_dir.join(format!("build_{seq:05}_{stem}.sh"));

        let mut cmd = format!("#!/bin/sh\nexec {} -fPIC -shared -O2 -g", self.compiler);
        for flag in &self.extra_cflags {
            cmd.push(' ');
            cmd.push_str(flag);
        }
        for include in includes {
            cmd.push_str(&format!(" -I{}", shell_quote(include)));
        }
        cmd.push_str(&format!(
            " -o {} {}\n",
            shell_quote(output),
            shell_quote(source)
        ));
        fs::write(&path, cmd)?;
        Ok(path)
    }
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let mtime = |p: &Path| -> Option<SystemTime> { fs::metadata(p).ok()?.modified().ok() };
    match (mtime(source), mtime(output)) {
        (Some(src), Some(out)) => out > src,
        _ => false,
    }
}

fn shell_quote(path: &Path) -> String {
    // paths come from our own layout; quoting guards against spaces
    format!("'{}'", path.display().to_string().replace('\'', "'\\''"))
}
