//! The compile-and-load pipeline shared by pages, indices and kernels.
//!
//! Generated C sources become shared objects through three collaborators:
//! - [`ArtifactCompiler`] - writes a build script and drives the toolchain
//! - [`ArtifactLoader`] - opens shared objects and caches the handles
//! - [`KernelPipeline`] - turns an opaque kernel source blob into a
//!   callable [`LoadedKernel`]

mod compiler;
mod kernel;
mod loader;

pub use compiler::{ArtifactCompiler, Compiled};
pub use kernel::{KernelPipeline, KernelSpec, LoadedKernel};
pub use loader::{ArtifactLoader, LoadedPage};
