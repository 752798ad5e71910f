//! Notebook environment inspection

pub mod inspector;
pub mod kernel;

pub use inspector::EnvironmentInspector;
pub use kernel::{Kernel, KernelCommand, KernelOutput, ProcessKernel};
