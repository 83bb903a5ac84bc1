//! Accelerator selection
//!
//! The preferred device is recorded with every trial. The ndarray kernels
//! always execute on the host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    Mps,
    Cuda,
    Cpu,
}

impl Accelerator {
    /// MPS on Apple Silicon, else CUDA when a device is visible, else CPU
    pub fn detect() -> Self {
        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            return Accelerator::Mps;
        }
        let cuda_visible = std::env::var("CUDA_VISIBLE_DEVICES")
            .map(|v| !v.trim().is_empty() && v.trim() != "-1")
            .unwrap_or(false);
        if cuda_visible || Path::new("/dev/nvidia0").exists() {
            return Accelerator::Cuda;
        }
        Accelerator::Cpu
    }

    /// Device for a model family; some families are pinned to the CPU
    pub fn for_family(self, requires_cpu: bool) -> Self {
        if requires_cpu {
            Accelerator::Cpu
        } else {
            self
        }
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Accelerator::Mps => "mps",
            Accelerator::Cuda => "cuda",
            Accelerator::Cpu => "cpu",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_families_run_on_cpu() {
        assert_eq!(Accelerator::Mps.for_family(true), Accelerator::Cpu);
        assert_eq!(Accelerator::Cuda.for_family(false), Accelerator::Cuda);
    }

    #[test]
    fn displays_lowercase() {
        assert_eq!(Accelerator::Mps.to_string(), "mps");
    }
}
