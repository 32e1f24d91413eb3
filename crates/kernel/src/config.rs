//! Evaluator configuration and kernel source handling.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ForceError, ForceResult};
use crate::strategy::{DispatchStrategy, NAIVE_WORKGROUP_SIZE};

/// Softening added to the squared separation of every pair.
pub const DEFAULT_SOFTENING: f64 = 1.0e-12;

/// Smallest softening accepted.
///
/// The kernel computes `(r² + ε)^-1.5` in f32; for `ε` below about `2e-26`
/// that overflows to infinity at zero separation.
pub const MIN_SOFTENING: f64 = 1.0e-24;

/// Upper bound on adapters inspected while looking for an accelerator.
pub const MAX_ADAPTERS: usize = 4;

/// Largest kernel source file accepted from disk.
pub const MAX_KERNEL_SOURCE_BYTES: u64 = 0x10000;

/// The force kernel shipped with the crate.
pub const EMBEDDED_KERNEL: &str = include_str!("gpu/shaders/force.wgsl");

/// Where the WGSL force kernel comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelSource {
    /// The kernel compiled into the crate.
    #[default]
    Embedded,
    /// Kernel text supplied directly.
    Inline(String),
    /// Kernel text read from a file when the session is built.
    File(PathBuf),
}

impl KernelSource {
    /// Return the kernel text.
    pub fn load(&self) -> ForceResult<String> {
        match self {
            KernelSource::Embedded => Ok(EMBEDDED_KERNEL.to_owned()),
            KernelSource::Inline(text) => Ok(text.clone()),
            KernelSource::File(path) => {
                let meta = fs::metadata(path).map_err(|e| ForceError::KernelSource {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                if meta.len() > MAX_KERNEL_SOURCE_BYTES {
                    return Err(ForceError::KernelSource {
                        path: path.clone(),
                        reason: format!(
                            "{} bytes exceeds the {} byte limit",
                            meta.len(),
                            MAX_KERNEL_SOURCE_BYTES
                        ),
                    });
                }
                fs::read_to_string(path).map_err(|e| ForceError::KernelSource {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Kernel text with the geometry constants for `strategy` prepended.
    ///
    /// Kernel sources refer to `TILE_WIDTH`, `THREADS_PER_BODY`, `TILE_SIZE`
    /// and `NAIVE_WORKGROUP_SIZE` without defining them.
    pub fn compose(&self, strategy: &DispatchStrategy) -> ForceResult<String> {
        let body = self.load()?;
        Ok(format!("{}\n{}", kernel_prelude(strategy), body))
    }
}

/// WGSL constant declarations for the chosen geometry.
pub fn kernel_prelude(strategy: &DispatchStrategy) -> String {
    let tile_width = strategy.tile_width();
    let threads = strategy.threads_per_body();
    format!(
        "const TILE_WIDTH: u32 = {tile_width}u;\n\
         const THREADS_PER_BODY: u32 = {threads}u;\n\
         const TILE_SIZE: u32 = {}u;\n\
         const NAIVE_WORKGROUP_SIZE: u32 = {NAIVE_WORKGROUP_SIZE}u;\n",
        tile_width * threads
    )
}

/// Settings for [`crate::gpu::GpuForceKernel`].
///
/// Strategy and tile geometry are compiled into the kernel when the session
/// is built; changing them needs a fresh session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuForceConfig {
    /// Work partitioning.
    #[serde(default)]
    pub strategy: DispatchStrategy,
    /// Softening epsilon added to squared separations.
    #[serde(default = "default_softening")]
    pub softening: f64,
    /// Kernel text origin.
    #[serde(default)]
    pub kernel_source: KernelSource,
    /// Adapters to inspect before giving up.
    #[serde(default = "default_max_adapters")]
    pub max_adapters: usize,
    /// Accept CPU-emulated adapters (e.g. lavapipe) when no GPU is present.
    #[serde(default)]
    pub allow_software_adapter: bool,
}

fn default_softening() -> f64 {
    DEFAULT_SOFTENING
}

fn default_max_adapters() -> usize {
    MAX_ADAPTERS
}

impl Default for GpuForceConfig {
    fn default() -> Self {
        Self {
            strategy: DispatchStrategy::default(),
            softening: DEFAULT_SOFTENING,
            kernel_source: KernelSource::Embedded,
            max_adapters: MAX_ADAPTERS,
            allow_software_adapter: false,
        }
    }
}

impl GpuForceConfig {
    /// Default settings with the given strategy.
    pub fn with_strategy(strategy: DispatchStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Check every field.
    pub fn validate(&self) -> ForceResult<()> {
        self.strategy.validate()?;
        validate_softening(self.softening)?;
        if self.max_adapters == 0 {
            return Err(ForceError::InvalidConfig(
                "max_adapters must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Softening must be finite and at least [`MIN_SOFTENING`].
pub(crate) fn validate_softening(softening: f64) -> ForceResult<()> {
    if !(softening.is_finite() && softening >= MIN_SOFTENING) {
        return Err(ForceError::InvalidConfig(format!(
            "softening must be finite and at least {MIN_SOFTENING:e}, got {softening:e}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GpuForceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_adapters, 4);
    }

    #[test]
    fn test_softening_must_be_positive() {
        let mut config = GpuForceConfig::default();
        config.softening = 0.0;
        assert!(config.validate().is_err());
        config.softening = -1.0;
        assert!(config.validate().is_err());
        config.softening = 1e-200;
        assert!(config.validate().is_err(), "underflows to zero in f32");
        config.softening = 1e-6;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_softening_below_f32_range_rejected() {
        let mut config = GpuForceConfig::default();
        config.softening = 1e-30;
        assert!(config.validate().is_err());
        config.softening = MIN_SOFTENING;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_softening_keeps_self_term_finite() {
        // Same arithmetic as the kernel's accumulate() at zero separation
        let eps = MIN_SOFTENING as f32;
        let inv_dist = 1.0 / (0.0_f32 + eps).sqrt();
        let inv_dist3 = inv_dist * inv_dist * inv_dist;
        assert!(inv_dist3.is_finite());
        assert_eq!(0.0_f32 * (1.0e6_f32 * inv_dist3), 0.0);
    }

    #[test]
    fn test_prelude_matches_strategy() {
        let prelude = kernel_prelude(&DispatchStrategy::tiled());
        assert!(prelude.contains("const TILE_WIDTH: u32 = 32u;"));
        assert!(prelude.contains("const THREADS_PER_BODY: u32 = 8u;"));
        assert!(prelude.contains("const TILE_SIZE: u32 = 256u;"));

        let naive = kernel_prelude(&DispatchStrategy::Naive);
        assert!(naive.contains("const TILE_SIZE: u32 = 1u;"));
        assert!(naive.contains("const NAIVE_WORKGROUP_SIZE: u32 = 64u;"));
    }

    #[test]
    fn test_embedded_kernel_exposes_entry_points() {
        for entry in [
            crate::strategy::NAIVE_ENTRY_POINT,
            crate::strategy::TILED_ENTRY_POINT,
            crate::strategy::TILED_MT_ENTRY_POINT,
        ] {
            assert!(
                EMBEDDED_KERNEL.contains(&format!("fn {entry}(")),
                "missing entry point {entry}"
            );
        }
    }

    #[test]
    fn test_inline_source_is_composed() {
        let source = KernelSource::Inline("// body".into());
        let text = source.compose(&DispatchStrategy::Naive).unwrap();
        assert!(text.starts_with("const TILE_WIDTH"));
        assert!(text.ends_with("// body"));
    }

    #[test]
    fn test_file_source_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "force_kernel_{}.wgsl",
            std::process::id()
        ));
        fs::write(&path, "// from disk").unwrap();
        let text = KernelSource::File(path.clone()).load().unwrap();
        assert_eq!(text, "// from disk");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_reports_path() {
        let path = PathBuf::from("/nonexistent/force_kernel.wgsl");
        let err = KernelSource::File(path.clone()).load().unwrap_err();
        match err {
            ForceError::KernelSource { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_json_defaults() {
        let config: GpuForceConfig =
            serde_json::from_str(r#"{"strategy":{"kind":"naive"}}"#).unwrap();
        assert_eq!(config.strategy, DispatchStrategy::Naive);
        assert_eq!(config.softening, DEFAULT_SOFTENING);
        assert_eq!(config.kernel_source, KernelSource::Embedded);
        assert!(!config.allow_software_adapter);
    }
}
