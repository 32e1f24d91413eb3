//! Error types for force evaluation.
//!
//! Every fallible operation in this crate returns [`ForceResult`]. Nothing here
//! retries or falls back to another backend; the caller decides whether a
//! failure aborts the run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while acquiring devices, building kernels, moving data or
/// validating caller input.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForceError {
    /// No accelerator-class adapter was found on any inspected backend.
    #[error("no suitable accelerator found ({inspected} adapter(s) inspected)")]
    NoAccelerator {
        /// Number of adapters that were inspected.
        inspected: usize,
    },

    /// The adapter refused to create a device and queue.
    #[error("device request failed: {0}")]
    DeviceRequest(String),

    /// The device limits cannot host the configured dispatch geometry.
    #[error("dispatch geometry not supported by device: {0}")]
    UnsupportedGeometry(String),

    /// The kernel source could not be read.
    #[error("failed to load kernel source from {path:?}: {reason}")]
    KernelSource {
        /// Path the source was loaded from.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    /// The kernel failed to compile or the pipeline failed validation.
    #[error("kernel build failed for entry point `{entry_point}`:\n{log}")]
    KernelBuild {
        /// Entry point the pipeline was created for.
        entry_point: String,
        /// Build diagnostics reported by the shader compiler.
        log: String,
    },

    /// Host or device memory for a buffer generation could not be allocated.
    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    /// The body count needs more workgroups than the device can launch.
    #[error("{bodies} bodies need {workgroups} workgroups, device limit is {limit}")]
    CapacityExceeded {
        /// Requested body count.
        bodies: usize,
        /// Workgroups the dispatch would need along x.
        workgroups: u32,
        /// Device limit per dimension.
        limit: u32,
    },

    /// Upload, kernel launch or submission reported an error.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Mapping the result buffer back to the host failed.
    #[error("readback failed: {0}")]
    Readback(String),

    /// Masses were not supplied; the force sum is undefined without them.
    #[error("masses must be provided")]
    MissingMasses,

    /// An input or output slice does not match the body count.
    #[error("`{array}` holds {actual} values, expected at least {expected}")]
    LengthMismatch {
        /// Name of the offending array.
        array: &'static str,
        /// Values required for the body count.
        expected: usize,
        /// Values actually supplied.
        actual: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for force evaluation.
pub type ForceResult<T> = Result<T, ForceError>;

impl ForceError {
    /// Whether this error means "no GPU here" rather than a real failure.
    ///
    /// Tests and tools use this to skip GPU work on headless machines.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ForceError::NoAccelerator { .. } | ForceError::DeviceRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_failing_array() {
        let err = ForceError::LengthMismatch {
            array: "positions",
            expected: 9,
            actual: 6,
        };
        let msg = err.to_string();
        assert!(msg.contains("positions"));
        assert!(msg.contains('9'));
        assert!(msg.contains('6'));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(ForceError::NoAccelerator { inspected: 0 }.is_unavailable());
        assert!(!ForceError::MissingMasses.is_unavailable());
        assert!(!ForceError::Readback("lost".into()).is_unavailable());
    }
}
