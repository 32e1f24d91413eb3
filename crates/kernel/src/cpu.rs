//! Reference CPU implementation of `ForceEvaluator`.
//!
//! Plain O(N²) double-precision sum with the same softening law as the GPU
//! kernel. Used to check the GPU path and as the backend when no device is
//! wanted.

use crate::bodies::ForceInput;
use crate::config::{validate_softening, DEFAULT_SOFTENING};
use crate::error::ForceResult;
use crate::ForceEvaluator;

/// Direct-sum CPU force evaluator.
#[derive(Debug, Clone)]
pub struct CpuForceKernel {
    softening: f64,
}

impl Default for CpuForceKernel {
    fn default() -> Self {
        Self {
            softening: DEFAULT_SOFTENING,
        }
    }
}

impl CpuForceKernel {
    /// Create an evaluator with the given softening epsilon.
    pub fn new(softening: f64) -> ForceResult<Self> {
        validate_softening(softening)?;
        Ok(Self { softening })
    }

    /// Softening epsilon in use.
    pub fn softening(&self) -> f64 {
        self.softening
    }
}

/// Plummer-softened acceleration on every body of `input`, written stride-3
/// into `out`.
fn direct_sum(input: &ForceInput<'_>, g: f64, softening: f64, out: &mut [f64]) {
    let pos = input.positions;
    for i in 0..input.n {
        let (xi, yi, zi) = (pos[3 * i], pos[3 * i + 1], pos[3 * i + 2]);
        let mut acc = [0.0_f64; 3];
        for j in 0..input.n {
            if j == i {
                continue;
            }
            let dx = pos[3 * j] - xi;
            let dy = pos[3 * j + 1] - yi;
            let dz = pos[3 * j + 2] - zi;
            let dist_sqr = dx * dx + dy * dy + dz * dz + softening;
            let inv_dist = 1.0 / dist_sqr.sqrt();
            let s = g * input.masses[j] * inv_dist * inv_dist * inv_dist;
            acc[0] += dx * s;
            acc[1] += dy * s;
            acc[2] += dz * s;
        }
        out[3 * i..3 * i + 3].copy_from_slice(&acc);
    }
}

impl ForceEvaluator for CpuForceKernel {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn evaluate_forces(
        &mut self,
        positions: &[f64],
        n: usize,
        g: f64,
        masses: Option<&[f64]>,
        _radii: Option<&[f64]>,
        accelerations: &mut [f64],
    ) -> ForceResult<()> {
        let input = ForceInput::new(positions, n, masses, accelerations.len())?;
        direct_sum(&input, g, self.softening, accelerations);
        Ok(())
    }

    fn finalize(&mut self) {}
}
