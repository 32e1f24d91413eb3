//! Direct-Sum Gravity Force Kernel
//!
//! This crate computes pairwise gravitational accelerations for N point
//! bodies, once per integrator step. The GPU backend keeps a compiled kernel
//! and device-resident buffers alive across calls and only rebuilds them when
//! it has to.
//!
//! # Modules
//! - [`bodies`] -- Flat stride-3 body storage and input validation.
//! - [`strategy`] -- Naive and tiled dispatch strategies and launch geometry.
//! - [`config`] -- Evaluator settings and kernel source handling.
//! - [`cpu`] -- Reference double-precision direct sum.
//! - [`error`] -- `ForceError` and `ForceResult`.
//! - `gpu` -- wgpu backend (feature `gpu`).

#![warn(missing_docs)]

pub mod bodies;
pub mod config;
pub mod cpu;
pub mod error;
pub mod strategy;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use bodies::{BodySystem, ForceInput};
pub use config::{GpuForceConfig, KernelSource, DEFAULT_SOFTENING, MIN_SOFTENING};
pub use cpu::CpuForceKernel;
pub use error::{ForceError, ForceResult};
pub use strategy::{DispatchGeometry, DispatchStrategy, THREADS_PER_BODY, TILE_WIDTH};

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, CapacityState, GpuCallProfile, GpuForceKernel};

// ---------------------------------------------------------------------------
// ForceEvaluator trait
// ---------------------------------------------------------------------------

/// Trait that every force back-end (CPU reference, GPU) implements.
///
/// An evaluator reads body state from the caller's slices, writes
/// accelerations into the caller's output slice and keeps no reference to
/// either after returning. Calls are blocking.
pub trait ForceEvaluator {
    /// Short backend name for logs and reports.
    fn name(&self) -> &'static str;

    /// Compute the acceleration on each of `n` bodies.
    ///
    /// * `positions` - stride-3 positions, at least `3 * n` values.
    /// * `g` - gravitational constant; masses are scaled by it.
    /// * `masses` - one per body; `None` is rejected with
    ///   [`ForceError::MissingMasses`].
    /// * `radii` - accepted for interface symmetry with other backends, unused.
    /// * `accelerations` - stride-3 output, at least `3 * n` values.
    fn evaluate_forces(
        &mut self,
        positions: &[f64],
        n: usize,
        g: f64,
        masses: Option<&[f64]>,
        radii: Option<&[f64]>,
        accelerations: &mut [f64],
    ) -> ForceResult<()>;

    /// Release every resource the evaluator holds. It stays usable and
    /// reacquires what it needs on the next call.
    fn finalize(&mut self);

    /// Evaluate for a whole [`BodySystem`].
    fn evaluate_system(
        &mut self,
        bodies: &BodySystem,
        g: f64,
        accelerations: &mut [f64],
    ) -> ForceResult<()> {
        self.evaluate_forces(
            &bodies.positions,
            bodies.len(),
            g,
            Some(&bodies.masses),
            Some(&bodies.radii),
            accelerations,
        )
    }
}

impl<E: ForceEvaluator + ?Sized> ForceEvaluator for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn evaluate_forces(
        &mut self,
        positions: &[f64],
        n: usize,
        g: f64,
        masses: Option<&[f64]>,
        radii: Option<&[f64]>,
        accelerations: &mut [f64],
    ) -> ForceResult<()> {
        (**self).evaluate_forces(positions, n, g, masses, radii, accelerations)
    }

    fn finalize(&mut self) {
        (**self).finalize()
    }
}

impl<E: ForceEvaluator + ?Sized> ForceEvaluator for &mut E {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn evaluate_forces(
        &mut self,
        positions: &[f64],
        n: usize,
        g: f64,
        masses: Option<&[f64]>,
        radii: Option<&[f64]>,
        accelerations: &mut [f64],
    ) -> ForceResult<()> {
        (**self).evaluate_forces(positions, n, g, masses, radii, accelerations)
    }

    fn finalize(&mut self) {
        (**self).finalize()
    }
}
