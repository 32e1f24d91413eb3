//! Kick-drift-kick leapfrog driver
//!
//! The runner owns the body state and calls its force evaluator exactly once
//! per step. It is deliberately small: fixed timestep, no output besides
//! energy reports.

use std::time::Instant;

use kernel::{BodySystem, ForceError, ForceEvaluator};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from a leapfrog run
#[derive(Debug, Error)]
pub enum RunError {
    /// The run parameters are unusable
    #[error("invalid run: {0}")]
    Invalid(String),

    /// Building the evaluator failed
    #[error("evaluator setup failed: {0}")]
    Setup(#[from] ForceError),

    /// The evaluator failed during a step
    #[error("force evaluation failed at step {step}: {source}")]
    Force {
        /// Step that was being taken
        step: u64,
        /// Underlying evaluator error
        #[source]
        source: ForceError,
    },
}

/// Energy bookkeeping at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyReport {
    /// Steps taken so far
    pub step: u64,
    /// Simulated time
    pub time: f64,
    /// Total kinetic energy
    pub kinetic: f64,
    /// Total pairwise potential energy
    pub potential: f64,
}

impl EnergyReport {
    /// Kinetic plus potential
    pub fn total(&self) -> f64 {
        self.kinetic + self.potential
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Backend that computed the forces
    pub backend: &'static str,
    /// Energy before the first step
    pub initial: EnergyReport,
    /// Energy after the last step
    pub last: EnergyReport,
    /// Wall-clock seconds spent stepping
    pub elapsed_secs: f64,
}

impl RunSummary {
    /// |E_last - E_initial| / |E_initial|
    pub fn relative_energy_drift(&self) -> f64 {
        let e0 = self.initial.total();
        (self.last.total() - e0).abs() / e0.abs().max(f64::MIN_POSITIVE)
    }
}

/// Fixed-step leapfrog integrator around one force evaluator
pub struct LeapfrogRunner<E: ForceEvaluator> {
    evaluator: E,
    bodies: BodySystem,
    accelerations: Vec<f64>,
    g: f64,
    dt: f64,
    step: u64,
    time: f64,
    primed: bool,
}

impl<E: ForceEvaluator> LeapfrogRunner<E> {
    /// Create a runner. Forces are first evaluated on the first step.
    pub fn new(evaluator: E, bodies: BodySystem, g: f64, dt: f64) -> Result<Self, RunError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RunError::Invalid(format!("dt must be positive, got {dt}")));
        }
        if bodies.is_empty() {
            return Err(RunError::Invalid("no bodies to integrate".to_string()));
        }
        let accelerations = vec![0.0; 3 * bodies.len()];
        Ok(Self {
            evaluator,
            bodies,
            accelerations,
            g,
            dt,
            step: 0,
            time: 0.0,
            primed: false,
        })
    }

    /// Current body state
    pub fn bodies(&self) -> &BodySystem {
        &self.bodies
    }

    /// Accelerations from the most recent evaluation
    pub fn accelerations(&self) -> &[f64] {
        &self.accelerations
    }

    /// Steps taken so far
    pub fn step_count(&self) -> u64 {
        self.step
    }

    fn evaluate(&mut self) -> Result<(), RunError> {
        let step = self.step;
        self.evaluator
            .evaluate_system(&self.bodies, self.g, &mut self.accelerations)
            .map_err(|source| RunError::Force { step, source })
    }

    fn kick(&mut self, h: f64) {
        for (v, a) in self.bodies.velocities.iter_mut().zip(&self.accelerations) {
            *v += a * h;
        }
    }

    fn drift(&mut self, h: f64) {
        for (x, v) in self.bodies.positions.iter_mut().zip(&self.bodies.velocities) {
            *x += v * h;
        }
    }

    /// Advance one step.
    pub fn step(&mut self) -> Result<(), RunError> {
        if !self.primed {
            self.evaluate()?;
            self.primed = true;
        }
        let half = 0.5 * self.dt;
        self.kick(half);
        self.drift(self.dt);
        self.evaluate()?;
        self.kick(half);
        self.step += 1;
        self.time += self.dt;
        Ok(())
    }

    /// Kinetic and potential energy of the current state
    pub fn energy(&self) -> EnergyReport {
        let b = &self.bodies;
        let n = b.len();
        let mut kinetic = 0.0;
        for i in 0..n {
            let v = &b.velocities[3 * i..3 * i + 3];
            kinetic += 0.5 * b.masses[i] * (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]);
        }
        let mut potential = 0.0;
        for i in 0..n {
            let pi = b.position(i);
            for j in (i + 1)..n {
                let pj = b.position(j);
                let r = ((pi[0] - pj[0]).powi(2) + (pi[1] - pj[1]).powi(2) + (pi[2] - pj[2]).powi(2))
                    .sqrt();
                if r > 0.0 {
                    potential -= self.g * b.masses[i] * b.masses[j] / r;
                }
            }
        }
        EnergyReport {
            step: self.step,
            time: self.time,
            kinetic,
            potential,
        }
    }

    /// Take `steps` steps, logging an energy report every `report_every`
    /// steps (0 disables).
    pub fn run(&mut self, steps: u64, report_every: u64) -> Result<RunSummary, RunError> {
        let initial = self.energy();
        info!(
            backend = self.evaluator.name(),
            bodies = self.bodies.len(),
            steps,
            dt = self.dt,
            energy = initial.total(),
            "starting leapfrog run"
        );
        let start = Instant::now();
        for _ in 0..steps {
            self.step()?;
            if report_every > 0 && self.step % report_every == 0 {
                let e = self.energy();
                debug!(
                    step = e.step,
                    time = e.time,
                    kinetic = e.kinetic,
                    potential = e.potential,
                    total = e.total(),
                    "energy"
                );
            }
        }
        let summary = RunSummary {
            backend: self.evaluator.name(),
            initial,
            last: self.energy(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            steps = self.step,
            elapsed_secs = summary.elapsed_secs,
            drift = summary.relative_energy_drift(),
            "leapfrog run finished"
        );
        Ok(summary)
    }

    /// Release the evaluator's resources and hand back the final state.
    pub fn finish(mut self) -> BodySystem {
        self.evaluator.finalize();
        self.bodies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::CpuForceKernel;

    #[test]
    fn rejects_bad_timestep() {
        let mut bodies = BodySystem::new();
        bodies.push_body([0.0; 3], [0.0; 3], 1.0);
        let err = LeapfrogRunner::new(CpuForceKernel::default(), bodies, 1.0, 0.0)
            .err()
            .unwrap();
        assert!(matches!(err, RunError::Invalid(_)));
    }

    #[test]
    fn free_body_moves_in_a_straight_line() {
        let mut bodies = BodySystem::new();
        bodies.push_body([0.0; 3], [1.0, 2.0, 0.0], 1.0);
        let mut runner = LeapfrogRunner::new(CpuForceKernel::default(), bodies, 1.0, 0.1).unwrap();
        for _ in 0..10 {
            runner.step().unwrap();
        }
        let p = runner.bodies().position(0);
        assert!((p[0] - 1.0).abs() < 1e-12);
        assert!((p[1] - 2.0).abs() < 1e-12);
        assert_eq!(runner.step_count(), 10);
    }

    #[test]
    fn energy_of_static_pair() {
        let mut bodies = BodySystem::new();
        bodies.push_body([0.0; 3], [0.0; 3], 2.0);
        bodies.push_body([4.0, 0.0, 0.0], [0.0; 3], 3.0);
        let runner = LeapfrogRunner::new(CpuForceKernel::default(), bodies, 1.0, 0.1).unwrap();
        let e = runner.energy();
        assert_eq!(e.kinetic, 0.0);
        assert!((e.potential + 1.5).abs() < 1e-15);
    }
}
