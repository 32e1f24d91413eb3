//! Circular-orbit reference test
//!
//! Integrates a two-body circular orbit with the leapfrog runner on the CPU
//! reference evaluator and checks energy drift, momentum and the orbital
//! period against the analytical values.

use kernel::{CpuForceKernel, ForceEvaluator};
use orchestrator::{run, Backend, LeapfrogRunner, RunConfig, Scenario};

fn config_path(name: &str) -> String {
    format!("{}/../../configs/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_circular_orbit_energy_drift() {
    let config = RunConfig::load(&config_path("two_body.json")).unwrap();
    assert_eq!(config.backend, Backend::Cpu);

    let summary = run(&config).unwrap();
    let drift = summary.relative_energy_drift();
    println!("energy drift over {} steps: {drift:.3e}", config.steps);
    assert!(drift < 1e-4, "energy drift {drift:.3e} too large");
    assert!(summary.initial.total() < 0.0, "orbit should be bound");
}

#[test]
fn test_orbit_returns_after_one_period() {
    // Equal masses m at separation d: T = 2 pi sqrt(d^3 / (G * 2m))
    let (d, m, g): (f64, f64, f64) = (1.0, 1.0, 1.0);
    let period = std::f64::consts::TAU * (d * d * d / (g * 2.0 * m)).sqrt();
    let steps = 4000;
    let dt = period / steps as f64;

    let bodies = Scenario::TwoBody {
        separation: d,
        mass: m,
    }
    .build(g);
    let start = bodies.position(1);
    let mut runner = LeapfrogRunner::new(CpuForceKernel::default(), bodies, g, dt).unwrap();
    for _ in 0..steps {
        runner.step().unwrap();
    }
    let end = runner.bodies().position(1);
    let miss = ((end[0] - start[0]).powi(2) + (end[1] - start[1]).powi(2)).sqrt();
    assert!(miss < 1e-3, "body 1 missed its start by {miss:.3e}");
}

#[test]
fn test_ring_momentum_conserved() {
    let bodies = Scenario::Ring {
        count: 16,
        radius: 5.0,
        central_mass: 100.0,
        satellite_mass: 0.01,
    }
    .build(1.0);
    let momentum = |b: &kernel::BodySystem| {
        let mut p = [0.0; 3];
        for i in 0..b.len() {
            for axis in 0..3 {
                p[axis] += b.masses[i] * b.velocities[3 * i + axis];
            }
        }
        p
    };
    let p0 = momentum(&bodies);

    let mut runner = LeapfrogRunner::new(CpuForceKernel::default(), bodies, 1.0, 1e-3).unwrap();
    runner.run(500, 0).unwrap();
    let p1 = momentum(runner.bodies());
    for axis in 0..3 {
        assert!(
            (p1[axis] - p0[axis]).abs() < 1e-10,
            "axis {axis}: momentum changed from {} to {}",
            p0[axis],
            p1[axis]
        );
    }
}

#[test]
fn test_sample_configs_parse() {
    for name in ["two_body.json", "ring.json", "cluster.json"] {
        let config = RunConfig::load(&config_path(name))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(!config.scenario.build(config.g).is_empty());
    }
}

#[test]
fn test_evaluator_is_finalized_by_finish() {
    struct Counting {
        inner: CpuForceKernel,
        calls: usize,
        finalized: bool,
    }
    impl ForceEvaluator for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn evaluate_forces(
            &mut self,
            positions: &[f64],
            n: usize,
            g: f64,
            masses: Option<&[f64]>,
            radii: Option<&[f64]>,
            accelerations: &mut [f64],
        ) -> kernel::ForceResult<()> {
            self.calls += 1;
            self.inner
                .evaluate_forces(positions, n, g, masses, radii, accelerations)
        }
        fn finalize(&mut self) {
            self.finalized = true;
        }
    }

    let mut counting = Counting {
        inner: CpuForceKernel::default(),
        calls: 0,
        finalized: false,
    };
    let bodies = Scenario::TwoBody {
        separation: 1.0,
        mass: 1.0,
    }
    .build(1.0);
    let mut runner = LeapfrogRunner::new(&mut counting, bodies, 1.0, 0.01).unwrap();
    runner.run(10, 0).unwrap();
    runner.finish();
    // One priming evaluation plus one per step
    assert_eq!(counting.calls, 11);
    assert!(counting.finalized);
}
