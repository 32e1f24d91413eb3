//! Reference test framework for force evaluator validation
//!
//! Every check takes a `&mut dyn ForceEvaluator`, so the same suite runs
//! unchanged against the CPU reference and each GPU strategy.


#[cfg(test)]
mod gpu_tests;

use std::time::Instant;

use kernel::{BodySystem, ForceEvaluator, ForceResult};
use orchestrator::{LeapfrogRunner, Scenario};

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Detail, on success or failure
    pub message: Option<String>,
}

impl CheckResult {
    fn pass(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: Some(message),
        }
    }

    fn fail(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: Some(message),
        }
    }

    /// Pass when `ok`, with the same message either way.
    fn from_bool(name: &str, ok: bool, message: String) -> Self {
        if ok {
            Self::pass(name, message)
        } else {
            Self::fail(name, message)
        }
    }
}

/// Result of running the suite against one backend
#[derive(Debug)]
pub struct TestResult {
    /// Backend or comparison name
    pub name: String,
    /// Whether every check passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Wall-clock seconds for the whole suite
    pub elapsed_secs: f64,
}

/// Tolerances for one backend
#[derive(Debug, Clone, Copy)]
pub struct PropertySuite {
    /// Relative tolerance on accelerations compared with the analytical or
    /// reference value
    pub tolerance: f64,
    /// Relative energy drift allowed over the orbit run
    pub energy_tolerance: f64,
}

impl PropertySuite {
    /// Tolerances for a double-precision backend
    pub fn double_precision() -> Self {
        Self {
            tolerance: 1e-10,
            energy_tolerance: 1e-4,
        }
    }

    /// Tolerances for a backend computing in f32
    pub fn single_precision() -> Self {
        Self {
            tolerance: 1e-4,
            energy_tolerance: 1e-3,
        }
    }

    /// Run every single-backend property against `evaluator`.
    pub fn run(&self, evaluator: &mut dyn ForceEvaluator) -> TestResult {
        let name = evaluator.name().to_string();
        tracing::info!("Running property suite on {}", name);
        let start = Instant::now();

        let checks = vec![
            check_determinism(evaluator),
            check_resize_regeneration(evaluator),
            check_padding_invariant(evaluator, self.tolerance),
            check_two_body_symmetry(evaluator, self.tolerance),
            check_single_body(evaluator),
            check_cleanup(evaluator),
            check_energy_drift(evaluator, self.energy_tolerance),
        ];
        evaluator.finalize();

        TestResult {
            passed: checks.iter().all(|c| c.passed),
            name,
            checks,
            elapsed_secs: start.elapsed().as_secs_f64(),
        }
    }
}

/// Deterministic jittered lattice of `n` bodies
pub fn body_cloud(n: usize, seed: u64) -> BodySystem {
    Scenario::Cluster {
        count: n,
        spacing: 1.0,
        mass: 1.0,
        seed,
    }
    .build(1.0)
}

fn evaluate(evaluator: &mut dyn ForceEvaluator, bodies: &BodySystem, g: f64) -> ForceResult<Vec<f64>> {
    let mut acc = vec![0.0; 3 * bodies.len()];
    evaluator.evaluate_system(bodies, g, &mut acc)?;
    Ok(acc)
}

/// Largest per-body error relative to the largest reference acceleration.
pub fn max_relative_error(reference: &[f64], other: &[f64]) -> f64 {
    let norm = |a: &[f64]| (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
    let scale = reference
        .chunks_exact(3)
        .map(norm)
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    reference
        .chunks_exact(3)
        .zip(other.chunks_exact(3))
        .map(|(r, o)| norm(&[r[0] - o[0], r[1] - o[1], r[2] - o[2]]) / scale)
        .fold(0.0, f64::max)
}

/// Two consecutive calls with identical input give identical output.
pub fn check_determinism(evaluator: &mut dyn ForceEvaluator) -> CheckResult {
    const NAME: &str = "Determinism";
    let bodies = body_cloud(100, 1);
    let result = evaluate(evaluator, &bodies, 1.0)
        .and_then(|first| Ok((first, evaluate(evaluator, &bodies, 1.0)?)));
    match result {
        Ok((first, second)) => {
            let differing = first.iter().zip(&second).filter(|(a, b)| a != b).count();
            CheckResult::from_bool(
                NAME,
                differing == 0,
                format!("{differing} of {} components differ", first.len()),
            )
        }
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// N=10, then N=3, then N=10 again reproduces the first result.
pub fn check_resize_regeneration(evaluator: &mut dyn ForceEvaluator) -> CheckResult {
    const NAME: &str = "Resize regeneration";
    let ten = body_cloud(10, 2);
    let mut three = ten.clone();
    three.truncate(3);
    let result = (|| {
        let first = evaluate(evaluator, &ten, 1.0)?;
        evaluate(evaluator, &three, 1.0)?;
        let again = evaluate(evaluator, &ten, 1.0)?;
        ForceResult::Ok((first, again))
    })();
    match result {
        Ok((first, again)) => CheckResult::from_bool(
            NAME,
            first == again,
            "N=10 -> 3 -> 10".to_string(),
        ),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// Bodies on a line away from the origin feel no off-axis pull, and the
/// output beyond `3 * n` is left alone.
pub fn check_padding_invariant(evaluator: &mut dyn ForceEvaluator, tolerance: f64) -> CheckResult {
    const NAME: &str = "Padding invariant";
    let n = 33;
    let mut bodies = BodySystem::new();
    for i in 0..n {
        bodies.push_body([5.0 + i as f64, 5.0, 5.0], [0.0; 3], 1.0);
    }
    let sentinel = 12345.0;
    let mut acc = vec![sentinel; 3 * n + 6];
    if let Err(e) = evaluator.evaluate_system(&bodies, 1.0, &mut acc) {
        return CheckResult::fail(NAME, e.to_string());
    }
    let scale = acc[..3 * n]
        .chunks_exact(3)
        .map(|a| a[0].abs())
        .fold(0.0_f64, f64::max);
    let off_axis = acc[..3 * n]
        .chunks_exact(3)
        .map(|a| a[1].abs().max(a[2].abs()))
        .fold(0.0_f64, f64::max);
    let tail_ok = acc[3 * n..].iter().all(|&v| v == sentinel);
    CheckResult::from_bool(
        NAME,
        off_axis <= tolerance * scale && tail_ok,
        format!(
            "max off-axis {:.2e} (scale {:.2e}), output tail {}",
            off_axis,
            scale,
            if tail_ok { "untouched" } else { "overwritten" }
        ),
    )
}

/// Equal masses at (-1,0,0) and (1,0,0), G=1: opposite x accelerations of
/// magnitude G m / 4.
pub fn check_two_body_symmetry(evaluator: &mut dyn ForceEvaluator, tolerance: f64) -> CheckResult {
    const NAME: &str = "Two-body symmetry";
    let m = 3.0;
    let mut bodies = BodySystem::new();
    bodies.push_body([-1.0, 0.0, 0.0], [0.0; 3], m);
    bodies.push_body([1.0, 0.0, 0.0], [0.0; 3], m);
    let acc = match evaluate(evaluator, &bodies, 1.0) {
        Ok(acc) => acc,
        Err(e) => return CheckResult::fail(NAME, e.to_string()),
    };
    let expected = m / 4.0;
    let err0 = (acc[0] - expected).abs() / expected;
    let err1 = (acc[3] + expected).abs() / expected;
    let transverse = acc[1].abs() + acc[2].abs() + acc[4].abs() + acc[5].abs();
    CheckResult::from_bool(
        NAME,
        err0 <= tolerance && err1 <= tolerance && transverse == 0.0,
        format!("ax = ({:.9}, {:.9}), expected +/-{expected}", acc[0], acc[3]),
    )
}

/// A single body feels exactly zero acceleration.
pub fn check_single_body(evaluator: &mut dyn ForceEvaluator) -> CheckResult {
    const NAME: &str = "Single body";
    let mut bodies = BodySystem::new();
    bodies.push_body([0.5, -1.5, 2.0], [0.0; 3], 10.0);
    match evaluate(evaluator, &bodies, 1.0) {
        Ok(acc) => CheckResult::from_bool(NAME, acc == [0.0; 3], format!("{acc:?}")),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// After `finalize`, the next evaluation rebuilds and matches the earlier
/// result.
pub fn check_cleanup(evaluator: &mut dyn ForceEvaluator) -> CheckResult {
    const NAME: &str = "Finalize and rebuild";
    let bodies = body_cloud(40, 4);
    let before = match evaluate(evaluator, &bodies, 1.0) {
        Ok(acc) => acc,
        Err(e) => return CheckResult::fail(NAME, e.to_string()),
    };
    evaluator.finalize();
    match evaluate(evaluator, &bodies, 1.0) {
        Ok(after) => CheckResult::from_bool(
            NAME,
            before == after,
            "evaluation after finalize".to_string(),
        ),
        Err(e) => CheckResult::fail(NAME, format!("rebuild failed: {e}")),
    }
}

/// Leapfrog energy drift over two periods of a circular orbit stays below
/// `tolerance`.
pub fn check_energy_drift(evaluator: &mut dyn ForceEvaluator, tolerance: f64) -> CheckResult {
    const NAME: &str = "Orbit energy drift";
    let bodies = Scenario::TwoBody {
        separation: 1.0,
        mass: 1.0,
    }
    .build(1.0);
    let period = std::f64::consts::TAU * 0.5_f64.sqrt();
    let steps = 2000;
    let result = LeapfrogRunner::new(evaluator, bodies, 1.0, period / 1000.0)
        .and_then(|mut runner| runner.run(steps, 0));
    match result {
        Ok(summary) => {
            let drift = summary.relative_energy_drift();
            CheckResult::from_bool(
                NAME,
                drift <= tolerance,
                format!("{drift:.2e} over {steps} steps (limit {tolerance:.0e})"),
            )
        }
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// Two evaluators agree on the same clouds within `tolerance`.
pub fn compare_backends(
    reference: &mut dyn ForceEvaluator,
    other: &mut dyn ForceEvaluator,
    tolerance: f64,
) -> CheckResult {
    let name = format!("{} vs {}", other.name(), reference.name());
    let mut worst = 0.0_f64;
    for n in [1, 7, 32, 33, 100, 257] {
        let bodies = body_cloud(n, n as u64);
        let pair = evaluate(reference, &bodies, 1.0)
            .and_then(|r| Ok((r, evaluate(other, &bodies, 1.0)?)));
        match pair {
            Ok((r, o)) => worst = worst.max(max_relative_error(&r, &o)),
            Err(e) => return CheckResult::fail(&name, format!("n={n}: {e}")),
        }
    }
    CheckResult::from_bool(
        &name,
        worst <= tolerance,
        format!("max relative error {worst:.2e} (limit {tolerance:.0e})"),
    )
}

impl TestResult {
    /// Wrap standalone comparison checks as one result
    pub fn from_checks(name: &str, checks: Vec<CheckResult>) -> Self {
        Self {
            name: name.to_string(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            elapsed_secs: 0.0,
        }
    }

    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Backend: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Elapsed: {:.3} s", self.elapsed_secs);
        println!("\nChecks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
