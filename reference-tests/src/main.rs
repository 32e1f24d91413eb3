//! Reference test binary entry point
//!
//! Runs the property suite against the CPU reference and, when an
//! accelerator is present, against each GPU dispatch strategy.

use kernel::CpuForceKernel;
use reference_tests::{compare_backends, PropertySuite, TestResult};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gpu")]
fn gpu_results(cpu: &mut CpuForceKernel) -> Vec<TestResult> {
    use kernel::{DispatchStrategy, GpuForceKernel};

    if !kernel::gpu_available() {
        tracing::warn!("No GPU adapter found; skipping GPU backends");
        return Vec::new();
    }

    let suite = PropertySuite::single_precision();
    let mut results = Vec::new();
    let mut evaluators = Vec::new();
    for strategy in [DispatchStrategy::Naive, DispatchStrategy::tiled()] {
        match GpuForceKernel::with_strategy(strategy) {
            Ok(mut gpu) => {
                results.push(suite.run(&mut gpu));
                evaluators.push(gpu);
            }
            Err(e) => tracing::error!("Cannot configure GPU backend {:?}: {}", strategy, e),
        }
    }

    let mut comparisons = Vec::new();
    for gpu in evaluators.iter_mut() {
        comparisons.push(compare_backends(cpu, gpu, suite.tolerance));
    }
    if let [naive, tiled] = evaluators.as_mut_slice() {
        comparisons.push(compare_backends(naive, tiled, suite.tolerance));
    }
    for gpu in evaluators.iter_mut() {
        gpu.finalize();
    }
    results.push(TestResult::from_checks("cross-backend", comparisons));
    results
}

#[cfg(not(feature = "gpu"))]
fn gpu_results(_cpu: &mut CpuForceKernel) -> Vec<TestResult> {
    tracing::warn!("Built without the gpu feature; skipping GPU backends");
    Vec::new()
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    tracing::info!("Force Evaluator Reference Suite");
    tracing::info!("===============================");

    let mut cpu = CpuForceKernel::default();
    let mut results = vec![PropertySuite::double_precision().run(&mut cpu)];
    results.extend(gpu_results(&mut cpu));

    let mut passed_count = 0;
    let mut failed_count = 0;
    for result in &results {
        if result.passed {
            passed_count += 1;
        } else {
            failed_count += 1;
        }
        result.print_summary();
    }

    // Print overall summary
    println!("\n{}", "=".repeat(80));
    println!("OVERALL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Backends tested: {}", results.len());
    println!("Passed: {}", passed_count);
    println!("Failed: {}", failed_count);
    println!("{}", "=".repeat(80));

    // Exit with error code if any suite failed
    if failed_count > 0 {
        std::process::exit(1);
    }
}
