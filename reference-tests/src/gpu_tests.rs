//! GPU backend reference tests
//!
//! Runs the property suite on every GPU dispatch strategy and compares each
//! against the CPU reference and against the other strategy.
//!
//! Gated behind `#[cfg(feature = "gpu")]`.

#![cfg(feature = "gpu")]

use crate::{compare_backends, PropertySuite};
use kernel::{CpuForceKernel, DispatchStrategy, GpuForceConfig, GpuForceKernel};

/// Helper: create a GPU evaluator with a live session. Software adapters are
/// accepted so the suite also runs on CI machines without a GPU.
/// Returns None if no adapter is available (test is skipped).
fn create_gpu_kernel(strategy: DispatchStrategy) -> Option<GpuForceKernel> {
    let config = GpuForceConfig {
        strategy,
        allow_software_adapter: true,
        ..Default::default()
    };
    let mut gpu = GpuForceKernel::new(config).expect("valid strategy");
    match gpu.initialize(1) {
        Ok(()) => Some(gpu),
        Err(e) if e.is_unavailable() => {
            eprintln!("Skipping GPU reference test: {e}");
            None
        }
        Err(e) => panic!("GPU initialization failed: {e}"),
    }
}

#[test]
fn gpu_naive_passes_property_suite() {
    let Some(mut gpu) = create_gpu_kernel(DispatchStrategy::Naive) else {
        return;
    };
    assert_eq!(gpu.config().strategy, DispatchStrategy::Naive);
    let result = PropertySuite::single_precision().run(&mut gpu);
    result.print_summary();
    assert!(result.passed, "naive GPU strategy failed its property suite");
}

#[test]
fn gpu_tiled_passes_property_suite() {
    let Some(mut gpu) = create_gpu_kernel(DispatchStrategy::tiled()) else {
        return;
    };
    let result = PropertySuite::single_precision().run(&mut gpu);
    result.print_summary();
    assert!(result.passed, "tiled GPU strategy failed its property suite");
}

#[test]
fn gpu_strategies_match_cpu_and_each_other() {
    let Some(mut naive) = create_gpu_kernel(DispatchStrategy::Naive) else {
        return;
    };
    let Some(mut tiled) = create_gpu_kernel(DispatchStrategy::tiled()) else {
        return;
    };
    let mut cpu = CpuForceKernel::default();
    let tolerance = PropertySuite::single_precision().tolerance;

    for check in [
        compare_backends(&mut cpu, &mut naive, tolerance),
        compare_backends(&mut cpu, &mut tiled, tolerance),
        compare_backends(&mut naive, &mut tiled, tolerance),
    ] {
        println!("{}: {:?}", check.name, check.message);
        assert!(check.passed, "{} failed", check.name);
    }
}
