//! Orchestration Layer
//!
//! This crate drives the force evaluators from a JSON run configuration:
//! - Run configuration loading and validation
//! - Deterministic initial-condition scenarios
//! - A kick-drift-kick leapfrog runner that calls the evaluator once per step

#![warn(missing_docs)]

pub mod config;
pub mod runner;
pub mod scenario;

pub use config::{Backend, RunConfig};
pub use runner::{EnergyReport, LeapfrogRunner, RunError, RunSummary};
pub use scenario::Scenario;

use kernel::{CpuForceKernel, ForceError, ForceEvaluator};

/// Build the evaluator selected by `config`.
///
/// A GPU backend is returned unbuilt; the device session is acquired on the
/// first evaluation. Without the `gpu` feature, selecting it is an error.
pub fn build_evaluator(config: &RunConfig) -> Result<Box<dyn ForceEvaluator>, ForceError> {
    match config.backend {
        Backend::Cpu => Ok(Box::new(CpuForceKernel::new(config.force.softening)?)),
        #[cfg(feature = "gpu")]
        Backend::Gpu => Ok(Box::new(kernel::GpuForceKernel::new(config.force.clone())?)),
        #[cfg(not(feature = "gpu"))]
        Backend::Gpu => Err(ForceError::InvalidConfig(
            "the gpu backend needs the `gpu` feature".to_string(),
        )),
    }
}

/// Run a simulation described by a configuration file.
///
/// # Example
/// ```no_run
/// let summary = orchestrator::run_from_file("configs/two_body.json")?;
/// println!("energy drift {:.2e}", summary.relative_energy_drift());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_from_file(config_path: &str) -> Result<RunSummary, Box<dyn std::error::Error>> {
    tracing::info!("Creating run from config: {}", config_path);
    let config = RunConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);
    Ok(run(&config)?)
}

/// Run a validated configuration to completion.
pub fn run(config: &RunConfig) -> Result<RunSummary, RunError> {
    config.validate().map_err(RunError::Invalid)?;
    let evaluator = build_evaluator(config)?;
    let bodies = config.scenario.build(config.g);
    let mut runner = LeapfrogRunner::new(evaluator, bodies, config.g, config.dt)?;
    let summary = runner.run(config.steps, config.report_every);
    runner.finish();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_backend_builds() {
        let config = RunConfig::from_json(
            r#"{"name":"t","backend":"cpu","dt":0.01,"steps":1,
                "scenario":{"kind":"two_body","separation":1.0,"mass":1.0}}"#,
        )
        .unwrap();
        let evaluator = build_evaluator(&config).unwrap();
        assert_eq!(evaluator.name(), "cpu");
    }

    #[test]
    fn invalid_config_is_reported() {
        let mut config = RunConfig::from_json(
            r#"{"name":"t","backend":"cpu","dt":0.01,"steps":1,
                "scenario":{"kind":"two_body","separation":1.0,"mass":1.0}}"#,
        )
        .unwrap();
        config.steps = 0;
        assert!(matches!(run(&config), Err(RunError::Invalid(_))));
    }
}
