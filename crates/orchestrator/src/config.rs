//! Run configuration parsing and validation

use serde::{Deserialize, Serialize};
use std::fs;

use kernel::GpuForceConfig;

use crate::scenario::Scenario;

/// Which force evaluator drives the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// wgpu evaluator (needs the `gpu` feature and an accelerator)
    #[default]
    Gpu,
    /// Double-precision CPU reference
    Cpu,
}

/// Main run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Human-readable run name
    pub name: String,
    /// Force backend
    #[serde(default)]
    pub backend: Backend,
    /// Gravitational constant
    #[serde(default = "default_g")]
    pub g: f64,
    /// Fixed leapfrog timestep
    pub dt: f64,
    /// Number of steps to integrate
    pub steps: u64,
    /// Log an energy report every this many steps (0 disables)
    #[serde(default)]
    pub report_every: u64,
    /// Initial conditions
    pub scenario: Scenario,
    /// Evaluator settings; `softening` also applies to the CPU backend
    #[serde(default)]
    pub force: GpuForceConfig,
}

fn default_g() -> f64 {
    1.0
}

impl RunConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let config: RunConfig = serde_json::from_str(contents)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.g.is_finite() && self.g > 0.0) {
            return Err("G must be positive and finite".to_string());
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err("dt must be positive and finite".to_string());
        }
        if self.steps == 0 {
            return Err("steps must be at least 1".to_string());
        }
        self.scenario.validate()?;
        self.force
            .validate()
            .map_err(|e| format!("Force settings: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_BODY: &str = r#"{
        "name": "test",
        "backend": "cpu",
        "dt": 0.001,
        "steps": 10,
        "scenario": { "kind": "two_body", "separation": 1.0, "mass": 1.0 }
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = RunConfig::from_json(TWO_BODY).unwrap();
        assert_eq!(config.backend, Backend::Cpu);
        assert_eq!(config.g, 1.0);
        assert_eq!(config.report_every, 0);
        assert_eq!(config.force, GpuForceConfig::default());
    }

    #[test]
    fn test_validation_dt() {
        let mut config = RunConfig::from_json(TWO_BODY).unwrap();
        config.dt = 0.0;
        assert!(config.validate().is_err());
        config.dt = f64::NAN;
        assert!(config.validate().is_err());
        config.dt = 0.01;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_steps_and_g() {
        let mut config = RunConfig::from_json(TWO_BODY).unwrap();
        config.steps = 0;
        assert!(config.validate().is_err());
        config.steps = 1;
        config.g = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_force_settings_checked() {
        let json = TWO_BODY.replace(
            r#""steps": 10,"#,
            r#""steps": 10, "force": { "softening": 0.0 },"#,
        );
        let err = RunConfig::from_json(&json).unwrap_err();
        assert!(err.contains("softening"), "{err}");
    }

    #[test]
    fn test_missing_file() {
        let err = RunConfig::load("/nonexistent/run.json").unwrap_err();
        assert!(err.starts_with("Failed to read config file"));
    }
}
