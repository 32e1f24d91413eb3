//! Deterministic initial conditions.

use serde::{Deserialize, Serialize};

use kernel::BodySystem;

/// Initial body layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    /// Two equal masses on a circular orbit about their barycentre, in the
    /// xy-plane.
    TwoBody {
        /// Distance between the bodies.
        separation: f64,
        /// Mass of each body.
        mass: f64,
    },
    /// A heavy central body with light satellites on circular orbits.
    Ring {
        /// Number of satellites.
        count: usize,
        /// Orbit radius.
        radius: f64,
        /// Central mass.
        central_mass: f64,
        /// Mass of each satellite.
        satellite_mass: f64,
    },
    /// Bodies at rest on a jittered cubic lattice.
    Cluster {
        /// Number of bodies.
        count: usize,
        /// Lattice spacing.
        spacing: f64,
        /// Mass of each body.
        mass: f64,
        /// Seed for the jitter.
        #[serde(default)]
        seed: u64,
    },
}

fn positive(name: &str, v: f64) -> Result<(), String> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be positive and finite"))
    }
}

impl Scenario {
    /// Check the scenario parameters.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Scenario::TwoBody { separation, mass } => {
                positive("separation", separation)?;
                positive("mass", mass)
            }
            Scenario::Ring {
                count,
                radius,
                central_mass,
                satellite_mass,
            } => {
                if count == 0 {
                    return Err("ring needs at least one satellite".to_string());
                }
                positive("radius", radius)?;
                positive("central_mass", central_mass)?;
                positive("satellite_mass", satellite_mass)
            }
            Scenario::Cluster {
                count,
                spacing,
                mass,
                ..
            } => {
                if count == 0 {
                    return Err("cluster needs at least one body".to_string());
                }
                positive("spacing", spacing)?;
                positive("mass", mass)
            }
        }
    }

    /// Build the bodies for gravitational constant `g`.
    pub fn build(&self, g: f64) -> BodySystem {
        let mut bodies = BodySystem::new();
        match *self {
            Scenario::TwoBody { separation, mass } => {
                let v = (g * mass / (2.0 * separation)).sqrt();
                let half = 0.5 * separation;
                bodies.push_body([-half, 0.0, 0.0], [0.0, -v, 0.0], mass);
                bodies.push_body([half, 0.0, 0.0], [0.0, v, 0.0], mass);
            }
            Scenario::Ring {
                count,
                radius,
                central_mass,
                satellite_mass,
            } => {
                bodies.push_body([0.0; 3], [0.0; 3], central_mass);
                let v = (g * central_mass / radius).sqrt();
                for k in 0..count {
                    let theta = std::f64::consts::TAU * k as f64 / count as f64;
                    let (s, c) = theta.sin_cos();
                    bodies.push_body([radius * c, radius * s, 0.0], [-v * s, v * c, 0.0], satellite_mass);
                }
            }
            Scenario::Cluster {
                count,
                spacing,
                mass,
                seed,
            } => {
                let mut jitter = Lcg::new(seed);
                let side = (count as f64).cbrt().ceil() as usize;
                'fill: for ix in 0..side {
                    for iy in 0..side {
                        for iz in 0..side {
                            if bodies.len() == count {
                                break 'fill;
                            }
                            let p = [
                                spacing * (ix as f64 + 0.25 * jitter.next_signed()),
                                spacing * (iy as f64 + 0.25 * jitter.next_signed()),
                                spacing * (iz as f64 + 0.25 * jitter.next_signed()),
                            ];
                            bodies.push_body(p, [0.0; 3], mass);
                        }
                    }
                }
            }
        }
        bodies
    }
}

/// Small linear congruential generator; reproducible across platforms.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed ^ 0x9E37_79B9_7F4A_7C15)
    }

    /// Uniform in [-1, 1).
    fn next_signed(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let unit = (self.0 >> 11) as f64 / (1u64 << 53) as f64;
        2.0 * unit - 1.0
    }
}
