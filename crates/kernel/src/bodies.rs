//! Body state in the flat stride-3 layout integrators hand to the evaluators.

use crate::error::{ForceError, ForceResult};

/// Owned body state.
///
/// `positions` and `velocities` are stride-3 (`x0, y0, z0, x1, ...`); `masses`
/// and `radii` hold one value per body. Index `i` across every array refers to
/// the same body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodySystem {
    /// Positions, 3 values per body.
    pub positions: Vec<f64>,
    /// Velocities, 3 values per body.
    pub velocities: Vec<f64>,
    /// Masses.
    pub masses: Vec<f64>,
    /// Physical radii. Carried for interface symmetry, not used by the force sum.
    pub radii: Vec<f64>,
}

impl BodySystem {
    /// Create an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bodies.
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    /// Return `true` if there are no bodies.
    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Append a body with the given position, velocity and mass. Radius is zero.
    pub fn push_body(&mut self, position: [f64; 3], velocity: [f64; 3], mass: f64) {
        self.positions.extend_from_slice(&position);
        self.velocities.extend_from_slice(&velocity);
        self.masses.push(mass);
        self.radii.push(0.0);
    }

    /// Position of body `i`.
    pub fn position(&self, i: usize) -> [f64; 3] {
        [
            self.positions[3 * i],
            self.positions[3 * i + 1],
            self.positions[3 * i + 2],
        ]
    }

    /// Drop every body past the first `n`.
    pub fn truncate(&mut self, n: usize) {
        self.positions.truncate(3 * n);
        self.velocities.truncate(3 * n);
        self.masses.truncate(n);
        self.radii.truncate(n);
    }
}

/// Borrowed, length-checked view of one evaluation's input.
#[derive(Debug, Clone, Copy)]
pub struct ForceInput<'a> {
    /// Stride-3 positions, exactly `3 * n` values.
    pub positions: &'a [f64],
    /// Masses, exactly `n` values.
    pub masses: &'a [f64],
    /// Body count.
    pub n: usize,
}

impl<'a> ForceInput<'a> {
    /// Check the caller's slices against `n`.
    ///
    /// Longer slices are accepted and only their first `n` bodies are used.
    /// `accelerations_len` is the length of the output slice.
    pub fn new(
        positions: &'a [f64],
        n: usize,
        masses: Option<&'a [f64]>,
        accelerations_len: usize,
    ) -> ForceResult<Self> {
        let masses = masses.ok_or(ForceError::MissingMasses)?;
        let coords = n.checked_mul(3).ok_or(ForceError::LengthMismatch {
            array: "positions",
            expected: usize::MAX,
            actual: positions.len(),
        })?;
        check_len("positions", coords, positions.len())?;
        check_len("masses", n, masses.len())?;
        check_len("accelerations", coords, accelerations_len)?;
        Ok(Self {
            positions: &positions[..coords],
            masses: &masses[..n],
            n,
        })
    }

    /// Iterate `(x, y, z, mass)` per body.
    pub fn iter(&self) -> impl Iterator<Item = ([f64; 3], f64)> + 'a {
        self.positions
            .chunks_exact(3)
            .zip(self.masses.iter())
            .map(|(p, &m)| ([p[0], p[1], p[2]], m))
    }
}

fn check_len(array: &'static str, expected: usize, actual: usize) -> ForceResult<()> {
    if actual < expected {
        return Err(ForceError::LengthMismatch {
            array,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_system() {
        let bodies = BodySystem::new();
        assert_eq!(bodies.len(), 0);
        assert!(bodies.is_empty());
    }

    #[test]
    fn push_and_truncate() {
        let mut bodies = BodySystem::new();
        bodies.push_body([1.0, 2.0, 3.0], [0.0, 0.5, 0.0], 2.0);
        bodies.push_body([4.0, 5.0, 6.0], [0.0, 0.0, 0.0], 3.0);
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies.position(1), [4.0, 5.0, 6.0]);
        assert_eq!(bodies.velocities[1], 0.5);

        bodies.truncate(1);
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies.positions.len(), 3);
        assert_eq!(bodies.radii.len(), 1);
    }

    #[test]
    fn missing_masses_rejected() {
        let pos = [0.0; 6];
        let err = ForceInput::new(&pos, 2, None, 6).unwrap_err();
        assert!(matches!(err, ForceError::MissingMasses));
    }

    #[test]
    fn short_arrays_rejected() {
        let pos = [0.0; 6];
        let masses = [1.0; 2];
        let err = ForceInput::new(&pos, 3, Some(&masses), 9).unwrap_err();
        assert!(matches!(
            err,
            ForceError::LengthMismatch { array: "positions", expected: 9, actual: 6 }
        ));

        let err = ForceInput::new(&pos, 2, Some(&masses), 5).unwrap_err();
        assert!(matches!(err, ForceError::LengthMismatch { array: "accelerations", .. }));
    }

    #[test]
    fn huge_body_count_is_a_length_error() {
        let pos = [0.0; 3];
        let masses = [1.0];
        let err = ForceInput::new(&pos, usize::MAX / 2, Some(&masses), 3).unwrap_err();
        assert!(matches!(err, ForceError::LengthMismatch { array: "positions", .. }));
    }

    #[test]
    fn longer_arrays_are_trimmed_to_n() {
        let pos = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let masses = [7.0, 8.0];
        let input = ForceInput::new(&pos, 1, Some(&masses), 6).unwrap();
        let bodies: Vec<_> = input.iter().collect();
        assert_eq!(bodies, vec![([1.0, 2.0, 3.0], 7.0)]);
    }
}
