//! Dispatch strategies and the launch geometry they imply.
//!
//! A strategy decides four things: which kernel entry point runs, how many
//! body slots are allocated for `n` bodies, what count the kernel receives,
//! and how many workgroups are launched. Nothing else in the evaluator
//! depends on which strategy is active.

use serde::{Deserialize, Serialize};

use crate::error::{ForceError, ForceResult};

/// Default number of bodies per tile in the cooperative strategy.
pub const TILE_WIDTH: u32 = 32;

/// Default number of invocations that split one body's inner sum.
pub const THREADS_PER_BODY: u32 = 8;

/// Workgroup size of the naive entry point.
pub const NAIVE_WORKGROUP_SIZE: u32 = 64;

/// Entry point of the one-invocation-per-body kernel.
pub const NAIVE_ENTRY_POINT: &str = "calculate_force";

/// Entry point of the tiled kernel with one invocation per body.
pub const TILED_ENTRY_POINT: &str = "calculate_force_tiled";

/// Entry point of the tiled kernel with several invocations per body.
pub const TILED_MT_ENTRY_POINT: &str = "calculate_force_tiled_mt";

/// How the force sum is partitioned across device invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// One invocation per body computes its full O(N) sum.
    Naive,
    /// Bodies are staged through workgroup memory one tile at a time and
    /// `threads_per_body` invocations share each body's inner loop.
    Tiled {
        /// Bodies per tile; also the workgroup's x extent.
        tile_width: u32,
        /// Invocations per body; the workgroup's y extent.
        threads_per_body: u32,
    },
}

impl Default for DispatchStrategy {
    fn default() -> Self {
        DispatchStrategy::Tiled {
            tile_width: TILE_WIDTH,
            threads_per_body: THREADS_PER_BODY,
        }
    }
}

/// Launch parameters for one buffer generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGeometry {
    /// Real bodies.
    pub bodies: usize,
    /// Allocated slots, `>= bodies`.
    pub slots: usize,
    /// Count handed to the kernel: slots when tiled, bodies when naive.
    pub count_argument: u32,
    /// Workgroup extent `[x, y]`.
    pub workgroup_size: [u32; 2],
    /// Workgroups launched along x.
    pub workgroups: u32,
}

impl DispatchGeometry {
    /// Total invocations along `[x, y]`.
    pub fn global_size(&self) -> [u64; 2] {
        [
            self.workgroups as u64 * self.workgroup_size[0] as u64,
            self.workgroup_size[1] as u64,
        ]
    }
}

impl DispatchStrategy {
    /// Tiled strategy with the default tile width and threads per body.
    pub fn tiled() -> Self {
        Self::default()
    }

    /// Check the strategy parameters.
    pub fn validate(&self) -> ForceResult<()> {
        if let DispatchStrategy::Tiled {
            tile_width,
            threads_per_body,
        } = *self
        {
            if tile_width == 0 {
                return Err(ForceError::InvalidConfig(
                    "tile_width must be at least 1".into(),
                ));
            }
            if threads_per_body == 0 {
                return Err(ForceError::InvalidConfig(
                    "threads_per_body must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }

    /// Kernel entry point for this strategy.
    pub fn entry_point(&self) -> &'static str {
        match *self {
            DispatchStrategy::Naive => NAIVE_ENTRY_POINT,
            DispatchStrategy::Tiled {
                threads_per_body: 1,
                ..
            } => TILED_ENTRY_POINT,
            DispatchStrategy::Tiled { .. } => TILED_MT_ENTRY_POINT,
        }
    }

    /// Tile width, or 1 for the naive strategy.
    pub fn tile_width(&self) -> u32 {
        match *self {
            DispatchStrategy::Naive => 1,
            DispatchStrategy::Tiled { tile_width, .. } => tile_width,
        }
    }

    /// Invocations per body, 1 for the naive strategy.
    pub fn threads_per_body(&self) -> u32 {
        match *self {
            DispatchStrategy::Naive => 1,
            DispatchStrategy::Tiled {
                threads_per_body, ..
            } => threads_per_body,
        }
    }

    /// Workgroup extent `[x, y]` the entry point is compiled with.
    pub fn workgroup_size(&self) -> [u32; 2] {
        match *self {
            DispatchStrategy::Naive => [NAIVE_WORKGROUP_SIZE, 1],
            DispatchStrategy::Tiled {
                tile_width,
                threads_per_body,
            } => [tile_width, threads_per_body],
        }
    }

    /// Invocations per workgroup.
    pub fn invocations_per_workgroup(&self) -> u32 {
        let [x, y] = self.workgroup_size();
        x.saturating_mul(y)
    }

    /// Bytes of workgroup memory the tiled kernels declare.
    ///
    /// The shader declares two arrays of `vec4<f32>` sized
    /// `tile_width * threads_per_body` regardless of which entry point runs.
    pub fn workgroup_storage_bytes(&self) -> u32 {
        self.invocations_per_workgroup().saturating_mul(32)
    }

    /// Slots allocated for `n` bodies: `n` rounded up to the tile width when
    /// tiled, `n` otherwise. `None` if that overflows.
    pub fn padded_slots(&self, n: usize) -> Option<usize> {
        match *self {
            DispatchStrategy::Naive => Some(n),
            DispatchStrategy::Tiled { tile_width, .. } => {
                n.checked_next_multiple_of(tile_width as usize)
            }
        }
    }

    /// Launch geometry for `n` bodies.
    ///
    /// Fails when the slot count does not fit the kernel's u32 count.
    pub fn geometry(&self, n: usize) -> ForceResult<DispatchGeometry> {
        let slots = self
            .padded_slots(n)
            .filter(|&slots| u32::try_from(slots).is_ok())
            .ok_or_else(|| {
                ForceError::Allocation(format!("{n} bodies exceed the kernel's 32-bit slot count"))
            })?;
        let count = slots as u32;
        let workgroup_size = self.workgroup_size();
        let (count_argument, workgroups) = match *self {
            DispatchStrategy::Naive => (count, dispatch_size(count, workgroup_size[0])),
            DispatchStrategy::Tiled { tile_width, .. } => (count, count / tile_width),
        };
        Ok(DispatchGeometry {
            bodies: n,
            slots,
            count_argument,
            workgroup_size,
            workgroups,
        })
    }
}

/// Workgroup count: ceil(total / workgroup_size).
fn dispatch_size(total: u32, workgroup_size: u32) -> u32 {
    total.div_ceil(workgroup_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_tiled_multi_thread() {
        let s = DispatchStrategy::default();
        assert_eq!(s.entry_point(), TILED_MT_ENTRY_POINT);
        assert_eq!(s.workgroup_size(), [TILE_WIDTH, THREADS_PER_BODY]);
        assert_eq!(s.invocations_per_workgroup(), 256);
    }

    #[test]
    fn single_thread_tiles_use_plain_tiled_entry() {
        let s = DispatchStrategy::Tiled {
            tile_width: 64,
            threads_per_body: 1,
        };
        assert_eq!(s.entry_point(), TILED_ENTRY_POINT);
    }

    #[test]
    fn tiled_padding_rounds_up_to_tile() {
        let s = DispatchStrategy::tiled();
        assert_eq!(s.padded_slots(1), Some(32));
        assert_eq!(s.padded_slots(32), Some(32));
        assert_eq!(s.padded_slots(33), Some(64));
        assert_eq!(s.padded_slots(100), Some(128));
    }

    #[test]
    fn naive_never_pads() {
        let s = DispatchStrategy::Naive;
        for n in [1, 7, 64, 1000] {
            assert_eq!(s.padded_slots(n), Some(n));
        }
    }

    #[test]
    fn tiled_geometry_passes_padded_count() {
        let g = DispatchStrategy::tiled().geometry(10).unwrap();
        assert_eq!(g.bodies, 10);
        assert_eq!(g.slots, 32);
        assert_eq!(g.count_argument, 32);
        assert_eq!(g.workgroups, 1);
        assert_eq!(g.global_size(), [32, 8]);
    }

    #[test]
    fn naive_geometry_passes_raw_count() {
        let g = DispatchStrategy::Naive.geometry(100).unwrap();
        assert_eq!(g.slots, 100);
        assert_eq!(g.count_argument, 100);
        assert_eq!(g.workgroups, 2);
        assert_eq!(g.global_size(), [128, 1]);
    }

    #[test]
    fn oversized_body_counts_rejected() {
        assert_eq!(DispatchStrategy::tiled().padded_slots(usize::MAX), None);
        for strategy in [DispatchStrategy::Naive, DispatchStrategy::tiled()] {
            let err = strategy.geometry(u32::MAX as usize + 1).unwrap_err();
            assert!(matches!(err, ForceError::Allocation(_)));
        }
        let g = DispatchStrategy::Naive.geometry(u32::MAX as usize).unwrap();
        assert_eq!(g.count_argument, u32::MAX);
    }

    #[test]
    fn zero_sized_tiles_rejected() {
        let bad = DispatchStrategy::Tiled {
            tile_width: 0,
            threads_per_body: 4,
        };
        assert!(bad.validate().is_err());
        let bad = DispatchStrategy::Tiled {
            tile_width: 16,
            threads_per_body: 0,
        };
        assert!(bad.validate().is_err());
        assert!(DispatchStrategy::Naive.validate().is_ok());
    }

    #[test]
    fn strategy_json_shape() {
        let json = serde_json::to_string(&DispatchStrategy::tiled()).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"tiled","tile_width":32,"threads_per_body":8}"#
        );
        let naive: DispatchStrategy = serde_json::from_str(r#"{"kind":"naive"}"#).unwrap();
        assert_eq!(naive, DispatchStrategy::Naive);
    }
}
