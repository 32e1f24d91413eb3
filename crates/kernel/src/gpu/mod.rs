//! GPU (Vulkan/Metal/DX12 via wgpu) direct-sum force evaluator.
//!
//! `GpuForceKernel` implements `ForceEvaluator` with a WGSL compute kernel.
//!
//! # Lifecycle
//! - The device session (device, queue, compiled pipeline) is built lazily on
//!   the first evaluation and kept until `finalize`.
//! - The buffer generation is rebuilt whenever the body count changes. Only
//!   one generation is ever alive.
//! - `finalize` drains the queue and releases buffers, then the session. A
//!   later evaluation rebuilds both from scratch.
//!
//! # Per call
//! pack → upload → dispatch → copy to staging → blocking map → unpack. The
//! blocking map is the only wait: it cannot complete before the dispatch
//! submitted ahead of it.

pub mod buffers;
pub mod session;

use std::time::Instant;

use tracing::{debug, info};

use buffers::GpuBuffers;
use session::DeviceSession;

use crate::bodies::ForceInput;
use crate::config::GpuForceConfig;
use crate::error::{ForceError, ForceResult};
use crate::strategy::DispatchStrategy;
use crate::ForceEvaluator;

/// Wall-clock breakdown of the last evaluation, in microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuCallProfile {
    /// Session and buffer checks (includes any rebuild).
    pub prepare_us: u64,
    /// Repack and upload.
    pub upload_us: u64,
    /// Dispatch, readback copy and blocking map.
    pub compute_us: u64,
    /// Repack into the caller's array.
    pub unpack_us: u64,
}

/// Current allocation as seen by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityState {
    /// Bodies the live generation serves, 0 if none.
    pub bodies: usize,
    /// Slots allocated, `>= bodies`.
    pub slots: usize,
    /// Tile width of the configured strategy.
    pub tile_width: u32,
    /// Threads per body of the configured strategy.
    pub threads_per_body: u32,
}

/// Check whether an accelerator adapter is present.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .any(|a| session::is_accelerator(a.get_info().device_type, false))
}

/// GPU force evaluator owning one device session and one buffer generation.
pub struct GpuForceKernel {
    config: GpuForceConfig,
    // Declared before `session` so the generation drops first.
    buffers: Option<GpuBuffers>,
    session: Option<DeviceSession>,
    last_profile: GpuCallProfile,
}

impl GpuForceKernel {
    /// Create an evaluator. No device work happens until the first call.
    pub fn new(config: GpuForceConfig) -> ForceResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buffers: None,
            session: None,
            last_profile: GpuCallProfile::default(),
        })
    }

    /// Evaluator with default settings and the given strategy.
    pub fn with_strategy(strategy: DispatchStrategy) -> ForceResult<Self> {
        Self::new(GpuForceConfig::with_strategy(strategy))
    }

    /// Settings this evaluator was built with.
    pub fn config(&self) -> &GpuForceConfig {
        &self.config
    }

    /// Whether the device session is built.
    pub fn is_built(&self) -> bool {
        self.session.is_some()
    }

    /// The live session, if built.
    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    /// Current allocation.
    pub fn capacity(&self) -> CapacityState {
        let (bodies, slots) = self
            .buffers
            .as_ref()
            .map_or((0, 0), |b| (b.bodies(), b.slots()));
        CapacityState {
            bodies,
            slots,
            tile_width: self.config.strategy.tile_width(),
            threads_per_body: self.config.strategy.threads_per_body(),
        }
    }

    /// Timing of the last evaluation.
    pub fn last_profile(&self) -> GpuCallProfile {
        self.last_profile
    }

    /// Build the session if it is not built yet.
    pub fn ensure_session(&mut self) -> ForceResult<&DeviceSession> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let started = Instant::now();
                let session = DeviceSession::new(&self.config)?;
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "device session ready"
                );
                session
            }
        };
        Ok(&*self.session.insert(session))
    }

    /// Make the buffer generation match `n` bodies, replacing it if needed.
    ///
    /// Builds the session first if necessary. `n == 0` releases the buffers.
    pub fn ensure_capacity(&mut self, n: usize) -> ForceResult<()> {
        if self.buffers.as_ref().is_some_and(|b| b.bodies() == n) {
            return Ok(());
        }
        self.release_buffers();
        if n == 0 {
            return Ok(());
        }

        let geometry = self.config.strategy.geometry(n)?;
        let session = self.ensure_session()?;
        let limit = session.limits.max_compute_workgroups_per_dimension;
        if geometry.workgroups > limit {
            return Err(ForceError::CapacityExceeded {
                bodies: n,
                workgroups: geometry.workgroups,
                limit,
            });
        }
        let buffers = GpuBuffers::new(session, geometry)?;
        info!(
            bodies = n,
            slots = geometry.slots,
            tile_width = self.config.strategy.tile_width(),
            threads_per_body = self.config.strategy.threads_per_body(),
            "buffer generation ready"
        );
        self.buffers = Some(buffers);
        Ok(())
    }

    /// Session plus buffers for `n` bodies.
    pub fn initialize(&mut self, n: usize) -> ForceResult<()> {
        self.ensure_session()?;
        self.ensure_capacity(n)
    }

    /// Free the current buffer generation, if any.
    pub fn release_buffers(&mut self) {
        if self.buffers.take().is_some() {
            debug!("buffer generation released");
        }
    }

    /// Drain the queue and release buffers and session.
    ///
    /// Valid whether or not the session was ever built; the evaluator can be
    /// used again afterwards and rebuilds everything on the next call.
    pub fn finalize(&mut self) {
        match self.session.take() {
            Some(session) => {
                session.drain();
                self.release_buffers();
                drop(session);
                info!("device session finalized");
            }
            None => self.release_buffers(),
        }
    }

    fn dispatch(&mut self, input: &ForceInput<'_>, g: f64, out: &mut [f64]) -> ForceResult<()> {
        let t0 = Instant::now();
        self.ensure_capacity(input.n)?;
        let t1 = Instant::now();

        let softening = self.config.softening;
        let (Some(session), Some(bufs)) = (self.session.as_ref(), self.buffers.as_mut()) else {
            return Err(ForceError::Dispatch("no live buffer generation".into()));
        };

        bufs.pack(input, g);
        bufs.upload(&session.queue, softening);
        let t2 = Instant::now();

        let geometry = bufs.geometry;
        debug!(
            entry_point = session.strategy.entry_point(),
            count = geometry.count_argument,
            workgroups = geometry.workgroups,
            workgroup_size = ?geometry.workgroup_size,
            "dispatching force kernel"
        );

        session.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = session
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("force_step"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("forces"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&session.pipeline);
            pass.set_bind_group(0, &bufs.bind_group, &[]);
            pass.dispatch_workgroups(geometry.workgroups, 1, 1);
        }
        bufs.encode_readback(&mut encoder);
        session.queue.submit(std::iter::once(encoder.finish()));
        if let Some(e) = pollster::block_on(session.device.pop_error_scope()) {
            return Err(ForceError::Dispatch(e.to_string()));
        }

        bufs.read_back(&session.device)?;
        let t3 = Instant::now();

        bufs.unpack(out);
        let t4 = Instant::now();

        self.last_profile = GpuCallProfile {
            prepare_us: (t1 - t0).as_micros() as u64,
            upload_us: (t2 - t1).as_micros() as u64,
            compute_us: (t3 - t2).as_micros() as u64,
            unpack_us: (t4 - t3).as_micros() as u64,
        };
        Ok(())
    }
}

impl ForceEvaluator for GpuForceKernel {
    fn name(&self) -> &'static str {
        match self.config.strategy {
            DispatchStrategy::Naive => "gpu-naive",
            DispatchStrategy::Tiled { .. } => "gpu-tiled",
        }
    }

    fn evaluate_forces(
        &mut self,
        positions: &[f64],
        n: usize,
        g: f64,
        masses: Option<&[f64]>,
        _radii: Option<&[f64]>,
        accelerations: &mut [f64],
    ) -> ForceResult<()> {
        let input = ForceInput::new(positions, n, masses, accelerations.len())?;
        if n == 0 {
            return Ok(());
        }
        self.dispatch(&input, g, accelerations)
            .inspect_err(|e| tracing::error!(bodies = n, "GPU force evaluation failed: {e}"))
    }

    fn finalize(&mut self) {
        GpuForceKernel::finalize(self);
    }
}
