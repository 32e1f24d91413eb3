//! One buffer generation: host staging arrays plus the device buffers that
//! mirror them, sized for a single body count.
//!
//! A generation is created whole and dropped whole. Resizing means building a
//! new generation and dropping the old one; nothing is resized in place.

use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use super::session::DeviceSession;
use crate::bodies::ForceInput;
use crate::error::{ForceError, ForceResult};
use crate::strategy::DispatchGeometry;

/// Device body record: position and G-scaled mass.
///
/// Layout: 16 bytes (4 × f32), matching `vec4<f32>` in the kernel.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BodyRecord {
    /// x, y, z
    pub position: [f32; 3],
    /// mass × G; zero in padding slots.
    pub gm: f32,
}

/// Device acceleration record. The fourth lane is unused.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AccelRecord {
    /// ax, ay, az
    pub acceleration: [f32; 3],
    /// Unused.
    pub _pad: f32,
}

/// Uniform parameters. Must match `ForceParams` in the kernel.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ForceParams {
    /// Slots (tiled) or bodies (naive) the kernel sums over.
    pub count: u32,
    /// Softening epsilon.
    pub softening: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Host and device buffers for one body count.
pub struct GpuBuffers {
    /// Host staging for body records, `slots` long, padding zeroed.
    pub bodies_host: Vec<BodyRecord>,
    /// Host staging for acceleration records, `slots` long.
    pub accels_host: Vec<AccelRecord>,

    /// Kernel input (read-only storage).
    pub bodies: wgpu::Buffer,
    /// Kernel output.
    pub accels: wgpu::Buffer,
    /// MAP_READ copy of `accels`.
    pub staging: wgpu::Buffer,
    /// Uniform `ForceParams`.
    pub params: wgpu::Buffer,
    /// Binds the four buffers above to the session's layout.
    pub bind_group: wgpu::BindGroup,

    /// Launch geometry this generation was sized for.
    pub geometry: DispatchGeometry,
}

fn record_bytes(slots: usize) -> u64 {
    (slots * std::mem::size_of::<BodyRecord>()) as u64
}

impl GpuBuffers {
    /// Allocate a generation for `geometry.slots` slots.
    ///
    /// The device input buffer is created from the zeroed host array, so every
    /// padding slot is mass-zero before the first dispatch.
    pub fn new(session: &DeviceSession, geometry: DispatchGeometry) -> ForceResult<Self> {
        let slots = geometry.slots;
        let device = &session.device;

        let mut bodies_host = Vec::new();
        bodies_host
            .try_reserve_exact(slots)
            .map_err(|e| ForceError::Allocation(format!("host body staging: {e}")))?;
        bodies_host.resize(slots, BodyRecord::default());
        let mut accels_host = Vec::new();
        accels_host
            .try_reserve_exact(slots)
            .map_err(|e| ForceError::Allocation(format!("host acceleration staging: {e}")))?;
        accels_host.resize(slots, AccelRecord::default());

        let byte_len = record_bytes(slots);
        if byte_len > session.limits.max_storage_buffer_binding_size as u64 {
            return Err(ForceError::Allocation(format!(
                "{byte_len} bytes exceeds the device's storage binding limit of {}",
                session.limits.max_storage_buffer_binding_size
            )));
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bodies = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bodies"),
            contents: bytemuck::cast_slice(&bodies_host),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let accels = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("accels"),
            size: byte_len,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_accels"),
            size: byte_len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("force_params"),
            size: std::mem::size_of::<ForceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("force_bg"),
            layout: &session.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: bodies.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: accels.as_entire_binding() },
            ],
        });

        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        if let Some(e) = oom.or(validation) {
            return Err(ForceError::Allocation(e.to_string()));
        }

        debug!(
            bodies = geometry.bodies,
            slots,
            bytes = byte_len,
            "allocated buffer generation"
        );

        Ok(Self {
            bodies_host,
            accels_host,
            bodies,
            accels,
            staging,
            params,
            bind_group,
            geometry,
        })
    }

    /// Number of real bodies this generation serves.
    pub fn bodies(&self) -> usize {
        self.geometry.bodies
    }

    /// Allocated slots, real and padding.
    pub fn slots(&self) -> usize {
        self.geometry.slots
    }

    /// Repack the caller's positions and masses into body records, scaling
    /// mass by `g`. Padding slots are left untouched (mass zero).
    pub fn pack(&mut self, input: &ForceInput<'_>, g: f64) {
        for (record, (p, m)) in self.bodies_host.iter_mut().zip(input.iter()) {
            record.position = [p[0] as f32, p[1] as f32, p[2] as f32];
            record.gm = (m * g) as f32;
        }
    }

    /// Upload the packed real-body records and the kernel parameters.
    pub fn upload(&self, queue: &wgpu::Queue, softening: f64) {
        let n = self.bodies();
        queue.write_buffer(&self.bodies, 0, bytemuck::cast_slice(&self.bodies_host[..n]));
        let params = ForceParams {
            count: self.geometry.count_argument,
            softening: softening as f32,
            _pad0: 0,
            _pad1: 0,
        };
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
    }

    /// Encode the copy of the first `n` acceleration records to staging.
    pub fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        let byte_len = record_bytes(self.bodies());
        encoder.copy_buffer_to_buffer(&self.accels, 0, &self.staging, 0, byte_len);
    }

    /// Block on mapping the staging buffer and copy the real-body records
    /// into `accels_host`.
    pub fn read_back(&mut self, device: &wgpu::Device) -> ForceResult<()> {
        let n = self.bodies();
        let byte_len = record_bytes(n);
        let slice = self.staging.slice(..byte_len);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| ForceError::Readback(format!("map callback dropped: {e}")))?
            .map_err(|e| ForceError::Readback(format!("buffer mapping failed: {e}")))?;

        {
            let data = slice.get_mapped_range();
            self.accels_host[..n].copy_from_slice(bytemuck::cast_slice(&data));
        }
        self.staging.unmap();
        Ok(())
    }

    /// Write xyz of the first `n` acceleration records into the caller's
    /// stride-3 output. Padding slots and the fourth lane are dropped.
    pub fn unpack(&self, accelerations: &mut [f64]) {
        let n = self.bodies();
        for (out, record) in accelerations[..3 * n]
            .chunks_exact_mut(3)
            .zip(&self.accels_host[..n])
        {
            out[0] = record.acceleration[0] as f64;
            out[1] = record.acceleration[1] as f64;
            out[2] = record.acceleration[2] as f64;
        }
        trace!(accelerations = ?&accelerations[..3 * n], "unpacked accelerations");
    }
}

impl Drop for GpuBuffers {
    fn drop(&mut self) {
        debug!(slots = self.slots(), "releasing buffer generation");
        self.bodies.destroy();
        self.accels.destroy();
        self.staging.destroy();
        self.params.destroy();
    }
}
