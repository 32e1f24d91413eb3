//! Device session: adapter choice, device and queue, compiled kernel.

use tracing::{debug, info, warn};

use crate::config::GpuForceConfig;
use crate::error::{ForceError, ForceResult};
use crate::strategy::DispatchStrategy;

/// Live device handles needed to issue any force work.
///
/// Fields drop in declaration order, so the pipeline goes first and the
/// device last.
pub struct DeviceSession {
    /// Compute pipeline for the strategy's entry point.
    pub pipeline: wgpu::ComputePipeline,
    /// Layout shared by every buffer generation's bind group.
    pub bind_group_layout: wgpu::BindGroupLayout,
    /// Compiled kernel module.
    pub module: wgpu::ShaderModule,
    /// In-order command queue.
    pub queue: wgpu::Queue,
    /// Logical device.
    pub device: wgpu::Device,
    /// Limits the device was created with.
    pub limits: wgpu::Limits,
    /// Adapter the device belongs to.
    pub adapter_info: wgpu::AdapterInfo,
    /// Strategy the pipeline was compiled for.
    pub strategy: DispatchStrategy,
}

/// Whether an adapter of this type counts as an accelerator.
pub(crate) fn is_accelerator(device_type: wgpu::DeviceType, allow_software: bool) -> bool {
    match device_type {
        wgpu::DeviceType::DiscreteGpu
        | wgpu::DeviceType::IntegratedGpu
        | wgpu::DeviceType::VirtualGpu => true,
        wgpu::DeviceType::Cpu => allow_software,
        wgpu::DeviceType::Other => false,
    }
}

/// Pick the first accelerator among at most `max_adapters` adapters.
fn select_adapter(
    instance: &wgpu::Instance,
    max_adapters: usize,
    allow_software: bool,
) -> ForceResult<wgpu::Adapter> {
    let adapters = instance.enumerate_adapters(wgpu::Backends::all());
    let mut inspected = 0;
    for adapter in adapters.into_iter().take(max_adapters) {
        inspected += 1;
        let info = adapter.get_info();
        debug!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "inspecting adapter");
        if is_accelerator(info.device_type, allow_software) {
            return Ok(adapter);
        }
    }
    Err(ForceError::NoAccelerator { inspected })
}

/// Check that the device can launch the strategy's workgroups.
fn check_limits(strategy: &DispatchStrategy, limits: &wgpu::Limits) -> ForceResult<()> {
    let [x, y] = strategy.workgroup_size();
    if x > limits.max_compute_workgroup_size_x || y > limits.max_compute_workgroup_size_y {
        return Err(ForceError::UnsupportedGeometry(format!(
            "workgroup {x}x{y} exceeds device maximum {}x{}",
            limits.max_compute_workgroup_size_x, limits.max_compute_workgroup_size_y
        )));
    }
    let invocations = strategy.invocations_per_workgroup();
    if invocations > limits.max_compute_invocations_per_workgroup {
        return Err(ForceError::UnsupportedGeometry(format!(
            "{invocations} invocations per workgroup exceeds device maximum {}",
            limits.max_compute_invocations_per_workgroup
        )));
    }
    let shared = strategy.workgroup_storage_bytes();
    if shared > limits.max_compute_workgroup_storage_size {
        return Err(ForceError::UnsupportedGeometry(format!(
            "{shared} bytes of workgroup memory exceeds device maximum {}",
            limits.max_compute_workgroup_storage_size
        )));
    }
    Ok(())
}

fn bgl_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl DeviceSession {
    /// Acquire a device and compile the force kernel for `config.strategy`.
    pub fn new(config: &GpuForceConfig) -> ForceResult<Self> {
        config.validate()?;
        let strategy = config.strategy;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = select_adapter(&instance, config.max_adapters, config.allow_software_adapter)
            .inspect_err(|e| warn!("{e}"))?;
        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "selected GPU adapter"
        );

        let adapter_limits = adapter.limits();
        check_limits(&strategy, &adapter_limits)?;

        // Ask for the adapter's real workgroup limits rather than the defaults
        // so wide tiles are not rejected on hardware that supports them.
        let mut required_limits = wgpu::Limits::default();
        required_limits.max_compute_invocations_per_workgroup =
            adapter_limits.max_compute_invocations_per_workgroup;
        required_limits.max_compute_workgroup_size_x = adapter_limits.max_compute_workgroup_size_x;
        required_limits.max_compute_workgroup_size_y = adapter_limits.max_compute_workgroup_size_y;
        required_limits.max_compute_workgroup_storage_size =
            adapter_limits.max_compute_workgroup_storage_size;
        required_limits.max_storage_buffer_binding_size =
            adapter_limits.max_storage_buffer_binding_size;
        required_limits.max_buffer_size = adapter_limits.max_buffer_size;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("force_device"),
                required_features: wgpu::Features::empty(),
                required_limits: required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| ForceError::DeviceRequest(e.to_string()))?;

        let source = config.kernel_source.compose(&strategy)?;
        let entry_point = strategy.entry_point();

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("force_kernel"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("force_bgl"),
            entries: &[
                bgl_entry(0, wgpu::BufferBindingType::Uniform),
                bgl_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                bgl_entry(2, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("force_pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            let log = build_log(&module, &e);
            warn!(entry_point, "kernel build failed");
            return Err(ForceError::KernelBuild {
                entry_point: entry_point.to_owned(),
                log,
            });
        }

        info!(
            entry_point,
            tile_width = strategy.tile_width(),
            threads_per_body = strategy.threads_per_body(),
            "force kernel built"
        );

        Ok(Self {
            pipeline,
            bind_group_layout,
            module,
            queue,
            device,
            limits: required_limits,
            adapter_info,
            strategy,
        })
    }

    /// Block until every submitted command has finished.
    pub fn drain(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

/// Compiler messages for the failed module, or the scope error if the
/// compiler reported nothing.
fn build_log(module: &wgpu::ShaderModule, error: &wgpu::Error) -> String {
    let info = pollster::block_on(module.get_compilation_info());
    let messages: Vec<String> = info
        .messages
        .iter()
        .map(|m| match &m.location {
            Some(loc) => format!(
                "{:?} at {}:{}: {}",
                m.message_type, loc.line_number, loc.line_position, m.message
            ),
            None => format!("{:?}: {}", m.message_type, m.message),
        })
        .collect();
    if messages.is_empty() {
        error.to_string()
    } else {
        messages.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_adapters_need_opt_in() {
        assert!(is_accelerator(wgpu::DeviceType::DiscreteGpu, false));
        assert!(is_accelerator(wgpu::DeviceType::IntegratedGpu, false));
        assert!(!is_accelerator(wgpu::DeviceType::Cpu, false));
        assert!(is_accelerator(wgpu::DeviceType::Cpu, true));
        assert!(!is_accelerator(wgpu::DeviceType::Other, true));
    }

    #[test]
    fn test_default_geometry_fits_default_limits() {
        let limits = wgpu::Limits::default();
        assert!(check_limits(&DispatchStrategy::tiled(), &limits).is_ok());
        assert!(check_limits(&DispatchStrategy::Naive, &limits).is_ok());
    }

    #[test]
    fn test_oversized_tiles_rejected() {
        let limits = wgpu::Limits::default();
        let wide = DispatchStrategy::Tiled {
            tile_width: 64,
            threads_per_body: 8,
        };
        let err = check_limits(&wide, &limits).unwrap_err();
        assert!(matches!(err, ForceError::UnsupportedGeometry(_)));
    }
}
