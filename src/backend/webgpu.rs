//! WebGPU backend.
//!
//! Plans built here reproduce the upload structure of a multi-pass FFT: each
//! axis is split into as many uploads as a single workgroup-sized kernel needs,
//! and every upload reads and writes the whole buffer once. No FFT arithmetic
//! is performed, so the timings are the memory-traffic floor of the transform.

use std::borrow::Cow;
use std::sync::Arc;

use instant::Instant;
use log::{debug, info};
use thiserror::Error;
use wgpu::*;

use super::{FftBackend, FftPlan, LaunchParameters, PlanConfiguration};

/// Printed once at startup so the reported numbers are not read as FFT throughput.
pub const BASELINE_NOTICE: &str = "Note: the WebGPU backend replays the FFT upload passes without FFT \
arithmetic; bandwidth figures are a memory-traffic baseline.";

/// Largest axis handled in one upload.
pub const MAX_SINGLE_UPLOAD: u64 = 4096;
const WORKGROUP_SIZE: u64 = 256;

#[derive(Debug, Error)]
pub enum WgpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] RequestDeviceError),
    #[error("buffer size {size} outside the device range 1..={max}")]
    InvalidBufferSize { size: u64, max: u64 },
    #[error("failed to allocate {size} bytes: {message}")]
    Allocation { size: u64, message: String },
    #[error("failed to build plan: {0}")]
    PlanCreation(String),
    #[error("launch needs at least one iteration")]
    NoIterations,
    #[error("failed to execute plan: {0}")]
    Execution(String),
}

/// Opens a device on the chosen backends, either the preferred high
/// performance adapter or the `adapter_index`-th enumerated one.
pub fn request_device(
    backends: Backends,
    adapter_index: Option<usize>,
) -> Result<(Device, Queue, AdapterInfo), WgpuError> {
    let instance = Instance::new(&InstanceDescriptor {
        backends,
        ..Default::default()
    });

    let adapter = match adapter_index {
        Some(index) => instance
            .enumerate_adapters(backends)
            .into_iter()
            .nth(index)
            .ok_or(WgpuError::NoAdapter)?,
        None => pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(WgpuError::NoAdapter)?,
    };
    let info = adapter.get_info();
    info!("using adapter {} ({:?})", info.name, info.backend);

    // Adapter limits rather than defaults so large systems fit in one binding.
    let (device, queue) = pollster::block_on(adapter.request_device(
        &DeviceDescriptor {
            label: None,
            required_features: Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: MemoryHints::Performance,
        },
        None,
    ))?;

    Ok((device, queue, info))
}

pub fn list_adapters(backends: Backends) -> Vec<AdapterInfo> {
    let instance = Instance::new(&InstanceDescriptor {
        backends,
        ..Default::default()
    });
    instance
        .enumerate_adapters(backends)
        .iter()
        .map(Adapter::get_info)
        .collect()
}

/// Number of uploads needed along an axis of length `n`.
pub fn axis_uploads(n: u64) -> u64 {
    if n <= 1 {
        return 1;
    }
    let bits = u64::from(64 - (n - 1).leading_zeros());
    let bits_per_upload = u64::from(MAX_SINGLE_UPLOAD.trailing_zeros());
    bits.div_ceil(bits_per_upload).max(1)
}

/// Workgroup grid covering `size` bytes of 32-bit words.
fn dispatch_grid(size: u64, max_per_dimension: u32) -> (u32, u32) {
    let words = size.div_ceil(4);
    let groups = words.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(u64::from(max_per_dimension));
    let y = groups.div_ceil(x);
    (x as u32, y as u32)
}

/// Records `dispatches` upload passes of `plan` into one command buffer.
fn record_round_trips(device: &Device, plan: &WebGpuPlan, dispatches: u64) -> CommandBuffer {
    let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor { label: None });
    {
        let mut compute_pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: None,
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&plan.pipeline);
        compute_pass.set_bind_group(0, &plan.bind_group, &[]);
        let (x, y) = plan.workgroups;
        for _ in 0..dispatches {
            compute_pass.dispatch_workgroups(x, y, 1);
        }
    }
    encoder.finish()
}

pub struct WebGpuBuffer {
    buffer: Buffer,
    size: u64,
}

pub struct WebGpuPlan {
    axis_uploads: Vec<u64>,
    pipeline: ComputePipeline,
    bind_group: BindGroup,
    workgroups: (u32, u32),
    _shader: Arc<ShaderModule>,
}

impl FftPlan for WebGpuPlan {
    fn axis_uploads(&self) -> &[u64] {
        &self.axis_uploads
    }
}

pub struct WebGpuBackend {
    device: Device,
    queue: Queue,
    shader: Option<Arc<ShaderModule>>,
}

impl WebGpuBackend {
    /// With `precompile_shaders` the shader module is compiled once here and
    /// shared by every plan built with `compiler_initialized` set.
    pub fn new(device: Device, queue: Queue, precompile_shaders: bool) -> Self {
        let shader = precompile_shaders.then(|| Arc::new(compile_shader(&device)));
        Self {
            device,
            queue,
            shader,
        }
    }

    pub fn has_precompiled_shaders(&self) -> bool {
        self.shader.is_some()
    }

    fn max_buffer_size(&self) -> u64 {
        let limits = self.device.limits();
        limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size))
    }
}

fn compile_shader(device: &Device) -> ShaderModule {
    device.create_shader_module(ShaderModuleDescriptor {
        label: Some("FFT round trip"),
        source: ShaderSource::Wgsl(Cow::Borrowed(include_str!("./shaders/round_trip.wgsl"))),
    })
}

impl FftBackend for WebGpuBackend {
    type Buffer = WebGpuBuffer;
    type Plan = WebGpuPlan;
    type Error = WgpuError;

    fn allocate(&self, size: u64) -> Result<WebGpuBuffer, WgpuError> {
        let max = self.max_buffer_size();
        if size == 0 || size > max {
            return Err(WgpuError::InvalidBufferSize { size, max });
        }

        self.device.push_error_scope(ErrorFilter::OutOfMemory);
        self.device.push_error_scope(ErrorFilter::Validation);
        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("FFT Buffer"),
            size: util::align_to(size, COPY_BUFFER_ALIGNMENT),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        if let Some(error) = out_of_memory.or(validation) {
            buffer.destroy();
            return Err(WgpuError::Allocation {
                size,
                message: error.to_string(),
            });
        }
        debug!("allocated {} byte buffer", size);
        Ok(WebGpuBuffer { buffer, size })
    }

    fn free(&self, buffer: WebGpuBuffer) {
        buffer.buffer.destroy();
        debug!("freed {} byte buffer", buffer.size);
    }

    fn build_plan(
        &self,
        config: &PlanConfiguration,
        buffer: &WebGpuBuffer,
    ) -> Result<WebGpuPlan, WgpuError> {
        let axis_uploads: Vec<u64> = config
            .size
            .iter()
            .take(config.fft_dim as usize)
            .map(|&n| axis_uploads(n))
            .collect();

        let shader = match (&self.shader, config.compiler_initialized) {
            (Some(shader), true) => Arc::clone(shader),
            _ => Arc::new(compile_shader(&self.device)),
        };

        self.device.push_error_scope(ErrorFilter::Validation);

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: None,
                entries: &[BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &bind_group_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: buffer.buffer.as_entire_binding(),
            }],
        });

        let pipeline = self
            .device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some("FFT round trip"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: PipelineCompilationOptions::default(),
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(WgpuError::PlanCreation(error.to_string()));
        }

        let workgroups = dispatch_grid(
            buffer.size,
            self.device.limits().max_compute_workgroups_per_dimension,
        );
        debug!(
            "plan {:?} batch {} {:?} r2c {}: axis uploads {:?}, grid {:?}",
            config.size,
            config.number_batches,
            config.precision,
            config.perform_r2c,
            axis_uploads,
            workgroups
        );

        Ok(WebGpuPlan {
            axis_uploads,
            pipeline,
            bind_group,
            workgroups,
            _shader: shader,
        })
    }

    fn execute(
        &self,
        plan: &mut WebGpuPlan,
        launch: &LaunchParameters,
        iterations: u64,
    ) -> Result<f64, WgpuError> {
        if iterations == 0 {
            return Err(WgpuError::NoIterations);
        }
        let uploads = plan.axis_uploads.iter().sum::<u64>() * launch.directions();

        self.device.push_error_scope(ErrorFilter::Validation);
        let command_buffer = record_round_trips(&self.device, plan, iterations * uploads);

        let start = Instant::now();
        self.queue.submit(Some(command_buffer));
        self.device.poll(wgpu::MaintainBase::Wait);
        let elapsed = start.elapsed();

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(WgpuError::Execution(error.to_string()));
        }
        Ok(elapsed.as_secs_f64() * 1000.0 / iterations as f64)
    }

    /// Pipeline, bind group and a non-shared shader module are released with the plan.
    fn destroy_plan(&self, plan: WebGpuPlan) {
        debug!("destroying plan with axis uploads {:?}", plan.axis_uploads);
        drop(plan);
    }
}
