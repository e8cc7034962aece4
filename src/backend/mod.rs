use std::ops::{Deref, DerefMut};

use crate::benchmarks::{BenchmarkParameters, Precision};

#[cfg(test)]
pub mod mock;
pub mod webgpu;

/// Everything a backend needs to build a plan for one trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConfiguration {
    /// Number of transformed axes (1, 2 or 3).
    pub fft_dim: u32,
    pub size: [u64; 3],
    pub number_batches: u64,
    pub precision: Precision,
    pub perform_r2c: bool,
    pub buffer_size: u64,
    /// The caller compiled shaders up front; the plan must not compile its own.
    pub compiler_initialized: bool,
}

impl PlanConfiguration {
    /// `None` when the system's buffer size overflows `u64`.
    pub fn new(params: &BenchmarkParameters, compiler_initialized: bool) -> Option<Self> {
        Some(Self {
            fft_dim: params.fft_dim(),
            size: [params.x, params.y, params.z],
            number_batches: params.batch,
            precision: params.precision,
            perform_r2c: params.r2c,
            buffer_size: params.buffer_size()?,
            compiler_initialized,
        })
    }
}

/// Which directions one iteration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchParameters {
    pub forward: bool,
    pub inverse: bool,
}

impl Default for LaunchParameters {
    fn default() -> Self {
        Self {
            forward: true,
            inverse: true,
        }
    }
}

impl LaunchParameters {
    pub fn directions(&self) -> u64 {
        u64::from(self.forward) + u64::from(self.inverse)
    }
}

pub trait FftPlan {
    /// Upload passes per axis, indexed by axis.
    fn axis_uploads(&self) -> &[u64];

    fn total_axis_uploads(&self, fft_dim: u32) -> u64 {
        self.axis_uploads().iter().take(fft_dim as usize).sum()
    }
}

/// Device memory plus an FFT engine able to plan and run transforms on it.
pub trait FftBackend {
    type Buffer;
    type Plan: FftPlan;
    type Error: std::error::Error + Send + Sync + 'static;

    fn allocate(&self, size: u64) -> Result<Self::Buffer, Self::Error>;
    fn free(&self, buffer: Self::Buffer);
    fn build_plan(
        &self,
        config: &PlanConfiguration,
        buffer: &Self::Buffer,
    ) -> Result<Self::Plan, Self::Error>;
    /// Runs `iterations` launches and returns the elapsed time per iteration in milliseconds.
    fn execute(
        &self,
        plan: &mut Self::Plan,
        launch: &LaunchParameters,
        iterations: u64,
    ) -> Result<f64, Self::Error>;
    fn destroy_plan(&self, plan: Self::Plan);
}

/// Device allocation released through its backend when dropped.
pub struct DeviceBuffer<'a, B: FftBackend> {
    backend: &'a B,
    buffer: Option<B::Buffer>,
}

impl<'a, B: FftBackend> DeviceBuffer<'a, B> {
    pub fn allocate(backend: &'a B, size: u64) -> Result<Self, B::Error> {
        let buffer = backend.allocate(size)?;
        Ok(Self {
            backend,
            buffer: Some(buffer),
        })
    }
}

impl<B: FftBackend> Deref for DeviceBuffer<'_, B> {
    type Target = B::Buffer;

    fn deref(&self) -> &B::Buffer {
        self.buffer.as_ref().expect("buffer is only taken on drop")
    }
}

impl<B: FftBackend> Drop for DeviceBuffer<'_, B> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.backend.free(buffer);
        }
    }
}

/// Plan destroyed through its backend when dropped.
pub struct PlanHandle<'a, B: FftBackend> {
    backend: &'a B,
    plan: Option<B::Plan>,
}

impl<'a, B: FftBackend> PlanHandle<'a, B> {
    pub fn build(
        backend: &'a B,
        config: &PlanConfiguration,
        buffer: &B::Buffer,
    ) -> Result<Self, B::Error> {
        let plan = backend.build_plan(config, buffer)?;
        Ok(Self {
            backend,
            plan: Some(plan),
        })
    }

    pub fn execute(&mut self, launch: &LaunchParameters, iterations: u64) -> Result<f64, B::Error> {
        let backend = self.backend;
        backend.execute(&mut **self, launch, iterations)
    }
}

impl<B: FftBackend> Deref for PlanHandle<'_, B> {
    type Target = B::Plan;

    fn deref(&self) -> &B::Plan {
        self.plan.as_ref().expect("plan is only taken on drop")
    }
}

impl<B: FftBackend> DerefMut for PlanHandle<'_, B> {
    fn deref_mut(&mut self) -> &mut B::Plan {
        self.plan.as_mut().expect("plan is only taken on drop")
    }
}

impl<B: FftBackend> Drop for PlanHandle<'_, B> {
    fn drop(&mut self) {
        if let Some(plan) = self.plan.take() {
            self.backend.destroy_plan(plan);
        }
    }
}
