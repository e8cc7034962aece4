use std::io::Write;

use log::{debug, info};
use thiserror::Error;

use super::report::SystemReport;
use super::stats::{real_bandwidth, scaled_bandwidth, throughput_kb_per_ms, TimingSamples};
use super::{BenchmarkParameters, NUM_PASSES, NUM_RUNS};
use crate::backend::{
    DeviceBuffer, FftBackend, FftPlan, LaunchParameters, PlanConfiguration, PlanHandle,
};

#[derive(Debug, Error)]
pub enum BenchmarkError<E: std::error::Error + 'static> {
    #[error("buffer for {x}x{y}x{z} batch {batch} does not fit in a 64-bit size")]
    BufferSizeOverflow { x: u64, y: u64, z: u64, batch: u64 },
    #[error("failed to allocate {size} byte device buffer")]
    Allocation {
        size: u64,
        #[source]
        source: E,
    },
    #[error(transparent)]
    Engine(E),
    #[error("failed to write benchmark report")]
    Report(#[from] std::io::Error),
}

/// Benchmarks FFT+iFFT of one system on `backend`.
///
/// Every trial builds its own buffer and plan and tears both down before the
/// next one starts. The first pass only warms up; statistics come from the
/// trials of the last pass. The report line is appended to `output`, if given,
/// and printed to stdout.
pub fn run_benchmark<B: FftBackend>(
    backend: &B,
    output: Option<&mut dyn Write>,
    compiler_initialized: bool,
    params: &BenchmarkParameters,
) -> Result<SystemReport, BenchmarkError<B::Error>> {
    let launch = LaunchParameters::default();

    for pass in 0..NUM_PASSES {
        let mut samples = TimingSamples::default();
        for run in 0..NUM_RUNS {
            let config = PlanConfiguration::new(params, compiler_initialized).ok_or(
                BenchmarkError::BufferSizeOverflow {
                    x: params.x,
                    y: params.y,
                    z: params.z,
                    batch: params.batch,
                },
            )?;
            let buffer = DeviceBuffer::allocate(backend, config.buffer_size).map_err(|source| {
                BenchmarkError::Allocation {
                    size: config.buffer_size,
                    source,
                }
            })?;
            let mut plan =
                PlanHandle::build(backend, &config, &buffer).map_err(BenchmarkError::Engine)?;
            let time = plan
                .execute(&launch, params.iterations)
                .map_err(BenchmarkError::Engine)?;
            debug!("pass {pass} run {run}: {time:.3} ms per iteration");
            samples.record(run, time);

            if pass == NUM_PASSES - 1 && run == NUM_RUNS - 1 {
                let total_axis_uploads = plan.total_axis_uploads(config.fft_dim);
                let report = system_report(params, &config, &samples, total_axis_uploads);
                if let Some(output) = output {
                    writeln!(output, "{}", report.file_line())?;
                }
                println!("{}", report.console_line());
                info!(
                    "{}x{}x{} batch {}: {} axis uploads",
                    report.size[0],
                    report.size[1],
                    report.size[2],
                    report.batch,
                    total_axis_uploads
                );
                return Ok(report);
            }
        }
    }

    unreachable!("the last trial of the last pass returns its report")
}

fn system_report(
    params: &BenchmarkParameters,
    config: &PlanConfiguration,
    samples: &TimingSamples,
    total_axis_uploads: u64,
) -> SystemReport {
    let avg_time = samples.mean();
    SystemReport {
        size: config.size,
        batch: params.batch,
        buffer_size: config.buffer_size,
        avg_time,
        std_error: samples.std_error(),
        iterations: params.iterations,
        throughput_kb_per_ms: throughput_kb_per_ms(config.buffer_size, avg_time),
        scaled_bandwidth: scaled_bandwidth(config.buffer_size, config.fft_dim, avg_time),
        real_bandwidth: real_bandwidth(config.buffer_size, total_axis_uploads, avg_time),
    }
}
