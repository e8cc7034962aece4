use std::fs::OpenOptions;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::info;

mod backend;
mod benchmarks;

use backend::webgpu::{self, WebGpuBackend};
use benchmarks::{fft_system::run_benchmark, BenchmarkParameters, Precision};

#[derive(Parser)]
#[command(name = "fft-bench")]
#[command(about = "Benchmarks FFT+iFFT systems on the GPU")]
struct Cli {
    /// Transform size along X
    #[arg(short = 'X', default_value_t = 256, value_parser = clap::value_parser!(u64).range(1..))]
    x: u64,

    /// Transform size along Y
    #[arg(short = 'Y', default_value_t = 256, value_parser = clap::value_parser!(u64).range(1..))]
    y: u64,

    /// Transform size along Z
    #[arg(short = 'Z', default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    z: u64,

    /// Number of batched systems
    #[arg(short = 'B', default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    batch: u64,

    /// Precision: 0 = single, 1 = double, 2 = half
    #[arg(short = 'P', default_value_t = 0, value_parser = clap::value_parser!(u64).range(0..=2))]
    precision: u64,

    /// FFT+iFFT iterations per timed run
    #[arg(short = 'N', default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    iterations: u64,

    /// Real-to-complex transform
    #[arg(long)]
    r2c: bool,

    /// Append report lines to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Compile shaders once up front instead of once per plan
    #[arg(long)]
    precompile_shaders: bool,

    /// Benchmark X = 2^k for every k in MIN..=MAX, keeping X*Y*Z*B fixed
    #[arg(long, value_name = "MIN..=MAX", value_parser = parse_sweep)]
    sweep: Option<RangeInclusive<u32>>,

    #[arg(long, value_enum, default_value_t = GpuApi::All)]
    backend: GpuApi,

    /// Index into the adapter list instead of the preferred adapter
    #[arg(long)]
    adapter: Option<usize>,

    /// Print available adapters and exit
    #[arg(long)]
    list_adapters: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GpuApi {
    All,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl From<GpuApi> for wgpu::Backends {
    fn from(api: GpuApi) -> Self {
        match api {
            GpuApi::All => wgpu::Backends::all(),
            GpuApi::Vulkan => wgpu::Backends::VULKAN,
            GpuApi::Metal => wgpu::Backends::METAL,
            GpuApi::Dx12 => wgpu::Backends::DX12,
            GpuApi::Gl => wgpu::Backends::GL,
        }
    }
}

fn parse_sweep(s: &str) -> Result<RangeInclusive<u32>, String> {
    let (min, max) = s
        .split_once("..=")
        .or_else(|| s.split_once(".."))
        .ok_or_else(|| format!("expected MIN..=MAX, got {s:?}"))?;
    let min: u32 = min.trim().parse().map_err(|e| format!("{min:?}: {e}"))?;
    let max: u32 = max.trim().parse().map_err(|e| format!("{max:?}: {e}"))?;
    if min > max || max > 40 {
        return Err(format!("invalid exponent range {min}..={max}"));
    }
    Ok(min..=max)
}

impl Cli {
    fn systems(&self) -> anyhow::Result<Vec<BenchmarkParameters>> {
        let base = BenchmarkParameters {
            x: self.x,
            y: self.y,
            z: self.z,
            batch: self.batch,
            precision: Precision::try_from(self.precision)?,
            r2c: self.r2c,
            iterations: self.iterations,
        };
        let Some(sweep) = self.sweep.clone() else {
            return Ok(vec![base]);
        };

        let total = base
            .total_elements()
            .context("system size overflows a 64-bit element count")?;
        sweep
            .map(|k| {
                let x = 1u64 << k;
                let slice = x
                    .checked_mul(base.y)
                    .and_then(|n| n.checked_mul(base.z))
                    .with_context(|| format!("sweep size 2^{k} overflows a 64-bit element count"))?;
                Ok::<_, anyhow::Error>(BenchmarkParameters {
                    x,
                    batch: (total / slice).max(1),
                    ..base.clone()
                })
            })
            .collect()
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let backends = wgpu::Backends::from(cli.backend);

    if cli.list_adapters {
        for (index, adapter) in webgpu::list_adapters(backends).iter().enumerate() {
            println!(
                "{index}: {} ({:?}, {:?})",
                adapter.name, adapter.backend, adapter.device_type
            );
        }
        return Ok(());
    }

    let systems = cli.systems()?;
    let (device, queue, adapter) =
        webgpu::request_device(backends, cli.adapter).context("failed to open GPU device")?;
    println!("Device: {} ({:?})", adapter.name, adapter.backend);
    println!("{}", webgpu::BASELINE_NOTICE);
    let backend = WebGpuBackend::new(device, queue, cli.precompile_shaders);

    let mut output = match &cli.output {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => None,
    };

    let mut benchmark_result = 0.0;
    for params in &systems {
        let sink = output.as_mut().map(|file| file as &mut dyn Write);
        let report = run_benchmark(&backend, sink, backend.has_precompiled_shaders(), params)
            .with_context(|| format!("{}x{}x{} benchmark failed", params.x, params.y, params.z))?;
        benchmark_result += report.throughput_kb_per_ms;
    }

    let score = (benchmark_result / systems.len() as f64) as u64;
    info!("benchmarked {} systems", systems.len());
    println!("Benchmark score VkFFT: {score}");
    if let Some(file) = output.as_mut() {
        writeln!(file, "Benchmark score VkFFT: {score}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sweep() {
        assert_eq!(parse_sweep("3..=10"), Ok(3..=10));
        assert_eq!(parse_sweep("3..10"), Ok(3..=10));
        assert!(parse_sweep("10..=3").is_err());
        assert!(parse_sweep("a..=3").is_err());
        assert!(parse_sweep("7").is_err());
    }

    #[test]
    fn test_default_system() {
        let cli = Cli::parse_from(["fft-bench"]);
        let systems = cli.systems().unwrap();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].buffer_size(), Some(524_288));
        assert_eq!(systems[0].iterations, 100);
    }

    #[test]
    fn test_flags_map_to_parameters() {
        let cli = Cli::parse_from([
            "fft-bench", "-X", "512", "-Y", "1", "-Z", "1", "-B", "4", "-P", "1", "-N", "20",
            "--r2c",
        ]);
        let systems = cli.systems().unwrap();
        let params = &systems[0];
        assert_eq!(params.x, 512);
        assert_eq!(params.batch, 4);
        assert_eq!(params.precision, Precision::Double);
        assert!(params.r2c);
        assert_eq!(params.fft_dim(), 1);
    }

    #[test]
    fn test_sweep_keeps_total_elements() {
        let cli = Cli::parse_from(["fft-bench", "-Y", "1", "-B", "16", "--sweep", "4..=8"]);
        let systems = cli.systems().unwrap();
        let xs: Vec<u64> = systems.iter().map(|p| p.x).collect();
        assert_eq!(xs, [16, 32, 64, 128, 256]);
        for params in &systems {
            assert_eq!(params.total_elements(), Some(256 * 16));
        }
    }

    #[test]
    fn test_oversized_system_is_an_error() {
        let cli = Cli::parse_from([
            "fft-bench", "-X", "2147483648", "-Y", "2147483648", "-Z", "4", "--sweep", "1..=2",
        ]);
        let err = cli.systems().unwrap_err();
        assert!(err.to_string().contains("overflows"));

        let cli = Cli::parse_from([
            "fft-bench", "-Y", "4294967296", "-Z", "4294967296", "--sweep", "1..=1",
        ]);
        assert!(cli.systems().is_err());
    }

    #[test]
    fn test_rejects_zero_size_and_bad_precision() {
        assert!(Cli::try_parse_from(["fft-bench", "-X", "0"]).is_err());
        assert!(Cli::try_parse_from(["fft-bench", "-P", "3"]).is_err());
    }
}
