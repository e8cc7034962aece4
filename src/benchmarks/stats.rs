use super::NUM_RUNS;

/// Divisor applied after the two MiB divisions; keeps GB/s numbers comparable
/// with existing result sets.
pub const BANDWIDTH_MIB_SCALE: f64 = 1.024;
/// Each upload is read and written once, for both the forward and the inverse transform.
pub const TRANSFERS_PER_UPLOAD: u64 = 4;

/// Per-iteration times (ms) of the trials of one pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingSamples {
    run_time: [f64; NUM_RUNS],
}

impl TimingSamples {
    pub fn record(&mut self, run: usize, time_ms: f64) {
        self.run_time[run] = time_ms;
    }

    pub fn mean(&self) -> f64 {
        self.run_time.iter().sum::<f64>() / NUM_RUNS as f64
    }

    /// Population standard deviation of the samples.
    pub fn std_error(&self) -> f64 {
        let avg_time = self.mean();
        let variance = self
            .run_time
            .iter()
            .map(|t| (t - avg_time) * (t - avg_time))
            .sum::<f64>()
            / NUM_RUNS as f64;
        variance.sqrt()
    }
}

fn scaled_mib(buffer_size: u64) -> f64 {
    buffer_size as f64 / 1024.0 / 1024.0 / BANDWIDTH_MIB_SCALE
}

/// Bandwidth assuming every axis is done in a single upload.
pub fn scaled_bandwidth(buffer_size: u64, fft_dim: u32, avg_time: f64) -> f64 {
    scaled_mib(buffer_size) * TRANSFERS_PER_UPLOAD as f64 * f64::from(fft_dim) / avg_time
}

/// Bandwidth from the uploads the plan actually performs.
pub fn real_bandwidth(buffer_size: u64, total_axis_uploads: u64, avg_time: f64) -> f64 {
    scaled_mib(buffer_size) * (total_axis_uploads * TRANSFERS_PER_UPLOAD) as f64 / avg_time
}

/// KiB processed per millisecond.
pub fn throughput_kb_per_ms(buffer_size: u64, avg_time: f64) -> f64 {
    buffer_size as f64 / 1024.0 / avg_time
}
