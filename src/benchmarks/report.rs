use std::fmt;

/// Statistics for one benchmarked system, produced by the last trial of the recorded pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemReport {
    pub size: [u64; 3],
    pub batch: u64,
    pub buffer_size: u64,
    pub avg_time: f64,
    pub std_error: f64,
    pub iterations: u64,
    /// Unrounded benchmark score; callers sum these across systems.
    pub throughput_kb_per_ms: f64,
    pub scaled_bandwidth: f64,
    pub real_bandwidth: f64,
}

impl SystemReport {
    pub fn buffer_mb(&self) -> u64 {
        self.buffer_size / 1024 / 1024
    }

    pub fn benchmark_score(&self) -> u64 {
        self.throughput_kb_per_ms as u64
    }

    /// Line written to the results file. Downstream log parsers depend on this layout.
    pub fn file_line(&self) -> String {
        self.line("bandwidth")
    }

    pub fn console_line(&self) -> String {
        self.line("real bandwidth")
    }

    fn line(&self, real_bandwidth_label: &str) -> String {
        format!(
            "VkFFT System: {}x{}x{} Batch: {} Buffer: {} MB avg_time_per_step: {:.3} ms std_error: {:.3} num_iter: {} benchmark: {} scaled bandwidth: {:.1} {}: {:.1}",
            self.size[0],
            self.size[1],
            self.size[2],
            self.batch,
            self.buffer_mb(),
            self.avg_time,
            self.std_error,
            self.iterations,
            self.benchmark_score(),
            self.scaled_bandwidth,
            real_bandwidth_label,
            self.real_bandwidth,
        )
    }
}

impl fmt::Display for SystemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_line())
    }
}
