use thiserror::Error;

pub mod fft_system;
pub mod report;
pub mod stats;

/// Timed trials per pass.
pub const NUM_RUNS: usize = 3;
/// Outer passes; only the last one is reported, the first warms caches and compilers.
pub const NUM_PASSES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
    Half,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown precision selector {0} (expected 0 = single, 1 = double, 2 = half)")]
pub struct UnknownPrecision(pub u64);

impl TryFrom<u64> for Precision {
    type Error = UnknownPrecision;

    fn try_from(selector: u64) -> Result<Self, Self::Error> {
        match selector {
            0 => Ok(Precision::Single),
            1 => Ok(Precision::Double),
            2 => Ok(Precision::Half),
            other => Err(UnknownPrecision(other)),
        }
    }
}

impl Precision {
    /// Size in bytes of one complex element.
    pub fn complex_element_size(self) -> u64 {
        match self {
            Precision::Single => 2 * std::mem::size_of::<f32>() as u64,
            Precision::Double => 2 * std::mem::size_of::<f64>() as u64,
            Precision::Half => 2 * 2,
        }
    }
}

/// Transform sizes and run settings for one benchmarked system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkParameters {
    pub x: u64,
    pub y: u64,
    pub z: u64,
    pub batch: u64,
    pub precision: Precision,
    pub r2c: bool,
    /// FFT+iFFT iterations per timed run.
    pub iterations: u64,
}

impl BenchmarkParameters {
    pub fn fft_dim(&self) -> u32 {
        1 + u32::from(self.y > 1) + u32::from(self.z > 1)
    }

    /// Bytes of device memory the plan operates on, or `None` if that does not fit in a `u64`.
    ///
    /// Real-to-complex transforms store `X/2 + 1` complex values along the
    /// leading axis, which is `X + 2` reals of half the complex element size.
    pub fn buffer_size(&self) -> Option<u64> {
        let element_size = self.precision.complex_element_size();
        let (scalar_size, leading) = if self.r2c {
            (element_size / 2, self.x.checked_add(2)?)
        } else {
            (element_size, self.x)
        };
        scalar_size
            .checked_mul(leading)?
            .checked_mul(self.y)?
            .checked_mul(self.z)?
            .checked_mul(self.batch)
    }

    pub fn total_elements(&self) -> Option<u64> {
        self.x
            .checked_mul(self.y)?
            .checked_mul(self.z)?
            .checked_mul(self.batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(precision: Precision, r2c: bool) -> BenchmarkParameters {
        BenchmarkParameters {
            x: 256,
            y: 256,
            z: 1,
            batch: 1,
            precision,
            r2c,
            iterations: 10,
        }
    }

    #[test]
    fn test_precision_selector() {
        assert_eq!(Precision::try_from(0), Ok(Precision::Single));
        assert_eq!(Precision::try_from(1), Ok(Precision::Double));
        assert_eq!(Precision::try_from(2), Ok(Precision::Half));
        assert_eq!(Precision::try_from(3), Err(UnknownPrecision(3)));
    }

    #[test]
    fn test_complex_element_size() {
        assert_eq!(Precision::Single.complex_element_size(), 8);
        assert_eq!(Precision::Double.complex_element_size(), 16);
        assert_eq!(Precision::Half.complex_element_size(), 4);
    }

    #[test]
    fn test_buffer_size_complex() {
        assert_eq!(params(Precision::Single, false).buffer_size(), Some(524_288));
        assert_eq!(params(Precision::Double, false).buffer_size(), Some(1_048_576));
        assert_eq!(params(Precision::Half, false).buffer_size(), Some(262_144));
    }

    #[test]
    fn test_buffer_size_r2c_pads_leading_axis() {
        assert_eq!(params(Precision::Single, true).buffer_size(), Some(264_192));
        assert_eq!(params(Precision::Double, true).buffer_size(), Some(8 * 258 * 256));
        assert_eq!(params(Precision::Half, true).buffer_size(), Some(2 * 258 * 256));
    }

    #[test]
    fn test_buffer_size_scales_with_batch_and_depth() {
        let mut p = params(Precision::Single, false);
        p.z = 4;
        p.batch = 3;
        assert_eq!(p.buffer_size(), Some(8 * 256 * 256 * 4 * 3));
    }

    #[test]
    fn test_oversized_system_has_no_buffer_size() {
        let mut p = params(Precision::Single, false);
        p.x = 1 << 31;
        p.y = 1 << 31;
        p.z = 4;
        assert_eq!(p.buffer_size(), None);
        assert_eq!(p.total_elements(), None);

        p.r2c = true;
        p.x = u64::MAX - 1;
        p.y = 1;
        p.z = 1;
        assert_eq!(p.buffer_size(), None);
    }

    #[test]
    fn test_fft_dim() {
        let mut p = params(Precision::Single, false);
        assert_eq!(p.fft_dim(), 2);
        p.y = 1;
        assert_eq!(p.fft_dim(), 1);
        p.z = 8;
        assert_eq!(p.fft_dim(), 2);
        p.y = 2;
        assert_eq!(p.fft_dim(), 3);
    }
}
