//! In-place radix-2 FFT kernel for the vocoder hot path.
//!
//! Features:
//! - Pre-computed twiddle factors (zero runtime trig)
//! - Pre-computed bit-reversal permutation table
//! - Zero-allocation processing on caller-owned buffers
//!
//! The inverse transform is deliberately not normalized by `1/N`; the
//! overlap-add factors in the shifter fold that scale in.

/// Transform direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// Complex number for FFT operations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    #[inline(always)]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[inline(always)]
    pub fn magnitude(self) -> f64 {
        (self.re * self.re + self.im * self.im).sqrt()
    }

    #[inline(always)]
    pub fn phase(self) -> f64 {
        self.im.atan2(self.re)
    }

    #[inline(always)]
    pub fn from_polar(mag: f64, phase: f64) -> Self {
        let (sin, cos) = phase.sin_cos();
        Self {
            re: mag * cos,
            im: mag * sin,
        }
    }

    #[inline(always)]
    pub fn mul(self, other: Self) -> Self {
        Self {
            re: self.re * other.re - self.im * other.im,
            im: self.re * other.im + self.im * other.re,
        }
    }

    #[inline(always)]
    pub fn add(self, other: Self) -> Self {
        Self {
            re: self.re + other.re,
            im: self.im + other.im,
        }
    }

    #[inline(always)]
    pub fn sub(self, other: Self) -> Self {
        Self {
            re: self.re - other.re,
            im: self.im - other.im,
        }
    }
}

/// Radix-2 Cooley-Tukey FFT with tables fixed at construction.
///
/// `size` must be a power of two; the shifter validates that before the
/// kernel is ever built.
pub struct Fft {
    size: usize,
    bit_rev: Vec<usize>,
    twiddles: Vec<Complex>,
    twiddles_inv: Vec<Complex>,
}

impl Fft {
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        let log2_size = size.trailing_zeros();
        Self {
            size,
            bit_rev: Self::compute_bit_reversal(size, log2_size),
            twiddles: Self::compute_twiddles(size, Direction::Forward),
            twiddles_inv: Self::compute_twiddles(size, Direction::Inverse),
        }
    }

    fn compute_twiddles(size: usize, direction: Direction) -> Vec<Complex> {
        let sign = match direction {
            Direction::Forward => -1.0,
            Direction::Inverse => 1.0,
        };
        (0..size)
            .map(|i| {
                let angle = sign * 2.0 * std::f64::consts::PI * i as f64 / size as f64;
                let (sin, cos) = angle.sin_cos();
                Complex::new(cos, sin)
            })
            .collect()
    }

    fn compute_bit_reversal(size: usize, log2_size: u32) -> Vec<usize> {
        (0..size)
            .map(|i| {
                let mut rev = 0;
                let mut n = i;
                for _ in 0..log2_size {
                    rev = (rev << 1) | (n & 1);
                    n >>= 1;
                }
                rev
            })
            .collect()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform `data` in place. `data.len()` must equal `size`.
    pub fn process(&self, data: &mut [Complex], direction: Direction) {
        debug_assert_eq!(data.len(), self.size);
        let n = self.size;
        let twiddles = match direction {
            Direction::Forward => &self.twiddles,
            Direction::Inverse => &self.twiddles_inv,
        };

        // Bit-reversal permutation
        for i in 0..n {
            let j = self.bit_rev[i];
            if i < j {
                data.swap(i, j);
            }
        }

        // Butterfly stages
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let stride = n / len;

            for start in (0..n).step_by(len) {
                let mut k = 0;
                for j in 0..half {
                    let i = start + j;
                    let t = data[i + half].mul(twiddles[k]);
                    data[i + half] = data[i].sub(t);
                    data[i] = data[i].add(t);
                    k += stride;
                }
            }
            len *= 2;
        }
    }
}
