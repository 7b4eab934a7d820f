//! Fixed-capacity circular sample buffer with age-indexed reads.

use crate::error::{Error, Result};

/// Ring of mono samples. One producer writes, readers see the last
/// `capacity` samples in chronological order.
///
/// Writes are O(1) and never fail; once `capacity` samples have been
/// written the buffer stays full until [`CircularBuffer::clear`].
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    data: Vec<f32>,
    write_pos: usize,
    filled: bool,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "circular buffer capacity must be positive".into(),
            ));
        }
        Ok(Self {
            data: vec![0.0; capacity],
            write_pos: 0,
            filled: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of samples written so far, saturating at capacity.
    pub fn valid_count(&self) -> usize {
        if self.filled {
            self.data.len()
        } else {
            self.write_pos
        }
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.valid_count() == 0
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.data[self.write_pos] = sample;
        self.write_pos += 1;
        if self.write_pos == self.data.len() {
            self.write_pos = 0;
            self.filled = true;
        }
    }

    /// Copies the valid samples, oldest first, into `out`.
    pub fn ordered_into(&self, out: &mut Vec<f32>) {
        out.clear();
        let (older, newer) = self.valid_slices();
        out.extend_from_slice(older);
        out.extend_from_slice(newer);
    }

    /// Valid samples, oldest first.
    pub fn ordered(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.valid_count());
        self.ordered_into(&mut out);
        out
    }

    /// Sample written `age + 1` writes ago; age 0 is the most recent.
    pub fn read_age(&self, age: usize) -> Result<f32> {
        let valid = self.valid_count();
        if age >= valid {
            return Err(Error::OutOfRange { index: age, valid });
        }
        let index = if self.filled {
            (self.write_pos + self.data.len() - 1 - age) % self.data.len()
        } else {
            self.write_pos - 1 - age
        };
        Ok(self.data[index])
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
        self.filled = false;
    }

    pub fn max(&self) -> f32 {
        self.fold_valid(f32::NEG_INFINITY, |acc, x| acc.max(x))
            .unwrap_or(0.0)
    }

    pub fn min(&self) -> f32 {
        self.fold_valid(f32::INFINITY, |acc, x| acc.min(x))
            .unwrap_or(0.0)
    }

    pub fn mean(&self) -> f32 {
        let count = self.valid_count();
        if count == 0 {
            return 0.0;
        }
        let (older, newer) = self.valid_slices();
        let sum: f64 = older
            .iter()
            .chain(newer.iter())
            .map(|&x| x as f64)
            .sum();
        (sum / count as f64) as f32
    }

    pub fn rms(&self) -> f32 {
        let count = self.valid_count();
        if count == 0 {
            return 0.0;
        }
        let (older, newer) = self.valid_slices();
        let sum_sq: f64 = older
            .iter()
            .chain(newer.iter())
            .map(|&x| x as f64 * x as f64)
            .sum();
        (sum_sq / count as f64).sqrt() as f32
    }

    /// (oldest..wrap, wrap..newest); the second slice is empty until filled.
    fn valid_slices(&self) -> (&[f32], &[f32]) {
        if self.filled {
            (&self.data[self.write_pos..], &self.data[..self.write_pos])
        } else {
            (&self.data[..self.write_pos], &[])
        }
    }

    fn fold_valid(&self, init: f32, f: impl Fn(f32, f32) -> f32) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let (older, newer) = self.valid_slices();
        Some(older.iter().chain(newer.iter()).fold(init, |acc, &x| f(acc, x)))
    }
}
