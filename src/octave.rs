//! Octave pyramid: decimated circular buffers sharing one filter bank.
//!
//! Level 0 holds the raw input; level `k` holds every `2^k`-th sample of
//! the (optionally lowpass-filtered) input, so the same period-indexed
//! bank detects periods `2^k` times longer when run against level `k`.

use crate::bank::FilterBank;
use crate::buffer::CircularBuffer;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::filter::{ButterworthFilter, FilterType};
use std::f64::consts::FRAC_1_SQRT_2;
use tracing::debug;

/// Anti-alias lowpass period in samples (cutoff at 0.4 of Nyquist).
/// Fixed for every level; the pair of sections runs at the input rate.
const DECIMATION_LOWPASS_PERIOD: f64 = 5.0;
const DECIMATION_LOWPASS_ORDER: usize = 4;

struct OctaveLevel {
    buffer: CircularBuffer,
    lowpass: ButterworthFilter,
    step: u64,
    counter: u64,
}

/// Owns the level buffers, the per-level decimation state, and the shared
/// filter bank. Single producer; the analyzer borrows it for one tick at
/// a time.
pub struct OctaveManager {
    sample_rate: f64,
    capacity: usize,
    bank: FilterBank,
    levels: Vec<OctaveLevel>,
}

impl OctaveManager {
    pub fn new(sample_rate: f64, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }

        let min_period = config.min_samples_per_period as f64;
        let max_period = config.max_samples_per_period as f64;
        let num_levels = ((max_period / min_period).log2().ceil() as usize + 1).max(1);
        let capacity = 2 * config.min_samples_per_period * config.min_periods_in_buffer;
        let bank = FilterBank::new(
            min_period,
            max_period,
            config.num_filters,
            config.percent_overlap,
            config.filter_order,
        )?;

        let mut levels = Vec::with_capacity(num_levels);
        for k in 0..num_levels {
            levels.push(OctaveLevel {
                buffer: CircularBuffer::new(capacity)?,
                lowpass: ButterworthFilter::new(
                    FilterType::Lowpass,
                    DECIMATION_LOWPASS_PERIOD,
                    FRAC_1_SQRT_2,
                    DECIMATION_LOWPASS_ORDER,
                )?,
                step: 1u64 << k,
                counter: 0,
            });
        }

        debug!(
            levels = num_levels,
            capacity,
            filters = config.num_filters,
            "octave manager built"
        );
        Ok(Self {
            sample_rate,
            capacity,
            bank,
            levels,
        })
    }

    /// Feeds a block of raw samples. Level 0 receives every sample; level
    /// `k` receives one write per `2^k` inputs, taken from its own lowpass
    /// chain when `use_lowpass` is set, from the raw stream otherwise.
    pub fn process_block(&mut self, samples: &[f32], use_lowpass: bool) {
        for &x in samples {
            self.levels[0].buffer.write(x);
            for level in &mut self.levels[1..] {
                let value = if use_lowpass {
                    level.lowpass.process(x)
                } else {
                    x
                };
                if level.counter % level.step == 0 {
                    level.buffer.write(value);
                }
                level.counter += 1;
            }
        }
    }

    /// Clears every buffer, lowpass state, and decimation counter; the
    /// result is indistinguishable from a freshly built manager.
    pub fn reset(&mut self) {
        for level in &mut self.levels {
            level.buffer.clear();
            level.lowpass.reset();
            level.counter = 0;
        }
        debug!("octave manager reset");
    }

    /// Recomputes the filter bank in place; buffers and decimators survive.
    pub fn rebuild_bank(&mut self, config: &EngineConfig) -> Result<()> {
        self.bank = FilterBank::new(
            config.min_samples_per_period as f64,
            config.max_samples_per_period as f64,
            config.num_filters,
            config.percent_overlap,
            config.filter_order,
        )?;
        debug!(filters = config.num_filters, "filter bank rebuilt");
        Ok(())
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Effective sample rate of `level`.
    pub fn level_rate(&self, level: usize) -> f64 {
        self.sample_rate / self.levels[level].step as f64
    }

    pub fn is_filled(&self, level: usize) -> bool {
        self.levels[level].buffer.is_filled()
    }

    /// True once every level buffer is filled.
    pub fn is_hot(&self) -> bool {
        self.levels.iter().all(|l| l.buffer.is_filled())
    }

    /// Chronological snapshot of `level`'s buffer into `out`.
    pub fn snapshot_into(&self, level: usize, out: &mut Vec<f32>) {
        self.levels[level].buffer.ordered_into(out);
    }

    pub fn level_buffer(&self, level: usize) -> Option<&CircularBuffer> {
        self.levels.get(level).map(|l| &l.buffer)
    }

    pub fn bank(&self) -> &FilterBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut FilterBank {
        &mut self.bank
    }
}
