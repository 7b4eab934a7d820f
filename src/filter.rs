//! Biquad sections and Butterworth cascades indexed by period in samples.
//!
//! Filters here are designed around a target *period* (`P = S/f` samples)
//! instead of a cutoff in Hz, so one design serves every decimation level
//! of the octave pyramid. Coefficients and state are kept in `f64`: at
//! periods in the thousands of samples `cos ω₀` sits so close to 1 that
//! `f32` coefficient arithmetic loses the filter shape entirely.

use crate::error::{Error, Result};
use std::f64::consts::{FRAC_1_SQRT_2, PI, TAU};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Passes periods longer than the target (frequencies below cutoff).
    Lowpass,
    /// Passes periods shorter than the target.
    Highpass,
    /// Passes a band around the target period.
    Bandpass,
}

/// Direct form II second-order section, coefficients normalized to `a0 = 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let w = x as f64 - self.a1 * self.z1 - self.a2 * self.z2;
        let y = self.b0 * w + self.b1 * self.z1 + self.b2 * self.z2;
        self.z2 = self.z1;
        self.z1 = w;
        y as f32
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Even-order Butterworth filter as a cascade of `order/2` biquads.
///
/// Coefficients are a pure function of `(type, period, quality, order)`.
/// Changing the period or order recomputes the cascade and discards state.
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    filter_type: FilterType,
    period: f64,
    quality: f64,
    order: usize,
    sections: Vec<Biquad>,
}

impl ButterworthFilter {
    pub fn new(filter_type: FilterType, period: f64, quality: f64, order: usize) -> Result<Self> {
        validate_design(period, quality, order)?;
        let mut filter = Self {
            filter_type,
            period,
            quality,
            order,
            sections: Vec::with_capacity(order / 2),
        };
        filter.redesign();
        Ok(filter)
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// Retarget the filter; recomputes coefficients and discards state.
    pub fn set_period(&mut self, period: f64) -> Result<()> {
        validate_design(period, self.quality, self.order)?;
        self.period = period;
        self.redesign();
        Ok(())
    }

    /// Change the cascade order; recomputes coefficients and discards state.
    pub fn set_order(&mut self, order: usize) -> Result<()> {
        validate_design(self.period, self.quality, order)?;
        self.order = order;
        self.redesign();
        Ok(())
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let mut y = x;
        for section in &mut self.sections {
            y = section.process(y);
        }
        y
    }

    /// Resets state, then filters `input` into `output`.
    pub fn run(&mut self, input: &[f32], output: &mut Vec<f32>) {
        self.reset();
        output.clear();
        output.reserve(input.len());
        output.extend(input.iter().map(|&x| self.process(x)));
    }

    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    fn redesign(&mut self) {
        let half = self.order / 2;
        let w0 = TAU / self.period;
        let (sin_w0, cos_w0) = (w0.sin(), w0.cos());

        self.sections.clear();
        for s in 0..half {
            let theta = PI * (2 * s + 1) as f64 / (2 * self.order) as f64;
            let section_q = match self.filter_type {
                FilterType::Lowpass | FilterType::Highpass => {
                    (1.0 / (2.0 * theta.cos())) * (self.quality / FRAC_1_SQRT_2)
                }
                // Staggered widening across sections; intentional deviation
                // from textbook Butterworth bandpass pole placement.
                FilterType::Bandpass => self.quality * (1.0 + 0.1 * s as f64),
            };
            let alpha = sin_w0 / (2.0 * section_q);
            let a0 = 1.0 + alpha;
            let (b0, b1, b2) = match self.filter_type {
                FilterType::Lowpass => {
                    ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0)
                }
                FilterType::Highpass => {
                    ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0)
                }
                FilterType::Bandpass => (alpha, 0.0, -alpha),
            };
            self.sections.push(Biquad::new(
                b0 / a0,
                b1 / a0,
                b2 / a0,
                (-2.0 * cos_w0) / a0,
                (1.0 - alpha) / a0,
            ));
        }
    }
}

fn validate_design(period: f64, quality: f64, order: usize) -> Result<()> {
    if order < 2 || order % 2 != 0 {
        return Err(Error::InvalidParameter(format!(
            "filter order must be even and >= 2, got {order}"
        )));
    }
    if !(period.is_finite() && period > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "filter period must be positive, got {period}"
        )));
    }
    if !(quality.is_finite() && quality > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "filter quality must be positive, got {quality}"
        )));
    }
    Ok(())
}
