//! Logarithmically spaced bandpass bank with energy readout and peak picking.

use crate::error::{Error, Result};
use crate::filter::{ButterworthFilter, FilterType};

/// Local energy maximum found by [`FilterBank::find_peaks`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Index of the detecting filter.
    pub index: usize,
    /// Center period of the detecting filter, in samples at the analyzed rate.
    pub period: f64,
    /// Mean squared filter output over the analyzed buffer.
    pub energy: f32,
}

/// Bandpass filters with center periods in geometric progression.
///
/// One bank serves every octave level: period indexing makes the design
/// independent of the sample rate it is run at. All filters share the
/// quality derived from the spacing ratio and the overlap percentage.
pub struct FilterBank {
    min_period: f64,
    max_period: f64,
    ratio: f64,
    quality: f64,
    order: usize,
    centers: Vec<f64>,
    filters: Vec<ButterworthFilter>,
}

impl FilterBank {
    pub fn new(
        min_period: f64,
        max_period: f64,
        num_filters: usize,
        percent_overlap: f64,
        order: usize,
    ) -> Result<Self> {
        if !(min_period > 0.0 && max_period.is_finite() && min_period < max_period) {
            return Err(Error::InvalidParameter(format!(
                "period range must be positive and increasing, got {min_period}..{max_period}"
            )));
        }
        if num_filters < 2 {
            return Err(Error::InvalidParameter(format!(
                "need at least 2 filters, got {num_filters}"
            )));
        }

        let ratio = (max_period / min_period).powf(1.0 / (num_filters as f64 - 1.0));
        let overlap = percent_overlap.clamp(0.0, 99.0);
        let quality = 1.0 / ((ratio - 1.0) * (1.0 + overlap / 100.0));
        let centers: Vec<f64> = (0..num_filters)
            .map(|i| min_period * ratio.powi(i as i32))
            .collect();
        let filters = centers
            .iter()
            .map(|&period| ButterworthFilter::new(FilterType::Bandpass, period, quality, order))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            min_period,
            max_period,
            ratio,
            quality,
            order,
            centers,
            filters,
        })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn min_period(&self) -> f64 {
        self.min_period
    }

    pub fn max_period(&self) -> f64 {
        self.max_period
    }

    /// Geometric step between adjacent center periods.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn center_period(&self, index: usize) -> Option<f64> {
        self.centers.get(index).copied()
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    /// Mean squared output of every filter over `samples`, into `energies`.
    ///
    /// Every filter is reset first, so consecutive calls are independent.
    pub fn process_buffer(&mut self, samples: &[f32], energies: &mut Vec<f32>) {
        energies.clear();
        energies.resize(self.filters.len(), 0.0);
        if samples.is_empty() {
            return;
        }
        let norm = samples.len() as f64;
        for (filter, slot) in self.filters.iter_mut().zip(energies.iter_mut()) {
            filter.reset();
            let mut sum = 0.0f64;
            for &x in samples {
                let y = filter.process(x) as f64;
                sum += y * y;
            }
            *slot = (sum / norm) as f32;
        }
    }

    /// Strict interior local maxima above `threshold`.
    pub fn find_peaks(&self, energies: &[f32], threshold: f32) -> Vec<Peak> {
        let mut peaks = Vec::new();
        let len = energies.len().min(self.centers.len());
        if len < 3 {
            return peaks;
        }
        for i in 1..len - 1 {
            let e = energies[i];
            if e > threshold && e > energies[i - 1] && e > energies[i + 1] {
                peaks.push(Peak {
                    index: i,
                    period: self.centers[i],
                    energy: e,
                });
            }
        }
        peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn test_invalid_parameters() {
        assert!(FilterBank::new(100.0, 24.0, 12, 50.0, 4).is_err());
        assert!(FilterBank::new(24.0, 24.0, 12, 50.0, 4).is_err());
        assert!(FilterBank::new(24.0, 4800.0, 1, 50.0, 4).is_err());
        assert!(FilterBank::new(24.0, 4800.0, 12, 50.0, 3).is_err());
    }

    #[test]
    fn test_centers_are_geometric() {
        let bank = FilterBank::new(24.0, 4800.0, 48, 50.0, 4).unwrap();
        assert_eq!(bank.len(), 48);
        assert_eq!(bank.min_period(), 24.0);
        assert_eq!(bank.max_period(), 4800.0);
        let centers = bank.centers();
        assert_eq!(centers.len(), 48);
        for pair in centers.windows(2) {
            assert!(pair[1] > pair[0], "centers must strictly increase");
            assert!((pair[1] / pair[0] - bank.ratio()).abs() < 1e-9);
        }
        let span = centers[centers.len() - 1] / centers[0];
        assert!(
            (span - 4800.0 / 24.0).abs() < 1e-6,
            "span should equal max/min, got {}",
            span
        );
    }

    #[test]
    fn test_quality_from_spacing_and_overlap() {
        let bank = FilterBank::new(24.0, 4800.0, 48, 50.0, 4).unwrap();
        let expected = 1.0 / ((bank.ratio() - 1.0) * 1.5);
        assert!((bank.quality() - expected).abs() < 1e-12);

        let tight = FilterBank::new(24.0, 4800.0, 48, 0.0, 4).unwrap();
        assert!(tight.quality() > bank.quality());
    }

    #[test]
    fn test_energy_peaks_at_matching_filter() {
        let mut bank = FilterBank::new(20.0, 500.0, 32, 50.0, 4).unwrap();
        // Lands practically on a filter center, so the winner is unambiguous.
        let period = 95.0f64;
        let samples: Vec<f32> = (0..8192)
            .map(|i| (TAU * i as f64 / period).sin() as f32)
            .collect();
        let mut energies = Vec::new();
        bank.process_buffer(&samples, &mut energies);

        let best = energies
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let nearest = bank
            .centers()
            .iter()
            .enumerate()
            .min_by(|a, b| {
                (a.1.ln() - period.ln())
                    .abs()
                    .total_cmp(&(b.1.ln() - period.ln()).abs())
            })
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(best, nearest, "energy should peak at the nearest center");
    }

    #[test]
    fn test_process_buffer_empty_input() {
        let mut bank = FilterBank::new(20.0, 500.0, 12, 0.0, 2).unwrap();
        let mut energies = vec![1.0; 3];
        bank.process_buffer(&[], &mut energies);
        assert_eq!(energies.len(), 12);
        assert!(energies.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_find_peaks_interior_strict() {
        let bank = FilterBank::new(20.0, 500.0, 12, 0.0, 2).unwrap();
        let mut energies = vec![0.0f32; 12];
        energies[0] = 5.0; // boundary, never a peak
        energies[3] = 1.0;
        energies[6] = 2.0;
        energies[11] = 9.0; // boundary, never a peak

        let peaks = bank.find_peaks(&energies, 0.5);
        let indices: Vec<usize> = peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![3, 6]);
        assert_eq!(peaks[0].period, bank.center_period(3).unwrap());

        let peaks = bank.find_peaks(&energies, 1.5);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 6);

        // Plateaus are not strict maxima.
        let flat = vec![1.0f32; 12];
        assert!(bank.find_peaks(&flat, 0.5).is_empty());
    }
}
