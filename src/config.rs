//! Runtime configuration with validated ranges and partial updates.

use crate::error::{Error, Result};

/// Engine configuration. All fields are changeable at runtime through
/// [`ConfigUpdate`]; [`EngineConfig::apply`] reports how much of the
/// engine must be rebuilt for the change to take effect.
///
/// `threshold` is the user-facing sensitivity in `[0, 1]`; the engine
/// raises it to the power 3.3 before comparing raw filter energies
/// against it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct EngineConfig {
    /// Smallest detectable period in samples, 4..=100.
    pub min_samples_per_period: usize,
    /// Largest detectable period in samples, 20..=10000.
    pub max_samples_per_period: usize,
    /// Buffer capacity in multiples of twice the minimum period, 2..=100.
    pub min_periods_in_buffer: usize,
    /// Bandpass filter count, 12..=200.
    pub num_filters: usize,
    /// Passband overlap percentage, 0..=90.
    pub percent_overlap: f64,
    /// Butterworth order, one of 2, 4, 6, 8.
    pub filter_order: usize,
    /// Detection sensitivity, 0..=1.
    pub threshold: f32,
    /// Gates the anti-alias lowpass on the decimation path.
    pub use_low_pass_filter: bool,
    /// Analysis runs once every this many input blocks, 1..=10.
    pub analysis_interval: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_samples_per_period: 24,
            max_samples_per_period: 4800,
            min_periods_in_buffer: 16,
            num_filters: 48,
            percent_overlap: 50.0,
            filter_order: 4,
            threshold: 0.25,
            use_low_pass_filter: true,
            analysis_interval: 2,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(4..=100).contains(&self.min_samples_per_period) {
            return Err(Error::InvalidConfig(format!(
                "min_samples_per_period must be in 4..=100, got {}",
                self.min_samples_per_period
            )));
        }
        if !(20..=10000).contains(&self.max_samples_per_period) {
            return Err(Error::InvalidConfig(format!(
                "max_samples_per_period must be in 20..=10000, got {}",
                self.max_samples_per_period
            )));
        }
        if self.min_samples_per_period >= self.max_samples_per_period {
            return Err(Error::InvalidConfig(format!(
                "period range must be increasing, got {}..{}",
                self.min_samples_per_period, self.max_samples_per_period
            )));
        }
        if !(2..=100).contains(&self.min_periods_in_buffer) {
            return Err(Error::InvalidConfig(format!(
                "min_periods_in_buffer must be in 2..=100, got {}",
                self.min_periods_in_buffer
            )));
        }
        if !(12..=200).contains(&self.num_filters) {
            return Err(Error::InvalidConfig(format!(
                "num_filters must be in 12..=200, got {}",
                self.num_filters
            )));
        }
        if !(self.percent_overlap.is_finite() && (0.0..=90.0).contains(&self.percent_overlap)) {
            return Err(Error::InvalidConfig(format!(
                "percent_overlap must be in 0..=90, got {}",
                self.percent_overlap
            )));
        }
        if !matches!(self.filter_order, 2 | 4 | 6 | 8) {
            return Err(Error::InvalidConfig(format!(
                "filter_order must be one of 2, 4, 6, 8, got {}",
                self.filter_order
            )));
        }
        if !(self.threshold.is_finite() && (0.0..=1.0).contains(&self.threshold)) {
            return Err(Error::InvalidConfig(format!(
                "threshold must be in 0..=1, got {}",
                self.threshold
            )));
        }
        if !(1..=10).contains(&self.analysis_interval) {
            return Err(Error::InvalidConfig(format!(
                "analysis_interval must be in 1..=10, got {}",
                self.analysis_interval
            )));
        }
        Ok(())
    }

    /// Merges `update` into `self` and reports the required rebuild depth.
    ///
    /// Setting a field to its current value is a no-op.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Rebuild {
        let mut rebuild = Rebuild::None;

        if let Some(v) = update.min_samples_per_period {
            if v != self.min_samples_per_period {
                self.min_samples_per_period = v;
                rebuild = rebuild.max(Rebuild::Manager);
            }
        }
        if let Some(v) = update.max_samples_per_period {
            if v != self.max_samples_per_period {
                self.max_samples_per_period = v;
                rebuild = rebuild.max(Rebuild::Manager);
            }
        }
        if let Some(v) = update.min_periods_in_buffer {
            if v != self.min_periods_in_buffer {
                self.min_periods_in_buffer = v;
                rebuild = rebuild.max(Rebuild::Manager);
            }
        }
        if let Some(v) = update.num_filters {
            if v != self.num_filters {
                self.num_filters = v;
                rebuild = rebuild.max(Rebuild::Bank);
            }
        }
        if let Some(v) = update.percent_overlap {
            if v != self.percent_overlap {
                self.percent_overlap = v;
                rebuild = rebuild.max(Rebuild::Bank);
            }
        }
        if let Some(v) = update.filter_order {
            if v != self.filter_order {
                self.filter_order = v;
                rebuild = rebuild.max(Rebuild::Bank);
            }
        }
        if let Some(v) = update.threshold {
            self.threshold = v;
        }
        if let Some(v) = update.use_low_pass_filter {
            self.use_low_pass_filter = v;
        }
        if let Some(v) = update.analysis_interval {
            self.analysis_interval = v;
        }

        rebuild
    }
}

/// Partial configuration; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ConfigUpdate {
    pub min_samples_per_period: Option<usize>,
    pub max_samples_per_period: Option<usize>,
    pub min_periods_in_buffer: Option<usize>,
    pub num_filters: Option<usize>,
    pub percent_overlap: Option<f64>,
    pub filter_order: Option<usize>,
    pub threshold: Option<f32>,
    pub use_low_pass_filter: Option<bool>,
    pub analysis_interval: Option<usize>,
}

/// How much of the engine a configuration change invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rebuild {
    /// Takes effect on the next tick without structural changes.
    None,
    /// Filter bank must be recomputed; buffers survive.
    Bank,
    /// Buffers, decimators, and bank are all re-created; state returns
    /// to warming.
    Manager,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_range_violations() {
        let base = EngineConfig::default();

        let mut cfg = base;
        cfg.min_samples_per_period = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.max_samples_per_period = 10001;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.min_samples_per_period = 50;
        cfg.max_samples_per_period = 50;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.filter_order = 5;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.analysis_interval = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut cfg = EngineConfig::default();
        let before = cfg;
        let rebuild = cfg.apply(&ConfigUpdate::default());
        assert_eq!(rebuild, Rebuild::None);
        assert_eq!(cfg, before);
    }

    #[test]
    fn test_same_value_update_is_noop() {
        let mut cfg = EngineConfig::default();
        let rebuild = cfg.apply(&ConfigUpdate {
            num_filters: Some(cfg.num_filters),
            max_samples_per_period: Some(cfg.max_samples_per_period),
            ..Default::default()
        });
        assert_eq!(rebuild, Rebuild::None);
    }

    #[test]
    fn test_rebuild_classification() {
        let mut cfg = EngineConfig::default();
        assert_eq!(
            cfg.apply(&ConfigUpdate {
                threshold: Some(0.5),
                ..Default::default()
            }),
            Rebuild::None
        );
        assert_eq!(
            cfg.apply(&ConfigUpdate {
                num_filters: Some(64),
                ..Default::default()
            }),
            Rebuild::Bank
        );
        assert_eq!(
            cfg.apply(&ConfigUpdate {
                min_periods_in_buffer: Some(8),
                ..Default::default()
            }),
            Rebuild::Manager
        );
        // Mixed updates escalate to the deepest rebuild.
        assert_eq!(
            cfg.apply(&ConfigUpdate {
                percent_overlap: Some(30.0),
                max_samples_per_period: Some(2400),
                ..Default::default()
            }),
            Rebuild::Manager
        );
        assert_eq!(cfg.num_filters, 64);
        assert_eq!(cfg.threshold, 0.5);
    }
}
