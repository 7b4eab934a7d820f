//! Synchronous engine facade: block feeding, tick cadence, atomic
//! reconfiguration.

use crate::analyzer::{AnalysisResult, Analyzer};
use crate::config::{ConfigUpdate, EngineConfig, Rebuild};
use crate::error::Result;
use crate::octave::OctaveManager;
use tracing::debug;

/// Maps the user-facing sensitivity onto a raw energy threshold.
const SENSITIVITY_EXPONENT: f32 = 3.3;

/// Single-threaded analysis engine.
///
/// Feed mono blocks of any size from the producer side; a result is
/// emitted once every `analysis_interval` blocks. Reconfiguration happens
/// between blocks and is atomic: either the change applies in full or the
/// engine is left untouched.
///
/// ```
/// use overtone::{AnalysisEngine, EngineConfig};
///
/// let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();
/// let block = vec![0.0f32; 256];
/// if let Some(result) = engine.process_block(&block) {
///     for peak in &result.peaks {
///         println!("{:.1} Hz (energy {:.3})", peak.frequency, peak.energy);
///     }
/// }
/// ```
pub struct AnalysisEngine {
    config: EngineConfig,
    manager: OctaveManager,
    analyzer: Analyzer,
    blocks_since_tick: usize,
}

impl AnalysisEngine {
    pub fn new(sample_rate: f64, config: EngineConfig) -> Result<Self> {
        let manager = OctaveManager::new(sample_rate, &config)?;
        let analyzer = Analyzer::new(manager.capacity());
        Ok(Self {
            config,
            manager,
            analyzer,
            blocks_since_tick: 0,
        })
    }

    /// Feeds one block; returns a result on analysis ticks.
    pub fn process_block(&mut self, samples: &[f32]) -> Option<AnalysisResult> {
        self.manager
            .process_block(samples, self.config.use_low_pass_filter);
        self.blocks_since_tick += 1;
        if self.blocks_since_tick >= self.config.analysis_interval {
            self.blocks_since_tick = 0;
            return Some(self.analyze_now());
        }
        None
    }

    /// Runs an analysis tick immediately, regardless of block cadence.
    pub fn analyze_now(&mut self) -> AnalysisResult {
        let threshold = self.config.threshold.powf(SENSITIVITY_EXPONENT);
        self.analyzer.analyze(&mut self.manager, threshold)
    }

    /// Applies a partial configuration change between ticks.
    ///
    /// Fails without side effects when the merged configuration is
    /// invalid. Changes to the period range or buffer sizing re-create
    /// the manager and return the engine to warming.
    pub fn update(&mut self, update: &ConfigUpdate) -> Result<()> {
        let mut next = self.config;
        let rebuild = next.apply(update);
        next.validate()?;

        match rebuild {
            Rebuild::Manager => {
                self.manager = OctaveManager::new(self.manager.sample_rate(), &next)?;
                self.blocks_since_tick = 0;
                debug!("manager rebuilt after config update");
            }
            Rebuild::Bank => {
                self.manager.rebuild_bank(&next)?;
            }
            Rebuild::None => {}
        }
        self.config = next;
        Ok(())
    }

    /// Clears all buffers and filter state; the engine returns to warming.
    pub fn reset(&mut self) {
        self.manager.reset();
        self.blocks_since_tick = 0;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.manager.sample_rate()
    }

    pub fn manager(&self) -> &OctaveManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_cadence_follows_analysis_interval() {
        let config = EngineConfig {
            analysis_interval: 3,
            ..Default::default()
        };
        let mut engine = AnalysisEngine::new(48000.0, config).unwrap();
        let block = vec![0.0f32; 128];

        assert!(engine.process_block(&block).is_none());
        assert!(engine.process_block(&block).is_none());
        assert!(engine.process_block(&block).is_some());
        assert!(engine.process_block(&block).is_none());
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();
        let block = vec![0.25f32; 512];
        engine.process_block(&block);
        let filled_before = engine.manager().level_buffer(0).unwrap().valid_count();

        engine.update(&ConfigUpdate::default()).unwrap();

        assert_eq!(
            engine.manager().level_buffer(0).unwrap().valid_count(),
            filled_before,
            "empty update must not disturb buffers"
        );
        assert_eq!(*engine.config(), EngineConfig::default());
    }

    #[test]
    fn test_invalid_update_rejected_atomically() {
        let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();
        let result = engine.update(&ConfigUpdate {
            min_samples_per_period: Some(99),
            max_samples_per_period: Some(50),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(*engine.config(), EngineConfig::default());
    }

    #[test]
    fn test_manager_rebuild_returns_to_warming() {
        let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();
        let block = vec![0.5f32; 2 * 24 * 16];
        engine.process_block(&block);
        assert!(engine.manager().is_filled(0));

        engine
            .update(&ConfigUpdate {
                min_periods_in_buffer: Some(8),
                ..Default::default()
            })
            .unwrap();

        assert!(!engine.manager().is_filled(0));
        assert_eq!(engine.manager().capacity(), 2 * 24 * 8);
    }

    #[test]
    fn test_bank_rebuild_preserves_buffers() {
        let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();
        let block = vec![0.5f32; 1024];
        engine.process_block(&block);
        let before = engine.manager().level_buffer(0).unwrap().valid_count();

        engine
            .update(&ConfigUpdate {
                num_filters: Some(96),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            engine.manager().level_buffer(0).unwrap().valid_count(),
            before
        );
        assert_eq!(engine.manager().bank().len(), 96);
    }

    #[test]
    fn test_frame_time_tracks_tick_spacing() {
        let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();

        let first = engine.analyze_now();
        assert_eq!(first.frame_time, 0.0, "first tick has no predecessor");

        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = engine.analyze_now();
        assert!(second.frame_time > 0.0);
        assert!(second.frame_time.is_finite());
    }

    #[test]
    fn test_reset_clears_warmup() {
        let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();
        let block = vec![0.5f32; 2 * 24 * 16];
        engine.process_block(&block);
        assert!(engine.manager().is_filled(0));

        engine.reset();
        assert!(!engine.manager().is_filled(0));

        let result = engine.analyze_now();
        assert!(result.peaks.is_empty(), "warming engine emits no peaks");
    }
}
