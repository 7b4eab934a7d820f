//! # Overtone
//!
//! Real-time multi-resolution bandpass analysis for mono audio streams.
//!
//! The engine ingests fixed-size sample blocks and continuously emits the
//! list of currently active frequency components, each with a refined
//! frequency estimate and one period of a phase-aligned, harmonic-summed
//! waveform. It is built for continuous operation in an audio callback
//! context: bounded memory, no allocation on the sample path, and
//! per-block cost independent of stream length.
//!
//! ## How it works
//!
//! - An [`OctaveManager`] maintains a pyramid of circular buffers at
//!   successively halved sample rates (2:1 decimation behind an
//!   anti-alias lowpass), so low frequencies are analyzed at proportional
//!   cost.
//! - A [`FilterBank`] of logarithmically spaced Butterworth bandpass
//!   filters is designed once, indexed by period in samples, and reused
//!   at every level.
//! - An [`Analyzer`] picks local energy maxima, refines each peak by
//!   targeted autocorrelation with parabolic interpolation, and extracts
//!   a phase-locked waveform with harmonics summed in.
//!
//! ## Example
//!
//! ```
//! use overtone::{AnalysisEngine, EngineConfig};
//!
//! let mut engine = AnalysisEngine::new(48000.0, EngineConfig::default()).unwrap();
//!
//! // Feed blocks from your audio source; results appear once the
//! // buffers have warmed up.
//! let block: Vec<f32> = (0..256)
//!     .map(|i| (std::f64::consts::TAU * 440.0 * i as f64 / 48000.0).sin() as f32)
//!     .collect();
//! if let Some(result) = engine.process_block(&block) {
//!     for peak in &result.peaks {
//!         println!("{:.1} Hz", peak.frequency);
//!     }
//! }
//! ```
//!
//! With the `live` feature (default), [`EngineHandle`] runs the engine on
//! a background thread fed by an SPSC ring buffer, publishing results
//! lock-free for a UI thread.

pub mod analyzer;
pub mod bank;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod octave;

#[cfg(feature = "live")]
pub mod live;

#[cfg(feature = "live")]
mod handle;

pub use analyzer::{freq_to_midi, midi_to_freq, AnalysisResult, Analyzer, RefinedPeak};
pub use bank::{FilterBank, Peak};
pub use buffer::CircularBuffer;
pub use config::{ConfigUpdate, EngineConfig, Rebuild};
pub use engine::AnalysisEngine;
pub use error::{Error, Result};
pub use filter::{Biquad, ButterworthFilter, FilterType};
pub use octave::OctaveManager;

#[cfg(feature = "live")]
pub use handle::EngineHandle;
#[cfg(feature = "live")]
pub use live::{run_analysis_thread, EngineCommand, LiveAnalysisState, LIVE_BLOCK_SIZE};
