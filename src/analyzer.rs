//! Per-tick analysis: bank energies, peak picking, autocorrelation
//! frequency refinement, and harmonic-summed phase-locked waveforms.
//!
//! ## Refinement
//!
//! The coarse estimate for a peak is the detecting filter's center, which
//! can sit a few percent off the true component. The refiner searches a
//! lag window around the expected period in the autocorrelation of the
//! isolated (bandpassed) signal and applies parabolic interpolation on
//! the winning lag. Two details matter for accuracy:
//!
//! - Correlation windows are anchored at the *newest* samples. The
//!   isolation filter starts from zero state, so the oldest stretch of
//!   its output carries a ring-in transient at the filter center rather
//!   than the true component.
//! - The window length is re-derived from each pass's estimate and the
//!   search is iterated. A correlation window that is not a whole number
//!   of periods biases the interpolated lag by up to a full sample;
//!   re-targeting the window from the previous estimate contracts that
//!   bias to the noise floor within a few passes.

use crate::filter::{ButterworthFilter, FilterType};
use crate::octave::OctaveManager;
use std::f64::consts::TAU;
use std::time::Instant;

/// Quality of the fixed bandpass used for waveform extraction.
const HARMONIC_FILTER_Q: f64 = 8.7;
const HARMONIC_FILTER_ORDER: usize = 4;
/// Harmonics summed into the waveform, fundamental included.
const MAX_HARMONICS: usize = 5;

const MAX_REFINE_PASSES: usize = 4;
/// Convergence bound on the period estimate, in samples.
const REFINE_CONVERGENCE: f64 = 0.005;

/// One active frequency component.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RefinedPeak {
    /// Refined frequency in Hz.
    pub frequency: f32,
    /// Mean squared energy of the detecting filter.
    pub energy: f32,
    /// Fundamental period in samples at the input rate.
    pub period: f32,
    /// One period of the harmonic-summed, phase-aligned waveform,
    /// `floor(input_rate / frequency)` samples long.
    pub waveform: Vec<f32>,
    /// Octave level the component was detected at.
    pub level: usize,
}

impl RefinedPeak {
    /// Sharp notation (e.g. "A4", "C#5").
    pub fn note_name(&self) -> Option<String> {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        self.note_label(&NAMES)
    }

    /// Flat notation (e.g. "A4", "Db5").
    pub fn note_name_flat(&self) -> Option<String> {
        const NAMES: [&str; 12] = [
            "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
        ];
        self.note_label(&NAMES)
    }

    fn note_label(&self, names: &[&str; 12]) -> Option<String> {
        if self.frequency <= 0.0 {
            return None;
        }
        let (note, _) = freq_to_midi(self.frequency);
        let name = names[(note % 12) as usize];
        let octave = (note / 12) as i32 - 1;
        Some(format!("{}{}", name, octave))
    }
}

/// Result of one analysis tick. Peaks are sorted ascending by frequency.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AnalysisResult {
    pub peaks: Vec<RefinedPeak>,
    /// Seconds elapsed since the previous tick; 0.0 on the first.
    pub frame_time: f64,
}

impl AnalysisResult {
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Highest-energy peak, if any.
    pub fn strongest(&self) -> Option<&RefinedPeak> {
        self.peaks.iter().max_by(|a, b| a.energy.total_cmp(&b.energy))
    }
}

/// Nearest MIDI note and the offset from it in cents.
pub fn freq_to_midi(freq: f32) -> (u8, f32) {
    if freq <= 0.0 {
        return (0, 0.0);
    }
    let note_float = 69.0 + 12.0 * (freq / 440.0).log2();
    let note = (note_float.round() as i32).clamp(0, 127) as u8;
    let note_freq = 440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0);
    let cents = 1200.0 * (freq / note_freq).log2();
    (note, cents)
}

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
}

/// Runs the detection pipeline against an [`OctaveManager`].
///
/// Owns every scratch buffer, so repeated ticks reuse their allocations.
/// Borrows the manager mutably only for the duration of a tick.
pub struct Analyzer {
    snapshot: Vec<f32>,
    energies: Vec<f32>,
    isolated: Vec<f32>,
    band: Vec<f32>,
    last_tick: Option<Instant>,
}

impl Analyzer {
    /// `capacity` should match the manager's buffer capacity so the
    /// scratch buffers never reallocate mid-stream.
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshot: Vec::with_capacity(capacity),
            energies: Vec::new(),
            isolated: Vec::with_capacity(capacity),
            band: Vec::with_capacity(capacity),
            last_tick: None,
        }
    }

    /// One analysis tick: reads every filled level once and emits the
    /// refined peak list, sorted ascending by frequency.
    ///
    /// `threshold` is the raw energy threshold (sensitivity transform
    /// already applied by the caller).
    pub fn analyze(&mut self, manager: &mut OctaveManager, threshold: f32) -> AnalysisResult {
        let input_rate = manager.sample_rate();
        let ratio = manager.bank().ratio();
        let quality = manager.bank().quality();
        let order = manager.bank().order();

        let mut collected: Vec<RefinedPeak> = Vec::new();
        for level in 0..manager.num_levels() {
            if !manager.is_filled(level) {
                continue;
            }
            manager.snapshot_into(level, &mut self.snapshot);
            let rate = manager.level_rate(level);

            let found = {
                let bank = manager.bank_mut();
                bank.process_buffer(&self.snapshot, &mut self.energies);
                bank.find_peaks(&self.energies, threshold)
            };

            for peak in found {
                let Ok(mut isolation) =
                    ButterworthFilter::new(FilterType::Bandpass, peak.period, quality, order)
                else {
                    continue;
                };
                isolation.run(&self.snapshot, &mut self.isolated);

                let estimate = rate / peak.period;
                let refined = refine_frequency(&self.isolated, estimate, rate, quality);
                if !(refined > 0.0 && refined < input_rate / 2.0) {
                    continue;
                }

                let wave = harmonic_waveform(&self.snapshot, refined, rate, &mut self.band);
                let waveform = if level == 0 {
                    wave
                } else {
                    stretch_cyclic(&wave, (input_rate / refined).floor() as usize)
                };

                collected.push(RefinedPeak {
                    frequency: refined as f32,
                    energy: peak.energy,
                    period: (input_rate / refined) as f32,
                    waveform,
                    level,
                });
            }
        }

        let peaks = merge_across_levels(collected, ratio);

        let now = Instant::now();
        let frame_time = self
            .last_tick
            .map_or(0.0, |t| now.duration_since(t).as_secs_f64());
        self.last_tick = Some(now);

        AnalysisResult { peaks, frame_time }
    }
}

/// Sorts ascending and merges components the shared bank detected at more
/// than one level. Within half a bank step of the cluster's first (lowest)
/// frequency the entries describe the same component; the lowest level has
/// the highest time resolution and wins. The window stays anchored at the
/// cluster's first frequency so replacements cannot chain-grow a cluster
/// past it.
fn merge_across_levels(mut collected: Vec<RefinedPeak>, ratio: f64) -> Vec<RefinedPeak> {
    collected.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    let tolerance = ((ratio - 1.0) * 0.5) as f32;

    let mut peaks: Vec<RefinedPeak> = Vec::new();
    let mut anchor = 0.0f32;
    for candidate in collected {
        match peaks.last_mut() {
            Some(last) if candidate.frequency <= anchor * (1.0 + tolerance) => {
                if candidate.level < last.level {
                    *last = candidate;
                }
            }
            _ => {
                anchor = candidate.frequency;
                peaks.push(candidate);
            }
        }
    }
    peaks
}

/// Refines `estimate_hz` against the isolated signal `y` by targeted
/// autocorrelation; returns the estimate unchanged whenever the search
/// would be degenerate.
fn refine_frequency(y: &[f32], estimate_hz: f64, rate: f64, quality: f64) -> f64 {
    let mut freq = estimate_hz;
    let mut previous_period = if freq > 0.0 { rate / freq } else { 0.0 };
    for _ in 0..MAX_REFINE_PASSES {
        let Some(next) = refine_pass(y, freq, rate, quality) else {
            return freq;
        };
        let period = rate / next;
        let converged = (period - previous_period).abs() < REFINE_CONVERGENCE;
        freq = next;
        previous_period = period;
        if converged {
            break;
        }
    }
    freq
}

fn refine_pass(y: &[f32], estimate_hz: f64, rate: f64, quality: f64) -> Option<f64> {
    let len = y.len();
    if estimate_hz <= 0.0 {
        return None;
    }
    let expected_period = rate / estimate_hz;
    let expected = expected_period.floor() as usize;
    if expected == 0 || expected >= len / 3 {
        return None;
    }

    let half_width_percent = (100.0 / quality).clamp(5.0, 25.0);
    let delta = (expected as f64 * half_width_percent / 100.0).ceil() as usize;
    let lo = expected.saturating_sub(delta).max(1);
    let hi = (expected + delta).min(len / 2);
    if lo > hi {
        return None;
    }

    // Whole-period window keeps the rectangular-window ripple out of the
    // interpolation; anchored at the tail, past the isolation transient.
    let window = ((3.0 * expected_period).round() as usize).max(1);

    let mut correlations = Vec::with_capacity(hi - lo + 1);
    for lag in lo..=hi {
        let m = (len - lag).min(window);
        if m < expected / 2 {
            return None;
        }
        let start = len - lag - m;
        let mut sum = 0.0f64;
        for i in 0..m {
            sum += y[start + i] as f64 * y[start + i + lag] as f64;
        }
        correlations.push(sum);
    }

    let best_offset = correlations
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)?;
    let best_lag = lo + best_offset;

    if best_lag > lo && best_lag < hi {
        let y1 = correlations[best_offset - 1];
        let y2 = correlations[best_offset];
        let y3 = correlations[best_offset + 1];
        let den = y1 - 2.0 * y2 + y3;
        if den.abs() > 1e-6 * y2.abs() {
            let offset = 0.5 * (y1 - y3) / den;
            if offset.abs() < 1.0 {
                return Some(rate / (best_lag as f64 + offset));
            }
        }
    }
    Some(rate / best_lag as f64)
}

/// Extracts one period of the component at `refined_hz` from `snapshot`,
/// phase-locked to a reference sine, with harmonics 2..=5 summed in at
/// the fundamental's alignment.
fn harmonic_waveform(
    snapshot: &[f32],
    refined_hz: f64,
    rate: f64,
    scratch: &mut Vec<f32>,
) -> Vec<f32> {
    let period = (rate / refined_hz).floor() as usize;
    if period == 0 {
        return Vec::new();
    }
    let len = snapshot.len();
    let mut wave = vec![0.0f32; period];

    let Ok(mut filter) = ButterworthFilter::new(
        FilterType::Bandpass,
        period as f64,
        HARMONIC_FILTER_Q,
        HARMONIC_FILTER_ORDER,
    ) else {
        return wave;
    };
    filter.run(snapshot, scratch);

    // Align the tail window against a reference sine so waveforms from
    // successive ticks line up.
    let window = len.min(5 * period);
    let start = len - window;
    let mut best_offset = 0usize;
    let mut best = f64::NEG_INFINITY;
    for offset in 0..period {
        let mut corr = 0.0f64;
        for i in 0..period {
            let index = start + offset + i;
            if index >= len {
                break;
            }
            corr += scratch[index] as f64 * (TAU * i as f64 / period as f64).sin();
        }
        if corr > best {
            best = corr;
            best_offset = offset;
        }
    }
    for (i, slot) in wave.iter_mut().enumerate() {
        let index = start + best_offset + i;
        if index >= len {
            break;
        }
        *slot = scratch[index];
    }

    // Harmonics reuse the fundamental's offset; independent alignment
    // would break their time relationship to the fundamental.
    let highest = ((rate / (2.0 * refined_hz)).floor() as usize).min(MAX_HARMONICS);
    for h in 2..=highest {
        let harmonic_period = (rate / (h as f64 * refined_hz)).floor();
        if harmonic_period < 2.0 {
            break;
        }
        let Ok(mut hf) = ButterworthFilter::new(
            FilterType::Bandpass,
            harmonic_period,
            HARMONIC_FILTER_Q,
            HARMONIC_FILTER_ORDER,
        ) else {
            continue;
        };
        hf.run(snapshot, scratch);
        for (i, slot) in wave.iter_mut().enumerate() {
            let index = start + best_offset + i;
            if index >= len {
                break;
            }
            *slot += scratch[index];
        }
    }

    wave
}

/// Cyclic linear interpolation of one waveform period to `target_len`
/// samples; used to express level-rate waveforms at the input rate.
fn stretch_cyclic(source: &[f32], target_len: usize) -> Vec<f32> {
    if source.is_empty() || target_len == 0 {
        return Vec::new();
    }
    if source.len() == target_len {
        return source.to_vec();
    }
    (0..target_len)
        .map(|i| {
            let position = i as f64 * source.len() as f64 / target_len as f64;
            let index = position.floor() as usize;
            let frac = position - index as f64;
            let a = source[index % source.len()] as f64;
            let b = source[(index + 1) % source.len()] as f64;
            (a * (1.0 - frac) + b * frac) as f32
        })
        .collect()
}
