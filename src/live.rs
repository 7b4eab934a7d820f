//! Live analysis via ring buffer tap.
//!
//! Runs the engine on a background thread, reading mono samples from an
//! SPSC ring buffer fed by the audio callback. The latest result is
//! published via `ArcSwap` for lock-free reads from the UI thread; every
//! result is also forwarded on a channel for consumers that want the full
//! tick stream. Configuration commands are applied between ticks.

use crate::analyzer::AnalysisResult;
use crate::config::{ConfigUpdate, EngineConfig};
use crate::engine::AnalysisEngine;
use arc_swap::ArcSwap;
use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_channel::{Receiver, Sender};
use ringbuf::{
    traits::{Consumer, Observer},
    HeapCons,
};
use std::sync::Arc;
use tracing::debug;

/// Samples drained per iteration; one drain counts as one input block for
/// the engine's analysis cadence.
pub const LIVE_BLOCK_SIZE: usize = 512;

/// Control messages applied between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    UpdateConfig(ConfigUpdate),
    Reset,
}

/// Shared state between the analysis thread and its handle.
pub struct LiveAnalysisState {
    /// Latest analysis result; lock-free to read from any thread.
    pub latest: ArcSwap<AnalysisResult>,
    running: AtomicBool,
}

impl LiveAnalysisState {
    pub fn new() -> Self {
        Self {
            latest: ArcSwap::from_pointee(AnalysisResult::default()),
            running: AtomicBool::new(true),
        }
    }

    /// Signal the analysis thread to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for LiveAnalysisState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the live analysis loop.
///
/// Blocks until [`LiveAnalysisState::stop`] is called. Returns
/// immediately if the initial configuration is rejected.
pub fn run_analysis_thread(
    mut consumer: HeapCons<f32>,
    commands: Receiver<EngineCommand>,
    results: Sender<AnalysisResult>,
    state: Arc<LiveAnalysisState>,
    sample_rate: f64,
    config: EngineConfig,
) {
    let mut engine = match AnalysisEngine::new(sample_rate, config) {
        Ok(engine) => engine,
        Err(e) => {
            debug!(error = %e, "live engine failed to start");
            return;
        }
    };
    debug!(sample_rate, "analysis thread started");

    let mut block = [0.0f32; LIVE_BLOCK_SIZE];

    while state.is_running() {
        // Commands apply between ticks; a rejected update leaves the
        // engine running on its previous configuration.
        while let Ok(command) = commands.try_recv() {
            match command {
                EngineCommand::UpdateConfig(update) => {
                    if let Err(e) = engine.update(&update) {
                        debug!(error = %e, "rejected config update");
                    }
                }
                EngineCommand::Reset => engine.reset(),
            }
        }

        let available = consumer.occupied_len();
        if available == 0 {
            std::thread::sleep(std::time::Duration::from_millis(5));
            continue;
        }

        let to_read = available.min(LIVE_BLOCK_SIZE);
        let read = consumer.pop_slice(&mut block[..to_read]);
        if read == 0 {
            continue;
        }

        if let Some(result) = engine.process_block(&block[..read]) {
            state.latest.store(Arc::new(result.clone()));
            // Consumer may have dropped the receiver; latest still updates.
            let _ = results.send(result);
        }
    }

    debug!("analysis thread stopped");
}
