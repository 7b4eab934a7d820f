//! Consumer-facing handle for the live analysis thread.

use crate::analyzer::AnalysisResult;
use crate::config::{ConfigUpdate, EngineConfig};
use crate::error::Result;
use crate::live::{run_analysis_thread, EngineCommand, LiveAnalysisState, LIVE_BLOCK_SIZE};
use crossbeam_channel::{unbounded, Receiver, Sender};
use ringbuf::{traits::Split, HeapProd, HeapRb};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to a running live analysis engine.
///
/// [`EngineHandle::spawn`] starts the analysis thread and returns the
/// ring-buffer producer for the audio callback together with the handle.
/// Results can be read two ways: [`EngineHandle::latest`] is a lock-free
/// snapshot of the most recent tick, [`EngineHandle::results`] the full
/// tick stream.
///
/// The thread is stopped and joined when the handle is dropped.
pub struct EngineHandle {
    state: Arc<LiveAnalysisState>,
    commands: Sender<EngineCommand>,
    results: Receiver<AnalysisResult>,
    thread: Option<JoinHandle<()>>,
    sample_rate: f64,
}

impl EngineHandle {
    /// Starts the analysis thread. `ring_capacity` sizes the sample tap;
    /// it is grown to hold at least a few analysis blocks.
    pub fn spawn(
        sample_rate: f64,
        config: EngineConfig,
        ring_capacity: usize,
    ) -> Result<(HeapProd<f32>, Self)> {
        config.validate()?;

        let ring = HeapRb::<f32>::new(ring_capacity.max(LIVE_BLOCK_SIZE * 4));
        let (producer, consumer) = ring.split();
        let (commands, command_rx) = unbounded();
        let (result_tx, results) = unbounded();
        let state = Arc::new(LiveAnalysisState::new());

        let thread_state = state.clone();
        let thread = std::thread::spawn(move || {
            run_analysis_thread(
                consumer,
                command_rx,
                result_tx,
                thread_state,
                sample_rate,
                config,
            );
        });

        Ok((
            producer,
            Self {
                state,
                commands,
                results,
                thread: Some(thread),
                sample_rate,
            },
        ))
    }

    /// Most recent analysis result; lock-free.
    pub fn latest(&self) -> Arc<AnalysisResult> {
        self.state.latest.load_full()
    }

    /// Receiver carrying every analysis tick in order.
    pub fn results(&self) -> &Receiver<AnalysisResult> {
        &self.results
    }

    /// Queues a configuration change; applied before the next block.
    pub fn update(&self, update: ConfigUpdate) {
        let _ = self.commands.send(EngineCommand::UpdateConfig(update));
    }

    /// Queues a reset; buffers refill before peaks are emitted again.
    pub fn reset(&self) {
        let _ = self.commands.send(EngineCommand::Reset);
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Stops the analysis thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.state.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
