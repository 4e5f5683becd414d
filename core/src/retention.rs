//! Background retention sweeper.
//!
//! The fraud subsystem already prunes the keys it touches and runs a
//! periodic inline sweep. This thread is for deployments that want
//! eviction on a timer as well, so idle keys do not linger.

use crate::engine::AnalyticsEngine;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct RetentionSweeper {
    stop:   Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl RetentionSweeper {
    /// Start sweeping `engine` every `interval` on a dedicated thread.
    pub fn spawn(engine: Arc<AnalyticsEngine>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("retention-sweeper".into())
            .spawn(move || {
                let mut passes = 0u64;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            engine.sweep_retention();
                            passes += 1;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("retention sweeper stopped after {passes} passes");
                passes
            })?;
        Ok(Self { stop: Some(stop_tx), handle: Some(handle) })
    }

    /// Stop the thread and wait for it. Returns the number of sweeps run.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("retention sweeper thread panicked");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
