//! Background acquisition loop for one reader.
//!
//! Spawns a thread that owns the `ReaderSession`, runs one cycle per
//! interval and publishes a `CycleReport` per cycle on a channel. The
//! cooperative stop flag is checked between cycles and while waiting; an
//! in-flight sweep always runs to completion (or its timeout) first.
//!
//! Each `AcquisitionRunner` owns exactly one thread, stopped and joined when
//! the runner is dropped or finished.
use crossbeam_channel as xch;
use resotrack_traits::Link;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::SensorError;
use crate::session::{DetectorEvent, ReaderSession, TimeSeriesPoint};

/// Longest single sleep while waiting for the next cycle, so a stop request
/// is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    pub result: Result<TimeSeriesPoint, SensorError>,
    pub events: Vec<DetectorEvent>,
    /// Growth index of this cycle's point, when it has a fit.
    pub growth_ppm: Option<f64>,
}

pub struct AcquisitionRunner<L: Link + Send + 'static> {
    rx: xch::Receiver<CycleReport>,
    stop: Arc<AtomicBool>,
    last_ok_ms: Arc<AtomicU64>,
    epoch: Instant,
    join_handle: Option<std::thread::JoinHandle<ReaderSession<L>>>,
}

impl<L: Link + Send + 'static> AcquisitionRunner<L> {
    /// Start cycling `session` every `interval`, for at most `max_cycles`
    /// cycles when given. The session should already be connected.
    pub fn spawn(
        mut session: ReaderSession<L>,
        interval: Duration,
        max_cycles: Option<u64>,
    ) -> Self {
        let (tx, rx) = xch::unbounded();
        let stop = session.stop_flag();
        let stop_thread = Arc::clone(&stop);
        let last_ok_ms = Arc::new(AtomicU64::new(0));
        let last_ok_thread = Arc::clone(&last_ok_ms);
        let clock = session.clock();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            let mut cycle = 0u64;
            loop {
                if stop_thread.load(Ordering::Relaxed) {
                    tracing::debug!("acquisition thread received stop signal");
                    break;
                }
                if max_cycles.is_some_and(|max| cycle >= max) {
                    break;
                }
                cycle += 1;
                let started = clock.now();
                let result = session.take_scan();
                match &result {
                    Ok(_) => last_ok_thread.store(clock.ms_since(epoch), Ordering::Relaxed),
                    Err(SensorError::Stopped) => break,
                    Err(e) => tracing::warn!(cycle, error = %e, "acquisition cycle failed"),
                }
                let growth_ppm = result
                    .as_ref()
                    .ok()
                    .and_then(|p| session.growth_index(p));
                let report = CycleReport {
                    cycle,
                    result,
                    events: session.drain_events(),
                    growth_ppm,
                };
                // If send fails, consumer is gone; exit gracefully
                if tx.send(report).is_err() {
                    tracing::debug!("acquisition consumer disconnected, exiting thread");
                    break;
                }
                if max_cycles.is_some_and(|max| cycle >= max) {
                    break;
                }

                let next = started + interval;
                while !stop_thread.load(Ordering::Relaxed) {
                    let now = clock.now();
                    if now >= next {
                        break;
                    }
                    clock.sleep((next - now).min(WAIT_SLICE));
                }
            }
            tracing::trace!(cycles = cycle, "acquisition thread exiting cleanly");
            session
        });

        Self {
            rx,
            stop,
            last_ok_ms,
            epoch,
            join_handle: Some(join_handle),
        }
    }

    pub fn reports(&self) -> &xch::Receiver<CycleReport> {
        &self.rx
    }

    /// Ask the loop to stop after the current cycle.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(std::thread::JoinHandle::is_finished)
    }

    /// Milliseconds since the last successful cycle, measured from `now_ms`
    /// on the runner's time base.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok_ms.load(Ordering::Relaxed))
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Wait for the loop to end on its own (cycle limit or stop flag) and
    /// hand the session back.
    pub fn join(mut self) -> Option<ReaderSession<L>> {
        let handle = self.join_handle.take()?;
        match handle.join() {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(?e, "acquisition thread panicked");
                None
            }
        }
    }

    /// Stop, join and hand the session back.
    pub fn finish(self) -> Option<ReaderSession<L>> {
        self.stop();
        self.join()
    }
}

impl<L: Link + Send + 'static> Drop for AcquisitionRunner<L> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(_) => tracing::trace!("acquisition thread joined"),
                Err(e) => tracing::warn!(?e, "acquisition thread panicked during shutdown"),
            }
        }
    }
}
