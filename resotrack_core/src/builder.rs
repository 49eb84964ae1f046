//! Builder for `ReaderSession`.
//!
//! The link is required up front; everything else has a default: a
//! monotonic clock, a fresh stop flag and no actuator.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use resotrack_traits::{Actuator, Clock, Link, MonotonicClock};

use crate::config::SessionCfg;
use crate::controller::SweepController;
use crate::denoise::TimeSeriesDenoiser;
use crate::detectors::{ContaminationDetector, FoamDetector, HarvestDetector};
use crate::fitter::SignalFitter;
use crate::optimizer::{AdaptiveSweepOptimizer, SearchRange};
use crate::session::ReaderSession;

pub struct SessionBuilder<L: Link> {
    link: L,
    cfg: SessionCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    actuator: Option<Box<dyn Actuator + Send>>,
    stop: Option<Arc<AtomicBool>>,
}

impl<L: Link> ReaderSession<L> {
    pub fn builder(link: L) -> SessionBuilder<L> {
        SessionBuilder {
            link,
            cfg: SessionCfg::default(),
            clock: None,
            actuator: None,
            stop: None,
        }
    }
}

impl<L: Link> SessionBuilder<L> {
    pub fn with_config(mut self, cfg: SessionCfg) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Output used by the foam detector for heartbeat and alarm currents.
    pub fn with_actuator(mut self, actuator: impl Actuator + Send + 'static) -> Self {
        self.actuator = Some(Box::new(actuator));
        self
    }

    /// Share a stop flag with other sessions or a signal handler.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn build(self) -> ReaderSession<L> {
        let Self {
            link,
            cfg,
            clock,
            actuator,
            stop,
        } = self;
        let clock = clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let controller = SweepController::new(link, cfg.link_timeout, cfg.limits, Arc::clone(&clock))
            .with_calibration_scan(cfg.calibration_scan.clone())
            .with_hard_reset_wait(cfg.hard_reset_wait);
        let optimizer =
            AdaptiveSweepOptimizer::new(cfg.optimizer.clone(), SearchRange::from(&cfg.acquisition));
        ReaderSession {
            controller,
            optimizer,
            fitter: SignalFitter::new(cfg.fitter.clone()),
            denoiser: TimeSeriesDenoiser::new(),
            harvest: HarvestDetector::new(cfg.harvest.clone()),
            contamination: ContaminationDetector::new(cfg.contamination.clone()),
            foam: FoamDetector::new(cfg.foam.clone()),
            actuator,
            epoch: clock.now(),
            clock,
            stop: stop.unwrap_or_default(),
            series: Vec::new(),
            events: Vec::new(),
            zero_point_mhz: None,
            last_sweep: None,
            cfg,
        }
    }
}
