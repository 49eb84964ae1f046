//! Per-reader acquisition session: one sensor, its calibration, its time
//! series and the detector state derived from it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use resotrack_config::{CalibrationFileError, calibration_csv_bytes, load_calibration_csv};
use resotrack_traits::{Actuator, Clock, Link};
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::config::{SessionCfg, SweepConfig};
use crate::controller::SweepController;
use crate::denoise::TimeSeriesDenoiser;
use crate::detectors::{
    ContaminationDetector, FoamAlert, FoamDetector, FoamZone, HarvestDetector, HarvestState,
};
use crate::error::{Result, SensorError};
use crate::fitter::{FittedPoint, SignalFitter};
use crate::optimizer::{AdaptiveSweepOptimizer, SearchRange};
use crate::sweep::{CalibrationCurve, Sweep};

/// One acquisition cycle's reading. Fitted values are NaN when the
/// refinement failed for that cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    /// Hours since the session connected.
    pub time_h: f64,
    pub raw_frequency_mhz: f64,
    pub raw_magnitude: f64,
    pub fitted_frequency_mhz: f64,
    pub fitted_magnitude: f64,
}

impl TimeSeriesPoint {
    pub fn has_fit(&self) -> bool {
        self.fitted_frequency_mhz.is_finite() && self.fitted_magnitude.is_finite()
    }
}

/// Something a detector raised during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorEvent {
    CloseToHarvest,
    ReadyToHarvest,
    ContaminationConfirmed,
    Foam(FoamAlert),
}

pub struct ReaderSession<L: Link> {
    pub(crate) controller: SweepController<L>,
    pub(crate) optimizer: AdaptiveSweepOptimizer,
    pub(crate) fitter: SignalFitter,
    pub(crate) denoiser: TimeSeriesDenoiser,
    pub(crate) harvest: HarvestDetector,
    pub(crate) contamination: ContaminationDetector,
    pub(crate) foam: FoamDetector,
    pub(crate) actuator: Option<Box<dyn Actuator + Send>>,
    pub(crate) cfg: SessionCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) epoch: Instant,
    pub(crate) series: Vec<TimeSeriesPoint>,
    pub(crate) events: Vec<DetectorEvent>,
    pub(crate) zero_point_mhz: Option<f64>,
    pub(crate) last_sweep: Option<Sweep>,
}

impl<L: Link> ReaderSession<L> {
    pub fn cfg(&self) -> &SessionCfg {
        &self.cfg
    }

    pub fn controller(&self) -> &SweepController<L> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SweepController<L> {
        &mut self.controller
    }

    /// Shared cooperative stop flag, checked between cycles and inside the
    /// peak search.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// Open the link, identify the device, load the stored calibration,
    /// power up and write the acquisition configuration. Run time starts here.
    pub fn connect(&mut self) -> Result<()> {
        self.controller.connect()?;
        self.controller.identify()?;
        self.load_calibration();
        self.controller.wake()?;
        self.controller.configure(&self.cfg.acquisition)?;
        self.epoch = self.clock.now();
        info!(
            start_mhz = self.cfg.acquisition.start_mhz,
            stop_mhz = self.cfg.acquisition.stop_mhz,
            points = self.cfg.acquisition.points,
            calibrated = self.controller.calibration().is_some(),
            "reader connected"
        );
        Ok(())
    }

    fn load_calibration(&mut self) {
        let Some(path) = self.cfg.calibration_file.clone() else {
            debug!("no calibration file configured");
            return;
        };
        let curve = match load_calibration_csv(&path) {
            Ok(rows) => CalibrationCurve::try_from(rows.as_slice()),
            Err(CalibrationFileError::Missing(_)) => {
                info!(path = %path.display(), "calibration file not found; running uncalibrated");
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "calibration file unusable; running uncalibrated");
                return;
            }
        };
        match curve {
            Ok(c) => {
                info!(path = %path.display(), points = c.len(), "calibration loaded");
                self.controller.set_calibration(Some(c));
            }
            Err(e) => warn!(error = %e, "calibration rejected; running uncalibrated"),
        }
    }

    /// Record a fresh baseline and persist it when a calibration file is
    /// configured. Returns false on any failure.
    pub fn calibrate(&mut self) -> bool {
        let curve = match self.controller.take_calibration_scan() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "calibration scan failed");
                return false;
            }
        };
        match self.cfg.calibration_file.clone() {
            Some(path) => match save_calibration(&path, &curve) {
                Ok(()) => {
                    info!(path = %path.display(), "calibration saved");
                    true
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "calibration not saved");
                    false
                }
            },
            None => true,
        }
    }

    pub fn calibration_compare(&self, mhz: f64, volts: f64) -> Result<f64> {
        self.controller.calibration_compare(mhz, volts)
    }

    fn acquire(&mut self) -> Result<Sweep> {
        if self.cfg.optimizer.enabled {
            self.optimizer
                .locate(&mut self.controller, &self.stop, &*self.clock)
                .map(|found| found.sweep)
        } else {
            self.controller.calibrated_sweep(&self.cfg.acquisition)
        }
    }

    /// Run one acquisition cycle: sweep, fit, append to the series and run
    /// the detectors. Fit failures still produce a point (with NaN fitted
    /// values); sweep failures are returned.
    pub fn take_scan(&mut self) -> Result<TimeSeriesPoint> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(SensorError::Stopped);
        }
        match self.controller.wake() {
            Err(SensorError::Reconnected(cause)) => {
                info!(cause = %cause, "link recovered on wake; retrying");
                self.controller.wake()?;
            }
            other => other?,
        }
        let acquired = self.acquire();
        if let Err(e) = self.controller.sleep() {
            debug!(error = %e, "sleep after sweep failed");
        }
        let db = acquired?.to_attenuation_db();

        let raw = SignalFitter::raw_minimum(&db).ok_or_else(|| {
            SensorError::Protocol("sweep contained no usable samples".into())
        })?;
        let fitted = self.fitter.fit(&db).unwrap_or_else(|e| {
            warn!(error = %e, "resonance fit failed; cycle recorded without fit");
            FittedPoint::NAN
        });
        let point = TimeSeriesPoint {
            time_h: self.clock.hours_since(self.epoch),
            raw_frequency_mhz: raw.frequency_mhz,
            raw_magnitude: raw.magnitude,
            fitted_frequency_mhz: fitted.frequency_mhz,
            fitted_magnitude: fitted.magnitude,
        };
        info!(
            time_h = point.time_h,
            raw_mhz = point.raw_frequency_mhz,
            fitted_mhz = point.fitted_frequency_mhz,
            fitted_db = point.fitted_magnitude,
            "scan"
        );
        self.series.push(point);
        self.last_sweep = Some(db);
        self.run_detectors(&point);
        Ok(point)
    }

    fn run_detectors(&mut self, point: &TimeSeriesPoint) {
        let denoised = self.denoised_series();

        let fitted: Vec<(f64, f64)> = denoised
            .iter()
            .map(|p| (p.time_h, p.fitted_frequency_mhz))
            .collect();
        match self.harvest.update(&fitted) {
            Some(HarvestState::CloseToHarvest) => self.events.push(DetectorEvent::CloseToHarvest),
            Some(HarvestState::ReadyToHarvest) => self.events.push(DetectorEvent::ReadyToHarvest),
            _ => {}
        }

        let raw: Vec<(f64, f64)> = denoised
            .iter()
            .map(|p| (p.time_h, p.raw_frequency_mhz))
            .collect();
        if self.contamination.update(&raw).newly_confirmed {
            self.events.push(DetectorEvent::ContaminationConfirmed);
        }

        if let Some(update) = self
            .foam
            .update(point.raw_frequency_mhz, self.actuator.as_deref_mut())
            && let Some(alert) = update.alert
        {
            self.events.push(DetectorEvent::Foam(alert));
        }
    }

    pub fn time_series(&self) -> &[TimeSeriesPoint] {
        &self.series
    }

    /// The series with scan-to-scan outliers (and unfitted cycles) removed.
    pub fn denoised_series(&self) -> Vec<TimeSeriesPoint> {
        self.denoiser
            .retain(&self.series, |p| (p.time_h, p.fitted_frequency_mhz))
    }

    /// The last cycle's sweep in attenuation dB.
    pub fn last_sweep(&self) -> Option<&Sweep> {
        self.last_sweep.as_ref()
    }

    /// Events raised since the last call.
    pub fn drain_events(&mut self) -> Vec<DetectorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn harvest_state(&self) -> HarvestState {
        self.harvest.state()
    }

    pub fn contamination_streak(&self) -> u32 {
        self.contamination.streak()
    }

    pub fn contamination_confirmed(&self) -> bool {
        self.contamination.is_confirmed()
    }

    pub fn foam_zone(&self) -> FoamZone {
        self.foam.zone()
    }

    pub fn acknowledge_foam_alert(&mut self) {
        self.foam.acknowledge_alert();
    }

    /// Reference frequency for the growth index; defaults to the first
    /// fitted reading.
    pub fn set_zero_point(&mut self, mhz: Option<f64>) {
        self.zero_point_mhz = mhz;
    }

    pub fn zero_point(&self) -> Option<f64> {
        self.zero_point_mhz.or_else(|| {
            self.series
                .iter()
                .find(|p| p.has_fit())
                .map(|p| p.fitted_frequency_mhz)
        })
    }

    /// Relative downward shift from the zero point, in parts per million.
    pub fn growth_index(&self, point: &TimeSeriesPoint) -> Option<f64> {
        let zero = self.zero_point()?;
        if !point.has_fit() || zero == 0.0 {
            return None;
        }
        Some((zero - point.fitted_frequency_mhz) / zero * 1e6)
    }

    fn retarget(&mut self, cfg: SweepConfig) -> bool {
        if let Err(e) = cfg.validate(self.controller.limits()) {
            warn!(error = %e, "sweep range change rejected");
            return false;
        }
        if self.controller.is_connected()
            && let Err(e) = self.controller.configure(&cfg)
        {
            warn!(error = %e, "sweep range change not applied");
            return false;
        }
        self.cfg.acquisition = cfg;
        self.optimizer.set_range(SearchRange::from(&cfg));
        true
    }

    /// Move the lower sweep bound, keeping the step size.
    pub fn set_start_frequency(&mut self, mhz: f64) -> bool {
        let cur = self.cfg.acquisition;
        self.retarget(SweepConfig::from_step(
            mhz,
            cur.stop_mhz,
            cur.step_mhz(),
            cur.amplitude_ma,
        ))
    }

    /// Move the upper sweep bound, keeping the step size.
    pub fn set_stop_frequency(&mut self, mhz: f64) -> bool {
        let cur = self.cfg.acquisition;
        self.retarget(SweepConfig::from_step(
            cur.start_mhz,
            mhz,
            cur.step_mhz(),
            cur.amplitude_ma,
        ))
    }

    /// Clear the series and detector state and restart the run clock.
    pub fn reset(&mut self) {
        self.series.clear();
        self.events.clear();
        self.last_sweep = None;
        self.harvest = HarvestDetector::new(self.cfg.harvest.clone());
        self.contamination = ContaminationDetector::new(self.cfg.contamination.clone());
        self.foam = FoamDetector::new(self.cfg.foam.clone());
        self.epoch = self.clock.now();
    }

    /// Put the device to sleep and close the link. Returns false if the
    /// link could not be closed cleanly.
    pub fn close(&mut self) -> bool {
        if self.controller.is_connected()
            && let Err(e) = self.controller.sleep()
        {
            debug!(error = %e, "sleep before close failed");
        }
        match self.controller.disconnect() {
            Ok(()) => {
                info!("reader closed");
                true
            }
            Err(e) => {
                warn!(error = %e, "close failed");
                false
            }
        }
    }
}

fn save_calibration(path: &Path, curve: &CalibrationCurve) -> eyre::Result<()> {
    let rows: Vec<resotrack_config::CalibrationRow> = curve.into();
    let bytes = calibration_csv_bytes(&rows)?;
    write_atomic(path, &bytes)?;
    Ok(())
}
