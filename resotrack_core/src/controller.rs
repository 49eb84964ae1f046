//! Sweep configuration, execution and link recovery.

use std::sync::Arc;
use std::time::Duration;

use resotrack_traits::wire::{self, Ack, Command, FailCode};
use resotrack_traits::{Clock, Link};
use tracing::{debug, info, warn};

use crate::config::{CalibrationScanCfg, DeviceLimits, SweepConfig};
use crate::error::{Result, SensorError};
use crate::sweep::{CalibrationCurve, Sweep};
use crate::transport::{Transport, fail_code_error, format_version};

pub struct SweepController<L: Link> {
    transport: Transport<L>,
    limits: DeviceLimits,
    /// Last configuration the device acknowledged; restored after a reconnect.
    last_config: Option<SweepConfig>,
    calibration: Option<CalibrationCurve>,
    calibration_scan: CalibrationScanCfg,
    hard_reset_wait: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<L: Link> SweepController<L> {
    pub fn new(
        link: L,
        link_timeout: Duration,
        limits: DeviceLimits,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            transport: Transport::new(link, link_timeout),
            limits,
            last_config: None,
            calibration: None,
            calibration_scan: CalibrationScanCfg::default(),
            hard_reset_wait: Duration::from_millis(5000),
            clock,
        }
    }

    pub fn with_calibration_scan(mut self, cfg: CalibrationScanCfg) -> Self {
        self.calibration_scan = cfg;
        self
    }

    pub fn with_hard_reset_wait(mut self, wait: Duration) -> Self {
        self.hard_reset_wait = wait;
        self
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn last_config(&self) -> Option<&SweepConfig> {
        self.last_config.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut Transport<L> {
        &mut self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect()
    }

    /// Handshake and log the firmware version.
    pub fn identify(&mut self) -> Result<u32> {
        self.transport.handshake()?;
        let version = self.transport.version()?;
        info!(firmware = %format_version(version), "sensor interface identified");
        Ok(version)
    }

    /// Validate and write start, stop, point count and amplitude. Each write
    /// must be answered with `Ok`; any other ack is a protocol error.
    pub fn configure(&mut self, cfg: &SweepConfig) -> Result<()> {
        cfg.validate(&self.limits)?;
        let writes = [
            (Command::SendStartFtw, wire::mhz_to_ftw(cfg.start_mhz)),
            (Command::SendStopFtw, wire::mhz_to_ftw(cfg.stop_mhz)),
            (Command::SendNumPts, cfg.points),
            (
                Command::SendAsf,
                u32::from(wire::ma_to_asf(cfg.amplitude_ma, self.limits.max_amplitude_ma)),
            ),
        ];
        for (cmd, payload) in writes {
            match self.transport.exchange(cmd, payload)? {
                (Ack::Ok, _) => {}
                (ack, p) => {
                    return Err(SensorError::Protocol(format!(
                        "{} answered {ack:?} ({p}) instead of Ok",
                        cmd.name()
                    )));
                }
            }
        }
        debug!(
            start_mhz = cfg.start_mhz,
            stop_mhz = cfg.stop_mhz,
            points = cfg.points,
            amplitude_ma = cfg.amplitude_ma,
            "sweep configured"
        );
        self.last_config = Some(*cfg);
        Ok(())
    }

    /// Power up the analog front end. A DDS configuration failure triggers a
    /// hard reset and is still reported as `DdsConfig`, or as
    /// `ReconnectFailed` when the link does not come back. A link failure
    /// goes through `recover`.
    pub fn wake(&mut self) -> Result<()> {
        let reply = match self.transport.exchange(Command::SystemWake, 0) {
            Ok(reply) => reply,
            Err(e) if e.is_link_failure() => return Err(self.recover(e)),
            Err(e) => return Err(e),
        };
        match reply {
            (Ack::Ok, _) => Ok(()),
            (Ack::Fail, code) => match FailCode::from_payload(code) {
                FailCode::DdsConfigError => {
                    warn!("DDS configuration error on wake; hard reset");
                    if let Err(e) = self.hard_reset() {
                        warn!(error = %e, "hard reset did not complete");
                        return Err(SensorError::ReconnectFailed(format!("hard reset: {e}")));
                    }
                    Err(SensorError::DdsConfig)
                }
                other => Err(fail_code_error(Command::SystemWake, other)),
            },
            (ack, _) => Err(SensorError::Protocol(format!(
                "unexpected {ack:?} ack to wake"
            ))),
        }
    }

    pub fn sleep(&mut self) -> Result<()> {
        self.transport.expect_ok(Command::SystemSleep, 0).map(|_| ())
    }

    /// Reset the device, wait for it to reboot, reopen the link and restore
    /// the last configuration.
    pub fn hard_reset(&mut self) -> Result<()> {
        if let Err(e) = self.transport.expect_ok(Command::Reset, 0) {
            debug!(error = %e, "reset not acknowledged");
        }
        self.clock.sleep(self.hard_reset_wait);
        if let Err(e) = self.transport.disconnect() {
            debug!(error = %e, "close during hard reset failed");
        }
        self.transport.connect()?;
        self.restore_config()?;
        info!("hard reset complete");
        Ok(())
    }

    /// Ask the device to abandon a sweep in progress.
    pub fn abort_sweep(&mut self) -> Result<()> {
        self.transport.expect_ok(Command::StopTest, 0).map(|_| ())
    }

    fn restore_config(&mut self) -> Result<()> {
        if let Some(cfg) = self.last_config {
            self.configure(&cfg)?;
        }
        Ok(())
    }

    /// Close, reopen and restore after a link failure. Always returns an
    /// error: `Reconnected` on success so the caller can retry the sweep,
    /// `ReconnectFailed` otherwise.
    pub fn recover(&mut self, cause: SensorError) -> SensorError {
        warn!(error = %cause, "link failure; reconnecting");
        if let Err(e) = self.transport.disconnect() {
            debug!(error = %e, "close before reconnect failed");
        }
        if let Err(e) = self.transport.connect() {
            return SensorError::ReconnectFailed(e.to_string());
        }
        if let Err(e) = self.restore_config() {
            return SensorError::ReconnectFailed(format!("restoring configuration: {e}"));
        }
        info!("link re-established");
        SensorError::Reconnected(Box::new(cause))
    }

    fn collect_samples(&mut self) -> Result<Vec<f64>> {
        let points = self.last_config.map_or(self.limits.max_points, |c| c.points);
        let max_bytes = points as usize * wire::SAMPLE_LEN;
        self.transport.write_command(Command::StartTest, 0)?;
        let mut volts = Vec::new();
        loop {
            match self.transport.read_ack()? {
                (Ack::SendData, len) => {
                    let remaining = max_bytes.saturating_sub(volts.len() * wire::SAMPLE_LEN);
                    let bytes = self.transport.read_data(len as usize, remaining)?;
                    volts.extend(wire::decode_samples(&bytes));
                }
                (Ack::Ok, _) => return Ok(volts),
                (Ack::Fail, code) => {
                    return Err(fail_code_error(
                        Command::StartTest,
                        FailCode::from_payload(code),
                    ));
                }
            }
        }
    }

    /// Run the configured sweep and return raw volts. A link failure
    /// mid-sweep triggers `recover`.
    pub fn perform_sweep(&mut self) -> Result<Vec<f64>> {
        match self.collect_samples() {
            Ok(volts) => {
                if let Some(cfg) = &self.last_config
                    && volts.len() != cfg.points as usize
                {
                    warn!(expected = cfg.points, got = volts.len(), "short sweep");
                }
                Ok(volts)
            }
            Err(e) if e.is_link_failure() => Err(self.recover(e)),
            Err(e) => Err(e),
        }
    }

    /// Configure and run one sweep, returning raw volts on its frequency axis.
    pub fn sweep(&mut self, cfg: &SweepConfig) -> Result<Sweep> {
        if self.last_config.as_ref() != Some(cfg) {
            self.configure(cfg)?;
        }
        let volts = self.perform_sweep()?;
        Ok(Sweep::new(cfg.frequencies(volts.len()), volts))
    }

    /// Like `sweep`, retrying once when the link was recovered mid-sweep.
    pub fn sweep_with_retry(&mut self, cfg: &SweepConfig) -> Result<Sweep> {
        match self.sweep(cfg) {
            Err(SensorError::Reconnected(cause)) => {
                info!(cause = %cause, "retrying sweep after reconnect");
                self.sweep(cfg)
            }
            other => other,
        }
    }

    /// Sweep and divide by the calibration curve when one is loaded.
    pub fn calibrated_sweep(&mut self, cfg: &SweepConfig) -> Result<Sweep> {
        let raw = self.sweep_with_retry(cfg)?;
        Ok(match &self.calibration {
            Some(curve) => curve.apply(&raw),
            None => raw,
        })
    }

    /// Record a baseline scan, dropping the start-up spike band, and install
    /// it as the active calibration. The previous acquisition configuration
    /// is restored afterwards.
    pub fn take_calibration_scan(&mut self) -> Result<CalibrationCurve> {
        let previous = self.last_config;
        let scan = &self.calibration_scan;
        let cfg = SweepConfig::from_step(
            scan.start_mhz,
            scan.stop_mhz,
            scan.step_mhz,
            previous.map_or(self.limits.max_amplitude_ma / 2.0, |c| c.amplitude_ma),
        );
        let skip = scan.spike_points();
        let raw = self.sweep_with_retry(&cfg)?;
        if raw.len() <= skip {
            return Err(SensorError::Protocol(format!(
                "calibration scan returned {} points, spike band alone is {skip}",
                raw.len()
            )));
        }
        let curve = CalibrationCurve::new(
            raw.frequencies[skip..].to_vec(),
            raw.values[skip..].to_vec(),
        )?;
        info!(points = curve.len(), skipped = skip, "calibration scan recorded");
        self.calibration = Some(curve.clone());
        if let Some(prev) = previous {
            self.configure(&prev)?;
        }
        Ok(curve)
    }

    pub fn set_calibration(&mut self, curve: Option<CalibrationCurve>) {
        self.calibration = curve;
    }

    pub fn calibration(&self) -> Option<&CalibrationCurve> {
        self.calibration.as_ref()
    }

    /// Ratio of `volts` to the calibration baseline nearest `mhz`.
    pub fn calibration_compare(&self, mhz: f64, volts: f64) -> Result<f64> {
        self.calibration
            .as_ref()
            .map(|c| c.compare(mhz, volts))
            .ok_or(SensorError::NoCalibration)
    }
}
