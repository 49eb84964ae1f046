use resotrack_traits::Actuator;
use tracing::{info, warn};

use crate::config::FoamCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoamZone {
    #[default]
    Normal,
    FoamReached,
    LiquidOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoamAlert {
    FoamReached,
    LiquidOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoamUpdate {
    pub zone: FoamZone,
    pub shift_mhz: f64,
    /// Set when this reading raised an alert.
    pub alert: Option<FoamAlert>,
}

/// Three-zone classifier of the shift between the current minimum
/// frequency and the reference frequency in air.
///
/// Alerts are edge-triggered: after one fires, no further alert is raised
/// until `acknowledge_alert` is called by whoever handled it.
#[derive(Debug, Clone)]
pub struct FoamDetector {
    cfg: FoamCfg,
    reference_mhz: Option<f64>,
    zone: FoamZone,
    alert_pending: bool,
    normal_cycles: u32,
}

impl FoamDetector {
    pub fn new(cfg: FoamCfg) -> Self {
        Self {
            reference_mhz: cfg.air_frequency_mhz,
            cfg,
            zone: FoamZone::Normal,
            alert_pending: false,
            normal_cycles: 0,
        }
    }

    pub fn zone(&self) -> FoamZone {
        self.zone
    }

    pub fn reference_mhz(&self) -> Option<f64> {
        self.reference_mhz
    }

    pub fn alert_pending(&self) -> bool {
        self.alert_pending
    }

    /// Called once the external alert handler has finished.
    pub fn acknowledge_alert(&mut self) {
        self.alert_pending = false;
    }

    pub fn classify(&self, shift_mhz: f64) -> FoamZone {
        let water = self.cfg.water_shift_mhz;
        if shift_mhz > 0.9 * water {
            FoamZone::LiquidOverflow
        } else if shift_mhz > water * self.cfg.threshold_percent / 100.0 {
            FoamZone::FoamReached
        } else {
            FoamZone::Normal
        }
    }

    /// Classify the current minimum frequency and drive the actuator. The
    /// first reading becomes the reference when none is configured.
    /// Actuator failures are logged and otherwise ignored.
    pub fn update(
        &mut self,
        current_mhz: f64,
        actuator: Option<&mut (dyn Actuator + Send + 'static)>,
    ) -> Option<FoamUpdate> {
        if !self.cfg.enabled || !current_mhz.is_finite() {
            return None;
        }
        let reference = *self.reference_mhz.get_or_insert(current_mhz);
        let shift_mhz = (current_mhz - reference).abs();
        let zone = self.classify(shift_mhz);
        self.zone = zone;

        let mut alert = None;
        let mut current_ma = None;
        match zone {
            FoamZone::Normal => {
                self.normal_cycles += 1;
                if self.cfg.heartbeat_every > 0
                    && self.normal_cycles % self.cfg.heartbeat_every == 0
                {
                    current_ma = Some(self.cfg.heartbeat_ma);
                }
            }
            FoamZone::FoamReached | FoamZone::LiquidOverflow => {
                self.normal_cycles = 0;
                if !self.alert_pending {
                    self.alert_pending = true;
                    let a = if zone == FoamZone::FoamReached {
                        current_ma = Some(self.cfg.alarm_ma);
                        FoamAlert::FoamReached
                    } else {
                        FoamAlert::LiquidOverflow
                    };
                    info!(?a, shift_mhz, "foam alert");
                    alert = Some(a);
                }
            }
        }

        if let (Some(ma), Some(act)) = (current_ma, actuator)
            && let Err(e) = act.send_current(ma)
        {
            warn!(error = %e, milliamps = ma, "actuator write failed");
        }

        Some(FoamUpdate {
            zone,
            shift_mhz,
            alert,
        })
    }
}
