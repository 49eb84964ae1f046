use thiserror::Error;

/// Failures of the acquisition path: link, device, configuration and search.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("device rejected command: {0}")]
    InvalidCommand(String),
    #[error("DDS configuration error")]
    DdsConfig,
    #[error("regulators not ready")]
    RegulatorsNotReady,
    #[error("invalid sweep configuration: {0}")]
    InvalidConfig(String),
    #[error("link recovered after: {0}; sweep was not completed")]
    Reconnected(Box<SensorError>),
    #[error("reconnect failed: {0}")]
    ReconnectFailed(String),
    #[error("sensor not found (best peak amplitude {best_amplitude:.3})")]
    SensorNotFound { best_amplitude: f64 },
    #[error("focused sweep failed (best peak amplitude {best_amplitude:.3})")]
    FocusedSweepFailed { best_amplitude: f64 },
    #[error("peak search budget exhausted after {restarts} restarts")]
    SearchBudgetExhausted { restarts: u32 },
    #[error("no calibration loaded")]
    NoCalibration,
    #[error("stopped")]
    Stopped,
}

impl SensorError {
    /// Link-level failures that trigger the reconnect-and-restore policy.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, SensorError::Connection(_) | SensorError::Timeout)
    }

    /// Search failures the optimizer's outer loop may retry.
    pub fn is_search_miss(&self) -> bool {
        matches!(
            self,
            SensorError::SensorNotFound { .. } | SensorError::FocusedSweepFailed { .. }
        )
    }
}

/// Numerical failures of the fitting stages. Never fatal to a run: the
/// session records the cycle with NaN fitted values and carries on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("bad fit: {0}")]
    BadFit(String),
    #[error("not enough points to fit: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("fit produced non-finite values")]
    NonFinite,
}

pub type Result<T> = std::result::Result<T, SensorError>;
