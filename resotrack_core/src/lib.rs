#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::similar_names,
    clippy::many_single_char_names,
    clippy::suboptimal_flops,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Resonance-tracking acquisition pipeline (hardware-agnostic).
//!
//! All device I/O goes through `resotrack_traits::Link`; the foam detector's
//! output goes through `resotrack_traits::Actuator`.
//!
//! ## Architecture
//!
//! - **Transport**: framed command/ack exchange with typed failures (`transport`)
//! - **Controller**: sweep configuration, execution, reconnect and hard reset (`controller`)
//! - **Optimizer**: two-phase Gaussian peak search over calibrated sweeps (`optimizer`)
//! - **Fitter**: sub-sample resonance minimum from one sweep (`fitter`)
//! - **Denoiser**: scan-to-scan outlier removal over the time series (`denoise`)
//! - **Detectors**: harvest, contamination and foam classifiers (`detectors`)
//! - **Session**: one reader's run, its series and events (`session`)
//! - **Runner**: background acquisition thread (`runner`)
//!
//! Sweeps flow volts → calibration ratio (peak over a baseline of 1, used by
//! the optimizer) → attenuation dB (`-20·log10(ratio)`, a dip, used by the
//! fitter).

pub mod atomic;
pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod denoise;
pub mod detectors;
pub mod error;
pub mod fitter;
pub mod hw_error;
pub mod numeric;
pub mod optimizer;
pub mod runner;
pub mod session;
pub mod sweep;
pub mod transport;

pub use builder::SessionBuilder;
pub use config::{
    CalibrationScanCfg, ContaminationCfg, DeviceLimits, FitMethod, FitterCfg, FoamCfg,
    HarvestCfg, OptimizerCfg, SessionCfg, SweepConfig,
};
pub use controller::SweepController;
pub use denoise::TimeSeriesDenoiser;
pub use detectors::{
    ContaminationDetector, FoamAlert, FoamDetector, FoamZone, HarvestDetector, HarvestState,
};
pub use error::{FitError, Result, SensorError};
pub use fitter::{FittedPoint, SignalFitter};
pub use optimizer::{AdaptiveSweepOptimizer, FocusedResult, PeakEstimate, SearchRange, Sweeper};
pub use runner::{AcquisitionRunner, CycleReport};
pub use session::{DetectorEvent, ReaderSession, TimeSeriesPoint};
pub use sweep::{CalibrationCurve, Sweep};
pub use transport::Transport;
