//! Trend classifiers over a reader's denoised time series.

pub mod contamination;
pub mod foam;
pub mod harvest;

pub use contamination::{ContaminationDetector, ContaminationStatus};
pub use foam::{FoamAlert, FoamDetector, FoamUpdate, FoamZone};
pub use harvest::{HarvestDetector, HarvestState};
