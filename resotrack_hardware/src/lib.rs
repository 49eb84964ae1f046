//! Link and actuator backends for the resonance reader.
//!
//! - `SimulatedLink` / `SimulatedActuator`: always available, used by tests and
//!   by the CLI when built without the `hardware` feature
//! - `SerialLink`: the sensor interface board on a serial port (`hardware` feature)
pub mod error;
pub mod sim;
pub mod util;

#[cfg(feature = "hardware")]
pub mod serial;

pub use error::HwError;
pub use sim::{
    Injection, Resonance, STRAY_BYTE, SimHandle, SimulatedActuator, SimulatedLink,
};

#[cfg(feature = "hardware")]
pub use serial::SerialLink;
