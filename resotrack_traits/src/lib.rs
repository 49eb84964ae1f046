//! Hardware-agnostic contracts shared by the reader stack.
//!
//! - `Link`: a byte link to the sensor interface board (serial port or emulator)
//! - `Actuator`: the pump/current output used by the foam detector
//! - `Clock`: monotonic time, injectable for tests
//! - `wire`: the fixed 8-byte frame and its command/ack tables
pub mod clock;
pub mod wire;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

pub trait Link {
    /// Open the underlying device. Opening an already open link is a no-op.
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn is_open(&self) -> bool;
    /// Write all bytes or fail once `timeout` elapses.
    fn write_all(
        &mut self,
        bytes: &[u8],
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Fill `buf` completely or fail once `timeout` elapses. Short reads are errors.
    fn read_exact(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub trait Actuator {
    fn send_current(&mut self, milliamps: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).open()
    }
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).close()
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
    fn write_all(
        &mut self,
        bytes: &[u8],
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_all(bytes, timeout)
    }
    fn read_exact(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_exact(buf, timeout)
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn send_current(&mut self, milliamps: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send_current(milliamps)
    }
}
