use std::io::{Read, Write};
use std::time::Duration;

use resotrack_traits::Link;
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::fill_with_deadline;

/// Per-call read timeout handed to the OS driver; the overall deadline is
/// enforced by `fill_with_deadline`.
const POLL_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Sensor interface board on a serial port.
pub struct SerialLink {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialLink {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or(HwError::NotOpen)
    }

    fn open_port(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(POLL_READ_TIMEOUT)
            .open()
            .map_err(|e| HwError::OpenFailed(format!("{}: {e}", self.path)))?;
        // Discard anything left over from a previous session.
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        debug!(path = %self.path, baud = self.baud_rate, "serial port opened");
        self.port = Some(port);
        Ok(())
    }

    fn write_frame(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        let res = port.write_all(bytes).and_then(|()| port.flush());
        // Restore the short poll timeout used by reads.
        let _ = port.set_timeout(POLL_READ_TIMEOUT);
        match res {
            Ok(()) => {
                trace!(len = bytes.len(), "serial write");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(HwError::Timeout),
            Err(e) => Err(e.into()),
        }
    }
}

impl Link for SerialLink {
    fn open(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.open_port().map_err(Into::into)
    }

    fn close(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.port.take().is_some() {
            debug!(path = %self.path, "serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write_all(
        &mut self,
        bytes: &[u8],
        timeout: Duration,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_frame(bytes, timeout).map_err(Into::into)
    }

    fn read_exact(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let port = self.port_mut()?;
        fill_with_deadline(|b| port.read(b), buf, timeout, Duration::from_millis(1))
            .map_err(Into::into)
    }
}
