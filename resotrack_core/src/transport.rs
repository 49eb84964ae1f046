//! Framed command/acknowledgment exchange over a `Link`.
//!
//! Every host command is one 8-byte frame; the device answers with an ack
//! frame, optionally followed by a run of sample bytes announced by a
//! `SendData` ack. Link failures are mapped to `Timeout`/`Connection`,
//! unknown ack codes to `Protocol`. An unknown code means the byte stream
//! has lost frame alignment, so the link is reopened (dropping whatever is
//! buffered) before the error is returned.

use std::time::Duration;

use resotrack_traits::Link;
use resotrack_traits::wire::{Ack, Command, FRAME_LEN, FailCode, Frame};
use tracing::{debug, trace, warn};

use crate::error::{Result, SensorError};
use crate::hw_error::map_link_error;

/// Payload echoed back by the handshake.
pub const HANDSHAKE_MAGIC: u32 = 0x5245_534F; // "RESO"

/// Typed error for a `Fail` ack.
pub fn fail_code_error(cmd: Command, code: FailCode) -> SensorError {
    match code {
        FailCode::InvalidCommand => SensorError::InvalidCommand(cmd.name().to_string()),
        FailCode::DdsConfigError => SensorError::DdsConfig,
        FailCode::RegulatorsNotReady => SensorError::RegulatorsNotReady,
        FailCode::Unknown(v) => {
            SensorError::Protocol(format!("{} failed with unknown code {v}", cmd.name()))
        }
    }
}

pub struct Transport<L: Link> {
    link: L,
    timeout: Duration,
}

impl<L: Link> Transport<L> {
    pub fn new(link: L, timeout: Duration) -> Self {
        Self { link, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    pub fn connect(&mut self) -> Result<()> {
        self.link
            .open()
            .map_err(|e| SensorError::Connection(e.to_string()))?;
        debug!("link opened");
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.link
            .close()
            .map_err(|e| SensorError::Connection(e.to_string()))?;
        debug!("link closed");
        Ok(())
    }

    /// Close and reopen the link, discarding buffered bytes on both sides.
    pub fn resync(&mut self) -> Result<()> {
        if let Err(e) = self.disconnect() {
            debug!(error = %e, "close before resync failed");
        }
        self.connect()
    }

    pub fn write_command(&mut self, cmd: Command, payload: u32) -> Result<()> {
        trace!(cmd = cmd.name(), payload, "tx");
        self.link
            .write_all(&Frame::command(cmd, payload).encode(), self.timeout)
            .map_err(|e| map_link_error(e.as_ref()))
    }

    pub fn read_ack(&mut self) -> Result<(Ack, u32)> {
        let mut raw = [0u8; FRAME_LEN];
        self.link
            .read_exact(&mut raw, self.timeout)
            .map_err(|e| map_link_error(e.as_ref()))?;
        let frame = Frame::decode(&raw);
        let Some(ack) = Ack::from_code(frame.code) else {
            warn!(code = %frame.code_str(), "unknown ack code; resynchronizing link");
            self.resync()?;
            return Err(SensorError::Protocol(format!(
                "unknown ack code {:?}",
                frame.code_str()
            )));
        };
        trace!(?ack, payload = frame.payload, "rx");
        Ok((ack, frame.payload))
    }

    /// Read a sample run of `len` bytes. A run longer than `max_len` is
    /// refused without reading it and the link is resynchronized.
    pub fn read_data(&mut self, len: usize, max_len: usize) -> Result<Vec<u8>> {
        if len > max_len {
            warn!(len, max_len, "oversized data announcement; resynchronizing link");
            self.resync()?;
            return Err(SensorError::Protocol(format!(
                "device announced {len} data bytes, at most {max_len} expected"
            )));
        }
        let mut buf = vec![0u8; len];
        self.link
            .read_exact(&mut buf, self.timeout)
            .map_err(|e| map_link_error(e.as_ref()))?;
        Ok(buf)
    }

    /// Write a command and read its ack.
    pub fn exchange(&mut self, cmd: Command, payload: u32) -> Result<(Ack, u32)> {
        self.write_command(cmd, payload)?;
        self.read_ack()
    }

    /// Exchange and require `Ok`; returns the ack payload. `Fail` acks map
    /// through `fail_code_error`, anything else is a protocol error.
    pub fn expect_ok(&mut self, cmd: Command, payload: u32) -> Result<u32> {
        match self.exchange(cmd, payload)? {
            (Ack::Ok, p) => Ok(p),
            (Ack::Fail, code) => Err(fail_code_error(cmd, FailCode::from_payload(code))),
            (ack, _) => Err(SensorError::Protocol(format!(
                "unexpected {ack:?} ack to {}",
                cmd.name()
            ))),
        }
    }

    /// Confirm the device answers and echoes the handshake payload.
    pub fn handshake(&mut self) -> Result<()> {
        let echo = self.expect_ok(Command::Handshake, HANDSHAKE_MAGIC)?;
        if echo != HANDSHAKE_MAGIC {
            return Err(SensorError::Protocol(format!(
                "handshake echo mismatch: {echo:#010x}"
            )));
        }
        Ok(())
    }

    /// Firmware version word.
    pub fn version(&mut self) -> Result<u32> {
        self.expect_ok(Command::GetVersion, 0)
    }
}

/// Render a packed firmware version word as `major.minor.patch`.
pub fn format_version(v: u32) -> String {
    format!("{}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resotrack_hardware::{Injection, SimulatedLink};

    fn transport() -> (Transport<SimulatedLink>, resotrack_hardware::SimHandle) {
        let link = SimulatedLink::default();
        let handle = link.handle();
        let mut t = Transport::new(link, Duration::from_millis(50));
        t.connect().unwrap();
        (t, handle)
    }

    #[test]
    fn handshake_and_version() {
        let (mut t, sim) = transport();
        sim.set_version(0x0002_0103);
        t.handshake().unwrap();
        assert_eq!(format_version(t.version().unwrap()), "2.1.3");
    }

    #[test]
    fn fail_acks_are_typed() {
        let (mut t, sim) = transport();
        sim.inject(
            Command::SystemWake,
            Injection::Fail(FailCode::RegulatorsNotReady),
        );
        assert_eq!(
            t.expect_ok(Command::SystemWake, 0),
            Err(SensorError::RegulatorsNotReady)
        );
        sim.inject(Command::SendAsf, Injection::Fail(FailCode::InvalidCommand));
        assert_eq!(
            t.expect_ok(Command::SendAsf, 1),
            Err(SensorError::InvalidCommand(Command::SendAsf.name().to_string()))
        );
    }

    #[test]
    fn silent_device_times_out() {
        let (mut t, sim) = transport();
        sim.inject(Command::GetVersion, Injection::Drop);
        assert_eq!(t.version(), Err(SensorError::Timeout));
    }

    #[test]
    fn stray_byte_is_a_protocol_error_and_the_next_exchange_succeeds() {
        let (mut t, sim) = transport();
        sim.inject(Command::GetVersion, Injection::StrayByte);
        assert!(matches!(
            t.version(),
            Err(SensorError::Protocol(msg)) if msg.contains("unknown ack code")
        ));
        assert!(t.is_connected());
        assert_eq!(sim.opens(), 2);
        t.handshake().unwrap();
        assert_eq!(t.version().unwrap(), 0x0001_0200);
    }

    #[test]
    fn oversized_data_run_is_refused() {
        let (mut t, sim) = transport();
        let err = t.read_data(1 << 30, 400).unwrap_err();
        assert!(matches!(err, SensorError::Protocol(_)), "{err:?}");
        assert_eq!(sim.opens(), 2);
        assert!(t.read_data(0, 400).unwrap().is_empty());
    }

    #[test]
    fn closed_link_is_a_connection_error() {
        let (mut t, _sim) = transport();
        t.disconnect().unwrap();
        assert!(matches!(
            t.write_command(Command::StopTest, 0),
            Err(SensorError::Connection(_))
        ));
    }
}
