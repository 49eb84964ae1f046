//! Wire format of the sensor interface board (SIB).
//!
//! Every exchange is a fixed 8-byte frame in each direction: a 4-byte code
//! followed by a 4-byte big-endian payload. Host frames carry a `Command`,
//! device frames an `Ack`. A `send_data` ack announces a run of raw sample
//! bytes (its payload is the byte count) that follows immediately on the link.

/// Total frame length in bytes.
pub const FRAME_LEN: usize = 8;
/// DDS reference clock.
pub const DDS_CLOCK_HZ: f64 = 1.0e9;
/// Full scale of the 14-bit amplitude scale factor.
pub const ASF_MAX: u16 = (1 << 14) - 1;
/// ADC reference voltage and resolution of one sample code.
pub const ADC_VREF: f64 = 3.3;
pub const ADC_COUNTS: f64 = 1024.0;
/// Bytes per measurement sample on the wire.
pub const SAMPLE_LEN: usize = 2;

const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SendStartFtw,
    SendStopFtw,
    SendNumPts,
    SendAsf,
    GetVersion,
    StartTest,
    StopTest,
    Handshake,
    SystemSleep,
    SystemWake,
    Reset,
}

impl Command {
    pub const ALL: [Command; 11] = [
        Command::SendStartFtw,
        Command::SendStopFtw,
        Command::SendNumPts,
        Command::SendAsf,
        Command::GetVersion,
        Command::StartTest,
        Command::StopTest,
        Command::Handshake,
        Command::SystemSleep,
        Command::SystemWake,
        Command::Reset,
    ];

    pub const fn code(self) -> [u8; 4] {
        match self {
            Command::SendStartFtw => *b"STFW",
            Command::SendStopFtw => *b"SPFW",
            Command::SendNumPts => *b"NPTS",
            Command::SendAsf => *b"SASF",
            Command::GetVersion => *b"GVER",
            Command::StartTest => *b"STRT",
            Command::StopTest => *b"STOP",
            Command::Handshake => *b"HAND",
            Command::SystemSleep => *b"SLEP",
            Command::SystemWake => *b"WAKE",
            Command::Reset => *b"RSET",
        }
    }

    pub fn from_code(code: [u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Command::SendStartFtw => "send_start_ftw",
            Command::SendStopFtw => "send_stop_ftw",
            Command::SendNumPts => "send_num_pts",
            Command::SendAsf => "send_asf",
            Command::GetVersion => "get_version",
            Command::StartTest => "start_test",
            Command::StopTest => "stop_test",
            Command::Handshake => "handshake",
            Command::SystemSleep => "system_sleep",
            Command::SystemWake => "system_wake",
            Command::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ack {
    Ok,
    SendData,
    Fail,
}

impl Ack {
    pub const ALL: [Ack; 3] = [Ack::Ok, Ack::SendData, Ack::Fail];

    pub const fn code(self) -> [u8; 4] {
        match self {
            Ack::Ok => *b"OKAY",
            Ack::SendData => *b"DATA",
            Ack::Fail => *b"FAIL",
        }
    }

    pub fn from_code(code: [u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }
}

/// Error codes carried in the payload of a `fail` ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailCode {
    InvalidCommand,
    DdsConfigError,
    RegulatorsNotReady,
    Unknown(u32),
}

impl FailCode {
    pub const fn from_payload(payload: u32) -> Self {
        match payload {
            1 => FailCode::InvalidCommand,
            2 => FailCode::DdsConfigError,
            3 => FailCode::RegulatorsNotReady,
            other => FailCode::Unknown(other),
        }
    }

    pub const fn payload(self) -> u32 {
        match self {
            FailCode::InvalidCommand => 1,
            FailCode::DdsConfigError => 2,
            FailCode::RegulatorsNotReady => 3,
            FailCode::Unknown(v) => v,
        }
    }
}

/// One 8-byte frame as it appears on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub code: [u8; 4],
    pub payload: u32,
}

impl Frame {
    pub const fn command(cmd: Command, payload: u32) -> Self {
        Self {
            code: cmd.code(),
            payload,
        }
    }

    pub const fn ack(ack: Ack, payload: u32) -> Self {
        Self {
            code: ack.code(),
            payload,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[..4].copy_from_slice(&self.code);
        out[4..].copy_from_slice(&self.payload.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Self {
        let mut code = [0u8; 4];
        code.copy_from_slice(&bytes[..4]);
        let mut payload = [0u8; 4];
        payload.copy_from_slice(&bytes[4..]);
        Self {
            code,
            payload: u32::from_be_bytes(payload),
        }
    }

    /// Printable form of the code for logs; non-ASCII bytes are hex-escaped.
    pub fn code_str(&self) -> String {
        self.code
            .iter()
            .flat_map(|b| std::ascii::escape_default(*b))
            .map(char::from)
            .collect()
    }
}

/// Frequency in Hz to the DDS 32-bit tuning word, rounded and clamped.
pub fn hz_to_ftw(hz: f64) -> u32 {
    let word = (TWO_POW_32 * hz / DDS_CLOCK_HZ).round();
    if !word.is_finite() || word <= 0.0 {
        0
    } else if word >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        word as u32
    }
}

pub fn ftw_to_hz(ftw: u32) -> f64 {
    f64::from(ftw) * DDS_CLOCK_HZ / TWO_POW_32
}

#[inline]
pub fn mhz_to_ftw(mhz: f64) -> u32 {
    hz_to_ftw(mhz * 1.0e6)
}

#[inline]
pub fn ftw_to_mhz(ftw: u32) -> f64 {
    ftw_to_hz(ftw) / 1.0e6
}

/// One FTW step in Hz.
pub fn ftw_resolution_hz() -> f64 {
    DDS_CLOCK_HZ / TWO_POW_32
}

/// Output amplitude (mA) to the 14-bit scale factor relative to `max_ma`.
pub fn ma_to_asf(ma: f64, max_ma: f64) -> u16 {
    if !(max_ma > 0.0) || !ma.is_finite() {
        return 0;
    }
    let asf = (f64::from(ASF_MAX) * ma / max_ma).round();
    asf.clamp(0.0, f64::from(ASF_MAX)) as u16
}

pub fn asf_to_ma(asf: u16, max_ma: f64) -> f64 {
    f64::from(asf.min(ASF_MAX)) * max_ma / f64::from(ASF_MAX)
}

#[inline]
pub fn code_to_volts(code: u16) -> f64 {
    f64::from(code) * (ADC_VREF / ADC_COUNTS)
}

/// Inverse of `code_to_volts`, rounded and clamped to the u16 range.
pub fn volts_to_code(volts: f64) -> u16 {
    let c = (volts / (ADC_VREF / ADC_COUNTS)).round();
    if !c.is_finite() || c <= 0.0 {
        0
    } else {
        c.min(f64::from(u16::MAX)) as u16
    }
}

/// Decode a run of 2-byte big-endian sample codes into volts.
/// A trailing odd byte is ignored.
pub fn decode_samples(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(SAMPLE_LEN)
        .map(|c| code_to_volts(u16::from_be_bytes([c[0], c[1]])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn frame_layout_is_code_then_big_endian_payload() {
        let f = Frame::command(Command::SendNumPts, 0x0102_0304);
        assert_eq!(f.encode(), [b'N', b'P', b'T', b'S', 1, 2, 3, 4]);
        assert_eq!(Frame::decode(&f.encode()), f);
    }

    #[test]
    fn code_tables_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for c in Command::ALL {
            assert!(seen.insert(c.code()), "duplicate code for {}", c.name());
        }
        for a in Ack::ALL {
            assert!(seen.insert(a.code()));
        }
    }

    #[test]
    fn fail_codes_map_both_ways() {
        for code in [
            FailCode::InvalidCommand,
            FailCode::DdsConfigError,
            FailCode::RegulatorsNotReady,
        ] {
            assert_eq!(FailCode::from_payload(code.payload()), code);
        }
        assert_eq!(FailCode::from_payload(99), FailCode::Unknown(99));
    }

    #[test]
    fn sample_codes_scale_to_volts() {
        let v = decode_samples(&[0x01, 0x00, 0x03, 0xFF, 0x7F]);
        assert_eq!(v.len(), 2);
        assert!((v[0] - 256.0 * 3.3 / 1024.0).abs() < 1e-12);
        assert!((v[1] - 1023.0 * 3.3 / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn amplitude_saturates_at_full_scale() {
        assert_eq!(ma_to_asf(25.0, 20.0), ASF_MAX);
        assert_eq!(ma_to_asf(-1.0, 20.0), 0);
        assert_eq!(ma_to_asf(1.0, 0.0), 0);
    }

    proptest! {
        #[test]
        fn ftw_round_trip_within_one_step(mhz in 1.0f64..400.0) {
            let hz = mhz * 1.0e6;
            let back = ftw_to_hz(hz_to_ftw(hz));
            prop_assert!((back - hz).abs() <= ftw_resolution_hz());
        }

        #[test]
        fn asf_round_trip_within_one_step(ma in 0.0f64..20.0) {
            let max = 20.0;
            let back = asf_to_ma(ma_to_asf(ma, max), max);
            prop_assert!((back - ma).abs() <= max / f64::from(ASF_MAX));
        }
    }
}
