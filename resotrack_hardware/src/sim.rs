//! Simulated sensor interface board and actuator.
//!
//! `SimulatedLink` speaks the real 8-byte frame protocol: host frames written
//! to it are parsed and answered by pushing ack frames (and sample runs) into
//! an outbox that `read_exact` drains. Nothing ever blocks; a read that cannot
//! be satisfied from the outbox fails with `HwError::Timeout`, which is what a
//! silent device looks like through a real port.
//!
//! State lives behind an `Arc<Mutex<_>>` so tests can keep a `SimHandle`
//! after moving the link into a controller, to move the resonance, inject
//! faults, and inspect the command log.
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use resotrack_traits::wire::{self, Ack, Command, FRAME_LEN, FailCode, Frame};
use resotrack_traits::{Actuator, Link};
use tracing::trace;

use crate::error::HwError;

/// Shape of the simulated resonance: a Gaussian peak on a flat baseline, in volts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resonance {
    pub center_mhz: f64,
    /// Standard deviation of the peak.
    pub width_mhz: f64,
    pub height_v: f64,
    pub baseline_v: f64,
    /// Center shift applied after every completed sweep.
    pub drift_mhz_per_sweep: f64,
}

impl Default for Resonance {
    fn default() -> Self {
        Self {
            center_mhz: 120.0,
            width_mhz: 3.0,
            height_v: 1.5,
            baseline_v: 1.0,
            drift_mhz_per_sweep: 0.0,
        }
    }
}

impl Resonance {
    pub fn volts_at(&self, mhz: f64) -> f64 {
        let w = self.width_mhz.max(1e-9);
        let d = mhz - self.center_mhz;
        self.baseline_v + self.height_v * (-(d * d) / (2.0 * w * w)).exp()
    }
}

/// A one-shot fault armed for the next occurrence of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// Answer with a `fail` ack carrying this code.
    Fail(FailCode),
    /// Swallow the command; the host's read will time out.
    Drop,
    /// Drop the connection as if the cable was pulled.
    Disconnect,
    /// Emit one stray byte ahead of the normal reply, shifting the frame
    /// boundaries the host sees.
    StrayByte,
}

/// Byte emitted by `Injection::StrayByte`.
pub const STRAY_BYTE: u8 = 0xAA;

#[derive(Debug)]
struct SimState {
    open: bool,
    refuse_opens: u32,
    opens: usize,
    awake: bool,
    start_ftw: u32,
    stop_ftw: u32,
    num_pts: u32,
    asf: u16,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    resonance: Resonance,
    spike_points: usize,
    spike_v: f64,
    noise_v: f64,
    rng: u64,
    injections: HashMap<Command, VecDeque<Injection>>,
    received: Vec<(Command, u32)>,
    sweeps: usize,
    chunk_samples: usize,
    version: u32,
}

impl SimState {
    fn new(resonance: Resonance) -> Self {
        Self {
            open: false,
            refuse_opens: 0,
            opens: 0,
            awake: true,
            start_ftw: 0,
            stop_ftw: 0,
            num_pts: 0,
            asf: 0,
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            resonance,
            spike_points: 0,
            spike_v: 0.0,
            noise_v: 0.0,
            rng: 0x9E37_79B9_7F4A_7C15,
            injections: HashMap::new(),
            received: Vec::new(),
            sweeps: 0,
            chunk_samples: 64,
            version: 0x0001_0200,
        }
    }

    fn push_ack(&mut self, ack: Ack, payload: u32) {
        self.outbox.extend(Frame::ack(ack, payload).encode());
    }

    fn fail(&mut self, code: FailCode) {
        self.push_ack(Ack::Fail, code.payload());
    }

    fn next_noise(&mut self) -> f64 {
        if self.noise_v == 0.0 {
            return 0.0;
        }
        // xorshift64*
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let r = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        let unit = (r as f64) / ((1u64 << 53) as f64);
        (unit * 2.0 - 1.0) * self.noise_v
    }

    fn ingest(&mut self, bytes: &[u8]) {
        self.inbox.extend_from_slice(bytes);
        while self.inbox.len() >= FRAME_LEN {
            let mut raw = [0u8; FRAME_LEN];
            raw.copy_from_slice(&self.inbox[..FRAME_LEN]);
            self.inbox.drain(..FRAME_LEN);
            self.handle(Frame::decode(&raw));
            if !self.open {
                break;
            }
        }
    }

    fn handle(&mut self, frame: Frame) {
        let Some(cmd) = Command::from_code(frame.code) else {
            trace!(code = %frame.code_str(), "sim: unknown command");
            self.fail(FailCode::InvalidCommand);
            return;
        };
        self.received.push((cmd, frame.payload));

        if let Some(inj) = self.injections.get_mut(&cmd).and_then(VecDeque::pop_front) {
            trace!(cmd = cmd.name(), ?inj, "sim: injected fault");
            match inj {
                Injection::Fail(code) => return self.fail(code),
                Injection::Drop => return,
                Injection::Disconnect => {
                    self.open = false;
                    self.inbox.clear();
                    self.outbox.clear();
                    return;
                }
                Injection::StrayByte => self.outbox.push_back(STRAY_BYTE),
            }
        }

        match cmd {
            Command::SendStartFtw => {
                self.start_ftw = frame.payload;
                self.push_ack(Ack::Ok, 0);
            }
            Command::SendStopFtw => {
                self.stop_ftw = frame.payload;
                self.push_ack(Ack::Ok, 0);
            }
            Command::SendNumPts => {
                self.num_pts = frame.payload;
                self.push_ack(Ack::Ok, 0);
            }
            Command::SendAsf => {
                if frame.payload > u32::from(wire::ASF_MAX) {
                    self.fail(FailCode::InvalidCommand);
                } else {
                    self.asf = frame.payload as u16;
                    self.push_ack(Ack::Ok, 0);
                }
            }
            Command::GetVersion => self.push_ack(Ack::Ok, self.version),
            Command::Handshake => self.push_ack(Ack::Ok, frame.payload),
            Command::StartTest => self.run_sweep(),
            Command::StopTest => self.push_ack(Ack::Ok, 0),
            Command::SystemSleep => {
                self.awake = false;
                self.push_ack(Ack::Ok, 0);
            }
            Command::SystemWake => {
                self.awake = true;
                self.push_ack(Ack::Ok, 0);
            }
            Command::Reset => {
                self.start_ftw = 0;
                self.stop_ftw = 0;
                self.num_pts = 0;
                self.asf = 0;
                self.awake = true;
                self.push_ack(Ack::Ok, 0);
            }
        }
    }

    fn run_sweep(&mut self) {
        if !self.awake {
            self.fail(FailCode::RegulatorsNotReady);
            return;
        }
        if self.num_pts == 0 || self.start_ftw >= self.stop_ftw {
            self.fail(FailCode::DdsConfigError);
            return;
        }
        let start = wire::ftw_to_mhz(self.start_ftw);
        let stop = wire::ftw_to_mhz(self.stop_ftw);
        let n = self.num_pts as usize;
        let step = (stop - start) / n as f64;
        let mut bytes = Vec::with_capacity(n * wire::SAMPLE_LEN);
        for i in 0..n {
            let f = start + step * i as f64;
            let mut v = self.resonance.volts_at(f) + self.next_noise();
            if i < self.spike_points {
                v += self.spike_v;
            }
            bytes.extend_from_slice(&wire::volts_to_code(v).to_be_bytes());
        }
        let chunk_len = self.chunk_samples.max(1) * wire::SAMPLE_LEN;
        for chunk in bytes.chunks(chunk_len) {
            self.push_ack(Ack::SendData, chunk.len() as u32);
            self.outbox.extend(chunk.iter().copied());
        }
        self.push_ack(Ack::Ok, 0);
        self.sweeps += 1;
        self.resonance.center_mhz += self.resonance.drift_mhz_per_sweep;
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory sensor interface board.
pub struct SimulatedLink {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new(Resonance::default())
    }
}

impl SimulatedLink {
    pub fn new(resonance: Resonance) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(resonance))),
        }
    }

    /// A handle sharing this link's device state.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Link for SimulatedLink {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = lock(&self.state);
        if s.refuse_opens > 0 {
            s.refuse_opens -= 1;
            return Err(HwError::OpenFailed("simulated device refused open".into()).into());
        }
        if !s.open {
            s.open = true;
            s.opens += 1;
            s.inbox.clear();
            s.outbox.clear();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = lock(&self.state);
        s.open = false;
        s.inbox.clear();
        s.outbox.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    fn write_all(
        &mut self,
        bytes: &[u8],
        _timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = lock(&self.state);
        if !s.open {
            return Err(HwError::NotOpen.into());
        }
        s.ingest(bytes);
        Ok(())
    }

    fn read_exact(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = lock(&self.state);
        if !s.open {
            return Err(HwError::NotOpen.into());
        }
        if s.outbox.len() < buf.len() {
            return Err(HwError::Timeout.into());
        }
        for b in buf.iter_mut() {
            *b = s.outbox.pop_front().unwrap_or_default();
        }
        Ok(())
    }
}

/// Test/driver handle onto a `SimulatedLink`'s device state.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn resonance(&self) -> Resonance {
        lock(&self.state).resonance
    }

    pub fn set_resonance(&self, resonance: Resonance) {
        lock(&self.state).resonance = resonance;
    }

    /// Arm a fault for the next occurrence of `cmd`. Multiple arms queue up.
    pub fn inject(&self, cmd: Command, injection: Injection) {
        lock(&self.state)
            .injections
            .entry(cmd)
            .or_default()
            .push_back(injection);
    }

    /// Make the next `n` open attempts fail.
    pub fn refuse_opens(&self, n: u32) {
        lock(&self.state).refuse_opens = n;
    }

    /// Add `volts` to the first `points` samples of every sweep.
    pub fn set_initial_spike(&self, points: usize, volts: f64) {
        let mut s = lock(&self.state);
        s.spike_points = points;
        s.spike_v = volts;
    }

    /// Uniform noise of +/- `volts` from a fixed-seed generator.
    pub fn set_noise(&self, volts: f64, seed: u64) {
        let mut s = lock(&self.state);
        s.noise_v = volts.abs();
        s.rng = seed.max(1);
    }

    pub fn set_chunk_samples(&self, n: usize) {
        lock(&self.state).chunk_samples = n.max(1);
    }

    pub fn set_version(&self, version: u32) {
        lock(&self.state).version = version;
    }

    pub fn received(&self) -> Vec<(Command, u32)> {
        lock(&self.state).received.clone()
    }

    pub fn count(&self, cmd: Command) -> usize {
        lock(&self.state)
            .received
            .iter()
            .filter(|(c, _)| *c == cmd)
            .count()
    }

    pub fn last_payload(&self, cmd: Command) -> Option<u32> {
        lock(&self.state)
            .received
            .iter()
            .rev()
            .find(|(c, _)| *c == cmd)
            .map(|(_, p)| *p)
    }

    pub fn sweeps(&self) -> usize {
        lock(&self.state).sweeps
    }

    pub fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn is_awake(&self) -> bool {
        lock(&self.state).awake
    }

    pub fn set_awake(&self, awake: bool) {
        lock(&self.state).awake = awake;
    }
}

/// Actuator that records every current it is asked to drive.
#[derive(Default)]
pub struct SimulatedActuator {
    sent: Arc<Mutex<Vec<f64>>>,
    fail: bool,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An actuator whose every call fails, for exercising error paths.
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    /// Shared log of currents sent so far (mA).
    pub fn log(&self) -> Arc<Mutex<Vec<f64>>> {
        Arc::clone(&self.sent)
    }
}

impl Actuator for SimulatedActuator {
    fn send_current(&mut self, milliamps: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err(HwError::Disconnected.into());
        }
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(milliamps);
        trace!(milliamps, "sim actuator current");
        Ok(())
    }
}
