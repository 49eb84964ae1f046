use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use resotrack_core::{
    AdaptiveSweepOptimizer, DeviceLimits, OptimizerCfg, SearchRange, SensorError, Sweep,
    SweepConfig, SweepController, Sweeper,
};
use resotrack_hardware::{Resonance, SimulatedLink};
use resotrack_traits::{Clock, ManualClock};
use rstest::rstest;

/// Calibrated sweeps of a fixed Gaussian peak over a baseline of 1.
struct FakeSweeper {
    center: f64,
    height: f64,
    std: f64,
    calls: usize,
    configs: Vec<SweepConfig>,
    clock: Option<ManualClock>,
}

impl FakeSweeper {
    fn new(center: f64, height: f64) -> Self {
        Self {
            center,
            height,
            std: 3.0,
            calls: 0,
            configs: Vec::new(),
            clock: None,
        }
    }
}

impl Sweeper for FakeSweeper {
    fn calibrated_sweep(&mut self, cfg: &SweepConfig) -> Result<Sweep, SensorError> {
        self.calls += 1;
        self.configs.push(*cfg);
        if let Some(c) = &self.clock {
            c.advance(Duration::from_secs(1));
        }
        let freqs = cfg.frequencies(cfg.points as usize);
        let values = freqs
            .iter()
            .map(|f| {
                let d = f - self.center;
                1.0 + self.height * (-(d * d) / (2.0 * self.std * self.std)).exp()
            })
            .collect();
        Ok(Sweep::new(freqs, values))
    }
}

fn range() -> SearchRange {
    SearchRange {
        start_mhz: 70.0,
        stop_mhz: 170.0,
        amplitude_ma: 10.0,
    }
}

#[rstest]
fn wide_phase_accepts_on_the_eleventh_call() {
    let mut opt = AdaptiveSweepOptimizer::new(OptimizerCfg::default(), range());
    let mut fake = FakeSweeper::new(120.0, 1.5);
    let stop = AtomicBool::new(false);
    let peak = opt.wide_phase(&mut fake, &stop).unwrap();
    assert_eq!(fake.calls, 11);
    assert!((peak.frequency_mhz - 120.0).abs() < 0.5, "{peak:?}");
    assert!(peak.amplitude >= 1.2);
    assert!(fake.configs.iter().all(|c| c.points == 50));
}

#[rstest]
fn wide_phase_gives_up_with_the_best_amplitude() {
    let cfg = OptimizerCfg {
        wide_max_attempts: 15,
        ..OptimizerCfg::default()
    };
    let mut opt = AdaptiveSweepOptimizer::new(cfg, range());
    // Peak too small to clear the default threshold of 1.2.
    let mut fake = FakeSweeper::new(120.0, 0.1);
    let stop = AtomicBool::new(false);
    match opt.wide_phase(&mut fake, &stop) {
        Err(SensorError::SensorNotFound { best_amplitude }) => {
            assert!(best_amplitude > 1.0 && best_amplitude < 1.2, "{best_amplitude}");
        }
        other => panic!("expected SensorNotFound, got {other:?}"),
    }
    assert_eq!(fake.calls, 15);
}

#[rstest]
fn focused_phase_recenters_and_keeps_the_best() {
    let mut opt = AdaptiveSweepOptimizer::new(OptimizerCfg::default(), range());
    let mut fake = FakeSweeper::new(123.0, 1.5);
    let stop = AtomicBool::new(false);
    let start = resotrack_core::PeakEstimate {
        frequency_mhz: 116.0,
        amplitude: 2.0,
        std_mhz: 3.0,
    };
    let found = opt.focused_phase(&mut fake, start, &stop).unwrap();
    assert_eq!(fake.calls, 6);
    assert!((found.peak.frequency_mhz - 123.0).abs() < 0.5, "{:?}", found.peak);
    assert_eq!(found.window.points, 200);
    assert!(fake.configs[0].start_mhz == 106.0 && fake.configs[0].stop_mhz == 126.0);
    assert!((fake.configs[5].start_mhz - 113.0).abs() < 0.5);
    assert_eq!(opt.previous_peak(), Some(found.peak.amplitude));
    assert!(opt.min_peak_threshold() > 1.2);
}

#[rstest]
fn focused_phase_fails_below_threshold() {
    let mut opt = AdaptiveSweepOptimizer::new(OptimizerCfg::default(), range());
    let mut fake = FakeSweeper::new(120.0, 0.05);
    let stop = AtomicBool::new(false);
    let start = resotrack_core::PeakEstimate {
        frequency_mhz: 120.0,
        amplitude: 2.0,
        std_mhz: 3.0,
    };
    assert!(matches!(
        opt.focused_phase(&mut fake, start, &stop),
        Err(SensorError::FocusedSweepFailed { .. })
    ));
    assert_eq!(fake.calls, 1);
    assert_eq!(opt.previous_peak(), None);
}

#[rstest]
fn search_is_bounded_by_restarts() {
    let cfg = OptimizerCfg {
        wide_max_attempts: 12,
        max_restarts: 3,
        ..OptimizerCfg::default()
    };
    let mut opt = AdaptiveSweepOptimizer::new(cfg, range());
    let mut fake = FakeSweeper::new(120.0, 0.05);
    let stop = AtomicBool::new(false);
    let clock = ManualClock::new();
    assert_eq!(
        opt.locate(&mut fake, &stop, &clock),
        Err(SensorError::SearchBudgetExhausted { restarts: 3 })
    );
    assert_eq!(fake.calls, 36);
}

#[rstest]
fn search_is_bounded_by_time() {
    let cfg = OptimizerCfg {
        wide_max_attempts: 12,
        max_restarts: 0,
        budget: Duration::from_secs(60),
        ..OptimizerCfg::default()
    };
    let mut opt = AdaptiveSweepOptimizer::new(cfg, range());
    let clock = ManualClock::new();
    let mut fake = FakeSweeper::new(120.0, 0.05);
    fake.clock = Some(clock.clone());
    let stop = AtomicBool::new(false);
    let started = clock.now();
    assert!(matches!(
        opt.locate(&mut fake, &stop, &clock),
        Err(SensorError::SearchBudgetExhausted { restarts: 5 })
    ));
    assert!(clock.ms_since(started) >= 60_000);
}

#[rstest]
fn stop_flag_interrupts_the_search() {
    let mut opt = AdaptiveSweepOptimizer::new(OptimizerCfg::default(), range());
    let mut fake = FakeSweeper::new(120.0, 1.5);
    let stop = AtomicBool::new(true);
    assert_eq!(
        opt.locate(&mut fake, &stop, &ManualClock::new()),
        Err(SensorError::Stopped)
    );
    assert_eq!(fake.calls, 0);
}

#[rstest]
fn locates_the_simulated_resonance_through_the_controller() {
    let link = SimulatedLink::new(Resonance {
        center_mhz: 131.7,
        ..Resonance::default()
    });
    let clock = ManualClock::new();
    let mut ctl = SweepController::new(
        link,
        Duration::from_millis(20),
        DeviceLimits::default(),
        Arc::new(clock.clone()),
    );
    ctl.connect().unwrap();
    let mut opt = AdaptiveSweepOptimizer::new(OptimizerCfg::default(), range());
    let found = opt
        .locate(&mut ctl, &AtomicBool::new(false), &clock)
        .unwrap();
    assert!((found.peak.frequency_mhz - 131.7).abs() < 0.5, "{:?}", found.peak);
    assert_eq!(found.sweep.len(), 200);
}
