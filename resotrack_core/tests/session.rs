use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use resotrack_core::{
    CalibrationScanCfg, DetectorEvent, FoamAlert, FoamCfg, FoamZone, ReaderSession, SensorError,
    SessionCfg, SweepConfig,
};
use resotrack_hardware::{Injection, Resonance, SimHandle, SimulatedActuator, SimulatedLink};
use resotrack_traits::wire::Command;
use resotrack_traits::ManualClock;
use rstest::rstest;

fn cfg(calibration_file: Option<PathBuf>) -> SessionCfg {
    let mut cfg = SessionCfg {
        link_timeout: Duration::from_millis(20),
        acquisition: SweepConfig::from_step(110.0, 130.0, 0.1, 10.0),
        calibration_scan: CalibrationScanCfg {
            start_mhz: 110.0,
            stop_mhz: 130.0,
            step_mhz: 0.1,
            spike_band_mhz: 0.1,
        },
        calibration_file,
        ..SessionCfg::default()
    };
    cfg.optimizer.enabled = false;
    cfg
}

fn session(cfg: SessionCfg) -> (ReaderSession<SimulatedLink>, SimHandle, ManualClock) {
    let link = SimulatedLink::new(Resonance::default());
    let sim = link.handle();
    let clock = ManualClock::new();
    let session = ReaderSession::builder(link)
        .with_config(cfg)
        .with_clock(Arc::new(clock.clone()))
        .build();
    (session, sim, clock)
}

fn flat_baseline(sim: &SimHandle) -> Resonance {
    let peak = sim.resonance();
    sim.set_resonance(Resonance {
        height_v: 0.0,
        ..peak
    });
    peak
}

#[rstest]
fn connect_powers_up_and_configures() {
    let (mut s, sim, _) = session(cfg(None));
    s.connect().unwrap();
    assert!(sim.is_open());
    assert!(sim.is_awake());
    assert_eq!(sim.count(Command::GetVersion), 1);
    assert_eq!(sim.last_payload(Command::SendNumPts), Some(200));
    assert!(s.controller().calibration().is_none());
}

#[rstest]
fn scan_locates_the_dip() {
    let (mut s, sim, clock) = session(cfg(None));
    s.connect().unwrap();
    clock.advance_hours(0.5);
    let p = s.take_scan().unwrap();
    assert!((p.raw_frequency_mhz - 120.0).abs() < 1e-6, "{p:?}");
    assert!(p.raw_magnitude < -7.0);
    assert!(p.has_fit());
    assert!((p.fitted_frequency_mhz - 120.0).abs() < 0.2, "{p:?}");
    assert!((p.time_h - 0.5).abs() < 1e-9);
    assert_eq!(s.time_series().len(), 1);
    assert_eq!(s.last_sweep().map(|w| w.len()), Some(200));
    // Device sleeps between cycles.
    assert!(!sim.is_awake());
    assert_eq!(sim.count(Command::SystemSleep), 1);
}

#[rstest]
fn growth_index_tracks_downward_drift() {
    let (mut s, sim, _) = session(cfg(None));
    s.connect().unwrap();
    let first = s.take_scan().unwrap();
    assert_eq!(s.growth_index(&first), Some(0.0));
    sim.set_resonance(Resonance {
        center_mhz: 119.0,
        ..Resonance::default()
    });
    let second = s.take_scan().unwrap();
    let ppm = s.growth_index(&second).unwrap();
    assert!(ppm > 7_000.0 && ppm < 9_500.0, "{ppm}");

    s.set_zero_point(Some(119.0));
    assert!(s.growth_index(&second).unwrap().abs() < 2_000.0);
}

#[rstest]
fn calibration_round_trips_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal").join("reader.csv");

    let (mut s, sim, _) = session(cfg(Some(path.clone())));
    s.connect().unwrap();
    let peak = flat_baseline(&sim);
    assert!(s.calibrate());
    sim.set_resonance(peak);
    assert!(path.exists());
    let rows = resotrack_config::load_calibration_csv(&path).unwrap();
    assert_eq!(rows.len(), 199);

    let p = s.take_scan().unwrap();
    assert!((p.fitted_frequency_mhz - 120.0).abs() < 0.2, "{p:?}");
    let ratio = s.calibration_compare(125.0, 1.0).unwrap();
    assert!((ratio - 1.0).abs() < 0.01, "{ratio}");

    let (mut again, _, _) = session(cfg(Some(path)));
    again.connect().unwrap();
    assert_eq!(again.controller().calibration().map(|c| c.len()), Some(199));
}

#[rstest]
fn missing_or_broken_calibration_runs_uncalibrated() {
    let dir = tempfile::tempdir().unwrap();
    let (mut s, _, _) = session(cfg(Some(dir.path().join("absent.csv"))));
    s.connect().unwrap();
    assert!(s.controller().calibration().is_none());
    assert_eq!(
        s.calibration_compare(120.0, 1.0),
        Err(SensorError::NoCalibration)
    );

    let broken = dir.path().join("broken.csv");
    std::fs::write(&broken, "frequency_mhz,volts\nabc,def\n").unwrap();
    let (mut s, _, _) = session(cfg(Some(broken)));
    s.connect().unwrap();
    assert!(s.controller().calibration().is_none());
    assert!(s.take_scan().is_ok());
}

#[rstest]
fn calibrate_without_a_file_keeps_the_curve_in_memory() {
    let (mut s, _, _) = session(cfg(None));
    s.connect().unwrap();
    assert!(s.calibrate());
    assert!(s.controller().calibration().is_some());
}

#[rstest]
fn sweep_bounds_are_validated() {
    let (mut s, sim, _) = session(cfg(None));
    s.connect().unwrap();
    assert!(s.set_start_frequency(100.0));
    assert_eq!(s.cfg().acquisition.start_mhz, 100.0);
    assert_eq!(s.cfg().acquisition.points, 300);
    assert_eq!(sim.last_payload(Command::SendNumPts), Some(300));

    assert!(!s.set_start_frequency(140.0));
    assert!(!s.set_stop_frequency(-5.0));
    assert_eq!(s.cfg().acquisition.start_mhz, 100.0);
    assert_eq!(s.cfg().acquisition.stop_mhz, 130.0);

    assert!(s.set_stop_frequency(125.0));
    assert_eq!(s.cfg().acquisition.points, 250);
}

#[rstest]
fn dropped_wake_is_recovered_within_the_cycle() {
    let (mut s, sim, _) = session(cfg(None));
    s.connect().unwrap();
    sim.inject(Command::SystemWake, Injection::Drop);
    assert!(s.take_scan().is_ok());
    assert_eq!(sim.opens(), 2);
}

#[rstest]
fn stop_flag_short_circuits_the_cycle() {
    let (mut s, sim, _) = session(cfg(None));
    s.connect().unwrap();
    s.stop_flag().store(true, Ordering::Relaxed);
    assert_eq!(s.take_scan(), Err(SensorError::Stopped));
    assert_eq!(sim.sweeps(), 0);
}

#[rstest]
fn optimizer_drives_acquisition_when_enabled() {
    let mut c = cfg(None);
    c.optimizer.enabled = true;
    c.acquisition = SweepConfig::from_step(70.0, 170.0, 0.01, 10.0);
    let (mut s, sim, _) = session(c);
    s.connect().unwrap();
    let p = s.take_scan().unwrap();
    assert!((p.fitted_frequency_mhz - 120.0).abs() < 0.3, "{p:?}");
    assert_eq!(sim.sweeps(), 17);
    assert_eq!(s.last_sweep().map(|w| w.len()), Some(200));
}

#[rstest]
fn foam_alert_is_raised_once_and_drives_the_actuator() {
    let mut c = cfg(None);
    c.foam = FoamCfg {
        enabled: true,
        ..FoamCfg::default()
    };
    let link = SimulatedLink::new(Resonance::default());
    let sim = link.handle();
    let actuator = SimulatedActuator::new();
    let log = actuator.log();
    let mut s = ReaderSession::builder(link)
        .with_config(c)
        .with_clock(Arc::new(ManualClock::new()))
        .with_actuator(actuator)
        .build();
    s.connect().unwrap();

    s.take_scan().unwrap();
    assert!(s.drain_events().is_empty());

    sim.set_resonance(Resonance {
        center_mhz: 113.0,
        ..Resonance::default()
    });
    s.take_scan().unwrap();
    assert_eq!(
        s.drain_events(),
        vec![DetectorEvent::Foam(FoamAlert::FoamReached)]
    );
    assert_eq!(s.foam_zone(), FoamZone::FoamReached);
    s.take_scan().unwrap();
    assert!(s.drain_events().is_empty());
    assert_eq!(*log.lock().unwrap(), vec![4.0, 20.0]);

    s.acknowledge_foam_alert();
    s.take_scan().unwrap();
    assert_eq!(
        s.drain_events(),
        vec![DetectorEvent::Foam(FoamAlert::FoamReached)]
    );
}

#[rstest]
fn reset_clears_the_run_and_close_releases_the_link() {
    let (mut s, sim, _) = session(cfg(None));
    s.connect().unwrap();
    s.take_scan().unwrap();
    s.reset();
    assert!(s.time_series().is_empty());
    assert!(s.last_sweep().is_none());
    assert!(s.close());
    assert!(!sim.is_open());
    assert!(!s.controller().is_connected());
}
