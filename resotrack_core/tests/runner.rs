use std::sync::Arc;
use std::time::Duration;

use resotrack_core::{AcquisitionRunner, ReaderSession, SessionCfg, SensorError, SweepConfig};
use resotrack_hardware::{Injection, Resonance, SimHandle, SimulatedLink};
use resotrack_traits::wire::Command;
use resotrack_traits::{Clock, ManualClock};

fn connected() -> (ReaderSession<SimulatedLink>, SimHandle, ManualClock) {
    let mut cfg = SessionCfg {
        link_timeout: Duration::from_millis(20),
        acquisition: SweepConfig::from_step(110.0, 130.0, 0.1, 10.0),
        ..SessionCfg::default()
    };
    cfg.optimizer.enabled = false;
    let link = SimulatedLink::new(Resonance::default());
    let sim = link.handle();
    let clock = ManualClock::new();
    let mut session = ReaderSession::builder(link)
        .with_config(cfg)
        .with_clock(Arc::new(clock.clone()))
        .build();
    session.connect().unwrap();
    (session, sim, clock)
}

#[test]
fn runs_the_requested_number_of_cycles() {
    let (session, sim, clock) = connected();
    let start = clock.now();
    let runner = AcquisitionRunner::spawn(session, Duration::from_secs(60), Some(3));
    let reports: Vec<_> = runner.reports().iter().take(3).collect();
    let session = runner.join().expect("session returned");

    assert_eq!(
        reports.iter().map(|r| r.cycle).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(reports.iter().all(|r| r.result.is_ok()));
    assert_eq!(reports[0].growth_ppm, Some(0.0));
    assert_eq!(session.time_series().len(), 3);
    assert_eq!(sim.sweeps(), 3);
    // Two waits between three cycles.
    assert!(clock.ms_since(start) >= 120_000);
    let hours: Vec<f64> = session.time_series().iter().map(|p| p.time_h).collect();
    assert!(hours.windows(2).all(|w| w[1] > w[0]), "{hours:?}");
}

#[test]
fn failed_cycles_are_reported_and_the_loop_continues() {
    let (session, sim, _) = connected();
    sim.inject(Command::StartTest, Injection::Fail(resotrack_traits::wire::FailCode::DdsConfigError));
    let runner = AcquisitionRunner::spawn(session, Duration::from_secs(1), Some(2));
    let reports: Vec<_> = runner.reports().iter().take(2).collect();
    drop(runner);
    assert_eq!(reports[0].result, Err(SensorError::DdsConfig));
    assert_eq!(reports[0].growth_ppm, None);
    assert!(reports[1].result.is_ok());
}

#[test]
fn finish_stops_an_unbounded_run() {
    let (session, _, _) = connected();
    let runner = AcquisitionRunner::spawn(session, Duration::from_secs(5), None);
    let first = runner
        .reports()
        .recv_timeout(Duration::from_secs(5))
        .expect("first cycle");
    assert_eq!(first.cycle, 1);
    let session = runner.finish().expect("session returned");
    assert!(!session.time_series().is_empty());
    assert!(session.stop_flag().load(std::sync::atomic::Ordering::Relaxed));
}

#[test]
fn stalled_for_measures_from_the_last_good_cycle() {
    let (session, _, _) = connected();
    let runner = AcquisitionRunner::spawn(session, Duration::from_secs(1), Some(1));
    let _ = runner.reports().recv_timeout(Duration::from_secs(5));
    assert!(runner.stalled_for(u64::MAX) > 0);
    assert_eq!(runner.stalled_for(0), 0);
    let _ = runner.join();
}
