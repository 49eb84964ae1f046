//! Subcommand bodies: backend assembly, session lifecycle and report output.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::{Result, WrapErr};
use resotrack_config::Config;
use resotrack_core::transport::format_version;
use resotrack_core::{
    AcquisitionRunner, CycleReport, DetectorEvent, ReaderSession, SessionCfg, TimeSeriesPoint,
};
use serde_json::json;

use crate::error_fmt::{format_error_json, humanize};

#[cfg(feature = "hardware")]
pub type Backend = resotrack_hardware::SerialLink;
#[cfg(not(feature = "hardware"))]
pub type Backend = resotrack_hardware::SimulatedLink;

#[cfg(feature = "hardware")]
fn make_link(cfg: &Config) -> Backend {
    resotrack_hardware::SerialLink::new(cfg.serial.port.clone(), cfg.serial.baud_rate)
}

/// Simulated board. Test-only knobs come from the environment:
/// `RESOTRACK_TEST_SIM_CENTER` (MHz) moves the resonance and
/// `RESOTRACK_TEST_SIM_TIMEOUT=1` makes the board stop answering.
#[cfg(not(feature = "hardware"))]
fn make_link(_cfg: &Config) -> Backend {
    use resotrack_hardware::{Injection, Resonance, SimulatedLink};
    use resotrack_traits::wire::Command;

    let mut resonance = Resonance::default();
    if let Some(center) = std::env::var("RESOTRACK_TEST_SIM_CENTER")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
    {
        resonance.center_mhz = center;
    }
    let link = SimulatedLink::new(resonance);
    if std::env::var("RESOTRACK_TEST_SIM_TIMEOUT").is_ok_and(|v| v == "1") {
        link.handle().inject(Command::GetVersion, Injection::Drop);
    }
    tracing::info!(center_mhz = resonance.center_mhz, "using simulated sensor interface");
    link
}

/// Build and connect a session for `cfg`, sharing `stop` with the signal handler.
pub fn open_session(cfg: &Config, stop: Arc<AtomicBool>) -> Result<ReaderSession<Backend>> {
    let session_cfg = SessionCfg::from(cfg);
    let builder = ReaderSession::builder(make_link(cfg))
        .with_config(session_cfg)
        .with_stop_flag(stop);
    #[cfg(not(feature = "hardware"))]
    let builder = builder.with_actuator(resotrack_hardware::SimulatedActuator::new());
    let mut session = builder.build();
    session.connect()?;
    Ok(session)
}

fn event_name(e: &DetectorEvent) -> &'static str {
    use resotrack_core::FoamAlert;
    match e {
        DetectorEvent::CloseToHarvest => "CloseToHarvest",
        DetectorEvent::ReadyToHarvest => "ReadyToHarvest",
        DetectorEvent::ContaminationConfirmed => "ContaminationConfirmed",
        DetectorEvent::Foam(FoamAlert::FoamReached) => "FoamReached",
        DetectorEvent::Foam(FoamAlert::LiquidOverflow) => "LiquidOverflow",
    }
}

fn point_json(p: &TimeSeriesPoint) -> serde_json::Value {
    json!({
        "time_h": p.time_h,
        "raw_mhz": p.raw_frequency_mhz,
        "raw_db": p.raw_magnitude,
        "fitted_mhz": p.fitted_frequency_mhz,
        "fitted_db": p.fitted_magnitude,
    })
}

fn point_text(p: &TimeSeriesPoint) -> String {
    let fit = if p.has_fit() {
        format!(
            "fit {:.4} MHz ({:.2} dB)",
            p.fitted_frequency_mhz, p.fitted_magnitude
        )
    } else {
        "fit -".to_string()
    };
    format!(
        "t={:.3}h  raw {:.3} MHz ({:.2} dB)  {fit}",
        p.time_h, p.raw_frequency_mhz, p.raw_magnitude
    )
}

fn print_report(r: &CycleReport, json_mode: bool) {
    let events: Vec<&str> = r.events.iter().map(event_name).collect();
    match (&r.result, json_mode) {
        (Ok(p), true) => {
            let mut v = point_json(p);
            v["cycle"] = json!(r.cycle);
            v["growth_ppm"] = json!(r.growth_ppm);
            v["events"] = json!(events);
            println!("{v}");
        }
        (Ok(p), false) => {
            let growth = r
                .growth_ppm
                .map_or_else(|| "-".to_string(), |g| format!("{g:+.1} ppm"));
            let tail = if events.is_empty() {
                String::new()
            } else {
                format!("  [{}]", events.join(", "))
            };
            println!("cycle {}  {}  growth {growth}{tail}", r.cycle, point_text(p));
        }
        (Err(e), true) => {
            let err: serde_json::Value =
                serde_json::from_str(&format_error_json(&eyre::Report::new(e.clone())))
                    .unwrap_or(serde_json::Value::Null);
            println!("{}", json!({ "cycle": r.cycle, "error": err }));
        }
        (Err(e), false) => {
            println!("cycle {}  failed: {e}", r.cycle);
            for line in humanize(&eyre::Report::new(e.clone())).lines() {
                println!("    {line}");
            }
        }
    }
}

/// Cycle until the count is reached or the stop flag is raised.
pub fn run(
    cfg: &Config,
    stop: Arc<AtomicBool>,
    cycles: Option<u64>,
    interval_s: Option<u64>,
    zero_mhz: Option<f64>,
    json_mode: bool,
) -> Result<()> {
    let interval_s = interval_s.unwrap_or(cfg.runner.cycle_interval_s);
    if interval_s > resotrack_config::MAX_CYCLE_INTERVAL_S {
        eyre::bail!(
            "--interval-s must be <= {}",
            resotrack_config::MAX_CYCLE_INTERVAL_S
        );
    }
    let mut session = open_session(cfg, stop)?;
    if zero_mhz.is_some() {
        session.set_zero_point(zero_mhz);
    }
    let interval = Duration::from_secs(interval_s);
    tracing::info!(interval_s = interval.as_secs(), ?cycles, "acquisition started");

    let runner = AcquisitionRunner::spawn(session, interval, cycles);
    let mut completed = 0u64;
    let mut failed = 0u64;
    for report in runner.reports().iter() {
        if report.result.is_ok() {
            completed += 1;
        } else {
            failed += 1;
        }
        print_report(&report, json_mode);
    }
    let mut session = runner
        .join()
        .ok_or_else(|| eyre::eyre!("acquisition thread panicked"))?;
    session.close();
    tracing::info!(completed, failed, "acquisition finished");
    Ok(())
}

pub fn scan(cfg: &Config, stop: Arc<AtomicBool>, json_mode: bool) -> Result<()> {
    let mut session = open_session(cfg, stop)?;
    let result = session.take_scan();
    session.close();
    let point = result?;
    if json_mode {
        println!("{}", point_json(&point));
    } else {
        println!("{}", point_text(&point));
    }
    Ok(())
}

pub fn calibrate(cfg: &Config, stop: Arc<AtomicBool>, json_mode: bool) -> Result<()> {
    let mut session = open_session(cfg, stop)?;
    let ok = session.calibrate();
    let points = session
        .controller()
        .calibration()
        .map_or(0, resotrack_core::CalibrationCurve::len);
    session.close();
    if !ok {
        eyre::bail!("calibration failed; re-run with --log-level=debug for details");
    }
    let file = cfg.calibration.file.as_ref().map(|p| p.display().to_string());
    if json_mode {
        println!("{}", json!({ "calibration_points": points, "file": file }));
    } else {
        match file {
            Some(f) => println!("Calibration recorded: {points} points saved to {f}"),
            None => println!("Calibration recorded: {points} points (no calibration.file set; not saved)"),
        }
    }
    Ok(())
}

pub fn self_check(cfg: &Config, stop: Arc<AtomicBool>, json_mode: bool) -> Result<()> {
    let mut session = open_session(cfg, stop)?;
    let version = session
        .controller_mut()
        .identify()
        .wrap_err("identify after connect")?;
    let calibrated = session.controller().calibration().is_some();
    session.close();
    if json_mode {
        println!(
            "{}",
            json!({ "ok": true, "firmware": format_version(version), "calibrated": calibrated })
        );
    } else {
        println!(
            "OK: sensor interface firmware {} ({})",
            format_version(version),
            if calibrated { "calibrated" } else { "uncalibrated" }
        );
    }
    Ok(())
}
