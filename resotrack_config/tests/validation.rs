use resotrack_config::{FitMethod, load_toml};
use rstest::rstest;

#[rstest]
fn empty_config_uses_instrument_defaults() {
    let cfg = load_toml("").expect("parse empty TOML");
    cfg.validate().expect("defaults must validate");
    assert_eq!(cfg.sweep.start_mhz, 70.0);
    assert_eq!(cfg.sweep.stop_mhz, 170.0);
    assert_eq!(cfg.optimizer.wide_points, 50);
    assert_eq!(cfg.optimizer.focused_points, 200);
    assert_eq!(cfg.optimizer.wide_min_attempts, 10);
    assert_eq!(cfg.optimizer.wide_max_attempts, 1000);
    assert_eq!(cfg.harvest.smoothing_window, 51);
    assert_eq!(cfg.harvest.tail_exclude, 25);
    assert_eq!(cfg.harvest.pattern_len, 8);
    assert_eq!(cfg.contamination.window, 100);
    assert_eq!(cfg.contamination.streak, 5);
    assert_eq!(cfg.serial.timeout_ms, 10_000);
    assert_eq!(cfg.fitter.method, FitMethod::Quadratic);
    assert_eq!(cfg.runner.cycle_interval_s, 60);
}

#[rstest]
fn partial_sections_keep_other_defaults() {
    let toml = r#"
[serial]
port = "/dev/ttyACM1"

[fitter]
method = "spline"

[foam]
enabled = true
air_frequency_mhz = 150.0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.serial.port, "/dev/ttyACM1");
    assert_eq!(cfg.serial.baud_rate, 115_200);
    assert_eq!(cfg.fitter.method, FitMethod::Spline);
    assert_eq!(cfg.foam.air_frequency_mhz, Some(150.0));
}

#[rstest]
#[case("[sweep]\nstart_mhz = 170.0\nstop_mhz = 70.0", "sweep.start_mhz must be < sweep.stop_mhz")]
#[case("[sweep]\nstep_mhz = 0.0", "sweep.step_mhz must be > 0")]
#[case("[sweep]\nstep_mhz = 0.0001", "more than 65535 points")]
#[case("[sweep]\namplitude_ma = 30.0", "sweep.amplitude_ma must be in")]
#[case("[serial]\ntimeout_ms = 0", "serial.timeout_ms must be >= 1")]
#[case("[optimizer]\nsmoothing_window = 100", "smoothing_window must be odd")]
#[case("[optimizer]\nwide_min_attempts = 1000", "wide_min_attempts must be <")]
#[case("[harvest]\nsmoothing_window = 50", "harvest.smoothing_window must be odd")]
#[case("[contamination]\nslope_ratio = 1.0", "contamination.slope_ratio must be > 1")]
#[case("[foam]\nthreshold_percent = 95.0", "foam.threshold_percent must be in")]
#[case("[calibration]\nspike_band_mhz = 500.0", "spike_band_mhz must be narrower")]
#[case("[runner]\ncycle_interval_s = 300", "runner.cycle_interval_s must be <= 72")]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "message {msg:?} missing {needle:?}");
}

#[rstest]
fn unknown_fit_method_is_a_parse_error() {
    assert!(load_toml("[fitter]\nmethod = \"cubic\"").is_err());
}

#[rstest]
fn shipped_sample_config_validates() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/resotrack.toml");
    let text = std::fs::read_to_string(path).expect("read sample config");
    let cfg = load_toml(&text).expect("parse sample config");
    cfg.validate().expect("sample config must validate");
    assert!(cfg.optimizer.enabled);
    assert_eq!(cfg.runner.cycle_interval_s, 60);
}
