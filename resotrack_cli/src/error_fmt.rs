//! Human-readable error descriptions and structured JSON error formatting.

use resotrack_config::CalibrationFileError;
use resotrack_core::SensorError;

fn sensor_text(e: &SensorError) -> String {
    match e {
        SensorError::Connection(msg) => format!(
            "What happened: Could not talk to the sensor interface ({msg}).\nLikely causes: Wrong serial port, cable unplugged, or the port is held by another process.\nHow to fix: Check serial.port in the config (or pass --port) and the USB connection."
        ),
        SensorError::Timeout => "What happened: The sensor interface did not answer in time.\nLikely causes: Board powered off, wrong baud rate, or serial.timeout_ms too low for the sweep length.\nHow to fix: Power-cycle the board, verify serial.baud_rate, and consider raising serial.timeout_ms.".to_string(),
        SensorError::Protocol(msg) => format!(
            "What happened: Unexpected reply from the sensor interface ({msg}).\nLikely causes: Firmware mismatch or line noise.\nHow to fix: Run `resotrack self-check` and compare the firmware version; re-run with --log-level=trace to see frames."
        ),
        SensorError::InvalidCommand(msg) => format!(
            "What happened: The board rejected a command ({msg}).\nLikely causes: Firmware does not support this command.\nHow to fix: Update the interface firmware."
        ),
        SensorError::DdsConfig => "What happened: The frequency synthesizer could not be configured.\nLikely causes: DDS fault after a brown-out.\nHow to fix: The reader already tried a hard reset; power-cycle the board if it keeps happening.".to_string(),
        SensorError::RegulatorsNotReady => "What happened: The board's regulators are not ready.\nLikely causes: The board is asleep or still powering up.\nHow to fix: Wait a few seconds and retry; check the supply.".to_string(),
        SensorError::InvalidConfig(msg) => format!(
            "What happened: Invalid sweep configuration ({msg}).\nLikely causes: Range, step or amplitude outside the device limits.\nHow to fix: Edit [sweep] in the config, then rerun."
        ),
        SensorError::Reconnected(cause) => format!(
            "What happened: The link dropped and was re-established, but the operation did not complete.\nCause: {cause}\nHow to fix: Retry; check the cable if this repeats."
        ),
        SensorError::ReconnectFailed(msg) => format!(
            "What happened: The link dropped and could not be re-established ({msg}).\nLikely causes: Cable unplugged or board reset into a different port.\nHow to fix: Reconnect the sensor and restart the reader."
        ),
        SensorError::SensorNotFound { best_amplitude }
        | SensorError::FocusedSweepFailed { best_amplitude } => format!(
            "What happened: No resonance peak found (best amplitude {best_amplitude:.3}).\nLikely causes: Sensor not attached, sample out of the sweep range, or a stale calibration.\nHow to fix: Check the sensor, widen [sweep], or run `resotrack calibrate` with no sample present."
        ),
        SensorError::SearchBudgetExhausted { restarts } => format!(
            "What happened: Peak search gave up after {restarts} restarts.\nLikely causes: Sensor not attached or resonance outside the sweep range.\nHow to fix: Check the sensor, or raise optimizer.max_restarts / optimizer.budget_s."
        ),
        SensorError::NoCalibration => "What happened: No calibration is loaded.\nLikely causes: calibration.file missing or never recorded.\nHow to fix: Run `resotrack calibrate` with no sample present.".to_string(),
        SensorError::Stopped => "Stopped by request.".to_string(),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<SensorError>() {
        return sensor_text(se);
    }

    if let Some(ce) = err.downcast_ref::<CalibrationFileError>() {
        return format!(
            "What happened: Calibration file unusable ({ce}).\nLikely causes: File edited by hand or written by another tool.\nHow to fix: Delete it and run `resotrack calibrate`. Expected header: 'Frequency (MHz),Signal Strength (V)'."
        );
    }

    let msg = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("parse toml") {
        return format!(
            "What happened: Config file could not be parsed.\nHow to fix: Fix the TOML syntax. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.contains(" must ") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range or inconsistent values in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<SensorError>() {
        Some(SensorError::Connection(_)) => "Connection",
        Some(SensorError::Timeout) => "Timeout",
        Some(SensorError::Protocol(_)) => "Protocol",
        Some(SensorError::InvalidCommand(_)) => "InvalidCommand",
        Some(SensorError::DdsConfig) => "DdsConfig",
        Some(SensorError::RegulatorsNotReady) => "RegulatorsNotReady",
        Some(SensorError::InvalidConfig(_)) => "InvalidConfig",
        Some(SensorError::Reconnected(_)) => "Reconnected",
        Some(SensorError::ReconnectFailed(_)) => "ReconnectFailed",
        Some(SensorError::SensorNotFound { .. }) => "SensorNotFound",
        Some(SensorError::FocusedSweepFailed { .. }) => "FocusedSweepFailed",
        Some(SensorError::SearchBudgetExhausted { .. }) => "SearchBudgetExhausted",
        Some(SensorError::NoCalibration) => "NoCalibration",
        Some(SensorError::Stopped) => "Stopped",
        None => "Error",
    }
}

/// Stable exit codes per error class; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<SensorError>() {
        Some(
            SensorError::Connection(_)
            | SensorError::Reconnected(_)
            | SensorError::ReconnectFailed(_),
        ) => 3,
        Some(SensorError::Timeout) => 4,
        Some(
            SensorError::SensorNotFound { .. }
            | SensorError::FocusedSweepFailed { .. }
            | SensorError::SearchBudgetExhausted { .. },
        ) => 5,
        Some(
            SensorError::Protocol(_)
            | SensorError::InvalidCommand(_)
            | SensorError::DdsConfig
            | SensorError::RegulatorsNotReady,
        ) => 6,
        Some(SensorError::InvalidConfig(_) | SensorError::NoCalibration) => 7,
        Some(SensorError::Stopped) => 130,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = reason_name(err);
    let message = humanize(err);
    let details = match err.downcast_ref::<SensorError>() {
        Some(
            SensorError::SensorNotFound { best_amplitude }
            | SensorError::FocusedSweepFailed { best_amplitude },
        ) => Some(json!({ "best_amplitude": best_amplitude })),
        Some(SensorError::SearchBudgetExhausted { restarts }) => {
            Some(json!({ "restarts": restarts }))
        }
        Some(SensorError::Reconnected(cause)) => Some(json!({ "cause": cause.to_string() })),
        _ => None,
    };
    match details {
        Some(d) => json!({ "reason": reason, "details": d, "message": message }),
        None => json!({ "reason": reason, "message": message }),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_get_stable_codes() {
        let r = eyre::Report::new(SensorError::Timeout);
        assert_eq!(exit_code_for_error(&r), 4);
        assert!(humanize(&r).starts_with("What happened: The sensor interface did not answer"));

        let r = eyre::Report::new(SensorError::SearchBudgetExhausted { restarts: 20 });
        assert_eq!(exit_code_for_error(&r), 5);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&r)).unwrap();
        assert_eq!(v["reason"], "SearchBudgetExhausted");
        assert_eq!(v["details"]["restarts"], 20);
    }

    #[test]
    fn untyped_errors_fall_back() {
        let r = eyre::eyre!("sweep.step_mhz must be > 0");
        assert_eq!(exit_code_for_error(&r), 1);
        assert!(humanize(&r).contains("Configuration is invalid"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&r)).unwrap();
        assert_eq!(v["reason"], "Error");
    }
}
