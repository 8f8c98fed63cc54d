mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use astrolive_core::acquisition::config::SlewingDetectionConfig;
use astrolive_core::acquisition::gate::{evaluate, GateDecision};
use astrolive_core::acquisition::{Stage, StageSummary, TelemetryWindow};
use astrolive_core::devices::Mount;
use astrolive_core::error::MountError;

use common::FakeMount;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[test]
fn test_window_drops_oldest_sample() {
    let mut window = TelemetryWindow::new(3);
    for value in [100, 1, 2, 3] {
        window.record(Stage::Capture, ms(value));
    }
    assert_eq!(window.len(Stage::Capture), 3);

    let summary = window.stage_summary(Stage::Capture);
    assert_eq!(summary.samples, 3);
    assert_eq!(summary.min, ms(1));
    assert_eq!(summary.avg, ms(2));
    assert_eq!(summary.max, ms(3));
}

#[test]
fn test_stages_are_independent() {
    let mut window = TelemetryWindow::default();
    window.record(Stage::Save, ms(10));
    window.record(Stage::Save, ms(30));

    let summary = window.summary();
    assert_eq!(summary.save.avg, ms(20));
    assert_eq!(summary.capture, StageSummary::default());
    assert_eq!(summary.stage(Stage::Solve).samples, 0);
    for stage in Stage::ALL {
        assert!(window.len(stage) <= 2, "{} over-counted", stage.name());
    }
}

#[test]
fn test_empty_window_reports_zeros() {
    let summary = TelemetryWindow::new(5).summary();
    assert_eq!(summary.solve.max, Duration::ZERO);
    assert_eq!(
        summary.to_string(),
        "min/avg/max capture=0.0/0.0/0.0ms save=0.0/0.0/0.0ms solve=0.0/0.0/0.0ms"
    );
}

fn gate_config(wait: bool) -> SlewingDetectionConfig {
    SlewingDetectionConfig {
        wait_for_completion: wait,
        wait_timeout_s: 0.05,
        check_interval_s: 0.01,
        ..SlewingDetectionConfig::default()
    }
}

#[test]
fn test_gate_disabled_without_mount_or_config() {
    assert_eq!(
        evaluate(None::<&mut FakeMount>, &gate_config(false)),
        GateDecision::Disabled
    );

    let mut mount = FakeMount::always(true);
    let mut config = gate_config(false);
    config.check_before_capture = false;
    assert_eq!(evaluate(Some(&mut mount), &config), GateDecision::Disabled);

    config = gate_config(false);
    config.enabled = false;
    assert_eq!(evaluate(Some(&mut mount), &config), GateDecision::Disabled);
    assert_eq!(mount.queries.load(Ordering::SeqCst), 0);
}

#[test]
fn test_gate_skips_while_slewing() {
    let mut mount = FakeMount::always(true);
    let decision = evaluate(Some(&mut mount), &gate_config(false));
    assert_eq!(decision, GateDecision::Skip);
    assert!(!decision.proceeds());
    assert_eq!(mount.waits.load(Ordering::SeqCst), 0);

    let mut mount = FakeMount::always(false);
    let decision = evaluate(Some(&mut mount), &gate_config(false));
    assert_eq!(decision, GateDecision::NotSlewing);
    assert!(decision.proceeds());
}

#[test]
fn test_gate_waits_for_slew() {
    let mut mount = FakeMount::new(vec![Ok(true)], Ok(true));
    assert_eq!(
        evaluate(Some(&mut mount), &gate_config(true)),
        GateDecision::WaitProceed
    );
    assert_eq!(mount.waits.load(Ordering::SeqCst), 1);

    let mut mount = FakeMount::new(vec![Ok(true)], Ok(false));
    let decision = evaluate(Some(&mut mount), &gate_config(true));
    assert_eq!(decision, GateDecision::WaitTimeoutSkip);
    assert!(!decision.proceeds());

    let mut mount = FakeMount::new(vec![Ok(true)], Err(MountError("link lost".into())));
    let decision = evaluate(Some(&mut mount), &gate_config(true));
    assert_eq!(decision, GateDecision::WaitErrorProceed);
    assert!(decision.proceeds());
}

#[test]
fn test_gate_proceeds_when_query_fails() {
    let mut mount = FakeMount::new(vec![Err(MountError("timeout".into()))], Ok(true));
    let decision = evaluate(Some(&mut mount), &gate_config(false));
    assert_eq!(decision, GateDecision::QueryFailedProceed);
    assert!(decision.proceeds());
}

/// Mount relying on the default polling wait.
struct SettlingMount {
    slewing_polls: usize,
}

impl Mount for SettlingMount {
    fn is_slewing(&mut self) -> Result<bool, MountError> {
        if self.slewing_polls == 0 {
            return Ok(false);
        }
        self.slewing_polls -= 1;
        Ok(true)
    }
}

#[test]
fn test_default_wait_polls_until_settled() {
    let mut mount = SettlingMount { slewing_polls: 3 };
    assert_eq!(
        mount.wait_for_slewing_complete(Duration::from_secs(1), ms(1)),
        Ok(true)
    );
    assert_eq!(mount.slewing_polls, 0);

    let mut stuck = SettlingMount {
        slewing_polls: usize::MAX,
    };
    assert_eq!(
        stuck.wait_for_slewing_complete(ms(20), ms(5)),
        Ok(false)
    );
}
