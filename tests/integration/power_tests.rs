//! Power modes, supply hysteresis, and sleep requests.

use patcom::app::events::AppEvent;
use patcom::power::{ModeChange, PowerMode, SupplyLevel};

use crate::mock_hw::{DeviceCall, make_app, run};

fn mode_changes(events: &[AppEvent]) -> Vec<ModeChange> {
    events
        .iter()
        .filter_map(|e| match e {
            AppEvent::PowerModeChanged(change) => Some(*change),
            _ => None,
        })
        .collect()
}

#[test]
fn inactivity_drops_to_low_power_and_press_wakes() {
    let (mut app, mut dev, mut sink) = make_app(None);

    run(&mut app, &mut dev, &mut sink, 0, 59_000, 1_000);
    assert_eq!(app.power_mode(), PowerMode::Active);

    app.tick(60_000, &mut dev, &mut sink);
    assert_eq!(app.power_mode(), PowerMode::LowPower);

    dev.press(1, true);
    run(&mut app, &mut dev, &mut sink, 60_010, 60_200, 10);
    assert_eq!(app.power_mode(), PowerMode::Active);

    assert_eq!(
        mode_changes(&sink.events),
        vec![
            ModeChange { from: PowerMode::Active, to: PowerMode::LowPower },
            ModeChange { from: PowerMode::LowPower, to: PowerMode::Active },
        ]
    );
}

#[test]
fn critical_supply_needs_margin_to_recover() {
    let (mut app, mut dev, mut sink) = make_app(None);

    dev.volts = 5.5;
    app.tick(0, &mut dev, &mut sink);
    assert_eq!(app.power_mode(), PowerMode::Critical);

    dev.volts = 6.1;
    app.tick(1_000, &mut dev, &mut sink);
    assert_eq!(app.power_mode(), PowerMode::Critical, "inside hysteresis band");

    dev.volts = 6.3;
    app.tick(2_000, &mut dev, &mut sink);
    assert_eq!(app.power_mode(), PowerMode::Active);
}

#[test]
fn critical_supply_suppresses_discovery_and_sync() {
    let patch = r#"{"device":{"auto_sync":true,"config_server_url":"http://mgmt/sync"}}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));
    dev.volts = 5.0;

    run(&mut app, &mut dev, &mut sink, 0, 120_000, 1_000);

    assert!(dev.broadcasts().is_empty());
    assert!(dev.http_requests().is_empty());
}

#[test]
fn critical_supply_still_dispatches_local_actions() {
    let patch = r#"{"buttons":[{"id":0,"action":2,"config":{"command":"ping"}}]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));
    dev.volts = 5.0;

    dev.press(0, true);
    run(&mut app, &mut dev, &mut sink, 0, 200, 10);

    assert_eq!(app.power_mode(), PowerMode::Critical);
    assert!(dev.calls.contains(&DeviceCall::Console("SERIAL_CMD:ping".into())));
}

#[test]
fn sleep_is_requested_once_per_idle_period() {
    let (mut app, mut dev, mut sink) = make_app(None);

    run(&mut app, &mut dev, &mut sink, 0, 299_000, 1_000);
    assert!(!app.take_sleep_request());

    run(&mut app, &mut dev, &mut sink, 300_000, 400_000, 1_000);
    assert!(app.take_sleep_request());
    assert!(!app.take_sleep_request());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::SleepRequested)), 1);
}

#[test]
fn status_led_is_written_only_on_change() {
    let (mut app, mut dev, mut sink) = make_app(None);
    run(&mut app, &mut dev, &mut sink, 0, 5_000, 10);

    let writes: Vec<bool> = dev
        .calls
        .iter()
        .filter_map(|c| match c {
            DeviceCall::Status(on) => Some(*on),
            _ => None,
        })
        .collect();
    assert!(!writes.is_empty());
    assert!(writes.windows(2).all(|w| w[0] != w[1]));
}

#[test]
fn supply_bands_are_announced_once_on_entry() {
    let (mut app, mut dev, mut sink) = make_app(None);
    app.tick(0, &mut dev, &mut sink);

    dev.volts = 6.4;
    app.tick(1_000, &mut dev, &mut sink);
    app.tick(2_000, &mut dev, &mut sink);
    assert_eq!(app.power_mode(), PowerMode::Active, "low is a warning only");

    dev.volts = 5.5;
    app.tick(3_000, &mut dev, &mut sink);

    let battery: Vec<&str> = dev
        .console_out()
        .into_iter()
        .filter(|l| l.starts_with("BATTERY:"))
        .collect();
    assert_eq!(battery, ["BATTERY:LOW:6.40", "BATTERY:CRITICAL:5.50"]);
    assert_eq!(
        sink.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::SupplyAlert { level, .. } => Some(*level),
                _ => None,
            })
            .collect::<Vec<_>>(),
        vec![SupplyLevel::Low, SupplyLevel::Critical]
    );
}
