//! Serial console commands through the full service.

use patcom::app::events::AppEvent;
use patcom::app::service::MAX_INBOUND_PER_TICK;
use serde_json::Value;

use crate::mock_hw::{DEVICE_ID, DeviceCall, make_app};

/// Decoded `RESPONSE:` lines, in order.
fn responses(lines: &[&str]) -> Vec<Value> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("RESPONSE:"))
        .map(|json| serde_json::from_str(json).unwrap())
        .collect()
}

#[test]
fn status_reports_identity_and_link() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.type_line("STATUS");
    app.tick(2_000, &mut dev, &mut sink);

    let out = responses(&dev.console_out());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["type"], "device_info");
    assert_eq!(out[0]["success"], true);
    assert_eq!(out[0]["timestamp"], 2_000);

    let info: Value = serde_json::from_str(out[0]["message"].as_str().unwrap()).unwrap();
    assert_eq!(info["device_id"], DEVICE_ID);
    assert_eq!(info["uptime"], 2_000);
    assert_eq!(info["wifi"]["connected"], true);
    assert_eq!(info["wifi"]["ip"], "192.168.1.77");
    // No supply reading has been taken yet on the first tick.
    assert!(info["battery"].is_null());
}

#[test]
fn every_line_gets_exactly_one_reply() {
    let (mut app, mut dev, mut sink) = make_app(None);
    for line in ["help", "WIFI", "BOGUS", "TEST:9", "SET_CONFIG:{bad", "CONFIG"] {
        dev.type_line(line);
    }
    dev.type_line("   ");
    app.tick(0, &mut dev, &mut sink);

    let out = responses(&dev.console_out());
    let kinds: Vec<(&str, bool)> = out
        .iter()
        .map(|r| (r["type"].as_str().unwrap(), r["success"].as_bool().unwrap()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("help", true),
            ("wifi", true),
            ("error", false),
            ("error", false),
            ("config", false),
            ("config", true),
        ]
    );
    assert_eq!(out[2]["message"], "Unknown command");
    assert_eq!(out[3]["message"], "Invalid argument");
    assert_eq!(out[4]["message"], "Invalid JSON");
    assert_eq!(out[1]["message"], "Connected (192.168.1.77)");
}

#[test]
fn test_command_activates_channel_in_same_tick() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.type_line("TEST:2");
    app.tick(500, &mut dev, &mut sink);

    let lines = dev.console_out();
    assert!(lines[0].starts_with("RESPONSE:"));
    assert!(lines[1].starts_with("EVENT:"));
    assert!(lines[1].contains(r#""button":2"#));
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::ButtonPressed { channel: 2, .. })),
        1
    );
}

#[test]
fn set_config_over_console_applies_patch() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.type_line(r#"SET_CONFIG:{"device":{"name":"Booth A"},"buttons":[{"id":0,"name":"Lights"}]}"#);
    app.tick(0, &mut dev, &mut sink);

    let out = responses(&dev.console_out());
    assert_eq!(out[0]["success"], true);
    assert_eq!(app.config().device.device_name, "Booth A");
    assert_eq!(app.config().channels[0].name, "Lights");
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigApplied { .. })), 1);
}

#[test]
fn reset_wifi_clears_credentials_and_requests_restart() {
    let (mut app, mut dev, mut sink) =
        make_app(Some(r#"{"network":{"ssid":"home","password":"hunter22"}}"#));
    dev.type_line("RESET_WIFI");
    app.tick(0, &mut dev, &mut sink);

    assert!(app.config().network.ssid.is_empty());
    assert!(app.config().network.password.is_empty());
    assert!(app.take_restart_request());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::RestartRequested)), 1);
}

#[test]
fn power_command_takes_a_fresh_reading() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.volts = 7.25;
    dev.type_line("BATTERY");
    app.tick(0, &mut dev, &mut sink);

    let out = responses(&dev.console_out());
    assert_eq!(out[0]["type"], "power");
    assert_eq!(out[0]["message"], "7.25V (active)");
}

#[test]
fn identify_lights_every_channel() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.type_line("IDENTIFY");
    app.tick(0, &mut dev, &mut sink);

    let lit = dev
        .calls
        .iter()
        .filter(|c| matches!(c, DeviceCall::Channel { level: 255, .. }))
        .count();
    assert_eq!(lit, 8);
}

#[test]
fn console_backlog_is_spread_over_ticks() {
    let (mut app, mut dev, mut sink) = make_app(None);
    for _ in 0..MAX_INBOUND_PER_TICK + 4 {
        dev.type_line("HELP");
    }

    app.tick(0, &mut dev, &mut sink);
    assert_eq!(responses(&dev.console_out()).len(), MAX_INBOUND_PER_TICK);

    app.tick(10, &mut dev, &mut sink);
    assert_eq!(responses(&dev.console_out()).len(), MAX_INBOUND_PER_TICK + 4);
    assert!(dev.console_in.is_empty());
}
