//! Button press → debounce → dispatch → LED/HTTP, end to end.

use patcom::app::events::AppEvent;
use patcom::dispatch::{DispatchFailure, Outcome, SkipReason};
use patcom::error::TransportError;

use crate::mock_hw::{DeviceCall, make_app, run};

const HTTP_ON_3: &str = r#"{"buttons":[{"id":3,"action":1,"config":{"url":"http://x/y","method":"POST"}}]}"#;

fn dispatched(events: &[AppEvent]) -> Vec<(u8, Outcome)> {
    events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Dispatched { channel, outcome } => Some((*channel, *outcome)),
            _ => None,
        })
        .collect()
}

#[test]
fn long_press_fires_one_http_post_after_led_toggle() {
    let (mut app, mut dev, mut sink) = make_app(Some(HTTP_ON_3));

    dev.press(3, true);
    run(&mut app, &mut dev, &mut sink, 0, 590, 10);
    dev.press(3, false);
    run(&mut app, &mut dev, &mut sink, 600, 1_000, 10);

    assert_eq!(dev.http_requests(), vec![("POST", "http://x/y".to_string())]);
    assert_eq!(dispatched(&sink.events), vec![(3, Outcome::Success)]);

    let pressed: Vec<_> = sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::ButtonPressed { channel: 3, .. }))
        .collect();
    assert_eq!(pressed.len(), 1, "exactly one activation for one press");

    let led_on = dev
        .calls
        .iter()
        .position(|c| *c == DeviceCall::Channel { index: 3, level: 255 })
        .expect("channel LED lit");
    let http = dev.first_http_at().expect("request sent");
    assert!(led_on < http, "LED must be written before the request starts");
}

#[test]
fn activation_lands_when_hold_time_is_reached() {
    let (mut app, mut dev, mut sink) = make_app(Some(HTTP_ON_3));

    dev.press(3, true);
    run(&mut app, &mut dev, &mut sink, 0, 90, 10);
    assert!(dev.http_requests().is_empty(), "no activation before 100 ms");

    app.tick(100, &mut dev, &mut sink);
    assert_eq!(dev.http_requests().len(), 1);

    let event = dev
        .console_out()
        .into_iter()
        .find(|l| l.starts_with("EVENT:"))
        .expect("press event line")
        .to_string();
    let body: serde_json::Value = serde_json::from_str(&event["EVENT:".len()..]).unwrap();
    assert_eq!(body["type"], "button_press");
    assert_eq!(body["button"], 3);
    assert_eq!(body["name"], "Button 3");
    assert_eq!(body["timestamp"], 100);
}

#[test]
fn short_tap_is_ignored() {
    let (mut app, mut dev, mut sink) = make_app(Some(HTTP_ON_3));

    dev.press(3, true);
    run(&mut app, &mut dev, &mut sink, 0, 50, 10);
    dev.press(3, false);
    run(&mut app, &mut dev, &mut sink, 60, 500, 10);

    assert!(dev.http_requests().is_empty());
    assert!(dispatched(&sink.events).is_empty());
}

#[test]
fn link_down_skips_network_action_but_still_toggles_led() {
    let (mut app, mut dev, mut sink) = make_app(Some(HTTP_ON_3));
    dev.link_up = false;

    dev.press(3, true);
    run(&mut app, &mut dev, &mut sink, 0, 200, 10);

    assert!(dev.http_requests().is_empty());
    assert_eq!(
        dispatched(&sink.events),
        vec![(3, Outcome::Skipped(SkipReason::LinkDown))]
    );
    assert!(dev.calls.contains(&DeviceCall::Channel { index: 3, level: 255 }));
}

#[test]
fn server_error_flashes_then_settles_off() {
    let (mut app, mut dev, mut sink) = make_app(Some(HTTP_ON_3));
    dev.http_reply = Ok(500);

    dev.press(3, true);
    run(&mut app, &mut dev, &mut sink, 0, 100, 10);
    dev.press(3, false);
    run(&mut app, &mut dev, &mut sink, 110, 1_000, 10);

    assert_eq!(
        dispatched(&sink.events),
        vec![(3, Outcome::Failed(DispatchFailure::Status(500)))]
    );
    let ch3: Vec<u8> = dev
        .calls
        .iter()
        .filter_map(|c| match c {
            DeviceCall::Channel { index: 3, level } => Some(*level),
            _ => None,
        })
        .collect();
    // Initial off, toggle on, then three flash pulses ending off.
    assert_eq!(ch3, vec![0, 255, 0, 255, 0, 255, 0]);
}

#[test]
fn transport_failure_is_reported_without_retry() {
    let (mut app, mut dev, mut sink) = make_app(Some(HTTP_ON_3));
    dev.http_reply = Err(TransportError::Timeout);

    dev.press(3, true);
    run(&mut app, &mut dev, &mut sink, 0, 300, 10);

    assert_eq!(dev.http_requests().len(), 1);
    assert_eq!(
        dispatched(&sink.events),
        vec![(3, Outcome::Failed(DispatchFailure::Transport(TransportError::Timeout)))]
    );
}

#[test]
fn disabled_channel_is_skipped() {
    let patch = r#"{"buttons":[{"id":3,"action":1,"enabled":false,"config":{"url":"http://x/y"}}]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));

    dev.press(3, true);
    run(&mut app, &mut dev, &mut sink, 0, 200, 10);

    assert!(dev.http_requests().is_empty());
    assert_eq!(
        dispatched(&sink.events),
        vec![(3, Outcome::Skipped(SkipReason::Disabled))]
    );
}

#[test]
fn invalid_action_behaves_as_disabled() {
    let patch = r#"{"buttons":[{"id":1,"action":1,"config":{"url":"ftp://nope"}}]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));

    dev.press(1, true);
    run(&mut app, &mut dev, &mut sink, 0, 200, 10);

    assert_eq!(
        dispatched(&sink.events),
        vec![(1, Outcome::Skipped(SkipReason::InvalidConfig))]
    );
}

#[test]
fn serial_action_writes_console_line() {
    let patch = r#"{"buttons":[{"id":0,"action":2,"config":{"command":"LIGHTS ON"}}]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));

    dev.press(0, true);
    run(&mut app, &mut dev, &mut sink, 0, 200, 10);

    assert!(dev.console_out().contains(&"SERIAL_CMD:LIGHTS ON"));
    assert_eq!(dispatched(&sink.events), vec![(0, Outcome::Success)]);
}

#[test]
fn simultaneous_presses_dispatch_in_channel_order() {
    let patch = r#"{"buttons":[
        {"id":2,"action":2,"config":{"command":"two"}},
        {"id":5,"action":2,"config":{"command":"five"}}
    ]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));

    dev.press(5, true);
    dev.press(2, true);
    run(&mut app, &mut dev, &mut sink, 0, 200, 10);

    let order: Vec<u8> = dispatched(&sink.events).iter().map(|(ch, _)| *ch).collect();
    assert_eq!(order, vec![2, 5]);
}

#[test]
fn held_button_reports_stuck_fault_once() {
    let (mut app, mut dev, mut sink) = make_app(None);

    dev.press(6, true);
    run(&mut app, &mut dev, &mut sink, 0, 5_000, 10);

    let faults = sink.count(|e| matches!(e, AppEvent::Fault(_)));
    assert_eq!(faults, 1);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::ButtonPressed { channel: 6, .. })),
        1,
        "the press itself still counted once"
    );
}
