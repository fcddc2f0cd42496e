//! Discovery and configuration datagrams through the full service.

use patcom::app::events::AppEvent;
use patcom::app::service::MAX_INBOUND_PER_TICK;
use patcom::error::ParseError;
use patcom::protocol::messages::{CONFIG_PORT, DISCOVERY_PORT};
use patcom::store::{CONFIG_KEY, CONFIG_NAMESPACE};

use crate::mock_hw::{CLIENT, DEVICE_ID, DeviceCall, make_app, run};

#[test]
fn boot_broadcasts_discovery_when_linked() {
    let (mut app, mut dev, mut sink) = make_app(None);
    app.tick(0, &mut dev, &mut sink);

    let broadcasts = dev.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    let (port, msg) = &broadcasts[0];
    assert_eq!(*port, DISCOVERY_PORT);
    assert_eq!(msg["type"], "device_discovery");
    assert_eq!(msg["device_id"], DEVICE_ID);
    assert_eq!(msg["ip"], "192.168.1.77");
    assert_eq!(msg["mac"], "DE:AD:BE:EF:CA:FE");
}

#[test]
fn discovery_repeats_on_interval_and_respects_flags() {
    let (mut app, mut dev, mut sink) = make_app(None);
    run(&mut app, &mut dev, &mut sink, 0, 60_000, 1_000);
    assert_eq!(dev.broadcasts().len(), 3, "t=0, 30 s, 60 s");

    let (mut app, mut dev, mut sink) = make_app(Some(r#"{"device":{"discoverable":false}}"#));
    run(&mut app, &mut dev, &mut sink, 0, 60_000, 1_000);
    assert!(dev.broadcasts().is_empty());

    let (mut app, mut dev, mut sink) = make_app(None);
    dev.link_up = false;
    run(&mut app, &mut dev, &mut sink, 0, 60_000, 1_000);
    assert!(dev.broadcasts().is_empty());
}

#[test]
fn discover_request_gets_unicast_reply() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.deliver(DISCOVERY_PORT, r#"{"type":"discover_devices"}"#);
    app.tick(0, &mut dev, &mut sink);

    let reply = dev
        .calls
        .iter()
        .find_map(|c| match c {
            DeviceCall::SendTo { dest, payload } => Some((*dest, payload.clone())),
            _ => None,
        })
        .expect("reply sent");
    assert_eq!(reply.0, CLIENT);
    let msg: serde_json::Value = serde_json::from_slice(&reply.1).unwrap();
    assert_eq!(msg["type"], "device_response");
    assert_eq!(msg["config_hash"], app.config().config_hash());
}

#[test]
fn get_config_redacts_secrets() {
    let patch = r#"{
        "network":{"ssid":"home","password":"hunter22"},
        "api_keys":[{"name":"hass","value":"s3cret-token"}]
    }"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));
    dev.deliver(CONFIG_PORT, r#"{"type":"get_config"}"#);
    app.tick(0, &mut dev, &mut sink);

    let replies = dev.replies();
    assert_eq!(replies.len(), 1);
    let text = replies[0].to_string();
    assert_eq!(replies[0]["type"], "config_response");
    assert_eq!(replies[0]["network"]["ssid"], "home");
    assert!(!text.contains("hunter22"));
    assert!(!text.contains("s3cret-token"));
    assert!(text.contains("hass"));
}

#[test]
fn invalid_static_ip_is_rejected_atomically() {
    let (mut app, mut dev, mut sink) = make_app(None);
    let before = app.config().clone();

    dev.deliver(
        CONFIG_PORT,
        r#"{"type":"set_config","device":{"name":"Desk"},
            "network":{"staticIP":true,"ip":"999.1.1.1","subnet":"255.255.255.0","gateway":"192.168.1.1"}}"#,
    );
    app.tick(0, &mut dev, &mut sink);

    let replies = dev.replies();
    assert_eq!(replies[0]["type"], "config_update_response");
    assert_eq!(replies[0]["success"], false);
    assert!(!replies[0]["errors"].as_array().unwrap().is_empty());

    assert_eq!(app.config(), &before, "nothing from the patch applied");
    assert!(!app.take_restart_request());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::RestartRequested)), 0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigRejected { .. })), 1);
    assert!(app.store().storage().raw(CONFIG_NAMESPACE, CONFIG_KEY).is_none());
}

#[test]
fn network_change_persists_and_requests_restart() {
    let (mut app, mut dev, mut sink) = make_app(None);

    dev.deliver(
        CONFIG_PORT,
        r#"{"type":"set_config","network":{"ssid":"studio","password":"longenough"}}"#,
    );
    app.tick(0, &mut dev, &mut sink);

    let reply = &dev.replies()[0];
    assert_eq!(reply["success"], true);
    assert_eq!(reply["restart_required"], true);
    assert_eq!(reply["config_hash"], app.config().config_hash());
    assert_eq!(app.config().network.ssid, "studio");
    assert!(app.store().storage().raw(CONFIG_NAMESPACE, CONFIG_KEY).is_some());
    assert!(app.take_restart_request());
    assert!(!app.take_restart_request(), "request is consumed once");
}

#[test]
fn device_only_change_needs_no_restart() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.deliver(CONFIG_PORT, r#"{"type":"set_config","device":{"brightness":40}}"#);
    app.tick(0, &mut dev, &mut sink);

    assert_eq!(dev.replies()[0]["restart_required"], false);
    assert_eq!(app.config().device.brightness, 40);
    assert!(!app.take_restart_request());
}

#[test]
fn test_button_dispatches_after_reply() {
    let patch = r#"{"buttons":[{"id":4,"action":2,"config":{"command":"go"}}]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));
    dev.deliver(CONFIG_PORT, r#"{"type":"test_button","button":4}"#);
    app.tick(0, &mut dev, &mut sink);

    let reply_at = dev
        .calls
        .iter()
        .position(|c| matches!(c, DeviceCall::SendTo { .. }))
        .unwrap();
    let action_at = dev
        .calls
        .iter()
        .position(|c| *c == DeviceCall::Console("SERIAL_CMD:go".into()))
        .unwrap();
    assert!(reply_at < action_at);
    assert_eq!(dev.replies()[0]["success"], true);
}

#[test]
fn test_button_out_of_range_fails() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.deliver(CONFIG_PORT, r#"{"type":"test_button","button":8}"#);
    app.tick(0, &mut dev, &mut sink);

    assert_eq!(dev.replies()[0]["success"], false);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ButtonPressed { .. })), 0);
}

#[test]
fn garbage_and_wrong_port_are_dropped_silently() {
    let (mut app, mut dev, mut sink) = make_app(None);
    dev.deliver(CONFIG_PORT, "not json {");
    dev.deliver(CONFIG_PORT, r#"{"type":"reboot_now"}"#);
    dev.deliver(DISCOVERY_PORT, r#"{"type":"get_config"}"#);
    app.tick(0, &mut dev, &mut sink);

    assert!(dev.replies().is_empty());
    let reasons: Vec<ParseError> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::DatagramDropped { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect();
    assert_eq!(
        reasons,
        vec![ParseError::Malformed, ParseError::UnknownType, ParseError::WrongPort]
    );
}

#[test]
fn burst_beyond_rate_limit_is_refused() {
    let (mut app, mut dev, mut sink) = make_app(None);
    for _ in 0..15 {
        dev.deliver(DISCOVERY_PORT, r#"{"type":"discover_devices"}"#);
    }
    while !dev.inbox.is_empty() {
        app.tick(0, &mut dev, &mut sink);
    }

    assert!(dev.replies().len() <= 11);
    assert!(sink.count(|e| matches!(e, AppEvent::RateLimited { .. })) >= 4);
}

#[test]
fn heartbeat_follows_configured_interval() {
    let (mut app, mut dev, mut sink) = make_app(None);
    run(&mut app, &mut dev, &mut sink, 0, 20_000, 1_000);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::Heartbeat(_))), 4, "5 s default");

    dev.type_line(r#"SET_CONFIG:{"device":{"heartbeat_interval_ms":1000}}"#);
    run(&mut app, &mut dev, &mut sink, 20_500, 25_500, 1_000);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::Heartbeat(_))), 9, "21.5 s through 25.5 s");

    let Some(AppEvent::Heartbeat(last)) = sink
        .events
        .iter()
        .rev()
        .find(|e| matches!(e, AppEvent::Heartbeat(_)))
    else {
        panic!("no heartbeat");
    };
    assert!(last.link_up);
    assert_eq!(last.uptime_ms, 25_500);
    assert_eq!(last.battery_volts, Some(7.4));
}

#[test]
fn datagram_flood_does_not_starve_button_sampling() {
    let patch = r#"{"buttons":[{"id":6,"action":2,"config":{"command":"go"}}]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));
    for _ in 0..200 {
        dev.deliver(CONFIG_PORT, "not json {");
    }

    dev.press(6, true);
    app.tick(0, &mut dev, &mut sink);
    assert_eq!(dev.inbox.len(), 200 - MAX_INBOUND_PER_TICK);

    run(&mut app, &mut dev, &mut sink, 10, 120, 10);
    assert!(!dev.inbox.is_empty(), "flood still queued");
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::ButtonPressed { channel: 6, .. })),
        1
    );
    assert!(dev.calls.contains(&DeviceCall::Console("SERIAL_CMD:go".into())));
}

#[test]
fn own_discovery_broadcast_is_ignored() {
    let (mut app, mut dev, mut sink) = make_app(None);
    app.tick(0, &mut dev, &mut sink);
    let (_, announcement) = dev.broadcasts().remove(0);

    dev.deliver(DISCOVERY_PORT, &announcement.to_string());
    app.tick(10, &mut dev, &mut sink);

    assert!(dev.replies().is_empty());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::DatagramDropped { .. })), 0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::RateLimited { .. })), 0);
}
