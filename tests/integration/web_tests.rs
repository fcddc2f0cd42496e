//! Local web interface routes through the full service.

use patcom::app::events::AppEvent;
use patcom::protocol::web::{WebReply, WebRequest};
use serde_json::Value;

use crate::mock_hw::{DEVICE_ID, DeviceCall, make_app};

fn body(reply: &WebReply) -> Value {
    serde_json::from_str(&reply.body).unwrap()
}

#[test]
fn index_page_shows_identity_and_link() {
    let (mut app, mut dev, mut sink) = make_app(Some(r#"{"device":{"name":"Desk"}}"#));
    let reply = app.handle_web(&WebRequest::get("/"), 1_000, &mut dev, &mut sink);

    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type, WebReply::HTML);
    assert!(reply.body.contains("<h1>Desk</h1>"));
    assert!(reply.body.contains(DEVICE_ID));
    assert!(reply.body.contains("Connected (192.168.1.77)"));
}

#[test]
fn config_view_is_redacted() {
    let patch = r#"{
        "network":{"ssid":"home","password":"hunter22"},
        "api_keys":[{"name":"hass","value":"s3cret-token"}]
    }"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));
    let reply = app.handle_web(&WebRequest::get("/api/config"), 0, &mut dev, &mut sink);

    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type, WebReply::JSON);
    let view = body(&reply);
    assert_eq!(view["device_id"], DEVICE_ID);
    assert_eq!(view["network"]["ssid"], "home");
    assert!(!reply.body.contains("hunter22"));
    assert!(!reply.body.contains("s3cret-token"));
    assert!(reply.body.contains("hass"));
}

#[test]
fn config_upload_applies_and_reports_hash() {
    let (mut app, mut dev, mut sink) = make_app(None);
    let upload = WebRequest::post("/api/config", r#"{"device":{"name":"Studio","brightness":40}}"#);
    let reply = app.handle_web(&upload, 0, &mut dev, &mut sink);

    assert_eq!(reply.status, 200);
    let result = body(&reply);
    assert_eq!(result["success"], true);
    assert_eq!(result["message"], "Configuration updated");
    assert_eq!(result["config_hash"], app.config().config_hash());
    assert_eq!(app.config().device.device_name, "Studio");
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigApplied { .. })), 1);
}

#[test]
fn config_upload_rejections_are_400() {
    let (mut app, mut dev, mut sink) = make_app(None);
    let before = app.config().clone();

    let garbage = app.handle_web(&WebRequest::post("/api/config", "{nope"), 0, &mut dev, &mut sink);
    assert_eq!(garbage.status, 400);
    assert_eq!(body(&garbage), serde_json::json!({"status":"error","message":"Invalid JSON"}));

    let bad_ip = WebRequest::post(
        "/api/config",
        r#"{"network":{"staticIP":true,"ip":"999.1.1.1","gateway":"10.0.0.1"}}"#,
    );
    let rejected = app.handle_web(&bad_ip, 0, &mut dev, &mut sink);
    assert_eq!(rejected.status, 400);
    assert_eq!(body(&rejected)["success"], false);
    assert_eq!(app.config(), &before);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigRejected { .. })), 1);
}

#[test]
fn test_route_queues_button_for_next_tick() {
    let patch = r#"{"buttons":[{"id":4,"action":2,"config":{"command":"go"}}]}"#;
    let (mut app, mut dev, mut sink) = make_app(Some(patch));

    let reply = app.handle_web(&WebRequest::post("/api/test", "button=4"), 0, &mut dev, &mut sink);
    assert_eq!(reply.status, 200);
    assert_eq!(body(&reply)["message"], "Button 4 triggered");
    assert!(!dev.calls.contains(&DeviceCall::Console("SERIAL_CMD:go".into())));

    app.tick(10, &mut dev, &mut sink);
    assert!(dev.calls.contains(&DeviceCall::Console("SERIAL_CMD:go".into())));
}

#[test]
fn test_route_checks_button_parameter() {
    let (mut app, mut dev, mut sink) = make_app(None);

    let missing = app.handle_web(&WebRequest::post("/api/test", ""), 0, &mut dev, &mut sink);
    assert_eq!(missing.status, 400);
    assert_eq!(body(&missing)["message"], "Missing button parameter");

    for bad in ["/api/test?button=8", "/api/test?button=-1", "/api/test?button=x"] {
        let reply = app.handle_web(&WebRequest::post(bad, ""), 0, &mut dev, &mut sink);
        assert_eq!(reply.status, 400, "{bad}");
        assert_eq!(body(&reply)["message"], "Invalid button index");
    }
}

#[test]
fn unknown_routes_and_oversized_bodies() {
    let (mut app, mut dev, mut sink) = make_app(None);

    let missing = app.handle_web(&WebRequest::get("/admin"), 0, &mut dev, &mut sink);
    assert_eq!(missing.status, 404);
    let wrong_method = app.handle_web(&WebRequest::get("/api/test?button=1"), 0, &mut dev, &mut sink);
    assert_eq!(wrong_method.status, 404);

    let huge = WebRequest::post("/api/config", vec![b' '; 8_192]);
    assert_eq!(app.handle_web(&huge, 0, &mut dev, &mut sink).status, 413);
}
