//! Configuration sync with the management server.

use patcom::app::events::AppEvent;
use patcom::error::TransportError;
use patcom::protocol::sync::SyncOutcome;

use crate::mock_hw::{make_app, run};

const AUTO_SYNC: &str = r#"{"device":{"auto_sync":true,"config_server_url":"http://mgmt/sync"}}"#;

fn sync_outcomes(events: &[AppEvent]) -> Vec<SyncOutcome> {
    events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Sync { outcome, .. } => Some(*outcome),
            _ => None,
        })
        .collect()
}

#[test]
fn unreachable_server_is_retried_every_interval() {
    let (mut app, mut dev, mut sink) = make_app(Some(AUTO_SYNC));
    dev.http_reply = Err(TransportError::Unreachable);

    run(&mut app, &mut dev, &mut sink, 0, 180_000, 1_000);

    let posts = dev.http_requests();
    assert_eq!(posts.len(), 3, "one attempt at 60 s, 120 s and 180 s");
    assert!(posts.iter().all(|(m, url)| *m == "POST" && url == "http://mgmt/sync"));
    assert_eq!(app.last_synced_hash(), None);
    assert_eq!(
        sync_outcomes(&sink.events),
        vec![SyncOutcome::Failed(TransportError::Unreachable); 3]
    );
}

#[test]
fn acknowledged_hash_is_not_resent() {
    let (mut app, mut dev, mut sink) = make_app(Some(AUTO_SYNC));

    run(&mut app, &mut dev, &mut sink, 0, 180_000, 1_000);

    assert_eq!(dev.http_requests().len(), 1);
    assert_eq!(app.last_synced_hash(), Some(app.config().config_hash().as_str()));
    assert_eq!(sync_outcomes(&sink.events), vec![SyncOutcome::Synced]);
}

#[test]
fn changed_config_is_synced_again() {
    let (mut app, mut dev, mut sink) = make_app(Some(AUTO_SYNC));
    run(&mut app, &mut dev, &mut sink, 0, 60_000, 1_000);
    assert_eq!(dev.http_requests().len(), 1);

    dev.type_line(r#"SET_CONFIG:{"device":{"name":"Renamed"}}"#);
    run(&mut app, &mut dev, &mut sink, 61_000, 120_000, 1_000);

    assert_eq!(dev.http_requests().len(), 2);
    assert_eq!(app.last_synced_hash(), Some(app.config().config_hash().as_str()));
}

#[test]
fn rejected_status_keeps_hash_unsynced() {
    let (mut app, mut dev, mut sink) = make_app(Some(AUTO_SYNC));
    dev.http_reply = Ok(503);

    run(&mut app, &mut dev, &mut sink, 0, 60_000, 1_000);

    assert_eq!(sync_outcomes(&sink.events), vec![SyncOutcome::Rejected(503)]);
    assert_eq!(app.last_synced_hash(), None);
}

#[test]
fn no_attempt_without_link_or_when_disabled() {
    let (mut app, mut dev, mut sink) = make_app(Some(AUTO_SYNC));
    dev.link_up = false;
    run(&mut app, &mut dev, &mut sink, 0, 180_000, 1_000);
    assert!(dev.http_requests().is_empty());

    let (mut app, mut dev, mut sink) =
        make_app(Some(r#"{"device":{"config_server_url":"http://mgmt/sync"}}"#));
    run(&mut app, &mut dev, &mut sink, 0, 180_000, 1_000);
    assert!(dev.http_requests().is_empty());
    assert!(sync_outcomes(&sink.events).is_empty());
}
