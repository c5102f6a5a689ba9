//! Tests for the router actor, end to end through a recording transport

use super::*;
use crate::dispatch::ShutdownMode;
use crate::drivers::ConsoleTransport;
use crate::endpoints::Endpoint;
use crate::scene::load_from_bytes;
use crate::value::TypedValue;
use std::time::Duration;

const SHOW: &str = r#"
server:
  reply: 127.0.0.1:9000
endpoints:
  - prefix: qlc
    ip: 127.0.0.1
    port: 7700
    valueType: float
  - prefix: atem
    ip: 127.0.0.1
    port: 3333
map:
  lights:
    front:
      in: /qlc/front 1
      out: /qlc/front 0
  camera:
    wide: /atem/program 1
    close: /atem/program 2
  obs:
    rec: /obs/record 1
scenes:
  - key: intro
    name: Intro
    midi: 64
    lights: [front]
    camera: wide
  - key: talk
    name: Talk
    lights: [none, delay 2s]
    camera: close
  - key: outro
    name: Outro
    obs: rec
    camera: wide
"#;

async fn setup(yaml: &str) -> (Arc<ConsoleTransport>, RouterHandle) {
    let transport = Arc::new(ConsoleTransport::quiet());
    let router = Router::spawn(Dispatcher::spawn(transport.clone()));
    router.reload(load_from_bytes(yaml.as_bytes()).unwrap()).await;
    (transport, router)
}

fn on(address: &str) -> InboundMessage {
    InboundMessage::new(address, vec![TypedValue::Int(1)])
}

/// Wait until the router has processed everything queued so far
async fn settle(router: &RouterHandle) -> RouterStatus {
    router.status().await
}

#[tokio::test]
async fn test_cold_start_broadcasts_then_replays_commands() {
    let (transport, router) = setup(SHOW).await;

    router.trigger(on("/scene/intro"));
    let status = settle(&router).await;

    assert_eq!(
        transport.lines(),
        vec![
            "127.0.0.1:9000 /scene/intro 1",
            "127.0.0.1:9000 /scene/talk 0",
            "127.0.0.1:9000 /scene/outro 0",
            "127.0.0.1:7700 /qlc/front 1.0",
            "127.0.0.1:3333 /atem/program 1",
        ]
    );
    assert_eq!(status.active_scene_key.as_deref(), Some("intro"));
    assert_eq!(status.active_scene_name.as_deref(), Some("Intro"));
    assert!(status.loaded);
    assert_eq!(status.scene_count, 3);
}

#[tokio::test]
async fn test_switch_announces_activate_then_deactivate_then_commands() {
    let (transport, router) = setup(SHOW).await;
    router.trigger(on("/scene/intro"));
    settle(&router).await;
    transport.take();

    router.trigger(on("/scene/outro"));
    settle(&router).await;

    // /obs has no endpoint: dropped, the rest of the scene still goes out
    assert_eq!(
        transport.lines(),
        vec![
            "127.0.0.1:9000 /scene/outro 1",
            "127.0.0.1:9000 /scene/intro 0",
            "127.0.0.1:3333 /atem/program 1",
        ]
    );
}

#[tokio::test]
async fn test_repeated_trigger_only_reaffirms() {
    let (transport, router) = setup(SHOW).await;
    router.trigger(on("/scene/intro"));
    settle(&router).await;
    transport.take();

    router.trigger(on("/scene/intro"));
    router.trigger(InboundMessage::new("/scene/intro", vec![]));
    settle(&router).await;

    assert_eq!(
        transport.lines(),
        vec!["127.0.0.1:9000 /scene/intro 1", "127.0.0.1:9000 /scene/intro 1"]
    );
}

#[tokio::test]
async fn test_echoed_zero_is_ignored() {
    let (transport, router) = setup(SHOW).await;
    router.trigger(on("/scene/intro"));
    settle(&router).await;
    transport.take();

    // the surface echoes our deactivations back
    router.trigger(InboundMessage::new("/scene/talk", vec![TypedValue::Int(0)]));
    router.trigger(InboundMessage::new("/scene/outro", vec![TypedValue::Float(0.0)]));
    router.trigger(InboundMessage::new("/scene/intro", vec![TypedValue::Bool(false)]));
    let status = settle(&router).await;

    assert!(transport.history().is_empty());
    assert_eq!(status.active_scene_key.as_deref(), Some("intro"));
}

#[tokio::test]
async fn test_midi_trigger() {
    let (transport, router) = setup(SHOW).await;

    router.trigger(InboundMessage::new("/midi-scene/0.5", vec![]));
    let status = settle(&router).await;
    assert_eq!(status.active_scene_key.as_deref(), Some("intro"));
    assert_eq!(transport.history().len(), 5);

    // 0.02 * 127 rounds to 3, which nothing is registered for
    transport.take();
    router.trigger(InboundMessage::new("/midi-scene/0.02", vec![]));
    let status = settle(&router).await;
    assert_eq!(status.active_scene_key.as_deref(), Some("intro"));
    assert!(transport.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delayed_commands_fire_later_without_blocking() {
    let (transport, router) = setup(SHOW).await;

    router.trigger(on("/scene/talk"));
    settle(&router).await;
    assert_eq!(
        transport.lines(),
        vec![
            "127.0.0.1:9000 /scene/talk 1",
            "127.0.0.1:9000 /scene/intro 0",
            "127.0.0.1:9000 /scene/outro 0",
            "127.0.0.1:3333 /atem/program 2",
        ]
    );
    assert_eq!(router.pending().await, 1);
    transport.take();

    // the router keeps answering while the delay runs
    router.trigger(on("/obs/record"));
    settle(&router).await;

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(transport.lines(), vec!["127.0.0.1:7700 /qlc/front 0.0"]);
    assert_eq!(router.pending().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_pending() {
    let (transport, router) = setup(SHOW).await;
    router.trigger(on("/scene/talk"));
    settle(&router).await;
    transport.take();

    assert_eq!(router.cancel_pending().await, 1);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(transport.history().is_empty());
}

#[tokio::test]
async fn test_passthrough_is_forwarded() {
    let (transport, router) = setup(SHOW).await;

    router.trigger(InboundMessage::new(
        "/qlc/dimmer",
        vec![TypedValue::Float(0.25), TypedValue::Str("go".into())],
    ));
    let status = settle(&router).await;

    assert_eq!(transport.lines(), vec!["127.0.0.1:7700 /qlc/dimmer 0.25 go"]);
    assert_eq!(status.active_scene_key, None);
}

#[tokio::test]
async fn test_invalid_and_undefined_change_nothing() {
    let (transport, router) = setup(SHOW).await;

    router.trigger(on("/scene/missing"));
    router.trigger(on("/scene/intro/extra"));
    router.trigger(on("/midi-scene/loud"));
    let status = settle(&router).await;

    assert!(transport.history().is_empty());
    assert_eq!(status.active_scene_key, None);
}

#[tokio::test]
async fn test_reload_swaps_table_and_keeps_active_scene() {
    let (transport, router) = setup(SHOW).await;
    router.trigger(on("/scene/intro"));
    settle(&router).await;
    transport.take();

    let next = r#"
endpoints:
  - prefix: qlc
    ip: 127.0.0.1
    port: 7800
map:
  lights:
    all: /qlc/all 1
scenes:
  - key: intro
    name: Intro v2
  - key: finale
    lights: all
"#;
    router.reload(load_from_bytes(next.as_bytes()).unwrap()).await;
    let status = settle(&router).await;
    assert_eq!(status.active_scene_key.as_deref(), Some("intro"));
    assert_eq!(status.active_scene_name.as_deref(), Some("Intro v2"));
    assert_eq!(status.scene_count, 2);

    router.trigger(on("/scene/finale"));
    router.trigger(on("/scene/talk"));
    settle(&router).await;

    // no server section any more: the reply endpoint went with it
    assert_eq!(transport.lines(), vec!["127.0.0.1:7800 /qlc/all 1"]);
}

#[tokio::test]
async fn test_explicit_reply_survives_reload() {
    let (transport, router) = setup(SHOW).await;
    router
        .set_reply(Some(Endpoint::reply("127.0.0.1:9500").unwrap()))
        .await;
    router.reload(load_from_bytes(SHOW.as_bytes()).unwrap()).await;

    router.trigger(on("/scene/outro"));
    settle(&router).await;
    assert_eq!(transport.lines()[0], "127.0.0.1:9500 /scene/outro 1");

    router.set_reply(None).await;
    transport.take();
    router.trigger(on("/scene/intro"));
    settle(&router).await;
    assert_eq!(
        transport.lines(),
        vec!["127.0.0.1:7700 /qlc/front 1.0", "127.0.0.1:3333 /atem/program 1"]
    );
}

#[tokio::test]
async fn test_idle_until_first_load() {
    let transport = Arc::new(ConsoleTransport::quiet());
    let router = Router::spawn(Dispatcher::spawn(transport.clone()));

    router.trigger(on("/scene/intro"));
    let status = settle(&router).await;
    assert!(!status.loaded);
    assert!(router.scenes().await.is_none());
    assert!(transport.history().is_empty());

    router.reload(load_from_bytes(SHOW.as_bytes()).unwrap()).await;
    let scenes = router.scenes().await.unwrap();
    assert_eq!(scenes.keys().collect::<Vec<_>>(), vec!["intro", "talk", "outro"]);
}

#[tokio::test]
async fn test_status_watch_follows_changes() {
    let (_, router) = setup(SHOW).await;
    let mut watch = router.watch_status();
    let _ = watch.borrow_and_update();

    router.set_listening(true);
    router.trigger(on("/scene/talk"));
    settle(&router).await;

    assert!(watch.has_changed().unwrap());
    let status = watch.borrow_and_update().clone();
    assert!(status.listening);
    assert_eq!(status.active_scene_name.as_deref(), Some("Talk"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_on_request() {
    let (transport, router) = setup(SHOW).await;
    router.trigger(on("/scene/talk"));
    settle(&router).await;
    transport.take();

    assert_eq!(router.shutdown(ShutdownMode::Drain).await, 1);
    assert_eq!(transport.lines(), vec!["127.0.0.1:7700 /qlc/front 0.0"]);
}
