//! Peer expiry and graceful departure (S5, S6).

use std::sync::Once;
use std::time::Duration;

use driftnet_api::{Config, Event};
use tokio::time::timeout;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    });
}

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event arrives in time")
        .expect("event stream stays open")
}

/// S5: a peer that vanishes without a departure beacon is still reaped once
/// PEER_EXPIRED + REAP_INTERVAL has elapsed. Time is paused and advanced so
/// the test does not actually wait ~31 real seconds.
#[tokio::test]
async fn s5_ungraceful_departure_is_eventually_expired() {
    init_tracing();
    let port = 15675;

    let config_a = Config {
        name: Some("A".into()),
        beacon_port: port,
        ..Config::default()
    };
    let (handle_a, _a_events) = driftnet_engine::spawn(config_a);
    handle_a.start().await.unwrap();

    let config_b = Config {
        name: Some("B".into()),
        beacon_port: port,
        ..Config::default()
    };
    let (handle_b, mut b_events) = driftnet_engine::spawn(config_b);
    handle_b.start().await.unwrap();

    let entered = next_event(&mut b_events).await;
    assert!(matches!(entered, Event::Enter { .. }));

    tokio::time::pause();

    // Simulate A's process dying: drop its command channel without a
    // graceful STOP, so no departure beacon is ever sent.
    drop(handle_a);
    // Let the dropped command channel actually unwind A's task before we
    // start fast-forwarding B's reap clock.
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_secs(32)).await;

    let event = next_event(&mut b_events).await;
    match event {
        Event::Exit { name, .. } => assert_eq!(name, "A"),
        other => panic!("expected Exit, got {other:?}"),
    }
}

/// S6: a graceful STOP is observed as an EXIT well inside one beacon
/// interval, much faster than the expiry path in S5.
#[tokio::test(flavor = "multi_thread")]
async fn s6_graceful_stop_is_observed_quickly() {
    init_tracing();
    let port = 15676;

    let config_a = Config {
        name: Some("A".into()),
        beacon_port: port,
        ..Config::default()
    };
    let (handle_a, _a_events) = driftnet_engine::spawn(config_a);
    handle_a.start().await.unwrap();

    let config_b = Config {
        name: Some("B".into()),
        beacon_port: port,
        ..Config::default()
    };
    let (handle_b, mut b_events) = driftnet_engine::spawn(config_b);
    handle_b.start().await.unwrap();

    let entered = next_event(&mut b_events).await;
    assert!(matches!(entered, Event::Enter { .. }));

    handle_a.stop().await.unwrap();

    let event = next_event(&mut b_events).await;
    match event {
        Event::Exit { name, .. } => assert_eq!(name, "A"),
        other => panic!("expected Exit, got {other:?}"),
    }
}
