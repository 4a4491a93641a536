//! Discovery and group-membership scenarios (S1, S2).

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

async fn start_node(name: &str, beacon_port: u16) -> (driftnet_api::Handle, tokio::sync::mpsc::UnboundedReceiver<Event>) {
    init_tracing();
    let config = Config {
        name: Some(name.to_string()),
        beacon_port,
        ..Config::default()
    };
    let (handle, events) = driftnet_engine::spawn(config);
    handle.start().await.expect("node starts");
    (handle, events)
}

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("event arrives within 3s")
        .expect("event stream stays open")
}

#[tokio::test(flavor = "multi_thread")]
async fn s1_discovery_emits_enter() {
    let port = 15670;
    let (a, _a_events) = start_node("A", port).await;
    let (_b, mut b_events) = start_node("B", port).await;

    let a_id = a.uuid().await.unwrap();

    let event = next_event(&mut b_events).await;
    match event {
        Event::Enter { peer, name, headers, .. } => {
            assert_eq!(peer, a_id);
            assert_eq!(name, "A");
            assert!(headers.is_empty());
        }
        other => panic!("expected Enter, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn s2_group_join_is_observed_by_both_sides() {
    let port = 15671;
    let (a, mut a_events) = start_node("A", port).await;
    let (b, mut b_events) = start_node("B", port).await;

    // Drain ENTER on both sides before exercising groups.
    let _ = next_event(&mut a_events).await;
    let _ = next_event(&mut b_events).await;

    a.join("X").await.unwrap();
    b.join("X").await.unwrap();

    let mut saw_join_on_b = false;
    for _ in 0..4 {
        if let Event::Join { group, .. } = next_event(&mut b_events).await {
            if group == "X" {
                saw_join_on_b = true;
                break;
            }
        }
    }
    assert!(saw_join_on_b, "B should observe A's JOIN X");

    assert!(a.own_groups().await.unwrap().contains(&"X".to_string()));
    assert!(b.own_groups().await.unwrap().contains(&"X".to_string()));
}
