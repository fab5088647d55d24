//! End-to-end pairing scenarios: a wearable and a handheld on one in-memory
//! mesh, plus the relay variant over loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use counterpart_client::{
    ConnectionState, CounterpartConfig, HandheldApp, LivenessState, MemoryMesh, MemoryNode,
    MeshTransport, RelayListener, RemoteRequest, SenderKind, SensorKind, WearableApp,
};
use counterpart_types::{HeartRate, WEAR_APP, WEAR_STATUS_PATH};
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(120);

async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(WAIT, rx.wait_for(|v| pred(v)))
        .await
        .expect("timed out waiting for value")
        .expect("sender dropped");
    value.clone()
}

struct Pair {
    mesh: MemoryMesh,
    watch: MemoryNode,
    phone: HandheldApp<MemoryNode>,
    wearable: WearableApp<MemoryNode>,
}

async fn pair(config: CounterpartConfig) -> Pair {
    let mesh = MemoryMesh::new();
    let phone_node = mesh.join("phone");
    let watch = mesh.join("watch");
    let phone = HandheldApp::start(Arc::new(phone_node), &config).await;
    let wearable = WearableApp::start(Arc::new(watch.clone()), config).await;
    Pair {
        mesh,
        watch,
        phone,
        wearable,
    }
}

fn scripted(script: Vec<u8>) -> CounterpartConfig {
    let mut config = CounterpartConfig::default();
    config.sensor.kind = SensorKind::Scripted;
    config.sensor.script = script;
    config
}

// ===========================================
// Mesh Scenarios
// ===========================================

#[tokio::test(start_paused = true)]
async fn wearable_streams_heart_rate_to_handheld() {
    let mut p = pair(scripted(vec![70, 72, 74, 76, 78])).await;
    let mut state = p.phone.connection_state();
    wait_for(&mut state, |s| *s == ConnectionState::AppInstalledActive).await;
    let mut presence = p.wearable.phone();
    wait_for(&mut presence, |n| n.is_some()).await;

    p.wearable.start_collecting().await.unwrap();

    let mut hr = p.phone.heart_rate();
    wait_for(&mut hr, |v| v.bpm() == 78).await;

    p.wearable.stop_collecting().await;
    wait_for(&mut hr, |v| v.is_none()).await;

    p.wearable.shutdown().await;
    wait_for(&mut state, |s| *s == ConnectionState::AppNotInstalled).await;
    p.phone.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn readings_arrive_in_order_with_zero_as_no_reading() {
    // The first reading can go out before the channel is up.
    let mut p = pair(scripted(vec![60, 72, 75, 0, 80])).await;
    let mut presence = p.wearable.phone();
    wait_for(&mut presence, |n| n.is_some()).await;
    let mut hr = p.phone.heart_rate();

    p.wearable.start_collecting().await.unwrap();

    let mut seen = Vec::new();
    while seen.last().map(|v: &HeartRate| v.bpm()) != Some(80) {
        tokio::time::timeout(WAIT, hr.changed())
            .await
            .expect("timed out waiting for reading")
            .expect("feed dropped");
        seen.push(*hr.borrow_and_update());
    }

    let from = seen
        .iter()
        .position(|v| v.bpm() == 72)
        .expect("72 never arrived");
    assert_eq!(
        seen[from..],
        [
            HeartRate::from_bpm(72),
            HeartRate::from_bpm(75),
            HeartRate::NONE,
            HeartRate::from_bpm(80),
        ]
    );
    assert!(seen[from + 2].is_none());
    assert_eq!(seen[from + 2].to_string(), "--");

    p.wearable.shutdown().await;
    p.phone.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reading_expires_when_samples_stop() {
    let mut config = scripted(vec![65, 65, 65]);
    config.heart_rate.ttl_secs = 10;
    let mut p = pair(config).await;
    let mut presence = p.wearable.phone();
    wait_for(&mut presence, |n| n.is_some()).await;

    p.wearable.start_collecting().await.unwrap();
    let mut hr = p.phone.heart_rate();
    wait_for(&mut hr, |v| v.bpm() == 65).await;
    let seen_at = tokio::time::Instant::now();

    // The script is exhausted; the channel stays up but the value goes stale.
    wait_for(&mut hr, |v| v.is_none()).await;
    assert!(seen_at.elapsed() >= Duration::from_secs(10));
    assert!(p.phone.session_state().borrow().is_streaming());

    p.wearable.shutdown().await;
    p.phone.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn session_recovers_after_reachability_flap() {
    let mut p = pair(CounterpartConfig::default()).await;
    let mut presence = p.wearable.phone();
    wait_for(&mut presence, |n| n.is_some()).await;
    p.wearable.start_collecting().await.unwrap();

    let mut hr = p.phone.heart_rate();
    let mut state = p.phone.connection_state();
    wait_for(&mut hr, |v| !v.is_none()).await;
    wait_for(&mut state, |s| *s == ConnectionState::AppInstalledActive).await;

    let mut liveness = p.phone.liveness();
    p.mesh.set_reachable(&p.watch.local_node(), false);
    wait_for(&mut state, |s| *s == ConnectionState::NoDeviceFound).await;
    wait_for(&mut hr, |v| v.is_none()).await;
    wait_for(&mut liveness, |s| *s == LivenessState::Unknown).await;
    assert_eq!(p.mesh.channel_count(), 0);

    p.mesh.set_reachable(&p.watch.local_node(), true);
    wait_for(&mut state, |s| *s == ConnectionState::AppInstalledActive).await;
    wait_for(&mut hr, |v| !v.is_none()).await;
    assert_eq!(p.mesh.channel_count(), 1);

    p.wearable.shutdown().await;
    p.phone.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn departed_wearable_clears_handheld() {
    let mut p = pair(CounterpartConfig::default()).await;
    let mut presence = p.wearable.phone();
    wait_for(&mut presence, |n| n.is_some()).await;
    p.wearable.start_collecting().await.unwrap();

    let mut hr = p.phone.heart_rate();
    let mut state = p.phone.connection_state();
    let mut liveness = p.phone.liveness();
    wait_for(&mut hr, |v| !v.is_none()).await;
    wait_for(&mut liveness, |s| s.is_active()).await;

    p.mesh.leave(&p.watch.local_node());

    wait_for(&mut state, |s| *s == ConnectionState::NoDeviceFound).await;
    wait_for(&mut hr, |v| v.is_none()).await;
    wait_for(&mut liveness, |s| *s == LivenessState::Unknown).await;
    assert_eq!(p.mesh.channel_count(), 0);

    // The departed wearable keeps running but can no longer reach the handheld.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(*state.borrow(), ConnectionState::NoDeviceFound);
    assert_eq!(*liveness.borrow(), LivenessState::Unknown);

    p.wearable.shutdown().await;
    p.phone.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_wearable_turns_inactive() {
    let mesh = MemoryMesh::new();
    let phone_node = mesh.join("phone");
    let watch = mesh.join("watch");
    let phone = HandheldApp::start(Arc::new(phone_node.clone()), &CounterpartConfig::default()).await;
    watch.advertise(WEAR_APP).await.unwrap();

    // One alive, then nothing.
    watch
        .send_message(&phone_node.local_node(), WEAR_STATUS_PATH, b"alive")
        .await
        .unwrap();
    let mut state = phone.connection_state();
    wait_for(&mut state, |s| *s == ConnectionState::AppInstalledActive).await;
    let alive_at = tokio::time::Instant::now();

    wait_for(&mut state, |s| *s == ConnectionState::AppInstalledInactive).await;
    assert!(alive_at.elapsed() >= Duration::from_secs(30));
    phone.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn ping_asks_wearable_to_collect() {
    let mut p = pair(scripted(vec![90, 91, 92])).await;
    let mut state = p.phone.connection_state();
    wait_for(&mut state, |s| *s == ConnectionState::AppInstalledActive).await;

    assert!(p.phone.ping().await);
    let request = p.wearable.next_request().await.unwrap();
    assert!(matches!(request, RemoteRequest::EnsureRunning { .. }));
    p.wearable.start_collecting().await.unwrap();

    let mut hr = p.phone.heart_rate();
    wait_for(&mut hr, |v| v.bpm() == 92).await;

    assert!(p.phone.launch_remote_app().await);
    let request = p.wearable.next_request().await.unwrap();
    assert!(matches!(request, RemoteRequest::Launch { .. }));

    p.wearable.shutdown().await;
    p.phone.shutdown().await;
}

// ===========================================
// Relay Scenario
// ===========================================

#[tokio::test]
async fn wearable_streams_through_relay() {
    let listener = RelayListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let mut relay = listener.serve();

    let mut config = scripted(vec![61, 62, 63]);
    config.sensor.interval_ms = 10;
    config.sender.kind = SenderKind::Relay;
    config.relay.address = address.to_string();

    let mesh = MemoryMesh::new();
    let mut wearable = WearableApp::start(Arc::new(mesh.join("watch")), config).await;
    wearable.start_collecting().await.unwrap();

    let mut values = Vec::new();
    while values.len() < 3 {
        let message = tokio::time::timeout(Duration::from_secs(5), relay.recv())
            .await
            .expect("no relay message")
            .expect("relay stopped");
        values.push(message.message.hr_value);
    }
    assert_eq!(values, vec![61, 62, 63]);

    wearable.stop_collecting().await;
    let last = tokio::time::timeout(Duration::from_secs(5), relay.recv())
        .await
        .expect("no final message")
        .expect("relay stopped");
    assert_eq!(last.message.hr_value, i32::from(HeartRate::NONE.bpm()));

    wearable.shutdown().await;
    relay.shutdown().await;
}

#[tokio::test]
async fn unreachable_relay_fails_collection() {
    let address = {
        let listener = RelayListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = scripted(vec![61]);
    config.sender.kind = SenderKind::Relay;
    config.relay.address = address.to_string();

    let mesh = MemoryMesh::new();
    let mut wearable = WearableApp::start(Arc::new(mesh.join("watch")), config).await;

    let result = wearable.start_collecting().await;
    assert!(matches!(
        result,
        Err(counterpart_client::ClientError::SenderUnavailable)
    ));
    assert!(!wearable.is_collecting());
    wearable.shutdown().await;
}
