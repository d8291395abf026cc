//! Session behavior end to end, against in-memory devices

use crate::support::{track, MockDecoder, Rig};
use soundboard_core::domain::{
    BindingState, Change, Command, DeviceId, InitialState, KeyAction, KeyCode, KeyEvent,
    OutputAssignment, OutputSlot, SessionError, SlotOutcome, TrackId,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const SPACE: KeyCode = KeyCode::new(57);

fn key(code: u16) -> KeyEvent {
    KeyEvent::new(KeyCode::new(code))
}

fn id(s: &str) -> DeviceId {
    DeviceId::new(s)
}

fn initial_with(tracks: Vec<soundboard_core::domain::Track>, stop_key: Option<KeyCode>) -> InitialState {
    InitialState {
        tracks,
        stop_key,
        ..InitialState::default()
    }
}

// ============================================================================
// DEVICE RESOLUTION
// ============================================================================

#[tokio::test]
async fn test_cable_replaced_by_new_device() {
    let rig = Rig::new(
        &[("default", "Speakers"), ("cable", "CABLE Input (VB-Audio)")],
        Some("default"),
    );
    let mut session = rig.session(InitialState::default());

    let assignment = session.refresh_devices().await.unwrap().clone();
    assert_eq!(assignment, OutputAssignment::new(Some(id("default")), Some(id("cable"))));

    rig.enumerator
        .set_devices(&[("default", "Speakers"), ("3", "USB Headset")], Some("default"));
    let assignment = session.refresh_devices().await.unwrap().clone();
    assert_eq!(assignment, OutputAssignment::new(Some(id("default")), Some(id("3"))));
}

#[tokio::test]
async fn test_saved_assignment_survives_restart() {
    let rig = Rig::new(
        &[("default", "Speakers"), ("headset", "Headset"), ("cable", "CABLE Input")],
        Some("default"),
    );
    let mut session = rig.session(InitialState {
        assignment: OutputAssignment::new(Some(id("headset")), Some(id("default"))),
        ..InitialState::default()
    });

    let assignment = session.refresh_devices().await.unwrap().clone();
    assert_eq!(assignment.slot1, Some(id("headset")));
    assert_eq!(assignment.slot2, Some(id("default")));
}

#[tokio::test]
async fn test_enumeration_failure_keeps_previous_state() {
    let rig = Rig::new(&[("default", "Speakers"), ("cable", "CABLE Input")], Some("default"));
    let mut session = rig.session(InitialState::default());
    session.refresh_devices().await.unwrap();
    let before = session.snapshot();

    rig.enumerator.set_failing(true);
    assert!(matches!(
        session.refresh_devices().await,
        Err(SessionError::Audio(_))
    ));

    let after = session.snapshot();
    assert_eq!(after.devices, before.devices);
    assert_eq!(after.assignment, before.assignment);
}

#[tokio::test]
async fn test_empty_device_list_leaves_slots_unresolved() {
    let rig = Rig::new(&[], None);
    let mut session = rig.session(InitialState::default());

    let assignment = session.refresh_devices().await.unwrap().clone();
    assert!(assignment.slot1.is_none());
    assert!(assignment.slot2.is_none());

    session.add_track(track("t1")).unwrap();
    session.play_track(&TrackId::new("t1")).unwrap();
    let results = session.settle().await;
    let report = results[0].1.as_ref().unwrap();
    assert_eq!(report.started(), 0);
    assert!(matches!(report.get(OutputSlot::Slot1), SlotOutcome::Failed(_)));
}

// ============================================================================
// DISPATCH
// ============================================================================

#[tokio::test]
async fn test_bound_key_plays_exactly_once_on_both_outputs() {
    let rig = Rig::new(&[("default", "Speakers"), ("cable", "CABLE Input")], Some("default"));
    let t1 = track("t1").with_keycode(KeyCode::new(65));
    let mut session = rig.session(initial_with(vec![t1, track("t2")], None));
    session.refresh_devices().await.unwrap();

    let action = session.handle_key(key(65));
    assert_eq!(action, KeyAction::Play(TrackId::new("t1")));

    let results = session.settle().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, TrackId::new("t1"));
    assert_eq!(results[0].1.as_ref().unwrap().started(), 2);

    assert_eq!(rig.decoder.count(), 1);
    let mut binds = rig.sink.binds();
    binds.sort();
    assert_eq!(binds, vec![id("cable"), id("default")]);
    assert_eq!(session.playing_count(), 2);
}

#[tokio::test]
async fn test_unbound_key_does_nothing() {
    let rig = Rig::new(&[("default", "Speakers")], Some("default"));
    let mut session = rig.session(initial_with(vec![track("t1")], None));
    session.refresh_devices().await.unwrap();

    assert_eq!(session.handle_key(key(30)), KeyAction::Ignored);
    assert!(session.settle().await.is_empty());
    assert_eq!(rig.decoder.count(), 0);
    assert!(rig.sink.binds().is_empty());
}

#[tokio::test]
async fn test_repeated_presses_layer_playback() {
    let rig = Rig::new(&[("a", "A"), ("b", "B")], Some("a"));
    let t1 = track("t1").with_keycode(KeyCode::new(30));
    let mut session = rig.session(initial_with(vec![t1], None));
    session.refresh_devices().await.unwrap();

    session.handle_key(key(30));
    session.handle_key(key(30));
    session.settle().await;

    assert_eq!(rig.decoder.count(), 2);
    assert_eq!(rig.sink.live(), 4);
}

#[tokio::test]
async fn test_stop_key_stops_everything() {
    let rig = Rig::new(&[("a", "A"), ("b", "B")], Some("a"));
    let t1 = track("t1").with_keycode(KeyCode::new(30));
    let mut session = rig.session(initial_with(vec![t1], Some(SPACE)));
    session.refresh_devices().await.unwrap();

    session.handle_key(key(30));
    session.settle().await;
    assert_eq!(rig.sink.live(), 2);

    assert_eq!(session.handle_key(KeyEvent::new(SPACE)), KeyAction::StopAll);
    assert_eq!(rig.sink.live(), 0);
    assert_eq!(rig.sink.stops(), 2);

    // nothing left to stop
    assert_eq!(session.stop_all(), 0);
}

#[tokio::test]
async fn test_stop_while_decoding_cancels_playback() {
    let (decoder, gate) = MockDecoder::gated();
    let rig = Rig::new(&[("a", "A"), ("b", "B")], Some("a")).with_decoder(decoder);
    let t1 = track("t1").with_keycode(KeyCode::new(30));
    let mut session = rig.session(initial_with(vec![t1], Some(SPACE)));
    session.refresh_devices().await.unwrap();

    session.handle_key(key(30));
    session.handle_key(KeyEvent::new(SPACE));
    gate.add_permits(1);

    let results = session.settle().await;
    let report = results[0].1.as_ref().unwrap();
    assert!(matches!(report.slot1, SlotOutcome::Cancelled));
    assert!(matches!(report.slot2, SlotOutcome::Cancelled));
    assert_eq!(rig.sink.live(), 0);
}

#[tokio::test]
async fn test_missing_device_fails_only_its_slot() {
    let rig = Rig::new(&[("a", "A"), ("b", "B")], Some("a"));
    let mut session = rig.session(initial_with(vec![track("t1")], None));
    session.refresh_devices().await.unwrap();
    rig.sink.remove_device("b");

    session.play_track(&TrackId::new("t1")).unwrap();
    let results = session.settle().await;
    let report = results[0].1.as_ref().unwrap();

    assert!(report.slot1.is_started());
    assert!(matches!(report.slot2, SlotOutcome::Failed(_)));
    // no automatic fallback
    assert_eq!(session.assignment().slot2, Some(id("b")));
}

#[tokio::test]
async fn test_decode_failure_is_reported() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let broken = soundboard_core::domain::Track::new(
        TrackId::new("broken"),
        "broken.mp3",
        soundboard_core::domain::TrackSource::Memory(Vec::new().into()),
    );
    let mut session = rig.session(initial_with(vec![broken], None));
    session.refresh_devices().await.unwrap();

    session.play_track(&TrackId::new("broken")).unwrap();
    let results = session.settle().await;

    assert!(results[0].1.is_err());
    assert!(rig.sink.binds().is_empty());
}

#[tokio::test]
async fn test_play_unknown_track() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let mut session = rig.session(InitialState::default());

    assert!(matches!(
        session.play_track(&TrackId::new("nope")),
        Err(SessionError::TrackNotFound(_))
    ));
}

// ============================================================================
// REBINDING
// ============================================================================

#[tokio::test]
async fn test_rebind_consumes_the_next_key() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let mut session = rig.session(initial_with(vec![track("t1")], None));
    session.refresh_devices().await.unwrap();
    let mut updates = session.subscribe();

    session.begin_track_rebind(&TrackId::new("t1")).unwrap();
    assert!(matches!(updates.recv().await.unwrap().change, Change::BindingChanged));

    let action = session.handle_key(key(30));
    assert_eq!(
        action,
        KeyAction::TrackKeyAssigned {
            track: TrackId::new("t1"),
            key: Some(KeyCode::new(30)),
        }
    );
    assert!(session.settle().await.is_empty());

    let update = updates.recv().await.unwrap();
    assert!(matches!(update.change, Change::TrackKeyChanged { .. }));
    assert_eq!(update.snapshot.tracks[0].keycode, Some(KeyCode::new(30)));
    assert_eq!(update.snapshot.binding, BindingState::Idle);

    // now the key plays
    assert_eq!(session.handle_key(key(30)), KeyAction::Play(TrackId::new("t1")));
}

#[tokio::test]
async fn test_escape_and_stop_key_clear_track_binding() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let t1 = track("t1").with_keycode(KeyCode::new(30));
    let t2 = track("t2").with_keycode(KeyCode::new(31));
    let mut session = rig.session(initial_with(vec![t1, t2], Some(SPACE)));

    session.begin_track_rebind(&TrackId::new("t1")).unwrap();
    session.handle_key(KeyEvent::new(KeyCode::ESCAPE));
    assert_eq!(session.tracks()[0].keycode, None);

    session.begin_track_rebind(&TrackId::new("t2")).unwrap();
    session.handle_key(KeyEvent::new(SPACE));
    assert_eq!(session.tracks()[1].keycode, None);
    assert_eq!(session.bindings().stop_key(), Some(SPACE));
}

#[tokio::test]
async fn test_stop_key_rebind() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let mut session = rig.session(initial_with(Vec::new(), Some(SPACE)));
    let mut updates = session.subscribe();

    session.begin_stop_rebind();
    assert_eq!(
        session.handle_key(key(44)),
        KeyAction::StopKeyAssigned(Some(KeyCode::new(44)))
    );
    assert_eq!(session.bindings().stop_key(), Some(KeyCode::new(44)));

    session.begin_stop_rebind();
    session.handle_key(KeyEvent::new(KeyCode::ESCAPE));
    assert_eq!(session.bindings().stop_key(), None);

    let changes: Vec<_> = std::iter::from_fn(|| updates.try_recv().ok())
        .map(|u| u.change)
        .collect();
    assert!(matches!(changes[1], Change::StopKeyChanged(Some(_))));
    assert!(matches!(changes[3], Change::StopKeyChanged(None)));
}

#[tokio::test]
async fn test_second_rebind_replaces_first() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let mut session = rig.session(initial_with(vec![track("t1"), track("t2")], None));

    session.begin_track_rebind(&TrackId::new("t1")).unwrap();
    session.begin_track_rebind(&TrackId::new("t2")).unwrap();
    session.handle_key(key(30));

    assert_eq!(session.tracks()[0].keycode, None);
    assert_eq!(session.tracks()[1].keycode, Some(KeyCode::new(30)));
}

#[tokio::test]
async fn test_shared_key_plays_first_track_in_list() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let t1 = track("t1").with_keycode(KeyCode::new(30));
    let mut session = rig.session(initial_with(vec![t1, track("t2")], None));

    session.begin_track_rebind(&TrackId::new("t2")).unwrap();
    session.handle_key(key(30));
    assert_eq!(session.tracks()[1].keycode, Some(KeyCode::new(30)));

    assert_eq!(session.handle_key(key(30)), KeyAction::Play(TrackId::new("t1")));
}

// ============================================================================
// TRACK MANAGEMENT
// ============================================================================

#[tokio::test]
async fn test_removing_a_track_stops_playback() {
    let rig = Rig::new(&[("a", "A"), ("b", "B")], Some("a"));
    let mut session = rig.session(initial_with(vec![track("t1"), track("t2")], None));
    session.refresh_devices().await.unwrap();

    session.play_track(&TrackId::new("t2")).unwrap();
    session.settle().await;
    assert_eq!(rig.sink.live(), 2);

    let removed = session.remove_track(&TrackId::new("t1")).unwrap();
    assert_eq!(removed.id, TrackId::new("t1"));
    assert_eq!(rig.sink.live(), 0);
    assert_eq!(session.tracks().len(), 1);
}

#[tokio::test]
async fn test_every_mutation_is_announced() {
    let rig = Rig::new(&[("a", "A"), ("b", "B")], Some("a"));
    let mut session = rig.session(InitialState::default());
    let mut updates = session.subscribe();

    session.refresh_devices().await.unwrap();
    session.add_track(track("t1")).unwrap();
    session.select_output(OutputSlot::Slot2, id("a")).unwrap();
    session.remove_track(&TrackId::new("t1")).unwrap();

    let changes: Vec<_> = std::iter::from_fn(|| updates.try_recv().ok())
        .map(|u| u.change)
        .collect();
    assert!(matches!(changes[0], Change::DevicesChanged));
    assert!(matches!(changes[1], Change::AssignmentChanged));
    assert!(matches!(changes[2], Change::TrackAdded(_)));
    assert!(matches!(changes[3], Change::AssignmentChanged));
    assert!(matches!(changes[4], Change::TrackRemoved(_)));
    assert_eq!(changes.len(), 5);
}

// ============================================================================
// EVENT LOOP
// ============================================================================

async fn snapshot(commands: &mpsc::Sender<Command>) -> soundboard_core::domain::SessionSnapshot {
    let (reply, snapshot) = oneshot::channel();
    commands.send(Command::Snapshot(reply)).await.unwrap();
    snapshot.await.unwrap()
}

#[tokio::test]
async fn test_run_loop_handles_keys_devices_and_commands() {
    let rig = Rig::new(&[("default", "Speakers"), ("cable", "CABLE Input")], Some("default"));
    let t1 = track("t1").with_keycode(KeyCode::new(65));
    let session = rig.session(initial_with(vec![t1], Some(SPACE)));

    let (key_tx, keys) = mpsc::unbounded_channel();
    let (device_tx, devices) = broadcast::channel(4);
    let (command_tx, commands) = mpsc::channel(8);
    let running = tokio::spawn(session.run(keys, devices, commands));

    let initial = snapshot(&command_tx).await;
    assert_eq!(initial.assignment.slot2, Some(id("cable")));

    key_tx.send(key(65)).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while rig.sink.live() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("playback never started");
    assert_eq!(rig.decoder.count(), 1);

    key_tx.send(KeyEvent::new(SPACE)).unwrap();
    snapshot(&command_tx).await;
    assert_eq!(rig.sink.live(), 0);

    rig.enumerator
        .set_devices(&[("default", "Speakers"), ("usb", "USB Headset")], Some("default"));
    device_tx.send(()).unwrap();
    let changed = snapshot(&command_tx).await;
    assert_eq!(changed.assignment.slot2, Some(id("usb")));

    command_tx.send(Command::RebindStop).await.unwrap();
    assert_eq!(snapshot(&command_tx).await.binding, BindingState::ListeningForStopKey);
    key_tx.send(key(1)).unwrap();
    let rebound = snapshot(&command_tx).await;
    assert_eq!(rebound.stop_key, None);

    command_tx.send(Command::Quit).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("session did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_run_loop_survives_failed_commands() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let session = rig.session(InitialState::default());

    let (_key_tx, keys) = mpsc::unbounded_channel();
    let (_device_tx, devices) = broadcast::channel(4);
    let (command_tx, commands) = mpsc::channel(8);
    let running = tokio::spawn(session.run(keys, devices, commands));

    command_tx
        .send(Command::Play(TrackId::new("missing")))
        .await
        .unwrap();
    command_tx
        .send(Command::SelectOutput {
            slot: OutputSlot::Slot1,
            device: id("ghost"),
        })
        .await
        .unwrap();
    command_tx.send(Command::AddTrack(track("t1"))).await.unwrap();

    let snap = snapshot(&command_tx).await;
    assert_eq!(snap.tracks.len(), 1);
    assert_eq!(snap.assignment.slot1, Some(id("a")));

    drop(command_tx);
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("session did not stop")
        .unwrap();
}
