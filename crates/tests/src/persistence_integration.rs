//! Saving a session and starting a new one from what was saved

use crate::support::Rig;
use soundboard_core::domain::{
    Command, ConfigManager, InitialState, KeyAction, KeyCode, KeyEvent, Persister, SoundboardConfig,
    TrackId, TrackImporter, TrackSource, TrackStore,
};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc, oneshot};

async fn restore(dir: &TempDir) -> (SoundboardConfig, InitialState, TrackStore) {
    let manager = ConfigManager::new(dir.path().to_path_buf());
    let config = manager.load().await;
    let store = TrackStore::beside(&manager);
    let initial = InitialState {
        assignment: config.outputs.clone(),
        tracks: store.load_tracks(&config.tracks),
        stop_key: config.stop_key,
        escape: config.app.escape_key,
    };
    (config, initial, store)
}

#[tokio::test]
async fn test_session_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let sound = dir.path().join("airhorn.wav");
    std::fs::write(&sound, b"RIFF fake wave").unwrap();

    let rig = Rig::new(&[("default", "Speakers"), ("cable", "CABLE Input")], Some("default"));

    // first run: import, bind, choose a stop key
    let (config, initial, store) = restore(&dir).await;
    let importer = TrackImporter::new(config.app.import_policy());
    let mut session = rig.session(initial);
    let persister = Persister::new(ConfigManager::new(dir.path().to_path_buf()), store, config);
    let persisting = tokio::spawn(persister.run(session.journal()));

    let (key_tx, keys) = mpsc::unbounded_channel();
    let (_device_tx, devices) = broadcast::channel(4);
    let (command_tx, commands) = mpsc::channel(8);
    let running = tokio::spawn(session.run(keys, devices, commands));

    let track = importer.import(&sound).await.unwrap();
    let track_id = track.id.clone();
    command_tx.send(Command::AddTrack(track)).await.unwrap();

    command_tx
        .send(Command::RebindTrack(track_id.clone()))
        .await
        .unwrap();
    barrier(&command_tx).await;
    key_tx.send(KeyEvent::new(KeyCode::new(30))).unwrap();
    barrier(&command_tx).await;

    command_tx.send(Command::RebindStop).await.unwrap();
    barrier(&command_tx).await;
    key_tx.send(KeyEvent::new(KeyCode::new(57))).unwrap();
    barrier(&command_tx).await;

    command_tx.send(Command::Quit).await.unwrap();
    running.await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), persisting)
        .await
        .expect("persister did not stop")
        .unwrap();

    // the original file is no longer needed
    std::fs::remove_file(&sound).unwrap();

    // second run
    let (config, initial, _store) = restore(&dir).await;
    assert_eq!(config.stop_key, Some(KeyCode::new(57)));
    assert_eq!(config.outputs.slot2.as_ref().map(|d| d.as_str()), Some("cable"));
    assert_eq!(initial.tracks.len(), 1);
    assert_eq!(initial.tracks[0].id, track_id);
    assert_eq!(initial.tracks[0].name, "airhorn.wav");
    assert_eq!(initial.tracks[0].keycode, Some(KeyCode::new(30)));
    match &initial.tracks[0].source {
        TrackSource::File(path) => assert_eq!(std::fs::read(path).unwrap(), b"RIFF fake wave"),
        other => panic!("unexpected source {:?}", other),
    }

    let mut session = rig.session(initial);
    session.refresh_devices().await.unwrap();
    assert_eq!(
        session.handle_key(KeyEvent::new(KeyCode::new(30))),
        KeyAction::Play(track_id)
    );
    assert_eq!(session.settle().await[0].1.as_ref().unwrap().started(), 2);
}

#[tokio::test]
async fn test_removed_track_is_forgotten() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new(&[("a", "A")], Some("a"));

    let (config, initial, store) = restore(&dir).await;
    let mut session = rig.session(initial);
    let mut updates = session.journal();
    let mut persister = Persister::new(ConfigManager::new(dir.path().to_path_buf()), store.clone(), config);

    let track = crate::support::track("_keepme01");
    session.add_track(track.clone()).unwrap();
    session.add_track(crate::support::track("_dropme01")).unwrap();
    session.remove_track(&TrackId::new("_dropme01")).unwrap();

    while let Ok(update) = updates.try_recv() {
        persister.apply(&update).await.unwrap();
    }

    let (config, initial, _) = restore(&dir).await;
    assert_eq!(config.tracks.len(), 1);
    assert_eq!(initial.tracks[0].id, track.id);
    assert!(!store.path(&TrackId::new("_dropme01")).exists());
}

#[tokio::test]
async fn test_large_import_keeps_every_track() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new(&[("a", "A")], Some("a"));

    let (config, initial, store) = restore(&dir).await;
    let mut session = rig.session(initial);
    let mut updates = session.journal();
    let mut persister = Persister::new(ConfigManager::new(dir.path().to_path_buf()), store, config);

    // more additions than a broadcast subscriber could hold
    for n in 0..100 {
        session
            .add_track(crate::support::track(&format!("_bulk{:05}", n)))
            .unwrap();
    }

    while let Ok(update) = updates.try_recv() {
        persister.apply(&update).await.unwrap();
    }

    let (config, initial, _) = restore(&dir).await;
    assert_eq!(config.tracks.len(), 100);
    assert_eq!(initial.tracks.len(), 100);
    assert_eq!(initial.tracks[99].id, TrackId::new("_bulk00099"));
}

#[tokio::test]
async fn test_journal_closes_with_session() {
    let rig = Rig::new(&[("a", "A")], Some("a"));
    let mut session = rig.session(InitialState::default());
    let mut updates = session.journal();

    session.add_track(crate::support::track("_last0001")).unwrap();
    drop(session);

    assert!(updates.recv().await.is_some());
    assert!(updates.recv().await.is_none());
}

async fn barrier(commands: &mpsc::Sender<Command>) {
    let (reply, done) = oneshot::channel();
    commands.send(Command::Snapshot(reply)).await.unwrap();
    done.await.unwrap();
}
