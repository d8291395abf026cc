//! Real decoding feeding the multiplexer

use crate::support::{init_tracing, MockEnumerator, MockSink};
use soundboard_core::domain::{
    InitialState, KeyAction, KeyCode, KeyEvent, Session, SessionParts, Track, TrackId, TrackSource,
};
use soundboard_infra::audio::{convert_for_device, SymphoniaDecoder};
use soundboard_infra::input::key_name;
use std::sync::Arc;

/// Mono 16-bit PCM wav
fn wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[tokio::test]
async fn test_wav_track_plays_on_both_outputs() {
    init_tracing();
    let enumerator = MockEnumerator::with_devices(&[("a", "A"), ("b", "CABLE Input")], Some("a"));
    let sink = MockSink::new();
    let bytes = wav(&[0, 8192, 16384, 8192, 0, -8192], 16000);
    let track = Track::new(TrackId::new("_wav"), "blip.wav", TrackSource::Memory(bytes.into()))
        .with_keycode(KeyCode::new(30));

    let mut session = Session::new(
        SessionParts {
            enumerator,
            decoder: Arc::new(SymphoniaDecoder::new()),
            sink: sink.clone(),
        },
        InitialState {
            tracks: vec![track],
            ..InitialState::default()
        },
    );
    session.refresh_devices().await.unwrap();

    assert_eq!(key_name(KeyCode::new(30)), "A");
    assert_eq!(
        session.handle_key(KeyEvent::new(KeyCode::new(30))),
        KeyAction::Play(TrackId::new("_wav"))
    );

    let results = session.settle().await;
    assert_eq!(results[0].1.as_ref().unwrap().started(), 2);
    assert_eq!(sink.live(), 2);
}

#[tokio::test]
async fn test_decoded_audio_converts_for_stereo_48k() {
    let bytes = wav(&[16384; 160], 16000);
    let audio = SymphoniaDecoder::decode_blocking(&TrackSource::Memory(bytes.into()), Some("wav"))
        .unwrap();
    assert_eq!(audio.channels(), 1);
    assert_eq!(audio.sample_rate(), 16000);

    let converted = convert_for_device(&audio, 2, 48000).unwrap();

    // three times the frames, two channels each
    let frames = converted.len() / 2;
    assert!((480..=481).contains(&frames), "got {} frames", frames);
    assert!(converted.iter().all(|s| (s - 0.5).abs() < 1e-3));
}
