//! Integration Test - Loading and Load Failures
//!
//! **Goal:** Verify source resolution, inline sources, the streaming fallback
//! after network failures, and `loaderror` reporting for status, decode,
//! codec and element failures.

mod helpers;

use helpers::{advance, EventLog, TestRig};
use wkmp_sp::backend::virtual_device::VirtualClip;
use wkmp_sp::backend::VirtualPlatform;
use wkmp_sp::{BackendKind, EventKind, LoadState, Preload, Sound, SoundDescriptor};

#[tokio::test(start_paused = true)]
async fn test_first_playable_source_is_chosen() {
    let rig = TestRig::new();
    rig.platform.set_codecs(&["mp3"]);
    rig.platform.add_clip("music.mp3", 2.0);

    let sound = Sound::new(
        &rig.ctx,
        SoundDescriptor::new(["music.webm", "music.mp3"]),
    )
    .unwrap();
    advance(50).await;

    assert_eq!(sound.state(), LoadState::Loaded);
    assert_eq!(sound.source().unwrap().url, "music.mp3");
    assert_eq!(sound.duration(), 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_inline_source_needs_no_fetch() {
    let rig = TestRig::new();
    let src = VirtualPlatform::inline_source("wav", 0.5);

    let sound = Sound::new(&rig.ctx, SoundDescriptor::new([src])).unwrap();
    let mut log = EventLog::new(&sound);
    advance(50).await;

    assert_eq!(log.count(EventKind::Load), 1);
    assert_eq!(sound.duration(), 0.5);
    assert_eq!(rig.platform.fetch_count(), 0);
    assert_eq!(rig.platform.decode_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_falls_back_to_streaming() {
    let rig = TestRig::new();
    rig.platform.add_clip("net.mp3", 2.0);
    rig.platform.set_network_down(true);

    let sound = Sound::new(&rig.ctx, SoundDescriptor::new(["net.mp3"])).unwrap();
    let mut log = EventLog::new(&sound);
    let id = sound.play().expect("voice id");

    advance(100).await;

    assert_eq!(sound.backend(), BackendKind::Streaming);
    assert_eq!(sound.state(), LoadState::Loaded);
    assert_eq!(log.count(EventKind::LoadError), 0);
    assert_eq!(log.count_for(EventKind::Play, id), 1, "voice id survives the fallback");
    assert!(sound.voice_playing(id));
    assert_eq!(sound.duration(), 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_http_status_reports_loaderror() {
    let rig = TestRig::new();
    rig.platform.add_clip_with(
        "gone.mp3",
        VirtualClip {
            status: Some(500),
            ..VirtualClip::new(1.0)
        },
    );

    let sound = Sound::new(&rig.ctx, SoundDescriptor::new(["gone.mp3"])).unwrap();
    let mut log = EventLog::new(&sound);
    advance(50).await;

    let event = log.last(EventKind::LoadError).expect("loaderror");
    assert_eq!(event.code, Some(500));
    assert_eq!(
        event.message.as_deref(),
        Some("Failed loading audio file with status: 500.")
    );
    assert_eq!(sound.state(), LoadState::Unloaded);
    assert_eq!(sound.backend(), BackendKind::Graph, "status errors never fall back");
    assert_eq!(rig.ctx.cache().refs("gone.mp3"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_load_can_be_retried_after_failure() {
    let rig = TestRig::new();
    rig.platform.add_clip_with(
        "flaky.mp3",
        VirtualClip {
            status: Some(503),
            ..VirtualClip::new(1.0)
        },
    );
    let sound = Sound::new(&rig.ctx, SoundDescriptor::new(["flaky.mp3"])).unwrap();
    let mut log = EventLog::new(&sound);
    advance(50).await;
    assert_eq!(log.count(EventKind::LoadError), 1);

    rig.platform.add_clip("flaky.mp3", 1.0);
    sound.load();
    advance(50).await;

    assert_eq!(log.count(EventKind::Load), 1);
    assert_eq!(sound.state(), LoadState::Loaded);
    assert_eq!(rig.platform.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_data_reports_loaderror() {
    let rig = TestRig::new();
    rig.platform.add_clip_with(
        "junk.mp3",
        VirtualClip {
            corrupt: true,
            ..VirtualClip::new(1.0)
        },
    );

    let sound = Sound::new(&rig.ctx, SoundDescriptor::new(["junk.mp3"])).unwrap();
    let mut log = EventLog::new(&sound);
    advance(50).await;

    let event = log.last(EventKind::LoadError).expect("loaderror");
    assert_eq!(event.code, None);
    assert!(event.message.is_some());
    assert_eq!(sound.state(), LoadState::Unloaded);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_codecs_report_loaderror() {
    let rig = TestRig::new();
    let descriptor = SoundDescriptor::new(["track.xyz", "track.abc"]).preload(Preload::None);
    let sound = Sound::new(&rig.ctx, descriptor).unwrap();
    let mut log = EventLog::new(&sound);
    assert_eq!(sound.state(), LoadState::Unloaded);

    sound.load();

    assert_eq!(log.count(EventKind::LoadError), 1);
    assert_eq!(sound.state(), LoadState::Unloaded);
    assert!(sound.source().is_none());
    assert_eq!(rig.platform.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_streaming_element_error_reports_code() {
    let rig = TestRig::streaming();
    let sound = Sound::new(&rig.ctx, SoundDescriptor::new(["missing.mp3"])).unwrap();
    let mut log = EventLog::new(&sound);
    advance(50).await;

    let event = log.last(EventKind::LoadError).expect("loaderror");
    assert_eq!(event.code, Some(4));
    assert!(event.voice.is_some());
    assert_eq!(sound.state(), LoadState::Unloaded);
}

#[tokio::test(start_paused = true)]
async fn test_streaming_duration_rounds_up() {
    let rig = TestRig::streaming();
    let (sound, _log) = rig
        .loaded("odd.mp3", 1.23, SoundDescriptor::new(["odd.mp3"]))
        .await;
    assert_eq!(sound.duration(), 1.3);
}

#[tokio::test(start_paused = true)]
async fn test_preload_none_defers_loading() {
    let rig = TestRig::new();
    rig.platform.add_clip("lazy.mp3", 1.0);
    let descriptor = SoundDescriptor::new(["lazy.mp3"]).preload(Preload::None);
    let sound = Sound::new(&rig.ctx, descriptor).unwrap();
    let mut log = EventLog::new(&sound);

    let id = sound.play().expect("voice id");
    advance(100).await;
    assert_eq!(sound.state(), LoadState::Unloaded);
    assert_eq!(rig.platform.fetch_count(), 0);

    sound.load();
    advance(50).await;
    assert_eq!(log.count_for(EventKind::Play, id), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_descriptors_are_rejected() {
    let rig = TestRig::new();
    let no_sources: [&str; 0] = [];

    let rejected = [
        SoundDescriptor::new(no_sources),
        SoundDescriptor::new(["loud.mp3"]).volume(1.5),
        SoundDescriptor::new(["fast.mp3"]).rate(0.0),
    ];
    for descriptor in rejected {
        let result = Sound::new(&rig.ctx, descriptor);
        assert!(matches!(result, Err(wkmp_sp::Error::Config(_))));
    }
    assert!(rig.ctx.sounds().is_empty());
}
