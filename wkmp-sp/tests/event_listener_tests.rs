//! Integration Test - Event Listeners
//!
//! **Goal:** Verify callback registration (`on`, `once`, per-voice filters,
//! `off`), that callbacks never run inside the triggering call, and that
//! callbacks may call back into the sound.

mod helpers;

use helpers::{advance, TestRig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wkmp_sp::{EventKind, Preload, Sound, SoundDescriptor, SoundEvent, VoiceId};

fn counter() -> (Arc<AtomicUsize>, impl Fn(&SoundEvent) + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    (hits, move |_: &SoundEvent| {
        h.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_run_after_the_triggering_call() {
    let rig = TestRig::new();
    let (sound, _log) = rig
        .loaded("tick.mp3", 1.0, SoundDescriptor::new(["tick.mp3"]))
        .await;
    let (plays, on_play) = counter();
    sound.on(EventKind::Play, on_play);

    sound.play().expect("voice id");
    assert_eq!(plays.load(Ordering::SeqCst), 0, "not inside play()");

    advance(1).await;
    assert_eq!(plays.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_descriptor_listeners_see_load() {
    let rig = TestRig::new();
    rig.platform.add_clip("boot.mp3", 1.0);
    let (loads, on_load) = counter();

    let _sound = Sound::new(
        &rig.ctx,
        SoundDescriptor::new(["boot.mp3"]).on(EventKind::Load, on_load),
    )
    .unwrap();
    advance(50).await;

    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_voice_filter_and_load_exception() {
    let rig = TestRig::new();
    rig.platform.add_clip("pair.mp3", 1.0);
    let sound = Sound::new(
        &rig.ctx,
        SoundDescriptor::new(["pair.mp3"]).preload(Preload::None),
    )
    .unwrap();

    let first = sound.play().expect("voice id");
    let second = sound.play_sprite("__default").expect("voice id");
    assert_ne!(first, second);

    let (ends, on_end) = counter();
    sound.on_voice(EventKind::End, second, on_end);
    // `load` reaches voice-bound listeners too
    let (loads, on_load) = counter();
    sound.on_voice(EventKind::Load, VoiceId::new(1), on_load);

    sound.load();
    advance(1_200).await;

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(ends.load(Ordering::SeqCst), 1, "only the second voice's end");
}

#[tokio::test(start_paused = true)]
async fn test_once_listener_fires_once() {
    let rig = TestRig::new();
    let (sound, _log) = rig
        .loaded("twice.mp3", 0.2, SoundDescriptor::new(["twice.mp3"]))
        .await;
    let (ends, on_end) = counter();
    sound.once(EventKind::End, on_end);

    sound.play().expect("voice id");
    advance(300).await;
    sound.play().expect("voice id");
    advance(300).await;

    assert_eq!(ends.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_off_removes_listeners() {
    let rig = TestRig::new();
    let (sound, _log) = rig
        .loaded("quiet.mp3", 1.0, SoundDescriptor::new(["quiet.mp3"]))
        .await;
    let (plays, on_play) = counter();
    let (stops, on_stop) = counter();
    sound.on(EventKind::Play, on_play);
    let stop_listener = sound.on(EventKind::Stop, on_stop);

    assert_eq!(sound.off(EventKind::Play), 1);
    assert!(sound.off_listener(stop_listener));
    assert!(!sound.off_listener(stop_listener));

    sound.play().expect("voice id");
    sound.stop();
    advance(10).await;

    assert_eq!(plays.load(Ordering::SeqCst), 0);
    assert_eq!(stops.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_listeners_fire_in_registration_order() {
    let rig = TestRig::new();
    let (sound, _log) = rig
        .loaded("order.mp3", 1.0, SoundDescriptor::new(["order.mp3"]))
        .await;
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        sound.on(EventKind::Play, move |_| order.lock().unwrap().push(name));
    }

    sound.play().expect("voice id");
    advance(1).await;

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test(start_paused = true)]
async fn test_end_listener_can_replay() {
    let rig = TestRig::new();
    let (sound, mut log) = rig
        .loaded("again.mp3", 1.0, SoundDescriptor::new(["again.mp3"]))
        .await;

    let replay = sound.clone();
    sound.once(EventKind::End, move |_| {
        replay.play();
    });

    sound.play().expect("voice id");
    advance(2_500).await;

    assert_eq!(
        log.transport(),
        vec![EventKind::Play, EventKind::End, EventKind::Play, EventKind::End]
    );
    assert!(!sound.playing());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_stop_dispatch() {
    let rig = TestRig::new();
    let (sound, _log) = rig
        .loaded("loud.mp3", 1.0, SoundDescriptor::new(["loud.mp3"]))
        .await;
    sound.once(EventKind::Play, |_| panic!("listener failure"));
    let (pauses, on_pause) = counter();
    sound.on(EventKind::Pause, on_pause);

    sound.play().expect("voice id");
    advance(1).await;
    sound.pause();
    advance(1).await;

    assert_eq!(pauses.load(Ordering::SeqCst), 1);
}
