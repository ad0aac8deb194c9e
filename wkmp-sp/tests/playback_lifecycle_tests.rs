//! Integration Test - Voice Lifecycle
//!
//! **Goal:** Verify play / pause / stop / end handling, looping, sprites and
//! the voice pool on both backends, driven by the paused tokio clock.

mod helpers;

use helpers::{advance, TestRig};
use wkmp_sp::{BackendKind, Command, EventKind, SoundDescriptor, Sprite};

#[tokio::test(start_paused = true)]
async fn test_one_shot_voice_ends_exactly_once() {
    let rig = TestRig::new();
    let (sound, mut log) = rig
        .loaded("shot.mp3", 1.0, SoundDescriptor::new(["shot.mp3"]))
        .await;
    assert_eq!(sound.backend(), BackendKind::Graph);

    let id = sound.play().expect("voice id");
    assert!(sound.voice_playing(id));

    advance(999).await;
    assert_eq!(log.count(EventKind::End), 0);

    advance(2).await;
    assert_eq!(log.count_for(EventKind::End, id), 1);
    assert!(!sound.voice_playing(id));

    advance(3000).await;
    assert_eq!(log.transport(), vec![EventKind::Play, EventKind::End]);
}

#[tokio::test(start_paused = true)]
async fn test_operations_before_load_replay_in_order() {
    let rig = TestRig::new();
    let (sound, mut log) = rig.sound("queued.mp3", 2.0, SoundDescriptor::new(["queued.mp3"]));

    let id = sound.play().expect("play before load still reserves a voice");
    sound.set_voice_volume(0.5, id);
    sound.mute_voice(true, id);
    assert_eq!(
        sound.queued(),
        vec![
            Command::Play { voice: id },
            Command::Volume {
                volume: 0.5,
                voice: Some(id)
            },
            Command::Mute {
                muted: true,
                voice: Some(id)
            },
        ]
    );

    advance(20).await;

    assert_eq!(
        log.kinds(),
        vec![
            EventKind::Load,
            EventKind::Play,
            EventKind::Volume,
            EventKind::Mute
        ]
    );
    assert!(sound.queued().is_empty());
    assert_eq!(sound.voice_volume(id), Some(0.5));
    assert_eq!(sound.voice_muted(id), Some(true));
    assert!(sound.voice_playing(id));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_keep_position() {
    let rig = TestRig::new();
    let (sound, mut log) = rig
        .loaded("long.mp3", 2.0, SoundDescriptor::new(["long.mp3"]))
        .await;

    let id = sound.play().expect("voice id");
    advance(500).await;
    sound.pause();
    let paused_at = sound.voice_seek(id).expect("voice exists");
    assert!((paused_at - 0.5).abs() < 1e-6, "paused at {}", paused_at);

    advance(1000).await;
    assert!((sound.voice_seek(id).unwrap() - 0.5).abs() < 1e-6);

    // The single paused voice resumes rather than starting a new one
    assert_eq!(sound.play(), Some(id));
    advance(1499).await;
    assert_eq!(log.count(EventKind::End), 0);
    advance(2).await;
    assert_eq!(log.count_for(EventKind::End, id), 1);
    assert_eq!(
        log.transport(),
        vec![
            EventKind::Play,
            EventKind::Pause,
            EventKind::Play,
            EventKind::End
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_rewinds_to_sprite_start() {
    let rig = TestRig::new();
    let descriptor = SoundDescriptor::new(["sprites.mp3"]).sprite("tail", Sprite::new(1000.0, 1000.0));
    let (sound, mut log) = rig.loaded("sprites.mp3", 3.0, descriptor).await;

    let id = sound.play_sprite("tail").expect("voice id");
    advance(300).await;
    assert!((sound.voice_seek(id).unwrap() - 1.3).abs() < 1e-6);

    sound.stop_voice(id);
    assert!(!sound.voice_playing(id));
    assert_eq!(sound.voice_seek(id), Some(1.0));
    assert_eq!(log.count_for(EventKind::Stop, id), 1);

    // A stopped voice never reports an end
    advance(2000).await;
    assert_eq!(log.count(EventKind::End), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_length_sprite_ends_immediately() {
    let rig = TestRig::new();
    let descriptor = SoundDescriptor::new(["blip.mp3"]).sprite("blip", Sprite::new(500.0, 0.0));
    let (sound, mut log) = rig.loaded("blip.mp3", 1.0, descriptor).await;

    let id = sound.play_sprite("blip").expect("voice id");

    assert!(!sound.voice_playing(id));
    assert_eq!(log.transport(), vec![EventKind::End]);
    assert_eq!(rig.platform.graph().unwrap().sources_started(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_seek_past_sprite_end_ends_on_play() {
    let rig = TestRig::new();
    let descriptor = SoundDescriptor::new(["hit.mp3"]).sprite("hit", Sprite::new(0.0, 500.0));
    let (sound, mut log) = rig.loaded("hit.mp3", 2.0, descriptor).await;

    let id = sound.play_sprite("hit").expect("voice id");
    advance(100).await;
    sound.pause_voice(id);
    sound.seek_voice(0.8, id);
    log.clear();

    sound.play_voice(id);
    assert!(!sound.voice_playing(id));
    assert_eq!(log.transport(), vec![EventKind::End]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_sprite_is_rejected_once_loaded() {
    let rig = TestRig::new();
    let (sound, mut log) = rig
        .loaded("plain.mp3", 1.0, SoundDescriptor::new(["plain.mp3"]))
        .await;

    assert_eq!(sound.play_sprite("nope"), None);
    assert!(log.events().is_empty());
    assert!(sound.sprites().contains(&"__default".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_graph_loop_ends_once_per_iteration() {
    let rig = TestRig::new();
    let descriptor = SoundDescriptor::new(["loop.mp3"]).looping(true);
    let (sound, mut log) = rig.loaded("loop.mp3", 1.0, descriptor).await;

    let id = sound.play().expect("voice id");
    advance(3500).await;

    assert_eq!(log.count_for(EventKind::End, id), 3);
    assert_eq!(log.count(EventKind::Play), 1);
    assert!(sound.voice_playing(id));
    assert_eq!(rig.platform.graph().unwrap().sources_started(), 1);

    sound.stop();
    advance(2000).await;
    assert_eq!(log.count(EventKind::End), 3);
    assert_eq!(log.count(EventKind::Stop), 1);
}

#[tokio::test(start_paused = true)]
async fn test_streaming_loop_restarts_element() {
    let rig = TestRig::streaming();
    let descriptor = SoundDescriptor::new(["loop.mp3"]).looping(true);
    let (sound, mut log) = rig.loaded("loop.mp3", 1.0, descriptor).await;
    assert_eq!(sound.backend(), BackendKind::Streaming);

    let id = sound.play().expect("voice id");
    advance(3500).await;

    assert_eq!(log.count_for(EventKind::End, id), 3);
    assert_eq!(log.count(EventKind::Play), 1);
    assert!(sound.voice_playing(id));

    let element = rig
        .platform
        .elements()
        .into_iter()
        .find(|e| e.plays() > 0)
        .expect("playing element");
    assert_eq!(element.plays(), 4);
    assert!((element.position() - 0.5).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_loop_sprite_loops_without_sound_loop_flag() {
    let rig = TestRig::new();
    let descriptor = SoundDescriptor::new(["hum.mp3"]).sprite("hum", Sprite::looping(1000.0, 500.0));
    let (sound, mut log) = rig.loaded("hum.mp3", 3.0, descriptor).await;

    let id = sound.play_sprite("hum").expect("voice id");
    advance(1600).await;

    assert_eq!(log.count_for(EventKind::End, id), 3);
    assert!(sound.voice_playing(id));
    let position = sound.voice_seek(id).unwrap();
    assert!((1.0..1.5).contains(&position), "position {}", position);
}

#[tokio::test(start_paused = true)]
async fn test_rate_change_rearms_end_timer() {
    let rig = TestRig::new();
    let (sound, mut log) = rig
        .loaded("rate.mp3", 2.0, SoundDescriptor::new(["rate.mp3"]))
        .await;

    let id = sound.play().expect("voice id");
    advance(500).await;
    sound.set_rate(2.0);
    assert_eq!(sound.voice_rate(id), Some(2.0));
    assert_eq!(sound.rate(), 2.0);

    // 1.5 s of clip left at double speed
    advance(740).await;
    assert_eq!(log.count(EventKind::End), 0);
    advance(20).await;
    assert_eq!(log.count_for(EventKind::End, id), 1);
    assert_eq!(
        log.transport(),
        vec![EventKind::Play, EventKind::Rate, EventKind::End]
    );
}

#[tokio::test(start_paused = true)]
async fn test_seek_while_playing_restarts_quietly() {
    let rig = TestRig::new();
    let (sound, mut log) = rig
        .loaded("seek.mp3", 2.0, SoundDescriptor::new(["seek.mp3"]))
        .await;

    let id = sound.play().expect("voice id");
    advance(200).await;
    sound.seek_voice(1.5, id);
    assert!(sound.voice_playing(id));

    advance(490).await;
    assert_eq!(log.count(EventKind::End), 0);
    advance(20).await;
    assert_eq!(
        log.transport(),
        vec![EventKind::Play, EventKind::Seek, EventKind::End]
    );
}

#[tokio::test(start_paused = true)]
async fn test_loop_flag_change_takes_effect_while_playing() {
    let rig = TestRig::new();
    let (sound, mut log) = rig
        .loaded("flag.mp3", 1.0, SoundDescriptor::new(["flag.mp3"]))
        .await;

    let id = sound.play().expect("voice id");
    advance(400).await;
    sound.set_voice_loop(true, id);
    assert_eq!(sound.voice_looping(id), Some(true));
    assert!(!sound.looping());

    advance(2000).await;
    assert_eq!(log.count_for(EventKind::End, id), 2);
    assert!(sound.voice_playing(id));
}

#[tokio::test(start_paused = true)]
async fn test_ended_voices_are_drained_to_pool_size() {
    let rig = TestRig::new();
    let descriptor = SoundDescriptor::new(["pool.mp3"]).pool(2);
    let (sound, _log) = rig.loaded("pool.mp3", 0.1, descriptor).await;

    let ids: Vec<_> = (0..6).map(|_| sound.play().expect("voice id")).collect();
    let mut unique = ids.clone();
    unique.dedup();
    assert_eq!(unique.len(), 6, "overlapping plays get distinct voices");
    assert_eq!(sound.voice_ids().len(), 6);

    advance(200).await;
    assert!(!sound.playing());

    let next = sound.play().expect("voice id");
    assert!(!ids.contains(&next), "recycled voices get fresh ids");
    assert_eq!(sound.voice_ids().len(), 2);
    assert_eq!(rig.platform.graph().unwrap().voice_gains().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_voice_ids_increase_across_sounds() {
    let rig = TestRig::new();
    let (first, _) = rig.loaded("a.mp3", 1.0, SoundDescriptor::new(["a.mp3"])).await;
    let (second, _) = rig.loaded("b.mp3", 1.0, SoundDescriptor::new(["b.mp3"])).await;

    let a = first.play().expect("voice id");
    let b = second.play().expect("voice id");
    assert!(b > a);
    assert!(a.get() > 1000);
}
