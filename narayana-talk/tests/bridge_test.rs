//! Command dispatch and live playback tests for narayana-talk

mod common;

use common::{args, catalog_config, Harness};
use narayana_talk::engine::EngineEvent;
use narayana_talk::scene::{Background, Rgba};
use narayana_talk::sim::{CallLog, SimScene};
use narayana_talk::{AvatarEngine, PlaybackPhase};

fn prepared(id: &str) -> EngineEvent {
    EngineEvent::Prepared {
        cache_id: id.to_string(),
    }
}

#[test]
fn test_start_emits_ready() {
    let h = Harness::new();
    assert_eq!(h.host.methods(), vec!["OnBridgeReady"]);
    assert!(h.bridge.is_ready());
    assert_eq!(h.bridge.current_avatar_id(), Some("alice"));
    assert_eq!(h.bridge.generation(), Some(1));
    assert_eq!(h.alice().subscriber_count(), 1);
    assert!(h.log.contains("look.look_at_camera alice"));
}

#[test]
fn test_start_without_avatar_reports_error() {
    let log = CallLog::new();
    let mut h = Harness::unstarted(catalog_config(), SimScene::new(log.clone()), log);
    h.bridge.start();

    assert_eq!(h.errors(), vec![args(&["Start", "Avatar engine not found in scene"])]);
    assert_eq!(h.host.count("OnBridgeReady"), 0);
    assert!(!h.bridge.is_ready());
    assert_eq!(h.bridge.current_avatar_id(), None);
}

#[test]
fn test_start_instantiates_initial_avatar() {
    let log = CallLog::new();
    let mut config = catalog_config();
    config.initial_avatar = Some("bob".to_string());
    let mut h = Harness::unstarted(config, SimScene::new(log.clone()), log);
    h.bridge.start();

    assert_eq!(h.host.methods(), vec!["OnBridgeReady"]);
    assert_eq!(h.bridge.current_avatar_id(), Some("bob"));
    assert!(h.log.contains("scene.instantiate bob"));
}

#[test]
fn test_prepare_audio_without_pending_bytes() {
    let mut h = Harness::new();
    h.handle("PrepareAudio", r#"{"format":"wav"}"#);

    assert_eq!(h.errors(), vec![args(&["PrepareAudio", "No audio data pending"])]);
    assert_eq!(h.decoder.decode_attempts(), 0);
    assert_eq!(h.bridge.decodes_in_flight(), 0);
}

#[test]
fn test_prepare_audio_round_trip() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.queue_id("c1");
    h.decoder.queue_audio(1.0);

    h.handle("PrepareAudio", r#"{"format":"mp3","text":"hello"}"#);
    assert!(h.log.contains("decoder.acquire mp3"));
    assert_eq!(h.bridge.decodes_in_flight(), 1);

    h.tick(1);
    assert!(h.log.contains("alice.prepare_speech_motion 1.00s"));
    assert_eq!(h.decoder.outstanding(), 0);
    assert_eq!(h.host.count("OnPrepared"), 0);

    alice.emit(prepared("c1"));
    h.tick(1);
    assert_eq!(h.host.args_of("OnPrepared"), vec![args(&["c1"])]);
    assert!(h.errors().is_empty());
    assert_eq!(alice.cached_ids(), vec!["c1"]);
}

#[test]
fn test_prepare_audio_engine_failure() {
    let mut h = Harness::new();
    h.alice().set_prepare_error(Some("engine busy".to_string()));
    h.decoder.queue_audio(0.5);

    h.handle("PrepareAudio", "{}");
    h.tick(1);

    assert_eq!(
        h.errors(),
        vec![args(&["PrepareAudio", "PrepareSpeechMotion failed: engine busy"])]
    );
    assert_eq!(h.decoder.outstanding(), 0);
}

#[test]
fn test_play_success_and_completion_delay() {
    let mut h = Harness::new();
    let alice = h.alice();

    h.handle("Play", r#"{"cacheId":"c1","playAudio":true}"#);
    assert_eq!(h.host.args_of("OnPlaybackStarted"), vec![args(&["c1"])]);
    assert_eq!(h.bridge.current_playing_id(), Some("c1"));
    assert_eq!(alice.plays(), vec![("c1".to_string(), true)]);

    alice.speak_sentences("c1", &["one", "two"]);
    h.tick(1);
    assert_eq!(
        h.methods_after_ready(),
        vec![
            "OnPlaybackStarted",
            "OnSentenceStarted",
            "OnSentenceEnded",
            "OnSentenceStarted",
            "OnSentenceEnded",
        ]
    );
    assert_eq!(
        h.bridge.playback_phase(),
        Some(PlaybackPhase::Completing { ticks_left: 2 })
    );

    h.tick(1);
    assert_eq!(h.host.count("OnPlaybackCompleted"), 0);
    h.tick(1);
    assert_eq!(h.host.args_of("OnPlaybackCompleted"), vec![args(&["c1"])]);
    assert_eq!(h.bridge.current_playing_id(), None);

    h.tick(10);
    assert_eq!(h.host.count("OnPlaybackCompleted"), 1);
    assert_eq!(h.host.count("OnPlaybackStarted"), 1);
}

#[test]
fn test_play_failure_keeps_current_id() {
    let mut h = Harness::new();
    h.handle("Play", r#"{"cacheId":"first"}"#);

    h.alice().set_play_result(false);
    h.handle("Play", r#"{"cacheId":"abc","playAudio":true}"#);

    assert_eq!(h.errors(), vec![args(&["Play", "PlayPrepared failed for cacheId: abc"])]);
    assert_eq!(h.bridge.current_playing_id(), Some("first"));
    assert_eq!(h.host.count("OnPlaybackStarted"), 1);
}

#[test]
fn test_play_requires_cache_id() {
    let mut h = Harness::new();
    h.handle("Play", r#"{"playAudio":true}"#);

    assert_eq!(h.errors(), vec![args(&["Play", "No cacheId provided"])]);
    assert!(h.alice().plays().is_empty());
}

#[test]
fn test_speak_first_sentence_starts_playback_once() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.queue_id("R");

    h.handle("Speak", r#"{"text":"hello","prepareOnly":false,"playAudio":true}"#);
    assert_eq!(h.bridge.current_playing_id(), Some("R"));
    assert_eq!(h.bridge.playback_phase(), Some(PlaybackPhase::RequestSent));
    assert!(h.log.contains("alice.start_speak play_audio=true"));
    assert_eq!(h.host.count("OnPlaybackStarted"), 0);

    alice.emit(EngineEvent::RequestSent {
        request_id: "R".to_string(),
    });
    alice.emit(EngineEvent::ResponseReceived {
        cache_id: "R".to_string(),
    });
    for text in ["hello", "again"] {
        alice.emit(EngineEvent::SentenceStarted {
            id: "R".to_string(),
            text: text.to_string(),
            is_first: true,
        });
    }
    h.tick(1);

    assert_eq!(
        h.methods_after_ready(),
        vec![
            "OnRequestSent",
            "OnResponseReceived",
            "OnPlaybackStarted",
            "OnSentenceStarted",
            "OnSentenceStarted",
        ]
    );
    assert_eq!(h.host.args_of("OnPlaybackStarted"), vec![args(&["R"])]);
    assert_eq!(h.bridge.playback_phase(), Some(PlaybackPhase::Playing));
}

#[test]
fn test_last_sentence_without_first_still_starts_playback() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.queue_id("R");

    h.handle("Speak", r#"{"text":"hello"}"#);
    alice.emit(EngineEvent::SentenceEnded {
        id: "R".to_string(),
        text: "hello".to_string(),
        is_last: true,
    });
    h.tick(4);

    assert_eq!(
        h.methods_after_ready(),
        vec!["OnPlaybackStarted", "OnSentenceEnded", "OnPlaybackCompleted"]
    );
    assert_eq!(h.host.args_of("OnPlaybackStarted"), vec![args(&["R"])]);
    assert_eq!(h.host.args_of("OnPlaybackCompleted"), vec![args(&["R"])]);
    assert_eq!(h.bridge.current_playing_id(), None);
}

#[test]
fn test_chat_with_responsive_engine() {
    let mut h = Harness::new();
    h.scene.set_auto_respond(true);
    h.alice().queue_id("R1");

    h.handle("Chat", r#"{"text":"hi there"}"#);
    h.tick(3);

    assert_eq!(
        h.methods_after_ready(),
        vec![
            "OnRequestSent",
            "OnResponseReceived",
            "OnPlaybackStarted",
            "OnSentenceStarted",
            "OnSubtitleStarted",
            "OnSubtitleEnded",
            "OnSentenceEnded",
            "OnPlaybackCompleted",
        ]
    );
    assert_eq!(h.host.last("OnSubtitleStarted"), Some(args(&["hi there"])));
    assert_eq!(h.host.last("OnPlaybackCompleted"), Some(args(&["R1"])));
}

#[test]
fn test_speak_subtitle_override() {
    let mut h = Harness::new();
    h.scene.set_auto_respond(true);

    h.handle("Speak", r#"{"text":"konnichiwa","subtitle":"hello"}"#);
    h.tick(1);

    assert_eq!(h.host.args_of("OnSubtitleStarted"), vec![args(&["hello"])]);
    assert_eq!(h.host.args_of("OnSentenceStarted"), vec![args(&["konnichiwa"])]);
}

#[test]
fn test_talk_without_request_id() {
    let mut h = Harness::new();
    h.alice().set_refuse_requests(true);

    h.handle("Chat", r#"{"text":"hi"}"#);
    h.handle("Speak", r#"{"text":"hi","prepareOnly":true}"#);

    assert_eq!(
        h.errors(),
        vec![
            args(&["Chat", "Chat returned no request id"]),
            args(&["Speak", "Speak returned no cache id"]),
        ]
    );
    assert_eq!(h.bridge.current_playing_id(), None);
}

#[test]
fn test_talk_requires_text() {
    let mut h = Harness::new();
    h.handle("Chat", r#"{"text":"   "}"#);
    h.handle("Speak", "");

    assert_eq!(
        h.errors(),
        vec![args(&["Chat", "No text provided"]), args(&["Speak", "No text provided"])]
    );
}

#[test]
fn test_prepare_only_never_autoplays() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.queue_id("p1");

    h.handle("Speak", r#"{"text":"later","prepareOnly":true}"#);
    alice.emit(prepared("p1"));
    h.tick(5);

    assert_eq!(h.methods_after_ready(), vec!["OnPrepared"]);
    assert!(alice.plays().is_empty());
    assert_eq!(h.bridge.current_playing_id(), None);
}

#[test]
fn test_prepare_then_autoplay() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.queue_id("a1");

    h.handle("Chat", r#"{"text":"hi","stream":false,"playAudio":false}"#);
    assert_eq!(h.bridge.current_playing_id(), None);

    alice.emit(prepared("a1"));
    h.tick(1);

    assert_eq!(h.methods_after_ready(), vec!["OnPrepared", "OnPlaybackStarted"]);
    assert_eq!(alice.plays(), vec![("a1".to_string(), false)]);
    assert_eq!(h.bridge.current_playing_id(), Some("a1"));
}

#[test]
fn test_autoplay_failure_reports_play_error() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.queue_id("a1");
    alice.set_play_result(false);

    h.handle("Speak", r#"{"text":"hi","stream":false}"#);
    alice.emit(prepared("a1"));
    h.tick(1);

    assert_eq!(h.host.args_of("OnPrepared"), vec![args(&["a1"])]);
    assert_eq!(h.errors(), vec![args(&["Play", "PlayPrepared failed for cacheId: a1"])]);
    assert_eq!(h.bridge.current_playing_id(), None);
}

#[test]
fn test_prepare_failed_discards_autoplay() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.queue_id("a1");

    h.handle("Chat", r#"{"text":"hi","stream":false}"#);
    alice.emit(EngineEvent::PrepareFailed {
        cache_id: "a1".to_string(),
        error: "tts down".to_string(),
    });
    h.tick(1);

    assert_eq!(h.host.args_of("OnPrepareFailed"), vec![args(&["a1", "tts down"])]);
    assert_eq!(h.host.count("OnPrepared"), 0);
    assert!(alice.plays().is_empty());
}

#[test]
fn test_unknown_callback_ids_are_forwarded() {
    let mut h = Harness::new();
    h.alice().emit(prepared("mystery"));
    h.tick(1);

    assert_eq!(h.host.args_of("OnPrepared"), vec![args(&["mystery"])]);
    assert!(h.errors().is_empty());
}

#[test]
fn test_stop_ignores_late_completion() {
    let mut h = Harness::new();
    let alice = h.alice();
    h.handle("Play", r#"{"cacheId":"c1"}"#);

    h.handle("Stop", "");
    assert_eq!(h.bridge.current_playing_id(), None);
    assert!(h.log.contains("alice.stop"));

    alice.speak_sentences("c1", &["trailing"]);
    h.tick(5);
    assert_eq!(h.host.count("OnPlaybackCompleted"), 0);
    assert!(h.errors().is_empty());
}

#[test]
fn test_stop_while_completing() {
    let mut h = Harness::new();
    let alice = h.alice();
    h.handle("Play", r#"{"cacheId":"c1"}"#);
    alice.speak_sentences("c1", &["only"]);
    h.tick(1);
    assert!(matches!(
        h.bridge.playback_phase(),
        Some(PlaybackPhase::Completing { .. })
    ));

    h.handle("Stop", "");
    h.tick(5);
    assert_eq!(h.host.count("OnPlaybackCompleted"), 0);
}

#[test]
fn test_new_playback_supersedes_old_completion() {
    let mut h = Harness::new();
    let alice = h.alice();
    h.handle("Play", r#"{"cacheId":"c1"}"#);
    h.handle("Play", r#"{"cacheId":"c2"}"#);

    alice.speak_sentences("c1", &["old"]);
    h.tick(5);
    assert_eq!(h.host.count("OnPlaybackCompleted"), 0);
    assert_eq!(h.bridge.current_playing_id(), Some("c2"));
}

#[test]
fn test_set_volume_forms() {
    let mut h = Harness::new();
    h.handle("SetVolume", "0.5");
    assert_eq!(h.bridge.volume(), Some(0.5));
    h.handle("SetVolume", r#"{"volume":0.25}"#);
    h.handle("SetVolume", "1.5");

    assert_eq!(
        h.host.args_of("OnVolumeChanged"),
        vec![args(&["0.5"]), args(&["0.25"]), args(&["1"])]
    );
    assert_eq!(h.bridge.volume(), Some(1.0));
}

#[test]
fn test_set_volume_rejects_garbage() {
    let mut h = Harness::new();
    h.handle("SetVolume", "loud");

    assert_eq!(h.errors(), vec![args(&["SetVolume", "Invalid volume value: loud"])]);
    assert_eq!(h.host.count("OnVolumeChanged"), 0);
    assert_eq!(h.bridge.volume(), Some(1.0));
}

#[test]
fn test_cache_info_and_clear() {
    let mut h = Harness::new();
    let alice = h.alice();
    alice.insert_cached("a");
    alice.insert_cached("b");

    h.handle("GetCacheInfo", "");
    h.handle("ClearAllCache", "");
    alice.insert_cached("c");
    h.handle("ClearCache", "");

    assert_eq!(
        h.host.args_of("OnCacheInfo"),
        vec![
            args(&[r#"{"count":2,"ids":["a","b"]}"#]),
            args(&[r#"{"count":0,"ids":[]}"#]),
            args(&[r#"{"count":0,"ids":[]}"#]),
        ]
    );
    assert!(h.log.contains("alice.clear_cache *"));
}

#[test]
fn test_avatar_list() {
    let mut h = Harness::new();
    h.handle("GetAvatarList", "");

    assert_eq!(
        h.host.last("OnAvatarList"),
        Some(args(&[r#"{"avatarIds":["alice","bob","carol"],"currentAvatarId":"alice"}"#]))
    );
}

#[test]
fn test_background_color() {
    let mut h = Harness::new();
    h.handle("SetBackgroundColor", "#ff0000");
    assert_eq!(
        h.scene.background(),
        Some(Background::Solid(Rgba { r: 255, g: 0, b: 0, a: 255 }))
    );

    h.handle("SetBackgroundColor", r#"{"color":"transparent"}"#);
    assert_eq!(h.scene.background(), Some(Background::Transparent));

    h.handle("SetBackgroundColor", "nope");
    assert_eq!(h.errors(), vec![args(&["SetBackgroundColor", "Invalid color value: nope"])]);
    assert_eq!(h.scene.background(), Some(Background::Transparent));
}

#[test]
fn test_background_without_camera() {
    let mut h = Harness::new();
    h.scene.set_has_camera(false);
    h.handle("SetBackgroundColor", "\"#000\"");

    assert_eq!(h.errors(), vec![args(&["SetBackgroundColor", "Main camera not found"])]);
}

#[test]
fn test_unknown_method() {
    let mut h = Harness::new();
    h.handle("Dance", "{}");
    assert_eq!(h.errors(), vec![args(&["Dance", "Unknown method"])]);
}

#[test]
fn test_shutdown_revokes_subscription() {
    let mut h = Harness::new();
    let alice = h.alice();
    h.handle("Play", r#"{"cacheId":"c1"}"#);

    h.bridge.shutdown();
    assert!(!h.bridge.is_ready());
    assert_eq!(alice.subscriber_count(), 0);
    assert_eq!(alice.revoked_count(), 1);
    assert_eq!(h.bridge.current_playing_id(), None);

    h.bridge.shutdown();
    assert_eq!(alice.revoked_count(), 1);
}
