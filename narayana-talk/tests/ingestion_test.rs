//! Audio ingestion pipeline tests for narayana-talk

use narayana_talk::ingestion::{
    AudioFormat, DecodeOutcome, DecodePurpose, IngestionPipeline,
};
use narayana_talk::sim::{CallLog, DecodeBehavior, SimDecoder};
use narayana_talk::BridgeError;
use std::sync::Arc;

fn prepare(text: &str) -> DecodePurpose {
    DecodePurpose::Prepare {
        text: text.to_string(),
    }
}

fn pipeline(decoder: &SimDecoder, budget: u32) -> IngestionPipeline {
    IngestionPipeline::new(Arc::new(decoder.clone()), budget)
}

#[test]
fn test_no_pending_bytes_fails_without_decode() {
    let decoder = SimDecoder::new(CallLog::new());
    let mut pipeline = pipeline(&decoder, 300);

    let err = pipeline.begin(prepare(""), AudioFormat::Wav).unwrap_err();
    assert!(matches!(err, BridgeError::Resource(_)));
    assert_eq!(err.detail(), "No audio data pending");
    assert_eq!(decoder.decode_attempts(), 0);
    assert_eq!(pipeline.in_flight(), 0);
}

#[test]
fn test_start_failure_releases_resource() {
    let decoder = SimDecoder::new(CallLog::new());
    decoder.set_start_error(Some("decoder unavailable".to_string()));
    decoder.queue_audio(1.0);
    let mut pipeline = pipeline(&decoder, 300);

    assert!(pipeline.begin(prepare(""), AudioFormat::Wav).is_err());
    assert_eq!(decoder.acquired().len(), 1);
    assert_eq!(decoder.outstanding(), 0);
    assert_eq!(pipeline.in_flight(), 0);
}

#[test]
fn test_loaded_after_several_polls() {
    let log = CallLog::new();
    let decoder = SimDecoder::new(log.clone());
    decoder.set_behavior(DecodeBehavior::Succeed { after_polls: 3 });
    decoder.queue_audio(2.0);
    let mut pipeline = pipeline(&decoder, 300);

    pipeline.begin(prepare("hello"), AudioFormat::OggVorbis).unwrap();
    assert!(pipeline.poll().is_empty());
    assert!(pipeline.poll().is_empty());
    assert_eq!(decoder.outstanding(), 1);

    let mut completed = pipeline.poll();
    assert_eq!(completed.len(), 1);
    let done = completed.remove(0);
    assert_eq!(done.elapsed_ticks, 3);
    assert_eq!(done.format, AudioFormat::OggVorbis);
    assert_eq!(done.purpose, prepare("hello"));
    let audio = done.outcome.into_result().unwrap();
    assert_eq!(audio.duration_secs, 2.0);

    assert_eq!(decoder.outstanding(), 0);
    assert!(log.position("decoder.acquire ogg").unwrap() < log.position("decoder.release").unwrap());
}

#[test]
fn test_failed_status_aborts_immediately() {
    let decoder = SimDecoder::new(CallLog::new());
    decoder.set_behavior(DecodeBehavior::Fail("corrupt header".to_string()));
    decoder.queue_audio(1.0);
    let mut pipeline = pipeline(&decoder, 300);

    pipeline
        .begin(DecodePurpose::TimelineClip { clip_id: "intro".to_string() }, AudioFormat::Wav)
        .unwrap();
    let completed = pipeline.poll();

    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].elapsed_ticks, 1);
    assert_eq!(completed[0].purpose.method(), "LoadTimelineAudio");
    let err = completed[0].outcome.clone().into_result().unwrap_err();
    assert_eq!(err.detail(), "Audio decode failed: corrupt header");
    assert_eq!(decoder.outstanding(), 0);
}

#[test]
fn test_timeout_after_budget() {
    let decoder = SimDecoder::new(CallLog::new());
    decoder.set_behavior(DecodeBehavior::Hang);
    decoder.queue_audio(1.0);
    let mut pipeline = pipeline(&decoder, 300);

    pipeline.begin(prepare(""), AudioFormat::Wav).unwrap();
    for _ in 0..299 {
        assert!(pipeline.poll().is_empty());
    }
    assert_eq!(decoder.outstanding(), 1);

    let completed = pipeline.poll();
    assert_eq!(completed.len(), 1);
    assert!(matches!(completed[0].outcome, DecodeOutcome::TimedOut));
    assert_eq!(completed[0].elapsed_ticks, 300);
    assert_eq!(
        completed[0].outcome.clone().into_result().unwrap_err().detail(),
        "Audio decode timed out (state=Loading)"
    );
    assert_eq!(decoder.outstanding(), 0);
    assert_eq!(pipeline.in_flight(), 0);
    assert!(pipeline.poll().is_empty());
}

#[test]
fn test_concurrent_decodes_complete_independently() {
    let decoder = SimDecoder::new(CallLog::new());
    let mut pipeline = pipeline(&decoder, 300);

    decoder.set_behavior(DecodeBehavior::Succeed { after_polls: 2 });
    decoder.queue_audio(1.0);
    pipeline.begin(prepare("slow"), AudioFormat::Wav).unwrap();

    decoder.set_behavior(DecodeBehavior::Succeed { after_polls: 1 });
    decoder.queue_audio(0.5);
    pipeline.begin(prepare("fast"), AudioFormat::Mpeg).unwrap();
    assert_eq!(pipeline.in_flight(), 2);

    let first = pipeline.poll();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].purpose, prepare("fast"));

    let second = pipeline.poll();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].purpose, prepare("slow"));
    assert_eq!(decoder.outstanding(), 0);
}

#[test]
fn test_cancel_releases_everything() {
    let decoder = SimDecoder::new(CallLog::new());
    decoder.set_behavior(DecodeBehavior::Hang);
    decoder.queue_audio(1.0);
    decoder.queue_audio(1.0);
    let mut pipeline = pipeline(&decoder, 300);
    pipeline.begin(prepare(""), AudioFormat::Wav).unwrap();
    pipeline.begin(prepare(""), AudioFormat::Wav).unwrap();

    pipeline.cancel_all();
    assert_eq!(pipeline.in_flight(), 0);
    assert_eq!(decoder.released().len(), 2);
    assert_eq!(decoder.outstanding(), 0);
}

#[test]
fn test_unknown_format_still_reaches_decoder() {
    let log = CallLog::new();
    let decoder = SimDecoder::new(log.clone());
    decoder.queue_audio(1.0);
    let mut pipeline = pipeline(&decoder, 300);

    pipeline.begin(prepare(""), AudioFormat::from_name("flac")).unwrap();
    assert!(log.contains("decoder.start unknown"));
}
