//! Integration tests for adaptive sources
//!
//! Verifies engine lifecycle and error classification as seen by the host.

mod common;

use common::{Harness, MockEngines};
use segue_playback::{
    EngineErrorType, EngineEvent, ErrorKind, PlaybackConfig, PlaybackEvent, PlaybackSource,
    PlaybackState, SinkEvent, SinkSlot,
};

const PLAYLIST: &str = "https://cdn.example/vod/master.m3u8";

fn fatal(kind: EngineErrorType, details: &str) -> EngineEvent {
    EngineEvent::Error {
        fatal: true,
        kind,
        details: details.to_string(),
    }
}

fn playing_adaptive() -> Harness {
    let mut h = Harness::new();
    h.session.play(PlaybackSource::adaptive(PLAYLIST)).unwrap();
    h.ready(SinkSlot::Primary, 120.0);
    assert_eq!(h.session.state(), PlaybackState::Playing);
    h
}

#[test]
fn engine_is_bound_to_primary_sink() {
    let h = playing_adaptive();

    let record = h.engines.record();
    assert_eq!(record.created.len(), 1);
    assert_eq!(record.options[0].max_load_retries, 3);
    assert_eq!(record.loaded, vec![PLAYLIST.to_string()]);
    drop(record);

    assert_eq!(h.primary.url().as_deref(), Some("blob:media-source"));
    assert_eq!(h.session.duration(), Some(120.0));
    assert_eq!(h.session.segment_index(), None);
}

#[test]
fn retry_budget_comes_from_config() {
    let config = PlaybackConfig {
        network_retry_budget: 7,
        ..Default::default()
    };
    let mut h = Harness::build(config, false, MockEngines::default());
    h.session.play(PlaybackSource::adaptive(PLAYLIST)).unwrap();

    assert_eq!(h.engines.record().options[0].max_load_retries, 7);
}

#[test]
fn native_playback_without_engine_support() {
    let mut h = Harness::build(PlaybackConfig::default(), false, MockEngines::unsupported());
    h.session.play(PlaybackSource::adaptive(PLAYLIST)).unwrap();

    assert!(h.engines.record().created.is_empty());
    assert_eq!(h.primary.url().as_deref(), Some(PLAYLIST));

    h.ready(SinkSlot::Primary, 60.0);
    assert_eq!(h.session.state(), PlaybackState::Playing);
}

#[test]
fn network_failure_is_reported_once() {
    let mut h = playing_adaptive();
    h.engine_event(fatal(EngineErrorType::Network, "manifestLoadError"));

    assert_eq!(h.session.state(), PlaybackState::Errored);
    assert_eq!(
        h.events.errors(),
        vec![(ErrorKind::Network, "manifestLoadError".to_string())]
    );
    assert_eq!(h.engines.record().destroyed, 1);
    assert_eq!(h.engines.record().live, 0);

    h.events.drain();

    // The engine is gone; its late reports and caller commands do nothing
    h.engine_event(fatal(EngineErrorType::Network, "manifestLoadError"));
    h.session.pause();
    h.session.seek(30.0);
    h.session.resume();

    assert!(h.events.drain().is_empty());
    assert_eq!(h.session.state(), PlaybackState::Errored);
}

#[test]
fn media_failures_are_classified() {
    let mut h = playing_adaptive();
    h.engine_event(fatal(EngineErrorType::Media, "bufferAppendError"));
    assert_eq!(h.session.error(), Some(ErrorKind::Media));

    let mut h = playing_adaptive();
    h.engine_event(fatal(EngineErrorType::Other, "internalException"));
    assert_eq!(h.session.error(), Some(ErrorKind::Media));

    let mut h = playing_adaptive();
    h.deliver(
        SinkSlot::Primary,
        SinkEvent::Error {
            message: "MEDIA_ERR_SRC_NOT_SUPPORTED".into(),
        },
    );
    assert_eq!(h.session.error(), Some(ErrorKind::Media));
}

#[test]
fn recoverable_conditions_never_escalate() {
    let mut h = playing_adaptive();

    h.engine_event(EngineEvent::Error {
        fatal: false,
        kind: EngineErrorType::Network,
        details: "fragLoadTimeOut".into(),
    });
    h.engine_event(EngineEvent::LevelSwitched { level: 2 });
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert_eq!(h.session.quality_level(), Some(2));

    h.deliver(SinkSlot::Primary, SinkEvent::Waiting);
    assert_eq!(h.session.state(), PlaybackState::Buffering);
    h.deliver(SinkSlot::Primary, SinkEvent::Playing);
    assert_eq!(h.session.state(), PlaybackState::Playing);

    assert!(h.events.errors().is_empty());
    assert!(h
        .events
        .snapshot()
        .contains(&PlaybackEvent::QualityChange { level: 2 }));
}

#[test]
fn replacing_source_destroys_engine_first() {
    let mut h = playing_adaptive();
    let old = h.engines.last_ticket();

    h.session
        .play(PlaybackSource::adaptive("https://cdn.example/other/master.m3u8"))
        .unwrap();

    let record = h.engines.record();
    assert_eq!(record.created.len(), 2);
    assert_eq!(record.destroyed, 1);
    assert_eq!(record.max_live, 1);
    drop(record);

    // Reports of the destroyed engine are dropped
    h.events.drain();
    h.session
        .handle_engine_event(old, EngineEvent::LevelSwitched { level: 4 });
    h.session
        .handle_engine_event(old, fatal(EngineErrorType::Network, "late"));
    assert!(h.events.drain().is_empty());
    assert_eq!(h.session.state(), PlaybackState::Loading);
}

#[test]
fn seek_before_ready_is_applied_on_first_frame() {
    let mut h = Harness::new();
    h.session.play(PlaybackSource::adaptive(PLAYLIST)).unwrap();
    h.session.seek(42.0);
    assert_eq!(h.session.current_time(), 42.0);

    h.ready(SinkSlot::Primary, 120.0);
    assert_eq!(h.primary.state().seeks, vec![42.0]);
}

#[test]
fn ended_then_resume_restarts() {
    let mut h = playing_adaptive();
    h.deliver(SinkSlot::Primary, SinkEvent::Ended);
    assert_eq!(h.session.state(), PlaybackState::Ended);

    h.session.pause();
    assert_eq!(h.session.state(), PlaybackState::Ended);
    h.events.drain();

    h.session.resume();
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert_eq!(h.events.states(), vec![PlaybackState::Playing]);
    assert_eq!(h.primary.state().seeks.last(), Some(&0.0));
    assert!(h.primary.state().playing);
}
