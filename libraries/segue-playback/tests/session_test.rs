//! Integration tests for the session lifecycle
//!
//! Source replacement, disposal, rate policy and the command surface.

mod common;

use common::{Harness, MockSink};
use segue_playback::{
    Callbacks, EventLog, PlaybackCommand, PlaybackConfig, PlaybackError, PlaybackHandle,
    PlaybackSession, PlaybackSource, PlaybackState, SegmentDescriptor, SinkEvent, SinkSlot,
};
use std::sync::{Arc, Mutex};

fn two_segments() -> PlaybackSource {
    PlaybackSource::sequential([
        SegmentDescriptor::with_hint("a.mp4", 10.0),
        SegmentDescriptor::with_hint("b.mp4", 10.0),
    ])
}

#[test]
fn replay_drops_events_of_previous_source() {
    let mut h = Harness::without_preload();
    h.session.play(two_segments()).unwrap();
    h.ready(SinkSlot::Primary, 10.0);
    h.play_until(SinkSlot::Primary, 10.0);
    let stale = h.primary.ticket();

    // Same source again restarts from zero
    h.session.play(two_segments()).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Loading);
    assert_eq!(h.primary.state().unloads, 1);
    h.events.drain();

    h.session.handle_sink_event(stale, SinkEvent::Ended);
    h.session.handle_sink_event(stale, SinkEvent::CanPlay);
    h.session.handle_sink_event(stale, SinkEvent::TimeUpdate);

    assert!(h.events.drain().is_empty());
    assert_eq!(h.session.segment_index(), Some(0));
    assert_eq!(h.session.current_time(), 0.0);
    assert_eq!(
        h.primary.state().loads,
        vec!["a.mp4".to_string(), "a.mp4".to_string()]
    );
}

#[test]
fn stop_mid_loading_discards_pending_load() {
    let mut h = Harness::new();
    h.session.play(two_segments()).unwrap();
    let stale = h.primary.ticket();

    h.session.stop();
    h.session.handle_sink_event(stale, SinkEvent::CanPlay);

    assert_eq!(h.session.state(), PlaybackState::Idle);
    assert_eq!(
        h.events.states(),
        vec![PlaybackState::Loading, PlaybackState::Idle]
    );
    assert!(!h.primary.state().playing);
    assert!(h.session.source().is_none());
}

#[test]
fn switching_source_kind_mid_loading() {
    let mut h = Harness::new();
    h.session.play(two_segments()).unwrap();
    let stale = h.primary.ticket();

    h.session
        .play(PlaybackSource::adaptive("https://cdn.example/master.m3u8"))
        .unwrap();
    h.session.handle_sink_event(stale, SinkEvent::Ended);

    assert_eq!(h.session.segment_index(), None);
    assert_eq!(h.primary.url().as_deref(), Some("blob:media-source"));

    h.ready(SinkSlot::Primary, 30.0);
    assert_eq!(h.session.state(), PlaybackState::Playing);
}

#[test]
fn rate_is_clamped() {
    let mut h = Harness::new();
    assert_eq!(h.session.set_playback_rate(5.0), 3.0);
    assert_eq!(h.session.playback_rate(), 3.0);
    assert_eq!(h.session.set_playback_rate(0.1), 0.5);
    assert_eq!(h.session.playback_rate(), 0.5);
    assert_eq!(h.session.set_playback_rate(f64::NAN), 1.0);
}

#[test]
fn initial_rate_from_config_is_clamped() {
    let config = PlaybackConfig {
        initial_rate: 10.0,
        ..Default::default()
    };
    let session = PlaybackSession::new(config, MockSink::default(), EventLog::new()).unwrap();
    assert_eq!(session.playback_rate(), 3.0);
}

#[test]
fn autoplay_off_lands_paused() {
    let config = PlaybackConfig {
        autoplay: false,
        ..Default::default()
    };
    let mut h = Harness::build(config, true, Default::default());
    h.session.play(two_segments()).unwrap();
    h.ready(SinkSlot::Primary, 10.0);

    assert_eq!(h.session.state(), PlaybackState::Paused);
    assert!(!h.primary.state().playing);

    h.session.toggle_play();
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert!(h.primary.state().playing);
}

#[test]
fn invalid_sources_are_rejected() {
    let mut h = Harness::new();

    assert!(matches!(
        h.session.play(PlaybackSource::sequential(Vec::new())),
        Err(PlaybackError::EmptySource)
    ));
    assert!(h
        .session
        .play(PlaybackSource::sequential([SegmentDescriptor::new("")]))
        .is_err());
    assert_eq!(h.session.state(), PlaybackState::Idle);
}

#[test]
fn commands_drive_the_session() {
    let mut h = Harness::new();
    h.session
        .apply(PlaybackCommand::Play {
            source: two_segments(),
        })
        .unwrap();
    h.ready(SinkSlot::Primary, 10.0);

    h.session.apply(PlaybackCommand::TogglePlay).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Paused);

    h.session
        .apply(PlaybackCommand::SetRate { rate: 2.0 })
        .unwrap();
    h.session
        .apply(PlaybackCommand::Seek { position_secs: 4.0 })
        .unwrap();
    assert_eq!(h.primary.state().rate, 2.0);
    assert_eq!(h.session.current_time(), 4.0);

    assert!(h
        .session
        .apply(PlaybackCommand::SkipFailedSegment)
        .is_err());

    h.session.apply(PlaybackCommand::Stop).unwrap();
    assert_eq!(h.session.state(), PlaybackState::Idle);
}

#[test]
fn closure_listener_receives_states() {
    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = states.clone();
    let sink = MockSink::default();

    let session = PlaybackSession::new(
        PlaybackConfig::default(),
        sink.clone(),
        Callbacks::new().state_change(move |s| seen.lock().unwrap().push(s)),
    )
    .unwrap();
    let handle = PlaybackHandle::new(session);

    handle.play(two_segments()).unwrap();
    handle.deliver_sink_event(sink.ticket(), SinkEvent::CanPlay);
    handle.pause();

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            PlaybackState::Loading,
            PlaybackState::Playing,
            PlaybackState::Paused
        ]
    );
}

#[test]
fn dropping_session_releases_sinks() {
    let mut h = Harness::new();
    h.session.play(two_segments()).unwrap();
    h.ready(SinkSlot::Primary, 10.0);
    h.play_until(SinkSlot::Primary, 9.5);
    assert!(h.secondary.url().is_some());

    let Harness {
        session,
        primary,
        secondary,
        ..
    } = h;
    drop(session);

    assert_eq!(primary.url(), None);
    assert_eq!(secondary.url(), None);
}
