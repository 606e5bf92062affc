use super::*;
use time::macros::datetime;

fn points(n: i64) -> Vec<TelemetryPoint> {
    (0..n)
        .map(|i| TelemetryPoint {
            time: datetime!(2024-05-01 00:00:00 UTC) + time::Duration::seconds(i),
            model_confidence: Some(0.9),
            task_phase: None,
            battery_percent: None,
        })
        .collect()
}

#[test]
fn load_resets_to_first_point_paused() {
    let mut replay = Replay::new();
    replay.load(points(3));
    replay.toggle();
    replay.tick();
    replay.load(points(5));
    assert_eq!(replay.position(), (1, 5));
    assert!(!replay.is_playing());
}

#[test]
fn plays_to_the_end_and_pauses_there() {
    let mut replay = Replay::new();
    replay.load(points(3));
    replay.toggle();
    assert!(replay.tick());
    assert!(replay.tick());
    assert_eq!(replay.position(), (3, 3));
    assert!(!replay.is_playing());
    assert!(!replay.tick());
    assert_eq!(replay.position(), (3, 3));
}

#[test]
fn play_at_end_restarts() {
    let mut replay = Replay::new();
    replay.load(points(3));
    replay.seek(2);
    replay.toggle();
    assert!(replay.is_playing());
    assert_eq!(replay.position(), (1, 3));
}

#[test]
fn seek_clamps_and_pauses() {
    let mut replay = Replay::new();
    replay.load(points(4));
    replay.toggle();
    replay.seek(99);
    assert_eq!(replay.position(), (4, 4));
    assert!(!replay.is_playing());
    replay.seek(1);
    assert_eq!(replay.current().unwrap().time, datetime!(2024-05-01 00:00:01 UTC));
}

#[test]
fn toggle_pauses_mid_session() {
    let mut replay = Replay::new();
    replay.load(points(10));
    replay.toggle();
    replay.tick();
    replay.toggle();
    assert!(!replay.tick());
    assert_eq!(replay.position(), (2, 10));
}

#[test]
fn empty_replay_is_inert() {
    let mut replay = Replay::new();
    replay.toggle();
    assert!(!replay.is_playing());
    assert!(!replay.tick());
    replay.seek(5);
    assert!(replay.current().is_none());
    assert_eq!(replay.position(), (0, 0));
}

#[test]
fn single_point_session_never_advances() {
    let mut replay = Replay::new();
    replay.load(points(1));
    replay.toggle();
    assert!(!replay.tick());
    assert!(!replay.is_playing());
    assert_eq!(replay.position(), (1, 1));
}
