//! Behavior tests for the race state engine.

use std::sync::Arc;

use tempfile::TempDir;

use swimboard_broadcaster::SnapshotHub;
use swimboard_meet::EventIndex;
use swimboard_protocol::TimingEvent;
use swimboard_server::config::ServerConfig;
use swimboard_server::engine::{
    HeaderPatch, LaneUpdate, PoolPatch, RaceEngine, SettingsPatch, TimingConfigPatch,
};
use swimboard_server::error::EngineError;
use swimboard_server::listener::ListenerSupervisor;
use swimboard_server::state::{PoolConfig, SortMode};

fn engine_with_pool(pool: PoolConfig) -> (TempDir, Arc<RaceEngine>, Arc<SnapshotHub>) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        config_path: dir.path().join("config.toml"),
        pool,
        ..ServerConfig::default()
    };
    let hub = Arc::new(SnapshotHub::new(dir.path().join("hub.sock")));
    let engine = RaceEngine::new(config, Arc::clone(&hub), ListenerSupervisor::new());
    (dir, engine, hub)
}

fn small_pool() -> PoolConfig {
    PoolConfig {
        lane_count: 2,
        first_lane: 1,
        lap_meters: 25.0,
    }
}

fn entry(lane: u8) -> LaneUpdate {
    LaneUpdate {
        lane,
        ..LaneUpdate::default()
    }
}

#[tokio::test]
async fn replace_lanes_is_authoritative() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    engine
        .replace_lanes(&[
            LaneUpdate {
                lap: Some(2),
                ..entry(1)
            },
            LaneUpdate {
                lap: Some(2),
                ..entry(2)
            },
        ])
        .await
        .unwrap();

    let state = engine.snapshot().await;
    assert_eq!(state.lanes[0].dist, Some(50.0));
    assert_eq!(state.lanes[1].dist, Some(50.0));

    engine
        .replace_lanes(&[LaneUpdate {
            lap: Some(4),
            finished: Some(true),
            ..entry(1)
        }])
        .await
        .unwrap();

    let state = engine.snapshot().await;
    let lane1 = &state.lanes[0];
    assert_eq!(lane1.dist, Some(100.0));
    assert!(lane1.finished);

    // Lane 2 was absent from the entries: fully cleared, still visible.
    let lane2 = &state.lanes[1];
    assert_eq!(lane2.lane, 2);
    assert_eq!(lane2.lap, None);
    assert_eq!(lane2.dist, None);
    assert_eq!(lane2.rank, None);
    assert!(!lane2.finished);
}

#[tokio::test]
async fn replace_lanes_clearing_is_idempotent() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    for _ in 0..2 {
        engine
            .replace_lanes(&[LaneUpdate {
                name: Some("Anna Berg".to_string()),
                ..entry(1)
            }])
            .await
            .unwrap();

        let state = engine.snapshot().await;
        assert_eq!(state.lanes[1].lane, 2);
        assert!(state.lanes[1].is_empty());
    }
}

#[tokio::test]
async fn patch_lane_merges_only_supplied_fields() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    engine
        .replace_lanes(&[LaneUpdate {
            name: Some("Anna Berg".to_string()),
            rank: Some("1".to_string()),
            split: Some("31.20".to_string()),
            ..entry(1)
        }])
        .await
        .unwrap();

    engine
        .patch_lane(&LaneUpdate {
            time: Some("1:03.45".to_string()),
            ..entry(1)
        })
        .await
        .unwrap();

    let state = engine.snapshot().await;
    let lane = &state.lanes[0];
    assert_eq!(lane.time.as_deref(), Some("1:03.45"));
    assert_eq!(lane.name.as_deref(), Some("Anna Berg"));
    assert_eq!(lane.rank.as_deref(), Some("1"));
    assert_eq!(lane.split.as_deref(), Some("31.20"));
}

#[tokio::test]
async fn patch_unknown_lane_is_rejected() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());
    let err = engine.patch_lane(&entry(9)).await.unwrap_err();
    assert_eq!(err, EngineError::UnknownLane(9));
}

#[tokio::test]
async fn replace_lanes_rejects_whole_batch_on_unknown_lane() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    engine
        .replace_lanes(&[LaneUpdate {
            name: Some("Anna Berg".to_string()),
            ..entry(1)
        }])
        .await
        .unwrap();

    let err = engine
        .replace_lanes(&[
            LaneUpdate {
                name: Some("Ola Vik".to_string()),
                ..entry(2)
            },
            entry(7),
        ])
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::UnknownLane(7));

    // Nothing was applied, not even the valid entry.
    let state = engine.snapshot().await;
    assert_eq!(state.lanes[0].name.as_deref(), Some("Anna Berg"));
    assert_eq!(state.lanes[1].name, None);
}

#[tokio::test]
async fn pool_changes_rebuild_or_recompute() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    engine
        .replace_lanes(&[LaneUpdate {
            lap: Some(2),
            name: Some("Anna Berg".to_string()),
            ..entry(1)
        }])
        .await
        .unwrap();

    // lap_meters alone: dist recomputed, everything else kept.
    engine
        .set_pool(PoolPatch {
            lap_meters: Some(50.0),
            ..PoolPatch::default()
        })
        .await
        .unwrap();
    let state = engine.snapshot().await;
    assert_eq!(state.lanes[0].dist, Some(100.0));
    assert_eq!(state.lanes[0].name.as_deref(), Some("Anna Berg"));

    // lane_count change: roster rebuilt from scratch.
    engine
        .set_pool(PoolPatch {
            lane_count: Some(3),
            ..PoolPatch::default()
        })
        .await
        .unwrap();
    let state = engine.snapshot().await;
    assert_eq!(state.lanes.len(), 3);
    assert!(state.lanes.iter().all(|lane| lane.is_empty()));
}

#[tokio::test]
async fn pool_and_settings_validation_reject_whole() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    assert_eq!(
        engine
            .set_pool(PoolPatch {
                lane_count: Some(4),
                first_lane: Some(11),
                ..PoolPatch::default()
            })
            .await
            .unwrap_err(),
        EngineError::InvalidFirstLane(11)
    );
    // The valid lane_count in the same patch was not applied either.
    assert_eq!(engine.pool().await.lane_count, 2);

    assert_eq!(
        engine
            .set_settings(SettingsPatch {
                background_color: Some("#123456".to_string()),
                font_scale: Some(300),
                ..SettingsPatch::default()
            })
            .await
            .unwrap_err(),
        EngineError::InvalidFontScale(300)
    );
    let state = engine.snapshot().await;
    assert_eq!(state.settings.background_color, "#000033");
}

#[tokio::test]
async fn prepare_heat_resets_sort_and_timer() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    engine.set_sort_mode(SortMode::Rank).await;
    engine.timer_start(Some(1_000)).await;

    engine
        .prepare_heat(
            HeaderPatch {
                race_title: Some("50m Freestyle".to_string()),
                heat: Some("Heat 3".to_string()),
                event_text: None,
            },
            &[LaneUpdate {
                name: Some("Anna Berg".to_string()),
                ..entry(1)
            }],
        )
        .await
        .unwrap();

    let state = engine.snapshot().await;
    assert_eq!(state.sort_mode, SortMode::Lane);
    assert!(!state.timer.running);
    assert_eq!(state.timer.elapsed_ms, 0);
    assert_eq!(state.race_title, "50m Freestyle");
    assert_eq!(state.heat, "Heat 3");
    assert_eq!(state.lanes[0].name.as_deref(), Some("Anna Berg"));
}

#[tokio::test]
async fn finish_heat_clears_only_unfinished_lanes() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    engine
        .replace_lanes(&[
            LaneUpdate {
                name: Some("Anna Berg".to_string()),
                time: Some("31.20".to_string()),
                finished: Some(true),
                ..entry(1)
            },
            LaneUpdate {
                name: Some("Ola Vik".to_string()),
                ..entry(2)
            },
        ])
        .await
        .unwrap();

    engine.finish_heat().await;

    let state = engine.snapshot().await;
    assert_eq!(state.sort_mode, SortMode::Rank);
    assert!(!state.timer.running);

    let finished = state.lanes.iter().find(|l| l.lane == 1).unwrap();
    assert_eq!(finished.name.as_deref(), Some("Anna Berg"));
    assert_eq!(finished.time.as_deref(), Some("31.20"));

    let cleared = state.lanes.iter().find(|l| l.lane == 2).unwrap();
    assert!(cleared.is_empty());
}

#[tokio::test]
async fn compound_operations_broadcast_once() {
    let (_dir, engine, hub) = engine_with_pool(small_pool());
    let mut rx = hub.subscribe().await;

    engine
        .prepare_heat(
            HeaderPatch::default(),
            &[LaneUpdate {
                name: Some("Anna Berg".to_string()),
                ..entry(1)
            }],
        )
        .await
        .unwrap();

    // Exactly one snapshot for the whole compound commit, already final.
    let line = rx.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["sort_mode"], "lane");
    assert_eq!(value["lanes"][0]["name"], "Anna Berg");
    assert!(rx.try_recv().is_err());
}

// ---- timing-event routing ------------------------------------------------

fn meet_fixture() -> (TempDir, EventIndex) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("lstconc.txt"),
        "id;lastname;firstname;abNat\n12;Berg;Anna;OSLO\n13;Vik;Ola;BRGN\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("lststart.txt"),
        "event;heat;lane;idBib\n5;0;1;12\n5;0;2;13\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("events.json"),
        r#"{"5": {"title": "50m Freestyle", "text": "Sponsor: Acme"}}"#,
    )
    .unwrap();
    let index = EventIndex::load(dir.path()).unwrap();
    (dir, index)
}

fn lane_time(event: u32, heat: u32, lane: u8, lap: u32, rank: u32, time: &str, finished: bool) -> TimingEvent {
    TimingEvent::LaneTime {
        event,
        heat,
        lane,
        lap,
        rank,
        time: time.to_string(),
        finished,
    }
}

#[tokio::test]
async fn heat_boundary_applies_staged_metadata() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());
    let (_meet_dir, index) = meet_fixture();

    engine.stage_event_index(index);
    engine
        .apply_timing_event(TimingEvent::HeatReady { event: 5, heat: 1 }, 0)
        .await;

    let state = engine.snapshot().await;
    assert_eq!(state.race_title, "50m Freestyle");
    assert_eq!(state.heat, "Heat 1");
    assert_eq!(state.event_text, "Sponsor: Acme");
    assert_eq!(state.lanes[0].name.as_deref(), Some("Anna Berg"));
    assert_eq!(state.lanes[1].name.as_deref(), Some("Ola Vik"));
    assert_eq!(state.sort_mode, SortMode::Lane);
}

#[tokio::test]
async fn staged_index_waits_for_next_boundary() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());
    let (_meet_dir, index) = meet_fixture();

    // A heat is already live when the reload arrives.
    engine
        .apply_timing_event(TimingEvent::HeatReady { event: 5, heat: 1 }, 0)
        .await;
    let state = engine.snapshot().await;
    assert_eq!(state.race_title, "Event 5");
    assert_eq!(state.lanes[0].name, None);

    engine.stage_event_index(index);

    // Mid-heat nothing changes...
    engine
        .apply_timing_event(lane_time(5, 1, 1, 1, 1, "31.20", false), 0)
        .await;
    let state = engine.snapshot().await;
    assert_eq!(state.race_title, "Event 5");
    assert_eq!(state.lanes[0].name, None);

    // ...but the next boundary picks the staged index up.
    engine
        .apply_timing_event(TimingEvent::HeatReady { event: 5, heat: 2 }, 0)
        .await;
    let state = engine.snapshot().await;
    assert_eq!(state.race_title, "50m Freestyle");
}

#[tokio::test]
async fn lane_times_update_rank_time_split_and_dist() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());
    let (_meet_dir, index) = meet_fixture();
    engine.stage_event_index(index);
    engine
        .apply_timing_event(TimingEvent::HeatReady { event: 5, heat: 1 }, 0)
        .await;

    engine
        .apply_timing_event(lane_time(5, 1, 1, 1, 2, "31.20", false), 0)
        .await;
    engine
        .apply_timing_event(lane_time(5, 1, 1, 2, 1, "1:03.45", true), 0)
        .await;

    let state = engine.snapshot().await;
    let lane = state.lanes.iter().find(|l| l.lane == 1).unwrap();
    assert_eq!(lane.rank.as_deref(), Some("1"));
    assert_eq!(lane.time.as_deref(), Some("1:03.45"));
    // Split of lap 2 is the difference to lap 1.
    assert_eq!(lane.split.as_deref(), Some("32.25"));
    assert_eq!(lane.lap, Some(2));
    assert_eq!(lane.dist, Some(50.0));
    assert!(lane.finished);
    // The name from the start list survived the patches.
    assert_eq!(lane.name.as_deref(), Some("Anna Berg"));
}

#[tokio::test]
async fn lane_time_for_wrong_heat_is_ignored() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());
    engine
        .apply_timing_event(TimingEvent::HeatReady { event: 5, heat: 1 }, 0)
        .await;

    engine
        .apply_timing_event(lane_time(5, 2, 1, 1, 1, "31.20", false), 0)
        .await;

    let state = engine.snapshot().await;
    assert!(state.lanes[0].is_empty());
}

#[tokio::test]
async fn race_start_uses_frame_arrival_time() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());
    engine
        .apply_timing_event(TimingEvent::RaceStart, 123_456)
        .await;

    let state = engine.snapshot().await;
    assert!(state.timer.running);
    assert_eq!(state.timer.start_timestamp, Some(123_456));
    assert_eq!(state.timer.elapsed_ms, 0);
}

#[tokio::test]
async fn heat_end_finishes_the_heat() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());
    engine
        .apply_timing_event(TimingEvent::HeatReady { event: 5, heat: 1 }, 0)
        .await;
    engine
        .apply_timing_event(lane_time(5, 1, 1, 1, 1, "31.20", true), 0)
        .await;
    engine.apply_timing_event(TimingEvent::HeatEnd, 0).await;

    let state = engine.snapshot().await;
    assert_eq!(state.sort_mode, SortMode::Rank);
    let lane = state.lanes.iter().find(|l| l.lane == 1).unwrap();
    assert!(lane.finished);
    assert_eq!(lane.time.as_deref(), Some("31.20"));
}

#[tokio::test]
async fn timing_config_is_persisted_and_feeds_the_ingest() {
    let (dir, engine, _hub) = engine_with_pool(small_pool());

    // Build an export directory and point the timing config at it.
    let (meet_dir, _index) = meet_fixture();
    let updated = engine
        .set_timing_config(TimingConfigPatch {
            lst_path: Some(meet_dir.path().to_path_buf()),
            hold_results_time: Some(3.0),
            ..TimingConfigPatch::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.hold_results_time, 3.0);

    // Persisted: a fresh load sees the change. No listener was started
    // (com_port is empty), which must not fail the operation.
    let reloaded = ServerConfig::load(Some(dir.path().join("config.toml"))).unwrap();
    assert_eq!(reloaded.timing.lst_path, meet_dir.path());
    assert_eq!(reloaded.timing.hold_results_time, 3.0);

    // The watcher staged the initial index; the next boundary applies it.
    engine
        .apply_timing_event(TimingEvent::HeatReady { event: 5, heat: 1 }, 0)
        .await;
    let state = engine.snapshot().await;
    assert_eq!(state.race_title, "50m Freestyle");
    assert_eq!(state.lanes[0].name.as_deref(), Some("Anna Berg"));
}

#[tokio::test]
async fn invalid_timing_config_changes_nothing() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    assert!(engine
        .set_timing_config(TimingConfigPatch {
            com_settings: Some("not-a-baud-rate".to_string()),
            ..TimingConfigPatch::default()
        })
        .await
        .is_err());
    assert_eq!(engine.timing_config().com_settings, "9600,7,n,1");

    assert!(engine
        .set_timing_config(TimingConfigPatch {
            hold_results_time: Some(-1.0),
            ..TimingConfigPatch::default()
        })
        .await
        .is_err());
    assert_eq!(engine.timing_config().hold_results_time, 0.0);
}

#[tokio::test]
async fn timer_stop_freezes_elapsed() {
    let (_dir, engine, _hub) = engine_with_pool(small_pool());

    engine.timer_start(None).await;
    let timer = engine.timer_stop().await;
    assert!(!timer.running);

    let again = engine.timer_stop().await;
    assert_eq!(again.elapsed_ms, timer.elapsed_ms);

    let reset = engine.timer_reset().await;
    assert_eq!(reset.elapsed_ms, 0);
    assert_eq!(reset.start_timestamp, None);
}
