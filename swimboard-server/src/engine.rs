//! The race state engine: every scoreboard mutation goes through here.
//!
//! One engine instance owns the [`RaceState`]; all operations serialize
//! through its lock and publish a complete snapshot after committing, so
//! subscribers never observe a half-applied compound operation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::Mutex;

use swimboard_broadcaster::SnapshotHub;
use swimboard_meet::{EventIndex, MeetWatcher};
use swimboard_protocol::{timefmt, TimingEvent};

use crate::config::{SerialSettings, ServerConfig, TimingConfig};
use crate::error::{EngineError, Result};
use crate::listener::ListenerSupervisor;
use crate::state::{
    dist_for, epoch_ms, DisplaySettings, Lane, PoolConfig, RaceState, SortMode, TimerState,
    MAX_FIRST_LANE, MAX_FONT_SCALE, MAX_LANE_COUNT, MIN_FONT_SCALE, MIN_LANE_COUNT,
};

/// Header fields; only supplied fields are merged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeaderPatch {
    pub race_title: Option<String>,
    pub heat: Option<String>,
    pub event_text: Option<String>,
}

/// Pool fields; only supplied fields are applied.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PoolPatch {
    pub lane_count: Option<u8>,
    pub first_lane: Option<u8>,
    pub lap_meters: Option<f64>,
}

/// Display-settings fields; only supplied fields are merged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub background_color: Option<String>,
    pub font_color: Option<String>,
    pub font_scale: Option<u16>,
}

/// One lane's worth of input, used both for authoritative rebuilds
/// (`replace_lanes`, absent fields clear) and for patches (`patch_lane`,
/// absent fields keep their value).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaneUpdate {
    pub lane: u8,
    pub rank: Option<String>,
    pub name: Option<String>,
    pub time: Option<String>,
    pub split: Option<String>,
    pub lap: Option<u32>,
    pub finished: Option<bool>,
}

/// Timing-configuration fields; only supplied fields are merged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimingConfigPatch {
    pub lst_path: Option<PathBuf>,
    pub com_port: Option<String>,
    pub com_settings: Option<String>,
    pub debug_capture_enabled: Option<bool>,
    pub debug_path: Option<PathBuf>,
    pub hold_results_time: Option<f64>,
    pub listener_program: Option<PathBuf>,
}

/// Per-heat context fed by the timing pipeline: which (event, heat) is
/// live, the cumulative lap times used for split computation, and the
/// current/pending metadata indexes.
#[derive(Default)]
struct HeatContext {
    index: EventIndex,
    pending: Option<EventIndex>,
    current: Option<(u32, u32)>,
    splits: HashMap<u8, HashMap<u32, String>>,
}

pub struct RaceEngine {
    state: Mutex<RaceState>,
    heat: std::sync::Mutex<HeatContext>,
    config: std::sync::Mutex<ServerConfig>,
    hub: Arc<SnapshotHub>,
    supervisor: Arc<ListenerSupervisor>,
    watcher: std::sync::Mutex<Option<MeetWatcher>>,
}

impl RaceEngine {
    pub fn new(
        config: ServerConfig,
        hub: Arc<SnapshotHub>,
        supervisor: Arc<ListenerSupervisor>,
    ) -> Arc<Self> {
        let state = RaceState::new(config.pool, config.scoreboard.clone());
        Arc::new(Self {
            state: Mutex::new(state),
            heat: std::sync::Mutex::new(HeatContext::default()),
            config: std::sync::Mutex::new(config),
            hub,
            supervisor,
            watcher: std::sync::Mutex::new(None),
        })
    }

    /// Broadcast the snapshot for an already-locked state.
    ///
    /// Called with the state lock held so snapshots go out in commit order.
    async fn commit(&self, state: &RaceState) {
        if let Err(err) = self.hub.publish(&state.snapshot()).await {
            tracing::warn!(error = %err, "failed to broadcast snapshot");
        }
    }

    /// Publish the current state unchanged (startup, catch-up).
    pub async fn publish_current(&self) {
        let state = self.state.lock().await;
        self.commit(&state).await;
    }

    pub async fn snapshot(&self) -> RaceState {
        self.state.lock().await.snapshot()
    }

    pub async fn pool(&self) -> PoolConfig {
        self.state.lock().await.pool
    }

    pub fn timing_config(&self) -> TimingConfig {
        self.config.lock().unwrap().timing.clone()
    }

    // ---- scoreboard operations -------------------------------------------

    pub async fn set_header(&self, patch: HeaderPatch) {
        let mut state = self.state.lock().await;
        if let Some(title) = patch.race_title {
            state.race_title = title;
        }
        if let Some(heat) = patch.heat {
            state.heat = heat;
        }
        if let Some(text) = patch.event_text {
            state.event_text = text;
        }
        self.commit(&state).await;
    }

    pub async fn set_pool(&self, patch: PoolPatch) -> Result<PoolConfig> {
        let mut state = self.state.lock().await;

        let mut pool = state.pool;
        if let Some(count) = patch.lane_count {
            if !(MIN_LANE_COUNT..=MAX_LANE_COUNT).contains(&count) {
                return Err(EngineError::InvalidLaneCount(count));
            }
            pool.lane_count = count;
        }
        if let Some(first) = patch.first_lane {
            if first > MAX_FIRST_LANE {
                return Err(EngineError::InvalidFirstLane(first));
            }
            pool.first_lane = first;
        }
        if let Some(meters) = patch.lap_meters {
            if !(meters.is_finite() && meters > 0.0) {
                return Err(EngineError::InvalidLapMeters(meters));
            }
            pool.lap_meters = meters;
        }

        let roster_changed =
            pool.lane_count != state.pool.lane_count || pool.first_lane != state.pool.first_lane;
        let meters_changed = pool.lap_meters != state.pool.lap_meters;
        if !roster_changed && !meters_changed {
            return Ok(pool);
        }

        state.pool = pool;
        if roster_changed {
            state.rebuild_roster();
        } else {
            state.recompute_dists();
        }

        self.persist(|config| config.pool = pool);
        self.commit(&state).await;
        Ok(pool)
    }

    pub async fn set_settings(&self, patch: SettingsPatch) -> Result<DisplaySettings> {
        if let Some(color) = &patch.background_color {
            validate_color(color)?;
        }
        if let Some(color) = &patch.font_color {
            validate_color(color)?;
        }
        if let Some(scale) = patch.font_scale {
            if !(MIN_FONT_SCALE..=MAX_FONT_SCALE).contains(&scale) {
                return Err(EngineError::InvalidFontScale(scale));
            }
        }

        let mut state = self.state.lock().await;
        if let Some(color) = patch.background_color {
            state.settings.background_color = color;
        }
        if let Some(color) = patch.font_color {
            state.settings.font_color = color;
        }
        if let Some(scale) = patch.font_scale {
            state.settings.font_scale = scale;
        }

        let settings = state.settings.clone();
        self.persist(|config| config.scoreboard = settings.clone());
        self.commit(&state).await;
        Ok(state.settings.clone())
    }

    /// Authoritative rebuild: every configured lane is cleared, then the
    /// supplied entries overwrite theirs. A lane absent from `entries` stays
    /// visible but fully empty.
    pub async fn replace_lanes(&self, entries: &[LaneUpdate]) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::apply_lanes(&mut state, entries)?;
        self.commit(&state).await;
        Ok(())
    }

    fn apply_lanes(state: &mut RaceState, entries: &[LaneUpdate]) -> Result<()> {
        for entry in entries {
            if !state.pool.contains_lane(entry.lane) {
                return Err(EngineError::UnknownLane(entry.lane));
            }
        }

        state.rebuild_roster();
        let lap_meters = state.pool.lap_meters;
        for entry in entries {
            if let Some(lane) = state.lane_mut(entry.lane) {
                merge_lane(lane, entry, lap_meters);
            }
        }
        Ok(())
    }

    /// Merge supplied fields into one lane; omitted fields keep their value.
    pub async fn patch_lane(&self, patch: &LaneUpdate) -> Result<Lane> {
        let mut state = self.state.lock().await;
        let lap_meters = state.pool.lap_meters;

        let Some(lane) = state.lane_mut(patch.lane) else {
            return Err(EngineError::UnknownLane(patch.lane));
        };
        merge_lane(lane, patch, lap_meters);
        let updated = lane.clone();

        self.commit(&state).await;
        Ok(updated)
    }

    pub async fn timer_start(&self, at_ms: Option<u64>) -> TimerState {
        let mut state = self.state.lock().await;
        state.timer = TimerState::start(at_ms.unwrap_or_else(epoch_ms));
        self.commit(&state).await;
        state.timer
    }

    pub async fn timer_stop(&self) -> TimerState {
        let mut state = self.state.lock().await;
        state.timer = state.timer.stop(epoch_ms());
        self.commit(&state).await;
        state.timer
    }

    pub async fn timer_reset(&self) -> TimerState {
        let mut state = self.state.lock().await;
        state.timer = TimerState::reset();
        self.commit(&state).await;
        state.timer
    }

    pub async fn set_sort_mode(&self, mode: SortMode) {
        let mut state = self.state.lock().await;
        state.sort_mode = mode;
        self.commit(&state).await;
    }

    /// Compound heat setup, applied as one commit: lane sort, timer reset,
    /// header merge, authoritative lane rebuild.
    pub async fn prepare_heat(&self, header: HeaderPatch, entries: &[LaneUpdate]) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::apply_lanes(&mut state, entries)?;

        state.sort_mode = SortMode::Lane;
        state.timer = TimerState::reset();
        if let Some(title) = header.race_title {
            state.race_title = title;
        }
        if let Some(heat) = header.heat {
            state.heat = heat;
        }
        if let Some(text) = header.event_text {
            state.event_text = text;
        }

        self.commit(&state).await;
        Ok(())
    }

    /// Compound heat teardown, one commit: clear every unfinished lane,
    /// reset the timer, sort by rank.
    pub async fn finish_heat(&self) {
        let mut state = self.state.lock().await;
        for lane in &mut state.lanes {
            if !lane.finished {
                *lane = Lane::empty(lane.lane);
            }
        }
        state.timer = TimerState::reset();
        state.sort_mode = SortMode::Rank;
        self.commit(&state).await;
    }

    // ---- timing pipeline entry points ------------------------------------

    /// Route one decoded timing event. `arrival_ms` is the server clock when
    /// the frame arrived, used for drift-free timer starts.
    pub async fn apply_timing_event(&self, event: TimingEvent, arrival_ms: u64) {
        match event {
            TimingEvent::HeatReady { event, heat } => self.on_heat_ready(event, heat).await,
            TimingEvent::RaceStart => {
                self.timer_start(Some(arrival_ms)).await;
            }
            TimingEvent::LaneTime {
                event,
                heat,
                lane,
                lap,
                rank,
                time,
                finished,
            } => {
                self.on_lane_time(event, heat, lane, lap, rank, time, finished)
                    .await;
            }
            TimingEvent::HeatEnd => self.finish_heat().await,
        }
    }

    /// Stage a freshly ingested metadata index.
    ///
    /// The index takes effect at the next heat boundary, never mid-heat.
    pub fn stage_event_index(&self, index: EventIndex) {
        let mut ctx = self.heat.lock().unwrap();
        ctx.pending = Some(index);
    }

    async fn on_heat_ready(&self, event: u32, heat: u32) {
        let (header, entries) = {
            let mut ctx = self.heat.lock().unwrap();
            if let Some(pending) = ctx.pending.take() {
                tracing::info!("applying reloaded meet data at heat boundary");
                ctx.index = pending;
            }
            ctx.splits.clear();
            ctx.current = Some((event, heat));

            let title = ctx
                .index
                .event_title(event)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Event {event}"));
            let text = ctx.index.event_text(event).unwrap_or("").to_string();
            let header = HeaderPatch {
                race_title: Some(title),
                heat: Some(format!("Heat {heat}")),
                event_text: Some(text),
            };

            let mut entries = Vec::new();
            match ctx.index.heat_lanes(event, heat) {
                Some(lanes) => {
                    for (&lane, &bib) in lanes {
                        let name = ctx.index.swimmer_name(bib).unwrap_or("").to_string();
                        entries.push(LaneUpdate {
                            lane,
                            name: Some(name),
                            ..LaneUpdate::default()
                        });
                    }
                }
                None => {
                    tracing::warn!(event, heat, "unknown event/heat; preparing empty lanes");
                }
            }
            (header, entries)
        };

        // A start list can assign lanes outside the configured pool; those
        // cannot be shown and must not reject the whole heat.
        let pool = self.pool().await;
        let (entries, skipped): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|entry| pool.contains_lane(entry.lane));
        for entry in &skipped {
            tracing::warn!(lane = entry.lane, "start-list lane outside configured pool; skipping");
        }

        tracing::info!(event, heat, lanes = entries.len(), "preparing heat");
        if let Err(err) = self.prepare_heat(header, &entries).await {
            tracing::warn!(error = %err, "failed to prepare heat from timing event");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_lane_time(
        &self,
        event: u32,
        heat: u32,
        lane: u8,
        lap: u32,
        rank: u32,
        time: String,
        finished: bool,
    ) {
        let split = {
            let mut ctx = self.heat.lock().unwrap();
            let current = ctx.current;
            if current != Some((event, heat)) {
                tracing::warn!(
                    event,
                    heat,
                    ?current,
                    "ignoring lane time for a heat that is not live"
                );
                return;
            }

            let lane_splits = ctx.splits.entry(lane).or_default();
            let split = if lap == 1 {
                time.clone()
            } else if let Some(prev) = lap.checked_sub(1).and_then(|p| lane_splits.get(&p)) {
                timefmt::split_between(prev, &time).unwrap_or_default()
            } else {
                String::new()
            };
            lane_splits.insert(lap, time.clone());
            split
        };

        let patch = LaneUpdate {
            lane,
            rank: Some(rank.to_string()),
            time: Some(time),
            split: Some(split),
            lap: Some(lap),
            finished: Some(finished),
            name: None,
        };
        if let Err(err) = self.patch_lane(&patch).await {
            tracing::warn!(error = %err, "dropping lane time");
        }
    }

    // ---- timing configuration --------------------------------------------

    /// Merge and persist new timing configuration, then restart the listener
    /// and re-target the metadata watcher. Does not broadcast: none of this
    /// is scoreboard-visible.
    pub async fn set_timing_config(
        self: &Arc<Self>,
        patch: TimingConfigPatch,
    ) -> anyhow::Result<TimingConfig> {
        let mut timing = self.timing_config();
        if let Some(path) = patch.lst_path {
            timing.lst_path = path;
        }
        if let Some(port) = patch.com_port {
            timing.com_port = port;
        }
        if let Some(settings) = patch.com_settings {
            settings
                .parse::<SerialSettings>()
                .with_context(|| format!("invalid com_settings {settings:?}"))?;
            timing.com_settings = settings;
        }
        if let Some(enabled) = patch.debug_capture_enabled {
            timing.debug_capture_enabled = enabled;
        }
        if let Some(path) = patch.debug_path {
            timing.debug_path = if path.as_os_str().is_empty() {
                None
            } else {
                Some(path)
            };
        }
        if let Some(hold) = patch.hold_results_time {
            anyhow::ensure!(
                hold.is_finite() && hold >= 0.0,
                "hold_results_time must be non-negative, got {hold}"
            );
            timing.hold_results_time = hold;
        }
        if let Some(program) = patch.listener_program {
            timing.listener_program = if program.as_os_str().is_empty() {
                None
            } else {
                Some(program)
            };
        }

        let timing_for_persist = timing.clone();
        self.persist(move |config| config.timing = timing_for_persist);

        // The listener restart discards all in-flight decode state; lane
        // updates resume at the next heat boundary.
        if let Err(err) = self.supervisor.apply(&timing, Arc::clone(self)).await {
            tracing::warn!(error = %err, "listener restart failed; timing input disabled");
        }
        self.restart_meet_watcher();

        Ok(timing)
    }

    /// (Re)start the export-directory watcher against the configured path.
    pub fn restart_meet_watcher(self: &Arc<Self>) {
        let lst_path = self.config.lock().unwrap().timing.lst_path.clone();
        let mut slot = self.watcher.lock().unwrap();
        *slot = None;

        if lst_path.as_os_str().is_empty() {
            tracing::info!("no LST path configured; meet ingest disabled");
            return;
        }

        let weak = Arc::downgrade(self);
        match MeetWatcher::start(lst_path, move |index| {
            if let Some(engine) = weak.upgrade() {
                engine.stage_event_index(index);
            }
        }) {
            Ok(watcher) => *slot = Some(watcher),
            Err(err) => {
                tracing::warn!(error = %err, "could not watch meet export directory");
            }
        }
    }

    /// Persist a configuration change; failures are logged, never fatal.
    fn persist(&self, update: impl FnOnce(&mut ServerConfig)) {
        let mut config = self.config.lock().unwrap();
        update(&mut config);
        if let Err(err) = config.save() {
            tracing::warn!(error = %err, "could not persist configuration");
        }
    }
}

fn validate_color(value: &str) -> Result<()> {
    let invalid = || EngineError::InvalidColor(value.to_string());
    let hex = value.strip_prefix('#').ok_or_else(invalid)?;
    if !(hex.len() == 3 || hex.len() == 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    Ok(())
}

/// Apply supplied fields to a lane. Empty strings clear their field; `lap`
/// recomputes `dist`.
fn merge_lane(lane: &mut Lane, patch: &LaneUpdate, lap_meters: f64) {
    if let Some(value) = &patch.rank {
        lane.rank = norm(value);
    }
    if let Some(value) = &patch.name {
        lane.name = norm(value);
    }
    if let Some(value) = &patch.time {
        lane.time = norm(value);
    }
    if let Some(value) = &patch.split {
        lane.split = norm(value);
    }
    if let Some(lap) = patch.lap {
        lane.lap = Some(lap);
        lane.dist = dist_for(lap, lap_meters);
    }
    if let Some(finished) = patch.finished {
        lane.finished = finished;
    }
}

fn norm(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
