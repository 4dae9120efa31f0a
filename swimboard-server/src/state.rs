//! The authoritative scoreboard state and its snapshot serialization.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub const MIN_LANE_COUNT: u8 = 1;
pub const MAX_LANE_COUNT: u8 = 10;
pub const MAX_FIRST_LANE: u8 = 10;
pub const MIN_FONT_SCALE: u16 = 50;
pub const MAX_FONT_SCALE: u16 = 200;

/// Server wall clock in epoch milliseconds.
///
/// Display clients fetch this through the time-sync command to compute a
/// local clock offset and extrapolate the running timer between snapshots.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Physical pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of lanes shown (1–10).
    #[serde(default = "default_lane_count")]
    pub lane_count: u8,
    /// Number of the first lane (0–10).
    #[serde(default = "default_first_lane")]
    pub first_lane: u8,
    /// Distance between touchpads in meters.
    #[serde(default = "default_lap_meters")]
    pub lap_meters: f64,
}

fn default_lane_count() -> u8 {
    8
}
fn default_first_lane() -> u8 {
    1
}
fn default_lap_meters() -> f64 {
    50.0
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            lane_count: default_lane_count(),
            first_lane: default_first_lane(),
            lap_meters: default_lap_meters(),
        }
    }
}

impl PoolConfig {
    /// Lane numbers of the configured roster, in order.
    pub fn lane_numbers(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.lane_count).map(move |i| self.first_lane + i)
    }

    pub fn contains_lane(&self, lane: u8) -> bool {
        lane >= self.first_lane && lane < self.first_lane + self.lane_count
    }
}

/// Scoreboard display settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default = "default_background")]
    pub background_color: String,
    #[serde(default = "default_font_color")]
    pub font_color: String,
    /// Font size in percent (50–200).
    #[serde(default = "default_font_scale")]
    pub font_scale: u16,
}

fn default_background() -> String {
    "#000033".to_string()
}
fn default_font_color() -> String {
    "#FFFFFF".to_string()
}
fn default_font_scale() -> u16 {
    100
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            background_color: default_background(),
            font_color: default_font_color(),
            font_scale: default_font_scale(),
        }
    }
}

/// How the display orders the lane rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Lane,
    Rank,
}

/// One lane row. Owned exclusively by the race state engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lane {
    pub lane: u8,
    pub rank: Option<String>,
    pub name: Option<String>,
    pub time: Option<String>,
    pub split: Option<String>,
    pub lap: Option<u32>,
    /// Derived: `lap * lap_meters`, recomputed whenever `lap` is supplied.
    pub dist: Option<f64>,
    pub finished: bool,
}

impl Lane {
    pub fn empty(lane: u8) -> Self {
        Self {
            lane,
            rank: None,
            name: None,
            time: None,
            split: None,
            lap: None,
            dist: None,
            finished: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty(self.lane)
    }

    fn rank_value(&self) -> Option<u64> {
        self.rank.as_deref()?.trim().parse().ok()
    }
}

/// Distance covered after `lap` lengths of a `lap_meters` pool.
pub fn dist_for(lap: u32, lap_meters: f64) -> Option<f64> {
    if lap == 0 || lap_meters <= 0.0 {
        return None;
    }
    Some(f64::from(lap) * lap_meters)
}

/// Race timer.
///
/// Elapsed time is derived from `start_timestamp` while running and only
/// frozen into `elapsed_ms` on stop, so repeated reads never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerState {
    pub running: bool,
    pub start_timestamp: Option<u64>,
    pub elapsed_ms: u64,
}

impl TimerState {
    pub fn reset() -> Self {
        Self {
            running: false,
            start_timestamp: None,
            elapsed_ms: 0,
        }
    }

    pub fn start(at_ms: u64) -> Self {
        Self {
            running: true,
            start_timestamp: Some(at_ms),
            elapsed_ms: 0,
        }
    }

    /// Freeze the derived elapsed value and stop.
    pub fn stop(self, now_ms: u64) -> Self {
        let elapsed_ms = match (self.running, self.start_timestamp) {
            (true, Some(start)) => now_ms.saturating_sub(start),
            _ => self.elapsed_ms,
        };
        Self {
            running: false,
            start_timestamp: self.start_timestamp,
            elapsed_ms,
        }
    }
}

/// The single source of truth for what the scoreboard shows.
///
/// Serializes directly to the snapshot document broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct RaceState {
    pub settings: DisplaySettings,
    pub race_title: String,
    pub heat: String,
    pub event_text: String,
    pub timer: TimerState,
    pub sort_mode: SortMode,
    pub lanes: Vec<Lane>,
    #[serde(skip)]
    pub pool: PoolConfig,
}

impl RaceState {
    pub fn new(pool: PoolConfig, settings: DisplaySettings) -> Self {
        let mut state = Self {
            settings,
            race_title: "Swimming Scoreboard".to_string(),
            heat: "Heat 1".to_string(),
            event_text: String::new(),
            timer: TimerState::reset(),
            sort_mode: SortMode::Lane,
            lanes: Vec::new(),
            pool,
        };
        state.rebuild_roster();
        state
    }

    /// Rebuild the roster from the pool configuration, discarding all
    /// per-lane data.
    pub fn rebuild_roster(&mut self) {
        self.lanes = self.pool.lane_numbers().map(Lane::empty).collect();
    }

    pub fn lane_mut(&mut self, lane: u8) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|l| l.lane == lane)
    }

    /// Recompute `dist` for every lane with a known lap count; used after
    /// `lap_meters` changes.
    pub fn recompute_dists(&mut self) {
        let lap_meters = self.pool.lap_meters;
        for lane in &mut self.lanes {
            lane.dist = lane.lap.and_then(|lap| dist_for(lap, lap_meters));
        }
    }

    /// A broadcast-ready copy with lanes ordered for display.
    ///
    /// Rank order: numeric ranks ascending, unranked rows after all ranked
    /// ones, ties broken by lane number.
    pub fn snapshot(&self) -> RaceState {
        let mut copy = self.clone();
        if copy.sort_mode == SortMode::Rank {
            copy.lanes.sort_by_key(|lane| match lane.rank_value() {
                Some(rank) => (0u8, rank, lane.lane),
                None => (1, 0, lane.lane),
            });
        }
        copy
    }
}
