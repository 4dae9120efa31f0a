//! Unix-socket control server.
//!
//! The transport collaborator (web UI, operator tools) drives the engine
//! through this socket: one JSON request per line, one JSON response per
//! line. Commands map 1:1 onto the engine's operations; validation failures
//! come back as `{"status": "error", ...}` without mutating anything.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::engine::{
    HeaderPatch, LaneUpdate, PoolPatch, RaceEngine, SettingsPatch, TimingConfigPatch,
};
use crate::state::{epoch_ms, SortMode};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum ControlRequest {
    /// Full current snapshot.
    State,
    /// Server clock for display offset computation.
    Time,
    Header(HeaderPatch),
    Pool(PoolPatch),
    Settings(SettingsPatch),
    Lanes { lanes: Vec<LaneUpdate> },
    Lane(LaneUpdate),
    TimerStart { ts: Option<u64> },
    TimerStop,
    TimerReset,
    Sort { mode: SortMode },
    PrepareHeat {
        #[serde(flatten)]
        header: HeaderPatch,
        lanes: Vec<LaneUpdate>,
    },
    FinishHeat,
    GetTimingConfig,
    TimingConfig(TimingConfigPatch),
}

pub struct ControlServer {
    listener: UnixListener,
    engine: Arc<RaceEngine>,
}

impl ControlServer {
    /// Bind the control socket, replacing a stale one from a previous run.
    pub fn bind(socket_path: &Path, engine: Arc<RaceEngine>) -> Result<Self> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("failed to bind control socket {}", socket_path.display()))?;
        tracing::info!(path = %socket_path.display(), "control server listening");
        Ok(Self { listener, engine })
    }

    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, _addr) = self
                .listener
                .accept()
                .await
                .context("failed to accept control connection")?;
            let engine = Arc::clone(&self.engine);
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, engine).await {
                    tracing::debug!(error = %err, "control connection closed");
                }
            });
        }
    }
}

async fn handle_connection(stream: UnixStream, engine: Arc<RaceEngine>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        tracing::debug!(request = %line.trim(), "control request");
        let response = dispatch(&engine, &line).await;
        let mut payload = response.to_string();
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}

async fn dispatch(engine: &Arc<RaceEngine>, line: &str) -> serde_json::Value {
    let request: ControlRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => return error_response(format!("invalid request: {err}")),
    };

    match request {
        ControlRequest::State => {
            json!({ "status": "ok", "state": engine.snapshot().await })
        }
        ControlRequest::Time => {
            json!({ "status": "ok", "server_time_ms": epoch_ms() })
        }
        ControlRequest::Header(patch) => {
            engine.set_header(patch).await;
            let state = engine.snapshot().await;
            json!({
                "status": "ok",
                "race_title": state.race_title,
                "heat": state.heat,
                "event_text": state.event_text,
            })
        }
        ControlRequest::Pool(patch) => match engine.set_pool(patch).await {
            Ok(pool) => json!({
                "status": "ok",
                "lane_count": pool.lane_count,
                "first_lane": pool.first_lane,
                "lap_meters": pool.lap_meters,
            }),
            Err(err) => error_response(err.to_string()),
        },
        ControlRequest::Settings(patch) => match engine.set_settings(patch).await {
            Ok(settings) => json!({ "status": "ok", "settings": settings }),
            Err(err) => error_response(err.to_string()),
        },
        ControlRequest::Lanes { lanes } => match engine.replace_lanes(&lanes).await {
            Ok(()) => json!({ "status": "ok", "lanes": engine.snapshot().await.lanes }),
            Err(err) => error_response(err.to_string()),
        },
        ControlRequest::Lane(patch) => match engine.patch_lane(&patch).await {
            Ok(lane) => json!({ "status": "ok", "lane": lane }),
            Err(err) => error_response(err.to_string()),
        },
        ControlRequest::TimerStart { ts } => {
            json!({ "status": "ok", "timer": engine.timer_start(ts).await })
        }
        ControlRequest::TimerStop => {
            json!({ "status": "ok", "timer": engine.timer_stop().await })
        }
        ControlRequest::TimerReset => {
            json!({ "status": "ok", "timer": engine.timer_reset().await })
        }
        ControlRequest::Sort { mode } => {
            engine.set_sort_mode(mode).await;
            json!({ "status": "ok", "sort_mode": mode })
        }
        ControlRequest::PrepareHeat { header, lanes } => {
            match engine.prepare_heat(header, &lanes).await {
                Ok(()) => json!({ "status": "ok" }),
                Err(err) => error_response(err.to_string()),
            }
        }
        ControlRequest::FinishHeat => {
            engine.finish_heat().await;
            json!({ "status": "ok" })
        }
        ControlRequest::GetTimingConfig => {
            json!({ "status": "ok", "timing_config": engine.timing_config() })
        }
        ControlRequest::TimingConfig(patch) => match engine.set_timing_config(patch).await {
            Ok(config) => json!({ "status": "ok", "timing_config": config }),
            Err(err) => error_response(err.to_string()),
        },
    }
}

fn error_response(message: String) -> serde_json::Value {
    json!({ "status": "error", "message": message })
}
