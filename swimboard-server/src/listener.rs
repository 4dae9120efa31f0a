//! Supervisor for the external serial-listener process.
//!
//! The listener bridges the physical serial device to the frame decoder's
//! byte stream. At most one instance is alive per timing-configuration
//! generation; `apply` is the only transition that starts one, and it
//! always tears the previous instance down first, discarding all in-flight
//! decode state. A listener that dies on its own stays down until the next
//! explicit `apply`.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use swimboard_protocol::{DebugRecorder, FrameDecoder};

use crate::config::TimingConfig;
use crate::engine::RaceEngine;
use crate::pipeline::{self, EventQueue, EVENT_QUEUE_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Inner {
    state: ListenerState,
    child: Option<Child>,
    tasks: Vec<JoinHandle<()>>,
    generation: u64,
}

pub struct ListenerSupervisor {
    inner: Mutex<Inner>,
}

impl ListenerSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: ListenerState::Stopped,
                child: None,
                tasks: Vec::new(),
                generation: 0,
            }),
        })
    }

    pub async fn state(&self) -> ListenerState {
        self.inner.lock().await.state
    }

    /// Process id of the live listener, if any.
    pub async fn child_id(&self) -> Option<u32> {
        self.inner.lock().await.child.as_ref().and_then(Child::id)
    }

    /// Apply a timing configuration: tear down any running listener, then
    /// start a fresh one for the new config.
    ///
    /// The inner lock serializes restarts, so at most one is in flight and
    /// the old instance is observably terminated before the new one spawns.
    /// With no serial port configured the supervisor simply ends up Stopped.
    pub async fn apply(
        self: &Arc<Self>,
        config: &TimingConfig,
        engine: Arc<RaceEngine>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::teardown(&mut inner).await;

        if config.com_port.trim().is_empty() {
            tracing::info!("no serial port configured; listener not started");
            return Ok(());
        }

        inner.state = ListenerState::Starting;
        inner.generation += 1;
        let generation = inner.generation;

        let (program, args) = listener_command(config)?;
        tracing::info!(program = %program.display(), ?args, "starting serial listener");

        let spawned = Command::new(&program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn listener {}", program.display()));
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                inner.state = ListenerState::Stopped;
                return Err(err);
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill().await;
                inner.state = ListenerState::Stopped;
                anyhow::bail!("listener stdout was not captured");
            }
        };

        let mut decoder = FrameDecoder::new();
        if config.debug_capture_enabled {
            match &config.debug_path {
                Some(path) if !path.as_os_str().is_empty() => {
                    decoder = decoder.with_capture(DebugRecorder::open(path));
                }
                _ => {
                    tracing::warn!("debug capture enabled but no debug_path configured");
                }
            }
        }

        let queue = Arc::new(EventQueue::new(EVENT_QUEUE_CAPACITY));

        let reader_queue = Arc::clone(&queue);
        let observer = Arc::downgrade(self);
        let reader = tokio::spawn(async move {
            pipeline::run_reader(stdout, decoder, reader_queue).await;
            // Stream end outside of a teardown means the listener died.
            if let Some(supervisor) = observer.upgrade() {
                supervisor.observe_exit(generation).await;
            }
        });

        let hold = Duration::from_secs_f64(config.hold_results_time.max(0.0));
        let consumer = tokio::spawn(pipeline::run_consumer(queue, engine, hold));

        inner.child = Some(child);
        inner.tasks = vec![reader, consumer];
        inner.state = ListenerState::Running;
        Ok(())
    }

    /// Stop the listener without starting a new one (server shutdown).
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        Self::teardown(&mut inner).await;
    }

    async fn teardown(inner: &mut Inner) {
        if inner.child.is_none() && inner.tasks.is_empty() {
            inner.state = ListenerState::Stopped;
            return;
        }

        inner.state = ListenerState::Stopping;
        if let Some(mut child) = inner.child.take() {
            match child.kill().await {
                Ok(()) => tracing::info!("listener terminated"),
                Err(err) => tracing::warn!(error = %err, "failed to kill listener"),
            }
        }
        // Dropping the tasks discards all partially decoded state and any
        // queued events from the old generation.
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        inner.state = ListenerState::Stopped;
    }

    /// Called by the reader task when the listener's stream ends on its own.
    ///
    /// No auto-restart: the operator (or a config re-apply) decides when to
    /// try again. The consumer task stays alive to drain events that were
    /// already queued; the next `apply`/`stop` teardown collects it.
    async fn observe_exit(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != ListenerState::Running {
            // A newer generation already replaced us; nothing to observe.
            return;
        }

        if let Some(mut child) = inner.child.take() {
            match child.wait().await {
                Ok(status) => {
                    tracing::error!(%status, "listener exited; waiting for explicit restart")
                }
                Err(err) => tracing::error!(error = %err, "listener exited and could not be reaped"),
            }
        }
        inner.state = ListenerState::Stopped;
    }
}

/// Resolve the listener command line for a timing configuration.
fn listener_command(config: &TimingConfig) -> Result<(PathBuf, Vec<String>)> {
    let program = match &config.listener_program {
        Some(program) => program.clone(),
        None => default_listener_program()?,
    };
    let args = vec![
        "--port".to_string(),
        config.com_port.clone(),
        "--settings".to_string(),
        config.com_settings.clone(),
    ];
    Ok((program, args))
}

/// The bundled `swimboard-listener` next to the server executable, falling
/// back to `$PATH` lookup.
fn default_listener_program() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate server executable")?;
    let sibling = exe
        .parent()
        .map(|dir| dir.join("swimboard-listener"))
        .filter(|path| path.is_file());
    Ok(sibling.unwrap_or_else(|| PathBuf::from("swimboard-listener")))
}
