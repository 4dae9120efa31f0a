//! The decode pipeline between the listener process and the state engine.
//!
//! Reader task: child stdout → frame decoder → timestamped events.
//! Consumer task: events → engine, with the results-hold pause after an
//! official end. The queue between them is bounded and drops the *oldest*
//! entry on overflow: only the most recent timing state matters for a live
//! display.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::Notify;

use swimboard_protocol::{FrameDecoder, TimingEvent};

use crate::engine::RaceEngine;
use crate::state::epoch_ms;

/// Events buffered between reader and consumer.
pub(crate) const EVENT_QUEUE_CAPACITY: usize = 64;

/// Bounded MPSC queue with drop-oldest overflow.
pub(crate) struct EventQueue {
    inner: std::sync::Mutex<VecDeque<(TimingEvent, u64)>>,
    notify: Notify,
    capacity: usize,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: std::sync::Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push an event, evicting the oldest entry when full.
    pub(crate) fn push(&self, event: TimingEvent, arrival_ms: u64) {
        {
            let mut queue = self.inner.lock().unwrap();
            if queue.len() == self.capacity {
                let dropped = queue.pop_front();
                tracing::warn!(?dropped, "timing event queue full; dropping oldest");
            }
            queue.push_back((event, arrival_ms));
        }
        self.notify.notify_one();
    }

    /// Wait for and take the next event.
    pub(crate) async fn pop(&self) -> (TimingEvent, u64) {
        loop {
            if let Some(item) = self.inner.lock().unwrap().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Drain the listener's stdout through the decoder into the queue.
///
/// Returns when the stream ends (listener exited or was killed) or errors.
pub(crate) async fn run_reader(
    mut stdout: ChildStdout,
    mut decoder: FrameDecoder,
    queue: Arc<EventQueue>,
) {
    let mut buf = [0u8; 1024];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("listener stream ended");
                return;
            }
            Ok(n) => {
                decoder.push(&buf[..n]);
                let arrival_ms = epoch_ms();
                while let Some(event) = decoder.next_event() {
                    tracing::debug!(?event, "decoded timing event");
                    queue.push(event, arrival_ms);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "error reading from listener");
                return;
            }
        }
    }
}

/// Apply queued events to the engine, one at a time.
///
/// After an official end the consumer pauses for `hold_results` so the
/// final results stay on the board before the next heat's messages are
/// processed.
pub(crate) async fn run_consumer(
    queue: Arc<EventQueue>,
    engine: Arc<RaceEngine>,
    hold_results: Duration,
) {
    loop {
        let (event, arrival_ms) = queue.pop().await;
        let is_heat_end = matches!(event, TimingEvent::HeatEnd);
        engine.apply_timing_event(event, arrival_ms).await;
        if is_heat_end && !hold_results.is_zero() {
            tracing::info!(seconds = hold_results.as_secs_f64(), "holding final results");
            tokio::time::sleep(hold_results).await;
        }
    }
}
