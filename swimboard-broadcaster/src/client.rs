use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

/// One connected display client.
///
/// Each client drains its own queue onto its own stream, so a stalled
/// display can never hold up the publisher or its neighbours. When the
/// queue's sender side is dropped (client evicted) or the stream dies, the
/// task ends and the connection closes.
pub(crate) struct Client {
    stream: UnixStream,
}

impl Client {
    pub(crate) fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Forward queued snapshot lines to the peer until either side goes away.
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Arc<str>>) {
        while let Some(line) = rx.recv().await {
            if let Err(err) = self.stream.write_all(line.as_bytes()).await {
                tracing::info!(error = %err, "display client disconnected");
                return;
            }
        }
        tracing::debug!("display client writer stopped");
    }
}
