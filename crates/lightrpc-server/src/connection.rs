use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use lightrpc_core::framing::log_frame;
use lightrpc_core::{Direction, FrameCodec, Message};

use crate::dispatch;
use crate::server::Shared;

/// How the peer is attached. Losing a pipe peer stops the whole server;
/// losing a socket peer only closes that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Pipe,
    Socket,
}

/// One peer: a reader loop dispatching frames and a writer loop draining the
/// connection's own outbound queue.
pub(crate) struct Connection {
    id: u64,
    mode: Mode,
    generation: u64,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl Connection {
    /// Register the connection for notifications and start both loops.
    pub(crate) fn spawn<R, W>(
        shared: Arc<Shared>,
        generation: u64,
        mode: Mode,
        cancel: CancellationToken,
        reader: R,
        writer: W,
    ) where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let id = shared.next_connection_id();
        let max_frame_size = shared.config.max_frame_size;
        let (outbound, queue) = mpsc::channel(shared.config.queue_capacity);
        shared.connections.insert(id, outbound.clone());
        tracing::debug!(connection = id, ?mode, "Peer connected");

        let connection = Arc::new(Self {
            id,
            mode,
            generation,
            shared,
            cancel,
        });

        let sink = FramedWrite::new(writer, FrameCodec::new(max_frame_size));
        let frames = FramedRead::new(reader, FrameCodec::new(max_frame_size));
        tokio::spawn(connection.clone().write_loop(sink, queue));
        tokio::spawn(connection.read_loop(frames, outbound));
    }

    async fn read_loop<R>(
        self: Arc<Self>,
        mut frames: FramedRead<R, FrameCodec>,
        outbound: mpsc::Sender<Message>,
    ) where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.shared.connections.remove(&self.id);
                    return;
                }
                frame = frames.next() => frame,
            };

            match frame {
                Some(Ok(frame)) => {
                    log_frame(&self.shared.config, Direction::Inbound, &frame);

                    // Each message runs on its own so a slow method never
                    // holds up the ones behind it.
                    let shared = self.shared.clone();
                    let outbound = outbound.clone();
                    tokio::spawn(async move {
                        let response =
                            dispatch::process(&shared.registry, &shared.config, &frame).await;
                        if let Some(response) = response {
                            if outbound.send(Message::Response(response)).await.is_err() {
                                tracing::debug!("Connection closed before response was sent");
                            }
                        }
                    });
                }
                Some(Err(e)) => {
                    tracing::error!("Failed to read from connection {}: {}", self.id, e);
                    break;
                }
                None => {
                    tracing::debug!(connection = self.id, "Peer disconnected");
                    break;
                }
            }
        }

        self.close();
    }

    async fn write_loop<W>(
        self: Arc<Self>,
        mut sink: FramedWrite<W, FrameCodec>,
        mut queue: mpsc::Receiver<Message>,
    ) where
        W: AsyncWrite + Unpin,
    {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = queue.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let payload = match serde_json::to_vec(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };

            log_frame(&self.shared.config, Direction::Outbound, &payload);
            if let Err(e) = sink.send(payload).await {
                tracing::error!("Failed to write to connection {}: {}", self.id, e);
                self.close();
                break;
            }
        }
        tracing::debug!(connection = self.id, "Writer stopped");
    }

    /// Stop accepting work for this peer. Responses already in flight still
    /// drain through the writer unless the server itself stops.
    fn close(&self) {
        self.shared.connections.remove(&self.id);
        if self.mode == Mode::Pipe {
            self.shared.stop(Some(self.generation));
        }
    }
}
