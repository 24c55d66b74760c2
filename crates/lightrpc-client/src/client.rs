use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lightrpc_core::framing::log_frame;
use lightrpc_core::{Direction, EngineConfig, FrameCodec, Id, Method, RawResponse, Request};

use crate::error::{ClientError, Result};

/// JSON-RPC client engine.
///
/// A client is Down until [`Client::start`] hands it a stream pair. While Up
/// it runs one writer task draining the outbound queue and one reader task
/// routing responses to their pending callers. Dropping the client shuts it
/// down.
pub struct Client {
    shared: Arc<Shared>,
    request_counter: AtomicI64,
    timeout: Mutex<Duration>,
}

struct Shared {
    config: EngineConfig,
    pending: DashMap<String, oneshot::Sender<RawResponse>>,
    state: Mutex<Option<Running>>,
    generation: AtomicU64,
}

/// Handles owned by an Up client. Taking them out of `state` is what shuts
/// the client down, so only one caller ever does it.
struct Running {
    generation: u64,
    outbound: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
}

impl Client {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.request_timeout();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                pending: DashMap::new(),
                state: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            request_counter: AtomicI64::new(1),
            timeout: Mutex::new(timeout),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Start the reader and writer loops. Must be called from within a tokio
    /// runtime.
    pub fn start<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.is_some() {
            return Err(ClientError::AlreadyRunning);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound, queue) = mpsc::channel(self.shared.config.queue_capacity);
        let cancel = CancellationToken::new();
        let max_frame_size = self.shared.config.max_frame_size;

        tokio::spawn(write_loop(
            self.shared.clone(),
            generation,
            FramedWrite::new(writer, FrameCodec::new(max_frame_size)),
            queue,
            cancel.clone(),
        ));
        tokio::spawn(read_loop(
            self.shared.clone(),
            generation,
            FramedRead::new(reader, FrameCodec::new(max_frame_size)),
            cancel.clone(),
        ));

        *state = Some(Running {
            generation,
            outbound,
            cancel,
        });
        info!("Client started");
        Ok(())
    }

    /// Start on a single bidirectional stream, such as a connected socket.
    pub fn start_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.start(reader, writer)
    }

    /// Stop both loops and release every waiting caller with
    /// [`ClientError::Closed`]. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.shared.stop(None);
    }

    pub fn is_up(&self) -> bool {
        self.shared.is_up()
    }

    /// Timeout applied by [`Client::request`].
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    /// Next request identifier. Identifiers start at 1 and never repeat for
    /// the lifetime of the client.
    pub fn next_id(&self) -> Id {
        Id::Int(self.request_counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Send a notification. Returns once it is queued; no reply is expected.
    pub async fn notify<M: Method>(&self, method: &M) -> Result<()> {
        let outbound = self.shared.outbound()?;
        let payload = serde_json::to_vec(&Request::notification(method))?;
        outbound
            .send(payload)
            .await
            .map_err(|_| ClientError::Shutdown)
    }

    /// Call `method` and decode its result, giving up after the client's
    /// timeout.
    pub async fn request<M, R>(&self, method: &M) -> Result<R>
    where
        M: Method,
        R: DeserializeOwned,
    {
        let timeout = self.timeout();
        self.request_with_timeout(method, timeout).await
    }

    pub async fn request_with_timeout<M, R>(&self, method: &M, timeout: Duration) -> Result<R>
    where
        M: Method,
        R: DeserializeOwned,
    {
        let (id, reply) = self.issue(method).await?;
        match tokio::time::timeout(timeout, reply).await {
            Ok(reply) => handle_reply(reply),
            Err(_) => {
                self.shared.pending.remove(&id.key());
                debug!(%id, "Request timed out");
                Err(ClientError::TimedOut)
            }
        }
    }

    /// Call `method` and wait for as long as it takes. Only shutdown or a
    /// reply ends the wait.
    pub async fn request_no_timeout<M, R>(&self, method: &M) -> Result<R>
    where
        M: Method,
        R: DeserializeOwned,
    {
        let (_, reply) = self.issue(method).await?;
        handle_reply(reply.await)
    }

    async fn issue<M: Method>(&self, method: &M) -> Result<(Id, oneshot::Receiver<RawResponse>)> {
        let outbound = self.shared.outbound()?;
        let id = self.next_id();
        let payload = serde_json::to_vec(&Request::new(id.clone(), method))?;

        let key = id.key();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(key.clone(), tx);

        // A shutdown that raced the insert has already cleared the map.
        if !self.shared.is_up() {
            self.shared.pending.remove(&key);
            return Err(ClientError::Shutdown);
        }

        if outbound.send(payload).await.is_err() {
            self.shared.pending.remove(&key);
            return Err(ClientError::Shutdown);
        }
        Ok((id, rx))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.stop(None);
    }
}

impl Shared {
    fn is_up(&self) -> bool {
        self.state.lock().is_some()
    }

    fn outbound(&self) -> Result<mpsc::Sender<Vec<u8>>> {
        self.state
            .lock()
            .as_ref()
            .map(|running| running.outbound.clone())
            .ok_or(ClientError::Shutdown)
    }

    /// Shut down. With a generation, only if that run is still the current
    /// one, so a stale loop can't stop a restarted client.
    fn stop(&self, generation: Option<u64>) {
        let mut state = self.state.lock();
        let current = match state.as_ref() {
            Some(running) => running.generation,
            None => return,
        };
        if generation.is_some_and(|generation| generation != current) {
            return;
        }

        if let Some(running) = state.take() {
            running.cancel.cancel();
            // Dropping the senders hands `Closed` to every waiting caller.
            self.pending.clear();
            info!("Client shut down");
        }
    }

    fn route(&self, response: RawResponse) {
        let id = match &response.id {
            Some(id) => id.key(),
            None => {
                warn!("No Id provided");
                return;
            }
        };

        match self.pending.remove(&id) {
            Some((_, reply)) => {
                if reply.send(response).is_err() {
                    debug!(%id, "Caller stopped waiting for response");
                }
            }
            None => warn!("No return channel found for response with id {}", id),
        }
    }
}

fn handle_reply<R: DeserializeOwned>(
    reply: std::result::Result<RawResponse, oneshot::error::RecvError>,
) -> Result<R> {
    let response = reply.map_err(|_| ClientError::Closed)?;
    Ok(response.into_result()?)
}

async fn write_loop<W>(
    shared: Arc<Shared>,
    generation: u64,
    mut sink: FramedWrite<W, FrameCodec>,
    mut queue: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            payload = queue.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        log_frame(&shared.config, Direction::Outbound, &payload);
        if let Err(e) = sink.send(payload).await {
            error!("Failed to write request: {}", e);
            shared.stop(Some(generation));
            break;
        }
    }
    debug!("Client writer stopped");
}

async fn read_loop<R>(
    shared: Arc<Shared>,
    generation: u64,
    mut frames: FramedRead<R, FrameCodec>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Client reader stopped");
                return;
            }
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(frame)) => {
                log_frame(&shared.config, Direction::Inbound, &frame);
                if frame.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<RawResponse>(&frame) {
                    Ok(response) => shared.route(response),
                    Err(e) => {
                        error!("Failed to decode response: {}", e);
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                error!("Failed to read from stream: {}", e);
                break;
            }
            None => {
                info!("Stream closed by peer");
                break;
            }
        }
    }

    shared.stop(Some(generation));
}
