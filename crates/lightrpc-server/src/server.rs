use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lightrpc_core::{EngineConfig, Message, Method, Request};

use crate::connection::{Connection, Mode};
use crate::error::{Result, ServerError};
use crate::method::{Handler, ServerMethod};
use crate::registry::MethodRegistry;

/// JSON-RPC server engine.
///
/// Methods are registered up front (or at any time while running). The
/// server then serves them either to a single peer over a stream pair
/// ([`Server::start`]) or to every peer connecting on a Unix socket
/// ([`Server::listen`]).
pub struct Server {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) registry: MethodRegistry,
    /// Outbound queue of every live connection, for notifications.
    pub(crate) connections: DashMap<u64, mpsc::Sender<Message>>,
    next_connection: AtomicU64,
    state: Mutex<Option<Running>>,
    generation: AtomicU64,
}

struct Running {
    generation: u64,
    cancel: CancellationToken,
}

impl Server {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                registry: MethodRegistry::new(),
                connections: DashMap::new(),
                next_connection: AtomicU64::new(1),
                state: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Register `method` as the prototype for requests naming it.
    pub fn register<H: Handler>(&self, method: H) -> Result<()> {
        self.shared.registry.register(Arc::new(method))?;
        Ok(())
    }

    pub fn unregister_by_name(&self, name: &str) -> Result<()> {
        self.shared.registry.unregister_by_name(name)?;
        Ok(())
    }

    pub fn unregister<M: Method>(&self, method: &M) -> Result<()> {
        self.unregister_by_name(method.name())
    }

    /// Every registered prototype, in no particular order.
    pub fn methods(&self) -> Vec<Arc<dyn ServerMethod>> {
        self.shared.registry.methods()
    }

    /// Serve a single peer over a stream pair. Returns once the loops are
    /// running; the server stops when the peer's stream ends. Must be called
    /// from within a tokio runtime.
    pub fn start<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let (generation, cancel) = self.shared.begin();
        Connection::spawn(
            self.shared.clone(),
            generation,
            Mode::Pipe,
            cancel.child_token(),
            reader,
            writer,
        );

        *state = Some(Running { generation, cancel });
        tracing::info!("Server started");
        Ok(())
    }

    pub fn start_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.start(reader, writer)
    }

    /// Listen on a Unix socket at `path`, serving each connection
    /// independently. A stale socket file is replaced. Runs until
    /// [`Server::shutdown`].
    pub async fn listen(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let (listener, generation, cancel) = {
            let mut state = self.shared.state.lock();
            if state.is_some() {
                return Err(ServerError::AlreadyRunning);
            }

            if path.exists() {
                std::fs::remove_file(path)?;
            }
            let listener = UnixListener::bind(path)?;

            let (generation, cancel) = self.shared.begin();
            *state = Some(Running {
                generation,
                cancel: cancel.clone(),
            });
            (listener, generation, cancel)
        };
        tracing::info!("Server listening on {}", path.display());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let (reader, writer) = tokio::io::split(stream);
                        Connection::spawn(
                            self.shared.clone(),
                            generation,
                            Mode::Socket,
                            cancel.child_token(),
                            reader,
                            writer,
                        );
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        drop(listener);
        if let Err(e) = std::fs::remove_file(path) {
            tracing::debug!("Failed to remove socket {}: {}", path.display(), e);
        }
        tracing::info!("Server stopped listening on {}", path.display());
        Ok(())
    }

    /// Push a notification to every connected peer.
    pub async fn notify<M: Method>(&self, method: &M) -> Result<()> {
        if !self.is_up() {
            return Err(ServerError::Shutdown);
        }

        let message = Message::Request(Request::notification(method));
        let targets: Vec<_> = self
            .shared
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for target in targets {
            if target.send(message.clone()).await.is_err() {
                tracing::debug!("Dropping notification for closed connection");
            }
        }
        Ok(())
    }

    /// Stop serving. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.shared.stop(None);
    }

    pub fn is_up(&self) -> bool {
        self.shared.state.lock().is_some()
    }

    /// Wait until the server is shut down, from any cause.
    pub async fn stopped(&self) {
        let cancel = self
            .shared
            .state
            .lock()
            .as_ref()
            .map(|running| running.cancel.clone());
        if let Some(cancel) = cancel {
            cancel.cancelled().await;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shared.stop(None);
    }
}

impl Shared {
    fn begin(&self) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, CancellationToken::new())
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::SeqCst)
    }

    /// Shut down. With a generation, only if that run is still the current
    /// one.
    pub(crate) fn stop(&self, generation: Option<u64>) {
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
            self.connections.clear();
            tracing::info!("Server shut down");
        }
    }
}
