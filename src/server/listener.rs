use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::server::{handler, ServerState};
use crate::utils::error::RelayError;

/// Bound on one accept wait. Expiry is a retry, not an error, so a stop
/// request is observed promptly instead of blocking in accept forever.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a stop waits for the accept loop before abandoning it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle state of the listener.
///
/// Transitions are `Stopped → Starting → Running → Stopping → Stopped`
/// only; `start` succeeds from `Stopped`, `stop` is idempotent from any
/// state and always ends in `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running { port: u16 },
    Stopping,
}

struct ListenerHandle {
    port: u16,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// Owns the listening socket and the accept loop.
///
/// Accepted connections are handed to spawned handler tasks gated by a
/// fixed-capacity worker pool; when the pool is saturated, admissions
/// queue FIFO rather than drop.
pub struct RelayServer {
    state: Arc<ServerState>,
    status: RwLock<ServerStatus>,
    // One start/stop transition in flight at a time.
    control: Mutex<Option<ListenerHandle>>,
}

impl RelayServer {
    /// Creates a server around shared relay state, in the `Stopped` state.
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            status: RwLock::new(ServerStatus::Stopped),
            control: Mutex::new(None),
        }
    }

    /// The shared state this server accepts connections for.
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Binds the configured port and starts accepting connections.
    ///
    /// Returns the bound port (meaningful when the configured port is
    /// 0). Calling `start` while already running is a logged no-op.
    ///
    /// # Errors
    /// Returns `RelayError::Bind` when the port cannot be bound; the
    /// failure is recorded in the durable error log and the server
    /// stays `Stopped`.
    pub async fn start(&self) -> Result<u16, RelayError> {
        let mut control = self.control.lock().await;

        if let Some(handle) = control.as_ref() {
            warn!("TCP server already running on port {}", handle.port);
            return Ok(handle.port);
        }
        self.set_status(ServerStatus::Starting);

        let config = self.state.config.current();
        let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                let msg = format!("Error starting TCP server on port {}: {}", config.port, e);
                error!("{}", msg);
                self.state.error_log.record(&msg, Some(&e));
                self.set_status(ServerStatus::Stopped);
                return Err(RelayError::Bind(msg));
            }
        };
        let port = listener
            .local_addr()
            .map_err(|e| RelayError::Bind(e.to_string()))?
            .port();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = Arc::new(Semaphore::new(config.max_clients));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.state.clone(),
            workers,
            shutdown_rx,
        ));

        *control = Some(ListenerHandle {
            port,
            shutdown: shutdown_tx,
            accept_task,
        });
        self.set_status(ServerStatus::Running { port });
        info!("TCP server started on port {}", port);
        Ok(port)
    }

    /// Stops accepting connections, signals every in-flight session to
    /// terminate, and releases the listening socket.
    ///
    /// Idempotent from any state; completes in bounded time even if a
    /// dispatch is hung, abandoning the accept task if it does not exit
    /// within the grace period.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;

        let Some(handle) = control.take() else {
            self.set_status(ServerStatus::Stopped);
            return;
        };
        self.set_status(ServerStatus::Stopping);

        let _ = handle.shutdown.send(true);

        let mut task = handle.accept_task;
        match timeout(STOP_GRACE, &mut task).await {
            Ok(_) => {}
            Err(_) => {
                warn!("Accept loop did not stop in time, aborting it");
                task.abort();
            }
        }

        self.state.sessions.clear();
        self.set_status(ServerStatus::Stopped);
        info!("TCP server closed successfully");
    }

    /// The current lifecycle state, safe to query from any task.
    pub fn status(&self) -> ServerStatus {
        *self.status.read().unwrap()
    }

    fn set_status(&self, status: ServerStatus) {
        *self.status.write().unwrap() = status;
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    workers: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
) {
    let mut stop = shutdown.clone();

    loop {
        tokio::select! {
            _ = stop.changed() => {
                debug!("Accept loop observed shutdown");
                break;
            }
            accepted = timeout(ACCEPT_TIMEOUT, listener.accept()) => {
                match accepted {
                    // Accept timeout: retry so shutdown stays observable.
                    Err(_) => continue,
                    Ok(Err(e)) => {
                        let msg = format!("Error accepting client: {}", e);
                        error!("{}", msg);
                        state.error_log.record(&msg, Some(&e));
                    }
                    Ok(Ok((stream, addr))) => {
                        let state = state.clone();
                        let workers = workers.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            // Queue FIFO behind the fixed worker pool.
                            let _permit = match workers.acquire().await {
                                Ok(permit) => permit,
                                Err(_) => return,
                            };
                            if let Err(e) =
                                handler::handle_connection(stream, addr, state.clone(), shutdown)
                                    .await
                            {
                                error!("Error handling client {}: {}", addr, e);
                                state.error_log.record(
                                    &format!("Error handling client {}", addr),
                                    Some(&e),
                                );
                            }
                        });
                    }
                }
            }
        }
    }
    // Returning drops the listener and releases the socket.
}
