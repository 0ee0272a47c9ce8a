use std::net::IpAddr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::utils::error::RelayError;

/// The requesting identity handed to the executor with each command.
#[derive(Debug, Clone)]
pub struct CommandOrigin {
    /// The session that submitted the command.
    pub session: Uuid,
    /// The peer IP the command arrived from.
    pub peer: IpAddr,
}

/// The external command-execution authority.
///
/// Implementations interpret one command string at a time. The relay
/// guarantees serialization: the executor task awaits each call to
/// completion before taking the next request from its inbox, so no two
/// invocations ever overlap.
#[async_trait]
pub trait CommandExecutor: Send + Sync + 'static {
    /// Interprets and runs `command`, reporting whether it succeeded.
    async fn execute(&self, command: &str, origin: &CommandOrigin) -> anyhow::Result<bool>;
}

struct DispatchRequest {
    command: String,
    origin: CommandOrigin,
    reply: oneshot::Sender<anyhow::Result<bool>>,
}

/// Cloneable handle through which sessions reach the executor.
///
/// This is the sole path by which a command string reaches the
/// executor; handlers never call it directly.
#[derive(Clone)]
pub struct DispatchBridge {
    inbox: mpsc::Sender<DispatchRequest>,
    timeout: Duration,
}

/// Starts the single executor task and returns the bridge feeding it.
///
/// The task owns the inbox and services it serially in arrival order.
/// Dropping every bridge clone closes the inbox and ends the task.
pub fn spawn_executor<E: CommandExecutor>(
    executor: E,
    queue_depth: usize,
    timeout: Duration,
) -> (DispatchBridge, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<DispatchRequest>(queue_depth);

    let task = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            debug!(
                "Dispatching `{}` for {}",
                request.command, request.origin.peer
            );
            let result = executor.execute(&request.command, &request.origin).await;
            // The session may already have given up on this request.
            let _ = request.reply.send(result);
        }
        info!("Executor inbox closed, dispatch task exiting");
    });

    (
        DispatchBridge { inbox: tx, timeout },
        task,
    )
}

impl DispatchBridge {
    /// Hands `command` to the executor and blocks the calling session
    /// until the outcome is available or the configured deadline passes.
    ///
    /// # Errors
    /// Returns `RelayError::Dispatch` when the executor failed, the
    /// wait timed out, or the executor task is gone.
    pub async fn execute(
        &self,
        command: String,
        origin: CommandOrigin,
    ) -> Result<bool, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.inbox
            .send(DispatchRequest {
                command,
                origin,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RelayError::Dispatch("executor is not running".into()))?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(Ok(success))) => Ok(success),
            Ok(Ok(Err(e))) => Err(RelayError::Dispatch(e.to_string())),
            Ok(Err(_)) => Err(RelayError::Dispatch("executor dropped the request".into())),
            Err(_) => Err(RelayError::Dispatch(format!(
                "no result within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Runs relayed commands as host processes.
///
/// The stand-in execution authority used by the standalone binary: the
/// command root becomes the program, the remaining words its arguments,
/// and the exit status the reported outcome.
pub struct ShellExecutor;

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str, origin: &CommandOrigin) -> anyhow::Result<bool> {
        let mut parts = command.split_whitespace();
        let program = parts.next().context("empty command")?;

        let status = tokio::process::Command::new(program)
            .args(parts)
            .status()
            .await
            .with_context(|| format!("failed to run `{}`", program))?;

        debug!("`{}` from {} exited with {}", command, origin.peer, status);
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn origin() -> CommandOrigin {
        CommandOrigin {
            session: Uuid::new_v4(),
            peer: "127.0.0.1".parse().unwrap(),
        }
    }

    struct RecordingExecutor {
        calls: Arc<Mutex<Vec<String>>>,
        active: Arc<AtomicUsize>,
        overlapped: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn execute(&self, command: &str, _origin: &CommandOrigin) -> anyhow::Result<bool> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(self.delay).await;
            self.calls.lock().await.push(command.to_string());
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn concurrent_calls_never_overlap_on_the_executor() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let overlapped = Arc::new(AtomicUsize::new(0));
        let executor = RecordingExecutor {
            calls: calls.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            overlapped: overlapped.clone(),
            delay: Duration::from_millis(10),
        };

        let (bridge, task) = spawn_executor(executor, 8, Duration::from_secs(5));

        let mut handles = Vec::new();
        for i in 0..8 {
            let bridge = bridge.clone();
            handles.push(tokio::spawn(async move {
                bridge.execute(format!("say {}", i), origin()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.lock().await.len(), 8);
        assert_eq!(overlapped.load(Ordering::SeqCst), 0);

        drop(bridge);
        task.await.unwrap();
    }

    struct OutcomeExecutor(Option<bool>);

    #[async_trait]
    impl CommandExecutor for OutcomeExecutor {
        async fn execute(&self, _command: &str, _origin: &CommandOrigin) -> anyhow::Result<bool> {
            match self.0 {
                Some(success) => Ok(success),
                None => Err(anyhow::anyhow!("executor exploded")),
            }
        }
    }

    #[tokio::test]
    async fn reports_command_failure() {
        let (bridge, _task) = spawn_executor(OutcomeExecutor(Some(false)), 1, Duration::from_secs(5));
        assert!(!bridge.execute("say hi".into(), origin()).await.unwrap());
    }

    #[tokio::test]
    async fn executor_error_becomes_dispatch_error() {
        let (bridge, _task) = spawn_executor(OutcomeExecutor(None), 1, Duration::from_secs(5));
        let err = bridge.execute("say hi".into(), origin()).await.unwrap_err();
        assert!(matches!(err, RelayError::Dispatch(_)));
        assert!(err.to_string().contains("executor exploded"));
    }

    struct StalledExecutor;

    #[async_trait]
    impl CommandExecutor for StalledExecutor {
        async fn execute(&self, _command: &str, _origin: &CommandOrigin) -> anyhow::Result<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn bounded_wait_expires_as_dispatch_error() {
        let (bridge, _task) = spawn_executor(StalledExecutor, 1, Duration::from_millis(50));
        let err = bridge.execute("say hi".into(), origin()).await.unwrap_err();
        assert!(matches!(err, RelayError::Dispatch(_)));
        assert!(err.to_string().contains("no result within"));
    }

    #[tokio::test]
    async fn closed_inbox_is_a_dispatch_error() {
        let (bridge, task) = spawn_executor(OutcomeExecutor(Some(true)), 1, Duration::from_secs(5));
        task.abort();
        let _ = task.await;
        let err = bridge.execute("say hi".into(), origin()).await.unwrap_err();
        assert!(matches!(err, RelayError::Dispatch(_)));
    }
}
