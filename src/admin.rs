use crate::server::{RelayServer, ServerStatus};

/// Usage line shown for empty or unknown operator input.
pub const USAGE: &str = "Use: reload | info | tcpstatus";

/// One of the three administrative subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Re-read the configuration and swap the active snapshot.
    Reload,
    /// Static name and version string.
    Info,
    /// Whether the listener is running, and on which port.
    TcpStatus,
}

impl AdminCommand {
    /// Parses an operator line; `None` for empty or unknown input.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "reload" => Some(Self::Reload),
            "info" => Some(Self::Info),
            "tcpstatus" => Some(Self::TcpStatus),
            _ => None,
        }
    }
}

/// Runs one administrative command and returns the operator-visible reply.
///
/// Gating who may invoke these is the host's concern; the standalone
/// binary treats local console access as the elevated privilege.
pub fn handle(command: AdminCommand, server: &RelayServer) -> String {
    match command {
        AdminCommand::Reload => match server.state().config.reload() {
            Ok(()) => "Config reloaded.".to_string(),
            Err(e) => format!("Reload failed, keeping previous config: {}", e),
        },
        AdminCommand::Info => format!(
            "{} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
        AdminCommand::TcpStatus => match server.status() {
            ServerStatus::Running { port } => {
                format!("TCP server listening on port {}", port)
            }
            _ => "TCP server is not active.".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::{ConfigStore, RelayConfig};
    use crate::server::{
        spawn_executor, CommandExecutor, CommandOrigin, ConnectionRateLimiter, HealthMetrics,
        ServerState, SessionManager,
    };
    use crate::utils::error_log::ErrorLog;

    struct NoopExecutor;

    #[async_trait]
    impl CommandExecutor for NoopExecutor {
        async fn execute(&self, _command: &str, _origin: &CommandOrigin) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn server(dir: &std::path::Path) -> RelayServer {
        let (dispatch, _task) = spawn_executor(NoopExecutor, 4, Duration::from_secs(1));
        let state = Arc::new(ServerState {
            config: Arc::new(ConfigStore::from_snapshot(RelayConfig::default())),
            sessions: SessionManager::new(),
            dispatch,
            metrics: HealthMetrics::new(),
            rate_limiter: ConnectionRateLimiter::new(20),
            error_log: ErrorLog::new(dir.join("errors.log")),
        });
        RelayServer::new(state)
    }

    #[test]
    fn parses_known_subcommands() {
        assert_eq!(AdminCommand::parse("reload"), Some(AdminCommand::Reload));
        assert_eq!(AdminCommand::parse("  INFO "), Some(AdminCommand::Info));
        assert_eq!(
            AdminCommand::parse("TcpStatus"),
            Some(AdminCommand::TcpStatus)
        );
        assert_eq!(AdminCommand::parse("restart"), None);
        assert_eq!(AdminCommand::parse(""), None);
    }

    #[tokio::test]
    async fn info_reports_name_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let reply = handle(AdminCommand::Info, &server);
        assert!(reply.contains("command-relay"));
        assert!(reply.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn tcpstatus_reports_stopped_server() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        assert_eq!(
            handle(AdminCommand::TcpStatus, &server),
            "TCP server is not active."
        );
    }

    #[tokio::test]
    async fn reload_without_backing_file_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let reply = handle(AdminCommand::Reload, &server);
        assert!(reply.starts_with("Reload failed"));
    }
}
