// src/server/mod.rs
pub mod dispatch;
pub mod handler;
pub mod health;
pub mod listener;
pub mod middleware;
pub mod session;

// Re-export public components
pub use dispatch::{spawn_executor, CommandExecutor, CommandOrigin, DispatchBridge, ShellExecutor};
pub use handler::handle_connection;
pub use health::HealthMetrics;
pub use listener::{RelayServer, ServerStatus};
pub use middleware::rate_limit::ConnectionRateLimiter;
pub use session::{Session, SessionManager};

// Import internal dependencies
use std::sync::Arc;

use crate::config::ConfigStore;
use crate::utils::error_log::ErrorLog;

/// State shared by every connection handler.
///
/// Read-mostly: the configuration snapshot is the only piece mutated at
/// runtime, by replacement through the store.
pub struct ServerState {
    pub config: Arc<ConfigStore>,
    pub sessions: SessionManager,
    pub dispatch: DispatchBridge,
    pub metrics: HealthMetrics,
    pub rate_limiter: ConnectionRateLimiter,
    pub error_log: ErrorLog,
}
