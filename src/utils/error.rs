use thiserror::Error;

use crate::server::middleware::validation::Rejection;

/// Represents various errors that can occur in the command relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A request line was rejected before dispatch.
    ///
    /// Covers malformed lines, bad tokens and disallowed IPs or command
    /// roots. These are resolved locally by writing a response to the
    /// client and closing the connection; they never escalate.
    #[error("Request rejected: {0}")]
    Rejected(#[from] Rejection),

    /// The executor failed, timed out or went away while a command was
    /// in flight.
    ///
    /// Recoverable: the session reports the failure for that line and
    /// keeps the connection open for further requests.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Socket I/O failed while reading a request or writing a response.
    ///
    /// Fatal to the connection; the session is logged and closed.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Represents an error in the relay configuration.
    ///
    /// A failed reload is rejected wholesale; the previous snapshot
    /// remains current.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The listener could not bind the configured port.
    ///
    /// The server fails to start and the administrative status keeps
    /// reporting not-running.
    #[error("Bind error: {0}")]
    Bind(String),
}
