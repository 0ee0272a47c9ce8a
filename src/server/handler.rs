use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::server::dispatch::CommandOrigin;
use crate::server::middleware::validation::{validate_line, Rejection};
use crate::server::session::Session;
use crate::server::ServerState;
use crate::utils::error::RelayError;

/// Serves one accepted connection until the peer disconnects, a fatal
/// rejection occurs, or the server shuts down.
///
/// The handler exclusively owns the socket and both halves of its
/// stream for the session's entire lifetime; every exit path closes the
/// connection by dropping them.
///
/// # Errors
/// Returns `RelayError::Transport` if socket I/O fails mid-session.
#[instrument(skip(stream, state, shutdown))]
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), RelayError> {
    state.rate_limiter.check(addr.ip()).await;

    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let snapshot = state.config.current();
    let peer_ip = addr.ip().to_string();

    // A disallowed IP is refused before a single line is read.
    if !snapshot.allowed_ips.is_empty() && !snapshot.allowed_ips.contains(&peer_ip) {
        info!("Connection refused from IP not allowed: {}", peer_ip);
        write_response(
            &mut writer,
            &Rejection::IpNotAllowed.wire_response(&snapshot),
        )
        .await?;
        return Ok(());
    }

    let session = Session::new(addr);
    let session_id = session.id;
    state.sessions.add(session);
    state.metrics.sessions_open.inc();
    info!(
        "Client connected: {} (active_sessions={})",
        addr,
        state.sessions.active()
    );

    let result = serve_lines(
        &mut reader,
        &mut writer,
        session_id,
        addr,
        &state,
        &mut shutdown,
    )
    .await;

    state.sessions.remove(&session_id);
    state.metrics.sessions_open.dec();
    info!("Client disconnected: {}", addr);

    result
}

/// The lock-step request loop: line N+1 is not read before line N's
/// response has been written.
async fn serve_lines(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    session_id: Uuid,
    addr: SocketAddr,
    state: &Arc<ServerState>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), RelayError> {
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            _ = shutdown.changed() => {
                debug!("Shutdown observed, closing session with {}", addr);
                return Ok(());
            }
            read = reader.read_line(&mut line) => read?,
        };

        // End of stream is the normal way for a session to end.
        if bytes_read == 0 {
            return Ok(());
        }

        state.metrics.lines_received.inc();

        // Each line is checked against the snapshot current at that
        // moment; a reload mid-check can never mix old and new fields.
        let snapshot = state.config.current();

        let parsed = match validate_line(line.trim(), &snapshot) {
            Ok(parsed) => parsed,
            Err(rejection) => {
                if snapshot.debug {
                    debug!("{} from {}", rejection, addr);
                }
                write_response(writer, &rejection.wire_response(&snapshot)).await?;
                // Fail closed: any structural, auth or authorization
                // failure ends the connection.
                return Ok(());
            }
        };

        debug!("Relaying `{}` command from {}", parsed.root, addr);
        let origin = CommandOrigin {
            session: session_id,
            peer: addr.ip(),
        };

        let outcome = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            result = state.dispatch.execute(parsed.command, origin) => result,
        };

        match outcome {
            Ok(true) => {
                state.metrics.commands_executed.inc();
                write_response(writer, &snapshot.messages.command_executed).await?;
            }
            Ok(false) => {
                state.metrics.commands_failed.inc();
                write_response(writer, "ERROR: command failed").await?;
            }
            Err(e) => {
                // The credentials and connection are still valid; only
                // this command failed, so the session continues.
                state.metrics.commands_failed.inc();
                error!("Error executing command for {}: {}", addr, e);
                state.error_log.record(
                    &format!("Error executing command from {}", addr),
                    Some(&e),
                );
                write_response(writer, "ERROR: failure to execute command").await?;
            }
        }
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, message: &str) -> Result<(), RelayError> {
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
