use thiserror::Error;
use tracing::debug;

use crate::config::RelayConfig;

/// Why a request line was refused before reaching the executor.
///
/// Every rejection is fatal to the connection: the mapped response is
/// written once and the session ends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The line carried no colon separator.
    #[error("invalid request format")]
    InvalidFormat,

    /// The supplied token did not match the shared secret.
    #[error("invalid token")]
    InvalidToken,

    /// The command root is not on the configured allowlist.
    #[error("command not allowed")]
    CommandNotAllowed,

    /// The peer IP is not on the configured allowlist.
    #[error("IP not allowed")]
    IpNotAllowed,
}

impl Rejection {
    /// The exact response line written to the client for this rejection.
    pub fn wire_response(&self, config: &RelayConfig) -> String {
        match self {
            Rejection::InvalidFormat => "ERROR: Invalid format".to_string(),
            Rejection::InvalidToken => config.messages.invalid_token.clone(),
            Rejection::CommandNotAllowed => "ERROR: Command not allowed".to_string(),
            Rejection::IpNotAllowed => "ERROR: IP not allowed".to_string(),
        }
    }
}

/// A request line that passed every check and may be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The full command text, trimmed; may itself contain colons.
    pub command: String,
    /// The first whitespace-delimited word, matched against the allowlist.
    pub root: String,
}

/// Checks one raw request line against a configuration snapshot.
///
/// Pure aside from the debug log call; the caller captures the snapshot
/// once per line so a concurrent reload can never mix old and new
/// fields within one check.
pub fn validate_line(line: &str, config: &RelayConfig) -> Result<ParsedCommand, Rejection> {
    // Only the first colon splits token from command.
    let (token, command) = line.split_once(':').ok_or(Rejection::InvalidFormat)?;

    if config.debug {
        debug!("Received -> {}", line);
    }

    let token = token.trim();
    let command = command.trim();

    if token != config.secret_key.trim() {
        return Err(Rejection::InvalidToken);
    }

    let root = command.split_whitespace().next().unwrap_or_default();
    if !config.allowed_commands.contains(root) {
        return Err(Rejection::CommandNotAllowed);
    }

    Ok(ParsedCommand {
        command: command.to_string(),
        root: root.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RelayConfig {
        RelayConfig {
            secret_key: "tok".to_string(),
            allowed_commands: ["say".to_string()].into_iter().collect(),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn accepts_valid_line() {
        let parsed = validate_line("tok:say hello", &config()).unwrap();
        assert_eq!(parsed.command, "say hello");
        assert_eq!(parsed.root, "say");
    }

    #[test]
    fn rejects_line_without_colon() {
        assert_eq!(
            validate_line("say hi", &config()),
            Err(Rejection::InvalidFormat)
        );
    }

    #[test]
    fn rejects_wrong_token() {
        assert_eq!(
            validate_line("wrong:say hi", &config()),
            Err(Rejection::InvalidToken)
        );
    }

    #[test]
    fn rejects_disallowed_root() {
        assert_eq!(
            validate_line("tok:ban steve", &config()),
            Err(Rejection::CommandNotAllowed)
        );
    }

    #[test]
    fn allowed_root_as_later_word_is_still_rejected() {
        assert_eq!(
            validate_line("tok:ban say", &config()),
            Err(Rejection::CommandNotAllowed)
        );
    }

    #[test]
    fn command_may_contain_colons() {
        let parsed = validate_line("tok:say hello:world", &config()).unwrap();
        assert_eq!(parsed.command, "say hello:world");
    }

    #[test]
    fn token_and_secret_are_compared_trimmed() {
        let mut cfg = config();
        cfg.secret_key = "  tok  ".to_string();
        assert!(validate_line("  tok  :say hi", &cfg).is_ok());
    }

    #[test]
    fn empty_command_is_not_allowed() {
        assert_eq!(
            validate_line("tok:", &config()),
            Err(Rejection::CommandNotAllowed)
        );
    }

    #[test]
    fn empty_token_is_invalid() {
        assert_eq!(
            validate_line(":say hi", &config()),
            Err(Rejection::InvalidToken)
        );
    }

    #[test]
    fn wire_responses_match_protocol() {
        let cfg = config();
        assert_eq!(
            Rejection::InvalidFormat.wire_response(&cfg),
            "ERROR: Invalid format"
        );
        assert_eq!(
            Rejection::InvalidToken.wire_response(&cfg),
            cfg.messages.invalid_token
        );
        assert_eq!(
            Rejection::CommandNotAllowed.wire_response(&cfg),
            "ERROR: Command not allowed"
        );
        assert_eq!(
            Rejection::IpNotAllowed.wire_response(&cfg),
            "ERROR: IP not allowed"
        );
    }
}
