//! In-band console commands.
//!
//! A console line starting with [`SENTINEL`] is a command `#token [argument]`;
//! anything else is chat text. [`interpret`] turns a line into an [`Action`]
//! for the caller to apply, checking the state precondition first and the
//! argument second. Rejections come back as [`ChatError`] values meant for
//! the local notifier only, and leave all state untouched.

use crate::error::ChatError;
use crate::session::SessionState;
use crate::MAX_IDENTITY_LEN;

pub const SENTINEL: char = '#';

/// Who typed the line, with the state the command preconditions look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client(SessionState),
    ServerOperator { listening: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub role: Role,
    pub host: &'a str,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Chat text to send (client) or broadcast (operator).
    Send(String),
    /// Blank line.
    Nothing,
    Quit,
    Logoff,
    Login { identity: Option<String> },
    SetHost(String),
    SetPort(u16),
    /// Local feedback, no state change.
    Report(String),
    StartListening,
    StopListening,
    CloseAll,
}

/// Whether a console loop keeps reading after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn login_announcement(identity: &str) -> String {
    format!("{}login {}", SENTINEL, identity)
}

/// Extracts the identity from a `#login <identity>` line.
pub fn parse_login_announcement(line: &str) -> Option<String> {
    let rest = line.strip_prefix(SENTINEL)?.strip_prefix("login")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut tokens = rest.split_whitespace();
    let identity = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    validate_identity(identity).ok()
}

/// Trims `raw` and checks that it can be announced as a login ID.
///
/// A login ID is one non-empty word of at most [`MAX_IDENTITY_LEN`] bytes.
pub fn validate_identity(raw: &str) -> Result<String, ChatError> {
    let identity = raw.trim();
    if identity.is_empty() {
        return Err(ChatError::IdentityRequired);
    }
    if identity.len() > MAX_IDENTITY_LEN || identity.contains(char::is_whitespace) {
        return Err(ChatError::InvalidIdentity(identity.to_string()));
    }
    Ok(identity.to_string())
}

pub fn interpret(line: &str, ctx: &CommandContext<'_>) -> Result<Action, ChatError> {
    let Some(command) = line.strip_prefix(SENTINEL) else {
        if line.trim().is_empty() {
            return Ok(Action::Nothing);
        }
        return Ok(Action::Send(line.to_string()));
    };

    if command.starts_with(char::is_whitespace) {
        return Err(ChatError::UnknownCommand(String::new()));
    }
    let mut tokens = command.split_whitespace();
    let token = tokens.next().unwrap_or_default();
    let args: Vec<&str> = tokens.collect();

    match (token, ctx.role) {
        ("quit", _) => {
            no_argument("quit", &args)?;
            Ok(Action::Quit)
        }
        ("logoff", Role::Client(_)) => {
            no_argument("logoff", &args)?;
            Ok(Action::Logoff)
        }
        ("login", Role::Client(state)) => {
            if !matches!(state, SessionState::Disconnected | SessionState::Closed) {
                return Err(ChatError::AlreadyActive);
            }
            let identity = optional_argument("login", &args)?;
            Ok(Action::Login {
                identity: identity.map(str::to_string),
            })
        }
        ("sethost", role) => {
            require_reconfigurable(role, "host")?;
            let host = one_argument("sethost", &args)?;
            Ok(Action::SetHost(host.to_string()))
        }
        ("setport", role) => {
            require_reconfigurable(role, "port")?;
            let port = one_argument("setport", &args)?;
            let port = port
                .parse::<u16>()
                .map_err(|_| ChatError::InvalidPort(port.to_string()))?;
            Ok(Action::SetPort(port))
        }
        ("gethost", _) => {
            no_argument("gethost", &args)?;
            Ok(Action::Report(format!("Current host: {}", ctx.host)))
        }
        ("getport", _) => {
            no_argument("getport", &args)?;
            Ok(Action::Report(format!("Current port: {}", ctx.port)))
        }
        ("start", Role::ServerOperator { listening }) => {
            if listening {
                return Err(ChatError::AlreadyListening);
            }
            no_argument("start", &args)?;
            Ok(Action::StartListening)
        }
        ("stop", Role::ServerOperator { listening }) => {
            if !listening {
                return Err(ChatError::NotListening);
            }
            no_argument("stop", &args)?;
            Ok(Action::StopListening)
        }
        ("close", Role::ServerOperator { .. }) => {
            no_argument("close", &args)?;
            Ok(Action::CloseAll)
        }
        _ => Err(ChatError::UnknownCommand(token.to_string())),
    }
}

fn require_reconfigurable(role: Role, what: &'static str) -> Result<(), ChatError> {
    match role {
        Role::Client(SessionState::Disconnected) => Ok(()),
        Role::Client(_) => Err(ChatError::MustDisconnectFirst(what)),
        Role::ServerOperator { listening: true } => Err(ChatError::MustStopFirst(what)),
        Role::ServerOperator { listening: false } => Ok(()),
    }
}

fn no_argument(command: &'static str, args: &[&str]) -> Result<(), ChatError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ChatError::TooManyArguments(command))
    }
}

fn optional_argument<'a>(
    command: &'static str,
    args: &[&'a str],
) -> Result<Option<&'a str>, ChatError> {
    match args {
        [] => Ok(None),
        [arg] => Ok(Some(*arg)),
        _ => Err(ChatError::TooManyArguments(command)),
    }
}

fn one_argument<'a>(command: &'static str, args: &[&'a str]) -> Result<&'a str, ChatError> {
    optional_argument(command, args)?.ok_or(ChatError::MissingArgument(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(state: SessionState) -> CommandContext<'static> {
        CommandContext {
            role: Role::Client(state),
            host: "localhost",
            port: 5555,
        }
    }

    fn operator(listening: bool) -> CommandContext<'static> {
        CommandContext {
            role: Role::ServerOperator { listening },
            host: "0.0.0.0",
            port: 5555,
        }
    }

    #[test]
    fn test_plain_text_is_chat() {
        let ctx = client(SessionState::Active);
        assert_eq!(
            interpret("hello #world", &ctx).unwrap(),
            Action::Send("hello #world".to_string())
        );
        assert_eq!(interpret("   ", &ctx).unwrap(), Action::Nothing);
        assert_eq!(
            interpret(" #quit", &ctx).unwrap(),
            Action::Send(" #quit".to_string())
        );
    }

    #[test]
    fn test_quit_for_both_roles() {
        assert_eq!(interpret("#quit", &client(SessionState::Active)).unwrap(), Action::Quit);
        assert_eq!(interpret("#quit", &operator(true)).unwrap(), Action::Quit);
        assert!(matches!(
            interpret("#quit now", &operator(true)),
            Err(ChatError::TooManyArguments("quit"))
        ));
    }

    #[test]
    fn test_commands_are_case_sensitive() {
        let result = interpret("#QUIT", &client(SessionState::Active));
        assert!(matches!(result, Err(ChatError::UnknownCommand(token)) if token == "QUIT"));
    }

    #[test]
    fn test_sentinel_must_touch_token() {
        let result = interpret("# quit", &client(SessionState::Active));
        assert!(matches!(result, Err(ChatError::UnknownCommand(token)) if token.is_empty()));
    }

    #[test]
    fn test_login_requires_inactive_session() {
        let result = interpret("#login", &client(SessionState::Active));
        assert!(matches!(result, Err(ChatError::AlreadyActive)));

        assert_eq!(
            interpret("#login", &client(SessionState::Disconnected)).unwrap(),
            Action::Login { identity: None }
        );
        assert_eq!(
            interpret("#login carol", &client(SessionState::Disconnected)).unwrap(),
            Action::Login {
                identity: Some("carol".to_string())
            }
        );
        assert!(matches!(
            interpret("#login carol smith", &client(SessionState::Disconnected)),
            Err(ChatError::TooManyArguments("login"))
        ));
    }

    #[test]
    fn test_sethost_rules() {
        assert_eq!(
            interpret("#sethost example.org", &client(SessionState::Disconnected)).unwrap(),
            Action::SetHost("example.org".to_string())
        );
        assert!(matches!(
            interpret("#sethost example.org", &client(SessionState::Active)),
            Err(ChatError::MustDisconnectFirst("host"))
        ));
        assert!(matches!(
            interpret("#sethost", &client(SessionState::Disconnected)),
            Err(ChatError::MissingArgument("sethost"))
        ));
        assert!(matches!(
            interpret("#sethost a b", &client(SessionState::Disconnected)),
            Err(ChatError::TooManyArguments("sethost"))
        ));
    }

    #[test]
    fn test_setport_rules() {
        let ctx = client(SessionState::Disconnected);
        assert_eq!(interpret("#setport 6000", &ctx).unwrap(), Action::SetPort(6000));
        assert!(matches!(
            interpret("#setport abc", &ctx),
            Err(ChatError::InvalidPort(value)) if value == "abc"
        ));
        assert!(matches!(
            interpret("#setport 70000", &ctx),
            Err(ChatError::InvalidPort(_))
        ));
        assert!(matches!(
            interpret("#setport", &ctx),
            Err(ChatError::MissingArgument("setport"))
        ));
    }

    #[test]
    fn test_state_precondition_checked_before_argument() {
        assert!(matches!(
            interpret("#setport abc", &client(SessionState::Active)),
            Err(ChatError::MustDisconnectFirst("port"))
        ));
        assert!(matches!(
            interpret("#setport", &operator(true)),
            Err(ChatError::MustStopFirst("port"))
        ));
    }

    #[test]
    fn test_operator_setport_while_listening() {
        assert!(matches!(
            interpret("#setport 6000", &operator(true)),
            Err(ChatError::MustStopFirst("port"))
        ));
        assert_eq!(
            interpret("#setport 6000", &operator(false)).unwrap(),
            Action::SetPort(6000)
        );
    }

    #[test]
    fn test_getters_report_locally() {
        assert_eq!(
            interpret("#gethost", &client(SessionState::Active)).unwrap(),
            Action::Report("Current host: localhost".to_string())
        );
        assert_eq!(
            interpret("#getport", &operator(true)).unwrap(),
            Action::Report("Current port: 5555".to_string())
        );
    }

    #[test]
    fn test_listening_commands() {
        assert_eq!(interpret("#start", &operator(false)).unwrap(), Action::StartListening);
        assert!(matches!(
            interpret("#start", &operator(true)),
            Err(ChatError::AlreadyListening)
        ));
        assert_eq!(interpret("#stop", &operator(true)).unwrap(), Action::StopListening);
        assert!(matches!(
            interpret("#stop", &operator(false)),
            Err(ChatError::NotListening)
        ));
        assert_eq!(interpret("#close", &operator(false)).unwrap(), Action::CloseAll);
    }

    #[test]
    fn test_role_specific_commands_are_unknown_elsewhere() {
        for line in ["#start", "#stop", "#close"] {
            assert!(matches!(
                interpret(line, &client(SessionState::Disconnected)),
                Err(ChatError::UnknownCommand(_))
            ));
        }
        for line in ["#login", "#logoff"] {
            assert!(matches!(
                interpret(line, &operator(false)),
                Err(ChatError::UnknownCommand(_))
            ));
        }
    }

    #[test]
    fn test_login_announcement_parsing() {
        assert_eq!(login_announcement("alice"), "#login alice");
        assert_eq!(parse_login_announcement("#login alice"), Some("alice".to_string()));
        assert_eq!(parse_login_announcement("#login   bob  "), Some("bob".to_string()));
        assert_eq!(parse_login_announcement("#login"), None);
        assert_eq!(parse_login_announcement("#loginID alice"), None);
        assert_eq!(parse_login_announcement("#login a b"), None);
        assert_eq!(parse_login_announcement("login alice"), None);
        let long = format!("#login {}", "a".repeat(MAX_IDENTITY_LEN + 1));
        assert_eq!(parse_login_announcement(&long), None);
    }

    #[test]
    fn test_identity_validation() {
        assert_eq!(validate_identity("  carol ").unwrap(), "carol");
        assert!(matches!(validate_identity("   "), Err(ChatError::IdentityRequired)));
        assert!(matches!(
            validate_identity("carol smith"),
            Err(ChatError::InvalidIdentity(id)) if id == "carol smith"
        ));
        assert!(matches!(
            validate_identity(&"a".repeat(MAX_IDENTITY_LEN + 1)),
            Err(ChatError::InvalidIdentity(_))
        ));
        assert!(validate_identity(&"a".repeat(MAX_IDENTITY_LEN)).is_ok());
    }
}
