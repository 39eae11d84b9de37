//! Parsing of the lines typed at the prompt.

use thiserror::Error;

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `@user text`
    Direct { to: String, text: String },
    /// `#room text`
    Room { room: String, text: String },
    /// `/quit`
    Quit,
    /// Blank line.
    Empty,
}

/// Rejected input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("missing recipient after '{0}'")]
    MissingTarget(char),

    #[error("nothing to send to {0}")]
    MissingText(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("start the line with @<user> or #<room>, or type /quit")]
    NoTarget,
}

/// Parse one input line.
///
/// # Errors
///
/// Returns an error describing why the line cannot be sent.
pub fn parse_line(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }

    if let Some(rest) = line.strip_prefix('/') {
        return match rest {
            "quit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        };
    }

    let Some(prefix) = line.chars().next().filter(|c| matches!(c, '@' | '#')) else {
        return Err(CommandError::NoTarget);
    };

    let rest = &line[1..];
    let (target, text) = match rest.split_once(char::is_whitespace) {
        Some((target, text)) => (target, text.trim()),
        None => (rest, ""),
    };

    if target.is_empty() {
        return Err(CommandError::MissingTarget(prefix));
    }
    if text.is_empty() {
        return Err(CommandError::MissingText(format!("{prefix}{target}")));
    }

    let (target, text) = (target.to_string(), text.to_string());
    Ok(if prefix == '@' {
        Command::Direct { to: target, text }
    } else {
        Command::Room { room: target, text }
    })
}
