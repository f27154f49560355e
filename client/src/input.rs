//! Turns typed lines into protocol messages

use shared::{Message, MessageOption, Value};
use thiserror::Error;

/// Who is speaking; becomes the concealed parameters of every message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub session: String,
    pub game: String,
    pub username: String,
}

impl Identity {
    pub fn new(
        session: impl Into<String>,
        game: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            session: session.into(),
            game: game.into(),
            username: username.into(),
        }
    }

    /// Concealed parameters in wire order; the username stays last
    pub fn concealed(&self) -> [&str; 3] {
        [self.session.as_str(), self.game.as_str(), self.username.as_str()]
    }

    pub fn stamp(&self, message: Message) -> Message {
        Message {
            concealed: self.concealed().iter().map(|s| s.to_string()).collect(),
            ..message
        }
    }
}

/// A parsed line and the delivery path it should take
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Reliable(Message),
    BestEffort(Message),
    /// Sends LOGOUT and leaves once the server confirms
    Quit(Message),
    Help,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command /{0}, try /help")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
/ping                ping the server
/w <user> <text>     whisper to one user
/name <new>          change username
/list                list online users
/game <TYPE> [args]  best-effort game update to everyone else
/quit                log out and exit
anything else        global chat";

/// Parses one line of input
///
/// Blank lines yield `Ok(None)`. Lines not starting with `/` are global chat.
pub fn parse_line(line: &str) -> Result<Option<Command>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Reliable(request("CHATGLB").with_param(line))));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "ping" => Command::Reliable(request("PING")),
        "w" | "whisper" => {
            let (target, text) = args
                .split_once(char::is_whitespace)
                .ok_or(InputError::Usage("/w <user> <text>"))?;
            Command::Reliable(
                request("WHISPER")
                    .with_param(target)
                    .with_param(text.trim()),
            )
        }
        "name" => {
            if args.is_empty() || args.contains(char::is_whitespace) {
                return Err(InputError::Usage("/name <new>"));
            }
            Command::Reliable(request("CHANGENAME").with_param(args))
        }
        "list" => Command::Reliable(request("LIST")),
        "quit" | "exit" => Command::Quit(request("LOGOUT")),
        "game" => {
            let mut tokens = args.split_whitespace();
            let kind = tokens.next().ok_or(InputError::Usage("/game <TYPE> [args]"))?;
            Command::BestEffort(
                Message::new(kind.to_ascii_uppercase())
                    .with_option(MessageOption::Game)
                    .with_params(tokens.map(Value::parse)),
            )
        }
        "help" => Command::Help,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };

    Ok(Some(command))
}

fn request(kind: &str) -> Message {
    Message::new(kind).with_option(MessageOption::Request)
}
