//! Protocol value objects exchanged between server and clients

use std::fmt;
use std::net::SocketAddr;

/// A single positional parameter carried by a [`Message`]
///
/// Parameters travel as plain text on the wire, so the decoder has to guess
/// their type back. [`Value::parse`] applies that guess: integer first, then
/// floating point, then literal string. The first successful parse wins, which
/// means a numeric-looking string (e.g. a username `"123"`) comes back as an
/// integer after a round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Resolves a raw wire token into a typed value
    pub fn parse(token: &str) -> Self {
        if let Ok(i) = token.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(token.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value, accepting both integer and float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            // Debug keeps the fractional part ("1.0"), so floats decode as floats
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Role tag attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageOption {
    Request,
    Response,
    Game,
    Other(String),
}

impl MessageOption {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "REQUEST" => MessageOption::Request,
            "RESPONSE" => MessageOption::Response,
            "GAME" => MessageOption::Game,
            other => MessageOption::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageOption::Request => "REQUEST",
            MessageOption::Response => "RESPONSE",
            MessageOption::Game => "GAME",
            MessageOption::Other(s) => s,
        }
    }
}

impl fmt::Display for MessageOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message
///
/// `concealed` holds routing metadata (session id, game id, username...) that
/// is not part of the visible payload. By convention its last element is the
/// sender's username. `sequence` is stamped by the reliable sender and stays 0
/// until then; `id` correlates a reliable message with its ACK.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub kind: String,
    pub parameters: Vec<Value>,
    pub option: Option<MessageOption>,
    pub concealed: Vec<String>,
    pub sequence: u64,
    pub id: Option<String>,
}

impl Message {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, option: MessageOption) -> Self {
        self.option = Some(option);
        self
    }

    pub fn with_param(mut self, value: impl Into<Value>) -> Self {
        self.parameters.push(value.into());
        self
    }

    pub fn with_params<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.parameters.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_concealed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.concealed.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builds the reserved ACK message for `id`
    ///
    /// ACKs carry no id of their own so they are never acknowledged in turn.
    pub fn ack(id: impl Into<String>) -> Self {
        Message::new(ACK).with_param(Value::Text(id.into()))
    }

    pub fn is_ack(&self) -> bool {
        self.kind == ACK
    }

    /// Copy for an independent send: same payload, fresh id and sequence
    pub fn clone_for_resend(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            parameters: self.parameters.clone(),
            option: self.option.clone(),
            concealed: self.concealed.clone(),
            sequence: 0,
            id: None,
        }
    }

    /// Username of the sender, taken from the last concealed parameter
    pub fn sender_username(&self) -> Option<&str> {
        self.concealed
            .last()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Id to acknowledge, ignoring empty ids
    pub fn ack_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Parameters from `start` onwards rendered back to wire text and rejoined
    ///
    /// Chat text containing commas arrives split into several parameters.
    pub fn text_from(&self, start: usize) -> String {
        self.parameters
            .iter()
            .skip(start)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Reserved message type for acknowledgements
pub const ACK: &str = "ACK";

/// A message paired with its destination
///
/// Created at enqueue time and owned by whichever queue or sender holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    message: Message,
    destination: SocketAddr,
}

impl OutgoingMessage {
    pub fn new(message: Message, destination: SocketAddr) -> Self {
        Self {
            message,
            destination,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn address(&self) -> std::net::IpAddr {
        self.destination.ip()
    }

    pub fn port(&self) -> u16 {
        self.destination.port()
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    /// Rebuilds the pair around a stamped copy of the message
    pub(crate) fn map_message(self, f: impl FnOnce(Message) -> Message) -> Self {
        Self {
            message: f(self.message),
            destination: self.destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_value_parse_precedence() {
        assert_eq!(Value::parse("42"), Value::Int(42));
        assert_eq!(Value::parse("-7"), Value::Int(-7));
        assert_approx_eq!(Value::parse("3.25").as_f64().unwrap(), 3.25);
        assert!(matches!(Value::parse("3.25"), Value::Float(_)));
        assert_eq!(Value::parse("alice"), Value::Text("alice".to_string()));
    }

    #[test]
    fn test_numeric_looking_string_is_reinterpreted() {
        // Usernames like "123" do not survive as text
        assert_eq!(Value::parse("123"), Value::Int(123));
    }

    #[test]
    fn test_float_display_keeps_fraction() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(-0.5).to_string(), "-0.5");
        assert!(matches!(Value::parse(&Value::Float(2.0).to_string()), Value::Float(_)));
    }

    #[test]
    fn test_option_parse() {
        assert_eq!(MessageOption::parse("REQUEST"), MessageOption::Request);
        assert_eq!(MessageOption::parse("RESPONSE"), MessageOption::Response);
        assert_eq!(MessageOption::parse("GAME"), MessageOption::Game);
        assert_eq!(
            MessageOption::parse("LOBBY"),
            MessageOption::Other("LOBBY".to_string())
        );
        assert_eq!(MessageOption::Other("LOBBY".into()).as_str(), "LOBBY");
    }

    #[test]
    fn test_clone_for_resend_resets_identity() {
        let mut original = Message::new("MOVE")
            .with_option(MessageOption::Game)
            .with_params([1, 2])
            .with_concealed(["s1", "bob"])
            .with_id("abc");
        original.sequence = 9;

        let copy = original.clone_for_resend();
        assert_eq!(copy.kind, "MOVE");
        assert_eq!(copy.parameters, original.parameters);
        assert_eq!(copy.concealed, original.concealed);
        assert_eq!(copy.option, Some(MessageOption::Game));
        assert_eq!(copy.id, None);
        assert_eq!(copy.sequence, 0);
    }

    #[test]
    fn test_ack_message_has_no_id() {
        let ack = Message::ack("xyz");
        assert!(ack.is_ack());
        assert_eq!(ack.parameters, vec![Value::Text("xyz".into())]);
        assert!(ack.id.is_none());
        assert!(ack.concealed.is_empty());
    }

    #[test]
    fn test_sender_username_is_last_concealed() {
        let msg = Message::new("PING").with_concealed(["session1", "game1", "alice"]);
        assert_eq!(msg.sender_username(), Some("alice"));
        assert_eq!(Message::new("PING").sender_username(), None);
    }

    #[test]
    fn test_empty_id_is_not_acknowledged() {
        assert_eq!(Message::new("PING").with_id("").ack_id(), None);
        assert_eq!(Message::new("PING").with_id("a1").ack_id(), Some("a1"));
    }

    #[test]
    fn test_outgoing_message_accessors() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let out = OutgoingMessage::new(Message::new("PING"), addr);
        assert_eq!(out.port(), 9000);
        assert_eq!(out.address(), addr.ip());
        assert_eq!(out.message().kind, "PING");
    }
}
