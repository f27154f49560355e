//! Text wire format
//!
//! One datagram carries one message:
//!
//! ```text
//! TYPE {OPTION}[param1, param2, ...]|concealed1, concealed2, ...|id
//! ```
//!
//! `{OPTION}` is omitted when the message has none. The concealed segment is
//! always present, possibly empty. The segment after the second `|` carries the
//! reliable id and is empty for best-effort traffic and ACKs.
//!
//! ACK parameters are ids and keep their raw token: `007` must not come back
//! as `7`.

use crate::error::CodecError;
use crate::message::{Message, MessageOption, Value, ACK};

/// Renders a message to its wire text
pub fn encode(message: &Message) -> String {
    let mut out = String::with_capacity(64);
    out.push_str(&message.kind);
    out.push(' ');

    if let Some(option) = &message.option {
        out.push('{');
        out.push_str(option.as_str());
        out.push('}');
    }

    out.push('[');
    let params: Vec<String> = message.parameters.iter().map(Value::to_string).collect();
    out.push_str(&params.join(", "));
    out.push(']');

    out.push('|');
    out.push_str(&message.concealed.join(", "));
    out.push('|');
    if let Some(id) = &message.id {
        out.push_str(id);
    }

    out
}

/// Parses wire text back into a message
///
/// Parameter types are recovered with [`Value::parse`], except on ACKs whose
/// parameters stay text. Concealed parameters always stay strings.
pub fn decode(payload: &str) -> Result<Message, CodecError> {
    let segments: Vec<&str> = payload.split('|').collect();
    if segments.len() < 3 {
        return Err(CodecError::MissingSegments {
            found: segments.len(),
        });
    }

    let (kind, option, parameters) = parse_main(segments[0])?;
    let concealed = split_list(segments[1])
        .map(str::to_string)
        .collect::<Vec<_>>();

    let id = segments[2].trim();
    let id = (!id.is_empty()).then(|| id.to_string());

    Ok(Message {
        kind,
        parameters,
        option,
        concealed,
        sequence: 0,
        id,
    })
}

/// Decodes a raw datagram
pub fn decode_bytes(data: &[u8]) -> Result<Message, CodecError> {
    let text = std::str::from_utf8(data).map_err(|_| CodecError::InvalidUtf8)?;
    decode(text)
}

fn parse_main(main: &str) -> Result<(String, Option<MessageOption>, Vec<Value>), CodecError> {
    let main = main.trim();
    let type_end = main
        .find(|c: char| c.is_whitespace() || c == '{' || c == '[')
        .unwrap_or(main.len());
    let kind = &main[..type_end];
    if kind.is_empty() {
        return Err(CodecError::EmptyType);
    }

    let mut rest = main[type_end..].trim_start();

    let mut option = None;
    if let Some(after_brace) = rest.strip_prefix('{') {
        let close = after_brace
            .find('}')
            .ok_or_else(|| CodecError::MalformedMain(format!("unclosed option in '{}'", main)))?;
        let raw = after_brace[..close].trim();
        if !raw.is_empty() {
            option = Some(MessageOption::parse(raw));
        }
        rest = after_brace[close + 1..].trim_start();
    }

    let parameters = if rest.is_empty() {
        Vec::new()
    } else {
        let inner = rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .ok_or_else(|| {
                CodecError::MalformedMain(format!("expected [params] in '{}'", main))
            })?;
        if kind == ACK {
            split_list(inner).map(|id| Value::Text(id.to_string())).collect()
        } else {
            split_list(inner).map(Value::parse).collect()
        }
    };

    Ok((kind.to_string(), option, parameters))
}

/// Splits a comma-separated list, trimming whitespace around each element
fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    let trimmed = raw.trim();
    let empty = trimmed.is_empty();
    trimmed
        .split(',')
        .map(str::trim)
        .filter(move |_| !empty)
}
