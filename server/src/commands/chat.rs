//! Chat commands: global chat and private whispers

use super::CommandHandler;
use crate::context::ServerContext;
use log::debug;
use shared::Message;

/// `CHATGLB {REQUEST}[text...]`, relayed best-effort to every client
///
/// The sender is included so its own client shows the line once the server
/// has accepted it.
pub struct ChatGlobalHandler;

impl CommandHandler for ChatGlobalHandler {
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str) {
        let line = ServerContext::response(&message.kind)
            .with_param(sender)
            .with_param(message.text_from(0));
        let delivered = context.broadcast(&line);
        debug!("Chat from {} relayed to {} clients", sender, delivered);
    }
}

/// `WHISPER {REQUEST}[target, text...]`, delivered reliably to `target` only
pub struct WhisperHandler;

impl CommandHandler for WhisperHandler {
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str) {
        let Some(target) = message.parameters.first().map(ToString::to_string) else {
            let error = ServerContext::response(&message.kind)
                .with_param("ERROR")
                .with_param("missing recipient");
            context.send_to(sender, error);
            return;
        };

        if !context.clients().contains(&target) {
            let error = ServerContext::response(&message.kind)
                .with_param("ERROR")
                .with_param(format!("unknown user {}", target));
            context.send_to(sender, error);
            return;
        }

        let whisper = ServerContext::response(&message.kind)
            .with_param(sender)
            .with_param(message.text_from(1));
        context.send_to(&target, whisper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{addr, context, drain};
    use shared::{MessageOption, Value};

    #[test]
    fn test_global_chat_reaches_everyone() {
        let (context, mut rx) = context();
        let msg = Message::new("CHATGLB")
            .with_option(MessageOption::Request)
            .with_params(["hello", "world"]);

        ChatGlobalHandler.handle(&context, &msg, "alice");

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        for outgoing in &sent {
            assert!(outgoing.message().id.is_none());
            assert_eq!(
                outgoing.message().parameters,
                vec![Value::Text("alice".into()), Value::Text("hello, world".into())]
            );
        }
    }

    #[test]
    fn test_whisper_goes_to_target_only() {
        let (context, mut rx) = context();
        let msg = Message::new("WHISPER").with_params(["bob", "psst"]);

        WhisperHandler.handle(&context, &msg, "alice");

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination(), addr(9002));
        assert_eq!(
            sent[0].message().parameters,
            vec![Value::Text("alice".into()), Value::Text("psst".into())]
        );
        assert!(sent[0].message().id.is_some());
    }

    #[test]
    fn test_whisper_to_unknown_user_reports_error() {
        let (context, mut rx) = context();
        let msg = Message::new("WHISPER").with_params(["zed", "psst"]);

        WhisperHandler.handle(&context, &msg, "alice");

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination(), addr(9001));
        assert_eq!(sent[0].message().parameters[0], Value::Text("ERROR".into()));
    }

    #[test]
    fn test_whisper_without_recipient() {
        let (context, mut rx) = context();
        WhisperHandler.handle(&context, &Message::new("WHISPER"), "bob");

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination(), addr(9002));
    }
}
