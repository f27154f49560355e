use super::CommandHandler;
use crate::context::ServerContext;
use shared::Message;

/// Answers `PING {REQUEST}` with a reliable `PING {RESPONSE}[PONG]`
pub struct PingHandler;

impl CommandHandler for PingHandler {
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str) {
        let pong = ServerContext::response(&message.kind).with_param("PONG");
        context.send_to(sender, pong);
    }
}
