//! Commands that change or inspect who is connected

use super::CommandHandler;
use crate::context::ServerContext;
use log::info;
use shared::Message;

/// `CHANGENAME {REQUEST}[new]`
pub struct ChangeNameHandler;

impl CommandHandler for ChangeNameHandler {
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str) {
        let Some(new_name) = message.parameters.first().map(ToString::to_string) else {
            return;
        };

        if context.rename_client(sender, &new_name) {
            let ok = ServerContext::response(&message.kind)
                .with_param("OK")
                .with_param(new_name.as_str());
            context.send_to(&new_name, ok);
        } else {
            let taken = ServerContext::response(&message.kind)
                .with_param("TAKEN")
                .with_param(new_name.as_str());
            context.send_to(sender, taken);
        }
    }
}

/// `LOGOUT` / `EXIT`: forget the sender and tell everyone else
pub struct LogoutHandler;

impl CommandHandler for LogoutHandler {
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str) {
        let Some(addr) = context.unregister_client(sender) else {
            return;
        };
        info!("{} left via {}", sender, message.kind);

        context.reply(addr, ServerContext::response(&message.kind).with_param("BYE"));
        context.broadcast(&ServerContext::response("LEFT").with_param(sender));
    }
}

/// `LIST`: reliable reply with every registered username
pub struct ListHandler;

impl CommandHandler for ListHandler {
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str) {
        let reply = ServerContext::response(&message.kind).with_params(context.clients().usernames());
        context.send_to(sender, reply);
    }
}
