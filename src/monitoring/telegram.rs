use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::sync::watch;

use crate::control::{CommandError, ControlCommand, Controller};
use crate::monitoring::Notifier;

/// The only chat allowed to control the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminChat(pub ChatId);

/// Sends notifications to the admin chat
pub struct TelegramNotifier {
    bot: Bot,
    chat: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat: AdminChat) -> Self {
        Self { bot, chat: chat.0 }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        if let Err(e) = self.bot.send_message(self.chat, message).await {
            warn!("Telegram notification failed: {}", e);
        }
    }
}

/// Reply to `text` sent in `chat`, or `None` when the message is ignored
pub async fn respond(controller: &Controller, admin: AdminChat, chat: ChatId, text: &str) -> Option<String> {
    if chat != admin.0 {
        warn!("Ignoring message from unauthorised chat {}", chat);
        return None;
    }

    match ControlCommand::parse(text) {
        Ok(command) => Some(controller.handle(command).await),
        Err(CommandError::NotACommand) => None,
        Err(e) => Some(e.to_string()),
    }
}

async fn handle_message(bot: Bot, msg: Message, controller: Arc<Controller>, admin: AdminChat) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Some(reply) = respond(&controller, admin, msg.chat.id, text).await {
        bot.send_message(msg.chat.id, reply).await?;
    }
    Ok(())
}

/// Long-poll Telegram until `shutdown` flips to true
pub async fn run_control_bot(
    bot: Bot,
    admin: AdminChat,
    controller: Arc<Controller>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Telegram control bot listening for chat {}", admin.0);

    let handler = Update::filter_message().endpoint(handle_message);
    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![controller, admin])
        .default_handler(|_| async {})
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        while shutdown.changed().await.is_ok() {
            if *shutdown.borrow() {
                break;
            }
        }
        if let Ok(done) = token.shutdown() {
            done.await;
        }
    });

    dispatcher.dispatch().await;
    info!("Telegram control bot stopped");
}
