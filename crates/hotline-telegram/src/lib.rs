//! Telegram adapter: implements the messenger port on top of teloxide.
//!
//! Everything teloxide-specific stays in this crate. The core sees only
//! its own chat/message types, and transport failures come back already
//! classified (flood waits, blocks, write-forbidden chats).

pub mod router;

mod handlers;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{
        BotCommand, BotCommandScope, ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup,
        KeyboardButton, KeyboardButtonRequestChat, KeyboardMarkup, ParseMode, Recipient, RequestId,
    },
    RequestError,
};

use hotline_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::{Error, TransportError},
    messaging::{
        types::{InlineKeyboard, Keyboard, ResolvedUser},
        MessengerPort,
    },
    Result,
};

// === Type conversions ===

fn tg_chat(chat: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat.0)
}

fn tg_user(user: UserId) -> teloxide::types::UserId {
    teloxide::types::UserId(user.0 as u64)
}

fn tg_msg(id: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(id.0)
}

fn message_ref_of(message: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(message.chat.id.0),
        message_id: MessageId(message.id.0),
    }
}

// === Error mapping ===

/// Classify a Telegram API failure into the transport categories the flows
/// branch on. Everything not structurally typed by teloxide comes back as
/// description text, so this matches on the documented phrases.
fn classify(err: &RequestError) -> TransportError {
    if let RequestError::RetryAfter(seconds) = err {
        return TransportError::FloodWait(seconds.duration());
    }
    let text = err.to_string();
    if text.contains("blocked by the user") || text.contains("user is deactivated") {
        TransportError::Blocked
    } else if text.contains("not enough rights")
        || text.contains("CHAT_WRITE_FORBIDDEN")
        || text.contains("bot is not a member")
        || text.contains("kicked")
    {
        TransportError::WriteForbidden
    } else if text.contains("chat not found") {
        TransportError::ChatNotFound
    } else {
        TransportError::Other(text)
    }
}

// Retry policy lives in the flows (broadcast sleeps a flood wait out once);
// the adapter only classifies, so a rate limit surfaces as one FloodWait.
fn map_err(err: RequestError) -> Error {
    Error::Transport(classify(&err))
}

// === Keyboards ===

fn to_inline_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.buttons.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
            .collect::<Vec<_>>()
    }))
}

fn to_reply_markup(keyboard: &Keyboard) -> teloxide::types::ReplyMarkup {
    use teloxide::types::ReplyMarkup;

    match keyboard {
        Keyboard::Inline(inline) => ReplyMarkup::InlineKeyboard(to_inline_markup(inline)),
        Keyboard::RequestChat(request) => {
            let mut chat_request =
                KeyboardButtonRequestChat::new(RequestId(request.request_id), false);
            chat_request.bot_is_member = true;

            let share = KeyboardButton {
                text: request.share_label.clone(),
                request: Some(ButtonRequest::RequestChat(chat_request)),
            };
            let mut rows = vec![vec![share]];
            for label in &request.extra_buttons {
                rows.push(vec![KeyboardButton {
                    text: label.clone(),
                    request: None,
                }]);
            }

            let mut markup = KeyboardMarkup::new(rows);
            markup.resize_keyboard = true;
            markup.one_time_keyboard = true;
            ReplyMarkup::Keyboard(markup)
        }
        Keyboard::Remove => ReplyMarkup::kb_remove(),
    }
}

// === The messenger ===

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessengerPort for TelegramMessenger {
    async fn send_html(&self, chat: ChatId, html: &str) -> Result<MessageRef> {
        let message = self
            .bot
            .send_message(tg_chat(chat), html)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(map_err)?;
        Ok(message_ref_of(&message))
    }

    async fn send_with_keyboard(
        &self,
        chat: ChatId,
        html: &str,
        keyboard: Keyboard,
    ) -> Result<MessageRef> {
        let markup = to_reply_markup(&keyboard);
        let message = self
            .bot
            .send_message(tg_chat(chat), html)
            .parse_mode(ParseMode::Html)
            .reply_markup(markup)
            .await
            .map_err(map_err)?;
        Ok(message_ref_of(&message))
    }

    async fn edit_html(
        &self,
        message: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        let request = self
            .bot
            .edit_message_text(tg_chat(message.chat_id), tg_msg(message.message_id), html)
            .parse_mode(ParseMode::Html);
        match &keyboard {
            Some(inline) => request.reply_markup(to_inline_markup(inline)).await,
            None => request.await,
        }
        .map_err(map_err)?;
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        self.bot
            .delete_message(tg_chat(message.chat_id), tg_msg(message.message_id))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn copy_message(&self, to: ChatId, source: MessageRef) -> Result<MessageRef> {
        let new_id = self
            .bot
            .copy_message(
                tg_chat(to),
                tg_chat(source.chat_id),
                tg_msg(source.message_id),
            )
            .await
            .map_err(map_err)?;
        Ok(MessageRef {
            chat_id: to,
            message_id: MessageId(new_id.0),
        })
    }

    async fn chat_title(&self, chat: ChatId) -> Result<String> {
        let info = self.bot.get_chat(tg_chat(chat)).await.map_err(map_err)?;
        Ok(info
            .title()
            .map(str::to_owned)
            .unwrap_or_else(|| "Private chat".to_string()))
    }

    async fn is_chat_member(&self, chat: ChatId, user: UserId) -> Result<bool> {
        let result = self
            .bot
            .get_chat_member(tg_chat(chat), tg_user(user))
            .await;
        match result {
            Ok(member) => Ok(member.kind.is_present()),
            // A user the chat has never seen comes back as an API error,
            // which for the gate simply means "not a member".
            Err(err) if err.to_string().contains("user not found") => Ok(false),
            Err(err) => Err(map_err(err)),
        }
    }

    async fn resolve_user(&self, handle: &str) -> Result<ResolvedUser> {
        // The Bot API cannot look up arbitrary @usernames; a numeric id of
        // someone who has talked to the bot is the one reliable handle.
        let id: i64 = handle
            .trim()
            .trim_start_matches('@')
            .parse()
            .map_err(|_| {
                Error::Transport(TransportError::Other(
                    "expected a numeric Telegram user id".to_string(),
                ))
            })?;

        let chat = self
            .bot
            .get_chat(teloxide::types::ChatId(id))
            .await
            .map_err(map_err)?;
        Ok(ResolvedUser {
            id: UserId(id),
            first_name: chat
                .first_name()
                .unwrap_or("Unknown")
                .to_string(),
            username: chat.username().map(str::to_owned),
        })
    }

    async fn user_display_name(&self, user: UserId) -> Result<String> {
        let chat = self
            .bot
            .get_chat(teloxide::types::ChatId(user.0))
            .await
            .map_err(map_err)?;
        let name = match (chat.first_name(), chat.username()) {
            (Some(first), Some(username)) => format!("{first} (@{username})"),
            (Some(first), None) => first.to_string(),
            (None, Some(username)) => format!("@{username}"),
            (None, None) => format!("id {}", user.0),
        };
        Ok(name)
    }

    async fn install_staff_commands(&self, chat: ChatId) -> Result<()> {
        let commands = vec![
            BotCommand::new("reply", "Reply to a user by number"),
            BotCommand::new("send", "Send any content to a user by number"),
            BotCommand::new("assign", "Give a user a memorable name"),
            BotCommand::new("help", "How to use the bot"),
        ];
        self.bot
            .set_my_commands(commands)
            .scope(BotCommandScope::Chat {
                chat_id: Recipient::Id(tg_chat(chat)),
            })
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn install_user_commands(&self) -> Result<()> {
        let commands = vec![BotCommand::new("start", "Open the menu")];
        self.bot
            .set_my_commands(commands)
            .scope(BotCommandScope::AllPrivateChats)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_keyboards_keep_their_shape() {
        use hotline_core::messaging::types::InlineButton;

        let keyboard = InlineKeyboard::new(vec![
            vec![InlineButton::new("A", "a"), InlineButton::new("B", "b")],
            vec![InlineButton::new("C", "c")],
        ]);
        let markup = to_inline_markup(&keyboard);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "C");
    }

    #[test]
    fn id_conversions_round_trip() {
        assert_eq!(tg_chat(ChatId(-100123)).0, -100123);
        assert_eq!(tg_user(UserId(42)).0, 42);
        assert_eq!(tg_msg(MessageId(7)).0, 7);
    }
}
