//! Messenger-facing value types, independent of any Telegram crate.
//!
//! The adapter converts these to and from the wire types; core code and
//! tests only ever see this module.

use crate::domain::{ChatId, MessageId, MessageRef, UserId};

// === Outbound keyboards ===

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<Vec<InlineButton>>) -> Self {
        Self { buttons }
    }

    /// Single-row keyboard; most confirm/cancel prompts use this.
    pub fn row(buttons: Vec<InlineButton>) -> Self {
        Self {
            buttons: vec![buttons],
        }
    }
}

/// One-time reply keyboard asking the admin to share a group chat.
///
/// The share button requests a chat the bot is already a member of;
/// `extra_buttons` become plain text buttons, one per row (cancel and
/// friends).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestChatKeyboard {
    pub share_label: String,
    pub request_id: i32,
    pub extra_buttons: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Keyboard {
    Inline(InlineKeyboard),
    RequestChat(RequestChatKeyboard),
    /// Remove any reply keyboard currently shown in the chat.
    Remove,
}

impl From<InlineKeyboard> for Keyboard {
    fn from(keyboard: InlineKeyboard) -> Self {
        Keyboard::Inline(keyboard)
    }
}

// === Inbound events ===

/// A message as the flows see it. Non-text messages (photos, stickers,
/// forwarded posts) arrive with `text: None` and are still routable, which
/// is what lets broadcast and /send carry arbitrary content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
    pub text: Option<String>,
    /// Set when the message is a "chat shared" service message.
    pub shared_chat_id: Option<ChatId>,
    pub reply_to: Option<MessageId>,
}

impl MessageEvent {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Message the pressed keyboard is attached to, when still available.
    pub message: Option<MessageRef>,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Message(MessageEvent),
    Callback(CallbackEvent),
}

impl InboundEvent {
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            InboundEvent::Message(m) => Some(m),
            InboundEvent::Callback(_) => None,
        }
    }

    pub fn as_callback(&self) -> Option<&CallbackEvent> {
        match self {
            InboundEvent::Callback(c) => Some(c),
            InboundEvent::Message(_) => None,
        }
    }
}

// === Lookups ===

/// Result of resolving a `@username` or numeric id through the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedUser {
    pub id: UserId,
    pub first_name: String,
    pub username: Option<String>,
}
