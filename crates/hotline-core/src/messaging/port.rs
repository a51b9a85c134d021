//! Outbound messenger port.

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{InlineKeyboard, Keyboard, ResolvedUser},
    Result,
};

/// Everything the flows need from the messaging platform.
///
/// All text goes out in HTML mode; callers escape user-provided fragments
/// with [`crate::formatting::escape_html`] before interpolating them.
/// Failures surface as [`crate::errors::TransportError`] inside the crate
/// error so flows can branch on blocked/forbidden without seeing the
/// underlying client.
#[async_trait]
pub trait MessengerPort: Send + Sync {
    async fn send_html(&self, chat: ChatId, html: &str) -> Result<MessageRef>;

    async fn send_with_keyboard(
        &self,
        chat: ChatId,
        html: &str,
        keyboard: Keyboard,
    ) -> Result<MessageRef>;

    /// Edit a previously sent message in place; `keyboard: None` drops any
    /// inline keyboard attached to it.
    async fn edit_html(
        &self,
        message: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()>;

    async fn delete_message(&self, message: MessageRef) -> Result<()>;

    /// Re-send a message to another chat without a forwarding header,
    /// keeping whatever media it carries.
    async fn copy_message(&self, to: ChatId, source: MessageRef) -> Result<MessageRef>;

    async fn chat_title(&self, chat: ChatId) -> Result<String>;

    async fn is_chat_member(&self, chat: ChatId, user: UserId) -> Result<bool>;

    /// Resolve a `@username` handle to a platform user.
    async fn resolve_user(&self, handle: &str) -> Result<ResolvedUser>;

    /// Best-effort display name for a user id (admin lists).
    async fn user_display_name(&self, user: UserId) -> Result<String>;

    /// Register the staff command menu (`/reply`, `/send`, ...) for the
    /// given chat.
    async fn install_staff_commands(&self, chat: ChatId) -> Result<()>;

    /// Register the private-chat command menu shown to users.
    async fn install_user_commands(&self) -> Result<()>;
}
