//! Conversational flows.
//!
//! A flow is a future spawned by the router for one person's interaction:
//! it sends prompts through the messenger port and blocks on the listener
//! registry for that person's next input. Flows return `Ok(())` when a wait
//! is cancelled; cancellation is normal control flow here, not a failure.

pub mod admin;
pub mod staff;
pub mod startup;
pub mod user;

use std::sync::Arc;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    listen::{Cancelled, Listeners},
    messaging::{
        types::{CallbackEvent, InlineKeyboard},
        MessengerPort,
    },
    oplog::OpsLog,
    store::HotlineStore,
    Result,
};

/// Shared handles every flow runs against.
#[derive(Clone)]
pub struct FlowContext {
    pub store: Arc<dyn HotlineStore>,
    pub messenger: Arc<dyn MessengerPort>,
    pub listeners: Arc<Listeners>,
    pub oplog: OpsLog,
    pub bot_id: UserId,
}

/// Wait until the person presses one of the expected buttons.
///
/// Presses of anything else (stale keyboards from an earlier wizard) are
/// swallowed so the current wizard keeps its slot.
pub(crate) async fn next_choice(
    ctx: &FlowContext,
    chat_id: ChatId,
    user_id: UserId,
    options: &[&str],
) -> std::result::Result<CallbackEvent, Cancelled> {
    loop {
        let event = ctx.listeners.next_callback(chat_id, user_id).await?;
        if options.contains(&event.data.as_str()) {
            return Ok(event);
        }
    }
}

/// Render a screen: edit the anchor message when there is one, otherwise
/// (or when the edit fails, e.g. the message is too old) send it fresh.
pub(crate) async fn show(
    ctx: &FlowContext,
    chat_id: ChatId,
    anchor: Option<MessageRef>,
    html: &str,
    keyboard: Option<InlineKeyboard>,
) -> Result<MessageRef> {
    if let Some(message) = anchor {
        if ctx
            .messenger
            .edit_html(message, html, keyboard.clone())
            .await
            .is_ok()
        {
            return Ok(message);
        }
    }

    match keyboard {
        Some(kb) => {
            ctx.messenger
                .send_with_keyboard(chat_id, html, crate::messaging::Keyboard::Inline(kb))
                .await
        }
        None => ctx.messenger.send_html(chat_id, html).await,
    }
}
