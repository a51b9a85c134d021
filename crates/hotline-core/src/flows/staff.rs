//! Staff-chat flows: replying to users, sending arbitrary content,
//! assigning names.
//!
//! Staff address users by serial number only. Every outbound delivery is
//! confirmed with an inline keyboard before anything reaches the user.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    domain::ChatId,
    errors::TransportError,
    flows::{next_choice, show, FlowContext},
    formatting::escape_html,
    messaging::types::{InlineButton, InlineKeyboard, MessageEvent},
    models::HotlineUser,
    Result,
};

pub const CB_CONFIRM_REPLY: &str = "confirm_reply";
pub const CB_CANCEL_REPLY: &str = "cancel_reply";
pub const CB_CONFIRM_SEND: &str = "confirm_send";
pub const CB_CANCEL_SEND: &str = "cancel_send";
pub const CB_CONFIRM_ASSIGN: &str = "confirm_assign";
pub const CB_CANCEL_ASSIGN: &str = "cancel_assign";

/// Sent to the user right before any staff content, so replies are never
/// mistaken for messages from the bot itself.
const REPLY_PREAMBLE: &str = "You have received a reply from the support team:";

static REPLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^/reply(?:@\w+)?\s+(\d+)\s+(.+)$").unwrap());
static SEND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/send(?:@\w+)?\s+(\d+)\s*$").unwrap());
static ASSIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/assign(?:@\w+)?\s+(\d+)\s+(\S.*)$").unwrap());

/// `/reply <serial> <text>`: the body may span multiple lines.
pub fn parse_reply(text: &str) -> Option<(i64, String)> {
    let caps = REPLY_RE.captures(text.trim())?;
    let serial = caps.get(1)?.as_str().parse().ok()?;
    Some((serial, caps.get(2)?.as_str().trim().to_string()))
}

/// `/send <serial>`, nothing else on the line.
pub fn parse_send(text: &str) -> Option<i64> {
    let caps = SEND_RE.captures(text.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

/// `/assign <serial> <name>`: the name stays on one line, spaces allowed.
pub fn parse_assign(text: &str) -> Option<(i64, String)> {
    let caps = ASSIGN_RE.captures(text.trim())?;
    let serial = caps.get(1)?.as_str().parse().ok()?;
    Some((serial, caps.get(2)?.as_str().trim().to_string()))
}

fn confirm_keyboard(confirm_label: &str, confirm: &str, cancel: &str) -> InlineKeyboard {
    InlineKeyboard::row(vec![
        InlineButton::new(confirm_label, confirm),
        InlineButton::new("Cancel", cancel),
    ])
}

async fn lookup_by_serial(
    ctx: &FlowContext,
    chat: ChatId,
    serial: i64,
) -> Result<Option<HotlineUser>> {
    let user = ctx.store.find_user_by_serial(serial).await?;
    if user.is_none() {
        ctx.messenger
            .send_html(chat, &format!("There is no user with the number #{serial}."))
            .await?;
    }
    Ok(user)
}

/// Text delivery failure, phrased for the staff chat.
fn delivery_failure_text(err: &crate::Error) -> String {
    match err.transport() {
        Some(TransportError::Blocked) => "This user has blocked the bot.".to_string(),
        _ => format!(
            "Failed to deliver the message. Show this error to the bot developer:\n<code>{}</code>",
            escape_html(&err.to_string())
        ),
    }
}

/// `/reply <serial> <text>` in the staff chat.
pub async fn reply(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    let text = event.text.clone().unwrap_or_default();
    let Some((serial, reply_text)) = parse_reply(&text) else {
        ctx.messenger
            .send_html(
                event.chat_id,
                "Usage: <code>/reply &lt;user number&gt; &lt;message&gt;</code>",
            )
            .await?;
        return Ok(());
    };
    let Some(user) = lookup_by_serial(ctx, event.chat_id, serial).await? else {
        return Ok(());
    };

    let tag = escape_html(&user.display_tag());
    let confirm = ctx
        .messenger
        .send_with_keyboard(
            event.chat_id,
            &format!(
                "Send this reply to <b>{tag}</b>?\n\n<i>{}</i>",
                escape_html(&reply_text)
            ),
            confirm_keyboard("Send", CB_CONFIRM_REPLY, CB_CANCEL_REPLY).into(),
        )
        .await?;

    let Ok(choice) = next_choice(
        ctx,
        event.chat_id,
        event.user_id,
        &[CB_CONFIRM_REPLY, CB_CANCEL_REPLY],
    )
    .await
    else {
        return Ok(());
    };
    let anchor = choice.message.or(Some(confirm));
    if choice.data == CB_CANCEL_REPLY {
        show(ctx, event.chat_id, anchor, "Reply cancelled.", None).await?;
        return Ok(());
    }

    let delivery = async {
        ctx.messenger
            .send_html(user.id.private_chat(), REPLY_PREAMBLE)
            .await?;
        ctx.messenger
            .send_html(user.id.private_chat(), &escape_html(&reply_text))
            .await?;
        Ok::<_, crate::Error>(())
    };
    match delivery.await {
        Ok(()) => {
            ctx.store.incr_staff_replies().await?;
            show(
                ctx,
                event.chat_id,
                anchor,
                &format!("Reply delivered to <b>{tag}</b> ✅"),
                None,
            )
            .await?;
        }
        Err(err) => {
            show(ctx, event.chat_id, anchor, &delivery_failure_text(&err), None).await?;
        }
    }
    Ok(())
}

/// `/send <serial>` in the staff chat: deliver arbitrary content (photos,
/// documents, voice notes) to a user by copying a staff message.
pub async fn send_to_user(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    let text = event.text.clone().unwrap_or_default();
    let Some(serial) = parse_send(&text) else {
        ctx.messenger
            .send_html(
                event.chat_id,
                "Usage: <code>/send &lt;user number&gt;</code>, then follow the prompt.",
            )
            .await?;
        return Ok(());
    };
    let Some(user) = lookup_by_serial(ctx, event.chat_id, serial).await? else {
        return Ok(());
    };
    let tag = escape_html(&user.display_tag());

    let request = ctx
        .messenger
        .send_html(
            event.chat_id,
            &format!(
                "Reply to <b>this message</b> with the content for {tag}, or send \
                 <code>cancel</code> to abort."
            ),
        )
        .await?;

    // Only a reply to the request message counts as content; everything
    // else this staffer writes meanwhile is ignored.
    let content = loop {
        let Ok(message) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
            return Ok(());
        };
        let is_cancel = message
            .text
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("cancel"));
        if is_cancel {
            ctx.messenger.send_html(event.chat_id, "Send cancelled.").await?;
            return Ok(());
        }
        if message.reply_to == Some(request.message_id) {
            break message;
        }
    };

    // Echo the content back as a preview, then ask.
    ctx.messenger
        .copy_message(event.chat_id, content.message_ref())
        .await?;
    let confirm = ctx
        .messenger
        .send_with_keyboard(
            event.chat_id,
            &format!("Send this to <b>{tag}</b>?"),
            confirm_keyboard("Send", CB_CONFIRM_SEND, CB_CANCEL_SEND).into(),
        )
        .await?;

    let Ok(choice) = next_choice(
        ctx,
        event.chat_id,
        event.user_id,
        &[CB_CONFIRM_SEND, CB_CANCEL_SEND],
    )
    .await
    else {
        return Ok(());
    };
    let anchor = choice.message.or(Some(confirm));
    if choice.data == CB_CANCEL_SEND {
        show(ctx, event.chat_id, anchor, "Send cancelled.", None).await?;
        return Ok(());
    }

    let delivery = async {
        ctx.messenger
            .send_html(user.id.private_chat(), REPLY_PREAMBLE)
            .await?;
        ctx.messenger
            .copy_message(user.id.private_chat(), content.message_ref())
            .await?;
        Ok::<_, crate::Error>(())
    };
    match delivery.await {
        Ok(()) => {
            ctx.store.incr_staff_replies().await?;
            show(
                ctx,
                event.chat_id,
                anchor,
                &format!("Delivered to <b>{tag}</b> ✅"),
                None,
            )
            .await?;
        }
        Err(err) => {
            show(ctx, event.chat_id, anchor, &delivery_failure_text(&err), None).await?;
        }
    }
    Ok(())
}

/// `/assign <serial> <name>` in the staff chat.
pub async fn assign_name(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    let text = event.text.clone().unwrap_or_default();
    let Some((serial, name)) = parse_assign(&text) else {
        ctx.messenger
            .send_html(
                event.chat_id,
                "Usage: <code>/assign &lt;user number&gt; &lt;name&gt;</code>",
            )
            .await?;
        return Ok(());
    };
    let Some(user) = lookup_by_serial(ctx, event.chat_id, serial).await? else {
        return Ok(());
    };

    // Names are unique across users, otherwise two serials would collapse
    // into one label in the staff chat.
    if let Some(holder) = ctx.store.find_user_by_custom_name(&name).await? {
        ctx.messenger
            .send_html(
                event.chat_id,
                &format!(
                    "That name is already taken by <b>{}</b>.",
                    escape_html(&holder.display_tag())
                ),
            )
            .await?;
        return Ok(());
    }

    let confirm = ctx
        .messenger
        .send_with_keyboard(
            event.chat_id,
            &format!(
                "Call <b>User #{serial}</b> \"{}\" from now on?",
                escape_html(&name)
            ),
            confirm_keyboard("Yes", CB_CONFIRM_ASSIGN, CB_CANCEL_ASSIGN).into(),
        )
        .await?;

    let Ok(choice) = next_choice(
        ctx,
        event.chat_id,
        event.user_id,
        &[CB_CONFIRM_ASSIGN, CB_CANCEL_ASSIGN],
    )
    .await
    else {
        return Ok(());
    };
    let anchor = choice.message.or(Some(confirm));
    if choice.data == CB_CANCEL_ASSIGN {
        show(ctx, event.chat_id, anchor, "Name assignment cancelled.", None).await?;
        return Ok(());
    }

    ctx.store.set_custom_name(user.id, &name).await?;
    show(
        ctx,
        event.chat_id,
        anchor,
        &format!(
            "User #{serial} will now be shown as <b>{}</b> ✅",
            escape_html(&name)
        ),
        None,
    )
    .await?;
    Ok(())
}

/// `/help` in the staff chat.
pub async fn help(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    let manual = "<b>Staff commands</b>\n\
         <code>/reply &lt;number&gt; &lt;text&gt;</code>: send a text reply to a user\n\
         <code>/send &lt;number&gt;</code>: send any message (photos, files) to a user\n\
         <code>/assign &lt;number&gt; &lt;name&gt;</code>: give a user a memorable name\n\
         <code>/help</code>: show this message\n\n\
         Users are identified by number; the bot never reveals who they are.";
    ctx.messenger.send_html(event.chat_id, manual).await?;
    Ok(())
}
