//! Admin panel: settings wizards, moderation, broadcast, statistics.
//!
//! Everything here runs in an admin's private chat, driven from an inline
//! menu. Wizards edit the menu message in place where they can and fall
//! back to fresh messages where they cannot (reply keyboards, long lists).

use std::time::Duration;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    errors::TransportError,
    flows::{next_choice, show, FlowContext},
    formatting::escape_html,
    messaging::types::{
        CallbackEvent, InlineButton, InlineKeyboard, Keyboard, MessageEvent, RequestChatKeyboard,
    },
    models::HotlineConfig,
    store::require_config,
    Result,
};

// Menu buttons.
pub const CB_SET_STAFF_CHAT: &str = "set_staff_chat";
pub const CB_SET_GA_CHAT: &str = "set_ga_chat";
pub const CB_SET_FORM_LINK: &str = "set_assessment_form_link";
pub const CB_BROADCAST: &str = "broadcast";
pub const CB_BAN_USER: &str = "ban_user";
pub const CB_LIST_BANNED: &str = "list_banned";
pub const CB_STATISTICS: &str = "statistics";
pub const CB_ADD_ADMIN: &str = "add_admin";
pub const CB_MANAGE_ADMINS: &str = "manage_admins";
pub const CB_BACK: &str = "back";

// Wizard confirmations.
pub const CB_CONFIRM_FORM_LINK: &str = "confirm_form_link";
pub const CB_CANCEL_FORM_LINK: &str = "cancel_form_link";
pub const CB_CONFIRM_BROADCAST: &str = "confirm_broadcast";
pub const CB_CANCEL_BROADCAST: &str = "cancel_broadcast";
pub const CB_CONFIRM_TRANSFER: &str = "confirm_super_transfer";
pub const CB_CANCEL_TRANSFER: &str = "cancel_super_transfer";

// Dynamic commands rendered into admin lists.
pub const CMD_UNBAN_PREFIX: &str = "/unban_";
pub const CMD_REMOVE_ADMIN_PREFIX: &str = "/remove_admin_";
pub const CMD_TRANSFER_PREFIX: &str = "/transfer_super_admin_";

const STAFF_CHAT_REQUEST: i32 = 1;
const GA_CHAT_REQUEST: i32 = 2;

const SHARE_GROUP_BUTTON: &str = "Choose a group";
const CANCEL_BUTTON: &str = "Cancel";
const DISABLE_GATE_BUTTON: &str = "Disable the membership check";

/// Parse the numeric tail of commands like `/unban_17`, tolerating a
/// trailing `@botname`.
pub fn numeric_suffix(text: &str, prefix: &str) -> Option<i64> {
    let rest = text.trim().strip_prefix(prefix)?;
    let rest = rest.split('@').next().unwrap_or(rest);
    rest.parse().ok()
}

fn back_keyboard() -> InlineKeyboard {
    InlineKeyboard::row(vec![InlineButton::new("Go back", CB_BACK)])
}

fn menu_keyboard(config: &HotlineConfig, viewer: UserId) -> InlineKeyboard {
    let mut rows = vec![
        vec![InlineButton::new("Set the staff chat", CB_SET_STAFF_CHAT)],
        vec![InlineButton::new("Set the assessment form link", CB_SET_FORM_LINK)],
        vec![InlineButton::new("Set the community chat", CB_SET_GA_CHAT)],
        vec![InlineButton::new("Broadcast a message", CB_BROADCAST)],
        vec![InlineButton::new("Ban a user", CB_BAN_USER)],
        vec![InlineButton::new("Banned users", CB_LIST_BANNED)],
        vec![InlineButton::new("Statistics", CB_STATISTICS)],
    ];
    let mut admin_row = vec![InlineButton::new("Add an admin", CB_ADD_ADMIN)];
    if config.super_admin_id == viewer {
        admin_row.push(InlineButton::new("Manage admins", CB_MANAGE_ADMINS));
    }
    rows.push(admin_row);
    InlineKeyboard::new(rows)
}

async fn chat_label(ctx: &FlowContext, chat: ChatId) -> String {
    match ctx.messenger.chat_title(chat).await {
        Ok(title) => escape_html(&title),
        Err(err) => {
            ctx.oplog
                .record(&format!("Could not fetch the title of chat {}: {err}", chat.0))
                .await;
            "Not accessible ⚠️".to_string()
        }
    }
}

async fn settings_text(ctx: &FlowContext, config: &HotlineConfig) -> String {
    let staff = match config.staff_chat_id {
        Some(chat) => chat_label(ctx, chat).await,
        None => "Not set yet ⚠️".to_string(),
    };
    let form = match &config.assessment_form_link {
        Some(link) => escape_html(link),
        None => "Not set yet ⚠️".to_string(),
    };
    let gate = match config.ga_chat_id {
        Some(chat) => chat_label(ctx, chat).await,
        None => "Disabled".to_string(),
    };
    format!(
        "<b>Current settings</b>\nStaff chat: {staff}\nAssessment form: {form}\nCommunity chat gate: {gate}"
    )
}

/// Render (or re-render) the settings menu.
async fn show_menu(
    ctx: &FlowContext,
    chat: ChatId,
    viewer: UserId,
    anchor: Option<MessageRef>,
) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    let text = settings_text(ctx, &config).await;
    show(ctx, chat, anchor, &text, Some(menu_keyboard(&config, viewer))).await?;
    Ok(())
}

/// `/start` in an admin's private chat.
pub async fn start(ctx: &FlowContext, admin: UserId) -> Result<()> {
    let chat = admin.private_chat();
    ctx.listeners.cancel(chat, admin);

    let config = require_config(ctx.store.as_ref()).await?;
    let text = format!(
        "Hello! This is the admin panel of the support hotline.\n\n{}",
        settings_text(ctx, &config).await
    );
    ctx.messenger
        .send_with_keyboard(chat, &text, menu_keyboard(&config, admin).into())
        .await?;
    Ok(())
}

/// "Go back" from any admin screen.
pub async fn go_back(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    ctx.listeners.cancel(event.chat_id, event.user_id);
    show_menu(ctx, event.chat_id, event.user_id, event.message).await
}

// === Chat pickers ===

/// "Set the staff chat": share a group through the reply-keyboard picker.
pub async fn set_staff_chat(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    // The reply keyboard replaces the inline menu, so drop the menu message.
    if let Some(menu) = event.message {
        let _ = ctx.messenger.delete_message(menu).await;
    }
    ctx.messenger
        .send_with_keyboard(
            event.chat_id,
            "Choose the group to use as the staff chat. The bot must already be a member of it.",
            Keyboard::RequestChat(RequestChatKeyboard {
                share_label: SHARE_GROUP_BUTTON.to_string(),
                request_id: STAFF_CHAT_REQUEST,
                extra_buttons: vec![CANCEL_BUTTON.to_string()],
            }),
        )
        .await?;

    let shared = loop {
        let Ok(message) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
            return Ok(());
        };
        if let Some(chat) = message.shared_chat_id {
            break chat;
        }
        if message.text.as_deref().map(str::trim) == Some(CANCEL_BUTTON) {
            ctx.messenger
                .send_with_keyboard(event.chat_id, "Cancelled.", Keyboard::Remove)
                .await?;
            return show_menu(ctx, event.chat_id, event.user_id, None).await;
        }
        ctx.messenger
            .send_html(event.chat_id, "Please use one of the two buttons.")
            .await?;
    };

    ctx.store.set_staff_chat(shared).await?;
    let title = match ctx.messenger.chat_title(shared).await {
        Ok(title) => title,
        Err(_) => "The selected group".to_string(),
    };

    // Welcome the staff chat and give it its command menu. The setting is
    // already saved either way; a write-forbidden group just needs a
    // permission fix, not a do-over.
    let greet = async {
        ctx.messenger.install_staff_commands(shared).await?;
        ctx.messenger
            .send_html(
                shared,
                "This group is now the staff chat of the support hotline. \
                 Commands: /reply, /send, /assign, /help.",
            )
            .await?;
        Ok::<_, crate::Error>(())
    };
    let confirmation = match greet.await {
        Ok(()) => format!(
            "<b>{}</b> has been set as the new staff chat ✅",
            escape_html(&title)
        ),
        Err(err) if matches!(err.transport(), Some(TransportError::WriteForbidden)) => {
            "The chat was saved, but the bot is not allowed to write there. \
             Please give it the right to send messages in that group."
                .to_string()
        }
        Err(err) => {
            ctx.oplog
                .record(&format!("Could not greet the new staff chat: {err}"))
                .await;
            format!(
                "The chat was saved, but greeting it failed: {}",
                escape_html(&err.to_string())
            )
        }
    };
    ctx.messenger
        .send_with_keyboard(event.chat_id, &confirmation, Keyboard::Remove)
        .await?;
    show_menu(ctx, event.chat_id, event.user_id, None).await
}

/// "Set the community chat": like the staff chat picker, plus a button to
/// switch the membership gate off entirely.
pub async fn set_ga_chat(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    if let Some(menu) = event.message {
        let _ = ctx.messenger.delete_message(menu).await;
    }
    ctx.messenger
        .send_with_keyboard(
            event.chat_id,
            "Choose the group users must be members of before the bot talks to them.",
            Keyboard::RequestChat(RequestChatKeyboard {
                share_label: SHARE_GROUP_BUTTON.to_string(),
                request_id: GA_CHAT_REQUEST,
                extra_buttons: vec![DISABLE_GATE_BUTTON.to_string(), CANCEL_BUTTON.to_string()],
            }),
        )
        .await?;

    let shared = loop {
        let Ok(message) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
            return Ok(());
        };
        if let Some(chat) = message.shared_chat_id {
            break chat;
        }
        match message.text.as_deref().map(str::trim) {
            Some(DISABLE_GATE_BUTTON) => {
                ctx.store.set_ga_chat(None).await?;
                ctx.messenger
                    .send_with_keyboard(
                        event.chat_id,
                        "Membership check disabled. Anyone can message the bot now ⚠️",
                        Keyboard::Remove,
                    )
                    .await?;
                return show_menu(ctx, event.chat_id, event.user_id, None).await;
            }
            Some(CANCEL_BUTTON) => {
                ctx.messenger
                    .send_with_keyboard(event.chat_id, "Cancelled.", Keyboard::Remove)
                    .await?;
                return show_menu(ctx, event.chat_id, event.user_id, None).await;
            }
            _ => {
                ctx.messenger
                    .send_html(event.chat_id, "Please use one of the buttons.")
                    .await?;
            }
        }
    };

    ctx.store.set_ga_chat(Some(shared)).await?;
    let title = match ctx.messenger.chat_title(shared).await {
        Ok(title) => title,
        Err(_) => "The selected group".to_string(),
    };
    ctx.messenger
        .send_with_keyboard(
            event.chat_id,
            &format!(
                "<b>{}</b> is now the required community chat ✅\n\
                 Run this again to change it or to disable the check.",
                escape_html(&title)
            ),
            Keyboard::Remove,
        )
        .await?;
    show_menu(ctx, event.chat_id, event.user_id, None).await
}

// === Form link ===

pub async fn set_form_link(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    show(
        ctx,
        event.chat_id,
        event.message,
        "Send the new assessment form link.",
        Some(back_keyboard()),
    )
    .await?;

    let link = loop {
        let Ok(message) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
            return Ok(());
        };
        match message.text {
            Some(text) => break text.trim().to_string(),
            None => {
                ctx.messenger
                    .send_html(event.chat_id, "Please send the link as text.")
                    .await?;
            }
        }
    };

    let confirm = ctx
        .messenger
        .send_with_keyboard(
            event.chat_id,
            &format!("Set the assessment form link to:\n{} ?", escape_html(&link)),
            InlineKeyboard::row(vec![
                InlineButton::new("Confirm", CB_CONFIRM_FORM_LINK),
                InlineButton::new("Cancel", CB_CANCEL_FORM_LINK),
            ])
            .into(),
        )
        .await?;

    let Ok(choice) = next_choice(
        ctx,
        event.chat_id,
        event.user_id,
        &[CB_CONFIRM_FORM_LINK, CB_CANCEL_FORM_LINK],
    )
    .await
    else {
        return Ok(());
    };
    let anchor = choice.message.or(Some(confirm));
    if choice.data == CB_CANCEL_FORM_LINK {
        return show_menu(ctx, event.chat_id, event.user_id, anchor).await;
    }

    ctx.store.set_form_link(&link).await?;
    show(
        ctx,
        event.chat_id,
        anchor,
        "The new assessment form link has been set successfully ✅",
        Some(back_keyboard()),
    )
    .await?;
    Ok(())
}

// === Moderation ===

pub async fn ban_user(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    show(
        ctx,
        event.chat_id,
        event.message,
        "Send the number of the user you want to ban.",
        Some(back_keyboard()),
    )
    .await?;

    let user = loop {
        let Ok(message) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
            return Ok(());
        };
        let serial = message.text.as_deref().and_then(|t| t.trim().parse::<i64>().ok());
        let Some(serial) = serial else {
            ctx.messenger
                .send_html(event.chat_id, "Please send a valid serial number.")
                .await?;
            continue;
        };
        match ctx.store.find_user_by_serial(serial).await? {
            Some(user) => break user,
            None => {
                ctx.messenger
                    .send_html(event.chat_id, "There is no bot user with that number.")
                    .await?;
            }
        }
    };

    let config = require_config(ctx.store.as_ref()).await?;
    if config.is_banned(user.id) {
        ctx.messenger
            .send_with_keyboard(
                event.chat_id,
                "That user is already banned.",
                back_keyboard().into(),
            )
            .await?;
        return Ok(());
    }

    ctx.store.ban_user(user.id).await?;
    ctx.messenger
        .send_with_keyboard(
            event.chat_id,
            &format!(
                "<b>{}</b> has been banned, they can no longer contact the bot ✅",
                escape_html(&user.display_tag())
            ),
            back_keyboard().into(),
        )
        .await?;
    Ok(())
}

pub async fn list_banned(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    if config.banned_users.is_empty() {
        show(
            ctx,
            event.chat_id,
            event.message,
            "No banned users.",
            Some(back_keyboard()),
        )
        .await?;
        return Ok(());
    }

    let mut lines = vec!["<b>Banned users</b>".to_string()];
    for banned in &config.banned_users {
        match ctx.store.find_user(*banned).await? {
            Some(user) => lines.push(format!(
                "{}   {}{}",
                escape_html(&user.display_tag()),
                CMD_UNBAN_PREFIX,
                user.serial_number
            )),
            None => lines.push(format!("id {} (no user record)", banned.0)),
        }
    }
    show(
        ctx,
        event.chat_id,
        event.message,
        &lines.join("\n"),
        Some(back_keyboard()),
    )
    .await?;
    Ok(())
}

/// `/unban_<serial>` typed (or tapped) in an admin chat.
pub async fn unban(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    let text = event.text.clone().unwrap_or_default();
    let Some(serial) = numeric_suffix(&text, CMD_UNBAN_PREFIX) else {
        ctx.messenger
            .send_html(event.chat_id, "Usage: <code>/unban_&lt;user number&gt;</code>")
            .await?;
        return Ok(());
    };

    let config = require_config(ctx.store.as_ref()).await?;
    let banned = match ctx.store.find_user_by_serial(serial).await? {
        Some(user) if config.is_banned(user.id) => user,
        _ => {
            ctx.messenger
                .send_html(
                    event.chat_id,
                    "There is no banned user with that number.",
                )
                .await?;
            return Ok(());
        }
    };

    ctx.store.unban_user(banned.id).await?;
    ctx.messenger
        .send_html(
            event.chat_id,
            &format!("User #{serial} has been unbanned successfully ✅"),
        )
        .await?;
    Ok(())
}

// === Admin management ===

pub async fn add_admin(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    show(
        ctx,
        event.chat_id,
        event.message,
        "Send the user id or @username of the new admin.",
        Some(back_keyboard()),
    )
    .await?;

    let resolved = loop {
        let Ok(message) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
            return Ok(());
        };
        let Some(text) = message.text else {
            ctx.messenger
                .send_html(event.chat_id, "Please send a valid user id or @username.")
                .await?;
            continue;
        };
        match ctx.messenger.resolve_user(text.trim()).await {
            Ok(resolved) => break resolved,
            Err(_) => {
                ctx.messenger
                    .send_html(event.chat_id, "Please send a valid user id or @username.")
                    .await?;
            }
        }
    };

    ctx.store.add_admin(resolved.id).await?;
    let label = match &resolved.username {
        Some(username) => format!("@{username}"),
        None => escape_html(&resolved.first_name),
    };
    ctx.messenger
        .send_with_keyboard(
            event.chat_id,
            &format!("{label} is now one of the bot admins ✅"),
            back_keyboard().into(),
        )
        .await?;
    Ok(())
}

/// Superadmin-only roster with per-admin remove and transfer commands.
pub async fn manage_admins(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    if event.user_id != config.super_admin_id {
        return Ok(());
    }

    let mut lines = vec!["<b>Bot admins</b>".to_string()];
    for admin in &config.admins_list {
        let name = ctx
            .messenger
            .user_display_name(*admin)
            .await
            .unwrap_or_else(|_| "This admin".to_string());
        if *admin == event.user_id {
            lines.push(format!("• {} (you)", escape_html(&name)));
        } else {
            lines.push(format!(
                "• {}\n  {}{}  {}{}",
                escape_html(&name),
                CMD_REMOVE_ADMIN_PREFIX,
                admin.0,
                CMD_TRANSFER_PREFIX,
                admin.0
            ));
        }
    }
    show(
        ctx,
        event.chat_id,
        event.message,
        &lines.join("\n"),
        Some(back_keyboard()),
    )
    .await?;
    Ok(())
}

/// `/remove_admin_<id>`, superadmin only.
pub async fn remove_admin(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    if event.user_id != config.super_admin_id {
        return Ok(());
    }

    let text = event.text.clone().unwrap_or_default();
    let Some(raw_id) = numeric_suffix(&text, CMD_REMOVE_ADMIN_PREFIX) else {
        ctx.messenger.send_html(event.chat_id, "Invalid admin id.").await?;
        return Ok(());
    };
    let target = UserId(raw_id);

    if !config.is_admin(target) {
        ctx.messenger
            .send_html(event.chat_id, "There is no admin with the specified id.")
            .await?;
        return Ok(());
    }
    if target == event.user_id {
        ctx.messenger
            .send_html(
                event.chat_id,
                "You can't remove yourself. Transfer the superadmin role to \
                 someone else first.",
            )
            .await?;
        return Ok(());
    }

    ctx.store.remove_admin(target).await?;
    ctx.messenger
        .send_html(event.chat_id, "Admin removed successfully ✅")
        .await?;
    Ok(())
}

/// `/transfer_super_admin_<id>`, superadmin only, with confirmation.
pub async fn transfer_super_admin(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    if event.user_id != config.super_admin_id {
        return Ok(());
    }

    let text = event.text.clone().unwrap_or_default();
    let Some(raw_id) = numeric_suffix(&text, CMD_TRANSFER_PREFIX) else {
        ctx.messenger.send_html(event.chat_id, "Invalid admin id.").await?;
        return Ok(());
    };
    let target = UserId(raw_id);

    if !config.is_admin(target) {
        ctx.messenger
            .send_html(event.chat_id, "There is no admin with the specified id.")
            .await?;
        return Ok(());
    }
    if target == event.user_id {
        ctx.messenger
            .send_html(event.chat_id, "You are already the superadmin.")
            .await?;
        return Ok(());
    }

    let name = ctx
        .messenger
        .user_display_name(target)
        .await
        .unwrap_or_else(|_| "This admin".to_string());
    let confirm = ctx
        .messenger
        .send_with_keyboard(
            event.chat_id,
            &format!(
                "Transfer the superadmin role to <b>{}</b>? Only they will be \
                 able to manage admins afterwards.",
                escape_html(&name)
            ),
            InlineKeyboard::row(vec![
                InlineButton::new("Transfer", CB_CONFIRM_TRANSFER),
                InlineButton::new("Cancel", CB_CANCEL_TRANSFER),
            ])
            .into(),
        )
        .await?;

    let Ok(choice) = next_choice(
        ctx,
        event.chat_id,
        event.user_id,
        &[CB_CONFIRM_TRANSFER, CB_CANCEL_TRANSFER],
    )
    .await
    else {
        return Ok(());
    };
    let anchor = choice.message.or(Some(confirm));
    if choice.data == CB_CANCEL_TRANSFER {
        return show_menu(ctx, event.chat_id, event.user_id, anchor).await;
    }

    ctx.store.set_super_admin(target).await?;
    ctx.oplog
        .record(&format!(
            "Superadmin role transferred from {} to {}",
            event.user_id.0, target.0
        ))
        .await;
    show(
        ctx,
        event.chat_id,
        anchor,
        "Superadmin powers transferred successfully ✅",
        Some(back_keyboard()),
    )
    .await?;
    Ok(())
}

// === Broadcast ===

async fn copy_with_flood_retry(
    ctx: &FlowContext,
    to: ChatId,
    source: MessageRef,
) -> Result<()> {
    match ctx.messenger.copy_message(to, source).await {
        Ok(_) => Ok(()),
        Err(err) => match err.transport() {
            Some(TransportError::FloodWait(wait)) => {
                tokio::time::sleep(*wait + Duration::from_secs(1)).await;
                ctx.messenger.copy_message(to, source).await.map(|_| ())
            }
            _ => Err(err),
        },
    }
}

/// "Broadcast a message": copy one admin message to every bot user.
pub async fn broadcast(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    show(
        ctx,
        event.chat_id,
        event.message,
        "Send the message you want to broadcast to all bot users.",
        Some(back_keyboard()),
    )
    .await?;

    let Ok(content) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
        return Ok(());
    };

    // Echo the message back so the admin confirms what users will see.
    ctx.messenger
        .copy_message(event.chat_id, content.message_ref())
        .await?;
    let total = ctx.store.count_users().await?;
    let confirm = ctx
        .messenger
        .send_with_keyboard(
            event.chat_id,
            &format!("Broadcast this message to all {total} bot users?"),
            InlineKeyboard::row(vec![
                InlineButton::new("Broadcast", CB_CONFIRM_BROADCAST),
                InlineButton::new("Cancel", CB_CANCEL_BROADCAST),
            ])
            .into(),
        )
        .await?;

    let Ok(choice) = next_choice(
        ctx,
        event.chat_id,
        event.user_id,
        &[CB_CONFIRM_BROADCAST, CB_CANCEL_BROADCAST],
    )
    .await
    else {
        return Ok(());
    };
    let anchor = choice.message.or(Some(confirm));
    if choice.data == CB_CANCEL_BROADCAST {
        return show_menu(ctx, event.chat_id, event.user_id, anchor).await;
    }

    show(
        ctx,
        event.chat_id,
        anchor,
        "Broadcast started, I will report back when it finishes.",
        None,
    )
    .await?;

    let users = ctx.store.list_users().await?;
    let mut delivered = 0usize;
    for user in &users {
        match copy_with_flood_retry(ctx, user.id.private_chat(), content.message_ref()).await {
            Ok(()) => delivered += 1,
            Err(err) => {
                ctx.oplog
                    .record(&format!(
                        "Broadcast skipped user #{}: {err}",
                        user.serial_number
                    ))
                    .await;
            }
        }
    }

    ctx.messenger
        .send_with_keyboard(
            event.chat_id,
            &format!(
                "The message was broadcast to {delivered} of {} bot users ✅",
                users.len()
            ),
            back_keyboard().into(),
        )
        .await?;
    Ok(())
}

// === Statistics ===

pub async fn statistics(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    let anchor = show(
        ctx,
        event.chat_id,
        event.message,
        "Preparing the statistics…",
        None,
    )
    .await?;

    let users = ctx.store.list_users().await?;
    let stats = ctx.store.load_statistics().await?.unwrap_or_default();
    let (filled, unfilled): (Vec<_>, Vec<_>) = users.iter().partition(|u| u.filled_form);

    let roster = |group: &[&crate::models::HotlineUser]| -> String {
        if group.is_empty() {
            "(nobody)".to_string()
        } else {
            group
                .iter()
                .map(|u| format!("• {}", escape_html(&u.display_tag())))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };

    let report = format!(
        "<b>Statistics</b>\n\
         Users: {}\n\
         Filled the form: {}\n\
         Staff replies sent: {}\n\
         User messages received: {}\n\n\
         <b>Filled the form</b>\n{}\n\n\
         <b>Did not fill the form</b>\n{}",
        users.len(),
        filled.len(),
        stats.staff_replies_counter,
        stats.users_messages_counter,
        roster(&filled),
        roster(&unfilled),
    );
    show(ctx, event.chat_id, Some(anchor), &report, Some(back_keyboard())).await?;
    Ok(())
}
