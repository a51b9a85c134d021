//! Telegram update handlers.
//!
//! Each update is converted to a core event and first offered to the
//! listener registry; a wizard mid-wait consumes it there. Everything else
//! is routed by role (admin, staff chat, plain user) and dispatched to the
//! matching flow. Flows are spawned, never awaited in the handler: the
//! dispatcher processes one update at a time per chat, and a wizard that
//! blocked the handler would deadlock waiting for its own next update.

use std::{future::Future, sync::Arc};

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use hotline_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    filters,
    flows::{admin, staff, user, FlowContext},
    messaging::types::{CallbackEvent, InboundEvent, MessageEvent},
};

use crate::router::AppState;

fn message_event(msg: &Message, user_id: UserId) -> MessageEvent {
    MessageEvent {
        chat_id: ChatId(msg.chat.id.0),
        user_id,
        message_id: MessageId(msg.id.0),
        text: msg.text().map(str::to_owned),
        shared_chat_id: msg.shared_chat().map(|shared| ChatId(shared.chat_id.0)),
        reply_to: msg.reply_to_message().map(|m| MessageId(m.id.0)),
    }
}

/// First token of a slash command, without the `/` and without a
/// `@botname` mention.
fn command_name(text: &str) -> Option<&str> {
    let first = text.trim().split_whitespace().next()?;
    let cmd = first.strip_prefix('/')?;
    Some(cmd.split('@').next().unwrap_or(cmd))
}

/// Run a flow in the background, reporting failures to the operator log.
/// A flow error is that interaction's problem, never the dispatcher's.
fn spawn_flow<F, Fut>(ctx: &FlowContext, what: &'static str, flow: F)
where
    F: FnOnce(FlowContext) -> Fut + Send + 'static,
    Fut: Future<Output = hotline_core::Result<()>> + Send + 'static,
{
    let ctx = ctx.clone();
    let oplog = ctx.oplog.clone();
    tokio::spawn(async move {
        if let Err(err) = flow(ctx).await {
            tracing::error!(flow = what, error = %err, "flow failed");
            oplog.record(&format!("The {what} flow failed: {err}")).await;
        }
    });
}

pub async fn handle_message(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Channel posts and service messages without an author are not ours.
    let Some(from) = &msg.from else {
        return Ok(());
    };
    let user_id = UserId(from.id.0 as i64);
    let event = message_event(&msg, user_id);
    let ctx = &state.ctx;

    // A wizard waiting on this person gets first pick.
    if ctx.listeners.deliver(InboundEvent::Message(event.clone())) {
        return Ok(());
    }

    let command = event.text.as_deref().and_then(command_name);

    if filters::is_staff_chat(ctx.store.as_ref(), event.chat_id).await {
        match command {
            Some("reply") => spawn_flow(ctx, "staff reply", move |ctx| async move {
                staff::reply(&ctx, event).await
            }),
            Some("send") => spawn_flow(ctx, "staff send", move |ctx| async move {
                staff::send_to_user(&ctx, event).await
            }),
            Some("assign") => spawn_flow(ctx, "staff assign", move |ctx| async move {
                staff::assign_name(&ctx, event).await
            }),
            Some("help") => spawn_flow(ctx, "staff help", move |ctx| async move {
                staff::help(&ctx, event).await
            }),
            _ => {} // ordinary staff chatter
        }
        return Ok(());
    }

    // Group messages below this point are not addressed to the bot.
    if !msg.chat.is_private() {
        return Ok(());
    }

    if filters::is_admin(ctx.store.as_ref(), Some(user_id)).await {
        let text = event.text.as_deref().unwrap_or("");
        if command == Some("start") {
            spawn_flow(ctx, "admin menu", move |ctx| async move {
                admin::start(&ctx, user_id).await
            });
        } else if text.starts_with(admin::CMD_UNBAN_PREFIX) {
            spawn_flow(ctx, "unban", move |ctx| async move {
                admin::unban(&ctx, event).await
            });
        } else if text.starts_with(admin::CMD_REMOVE_ADMIN_PREFIX) {
            spawn_flow(ctx, "remove admin", move |ctx| async move {
                admin::remove_admin(&ctx, event).await
            });
        } else if text.starts_with(admin::CMD_TRANSFER_PREFIX) {
            spawn_flow(ctx, "superadmin transfer", move |ctx| async move {
                admin::transfer_super_admin(&ctx, event).await
            });
        }
        return Ok(());
    }

    if filters::is_allowed_user(ctx.store.as_ref(), Some(user_id), ctx.bot_id).await {
        if command == Some("start") {
            spawn_flow(ctx, "user intake", move |ctx| async move {
                user::start(&ctx, user_id).await
            });
        } else if event.text.is_some() {
            spawn_flow(ctx, "user hint", move |ctx| async move {
                user::stray_text(&ctx, event).await
            });
        }
    }

    Ok(())
}

pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    // Ack straight away so the button stops spinning whatever happens next.
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(data) = q.data else {
        return Ok(());
    };
    let user_id = UserId(q.from.id.0 as i64);
    let message = q.message.as_ref().map(|m| MessageRef {
        chat_id: ChatId(m.chat().id.0),
        message_id: MessageId(m.id().0),
    });
    // Keyboards live in the chat they were sent to; a detached (too old)
    // callback can only have come from this person's private chat.
    let chat_id = message
        .map(|m| m.chat_id)
        .unwrap_or_else(|| user_id.private_chat());

    let event = CallbackEvent {
        chat_id,
        user_id,
        message,
        data,
    };
    let ctx = &state.ctx;

    if ctx.listeners.deliver(InboundEvent::Callback(event.clone())) {
        return Ok(());
    }

    if filters::is_admin(ctx.store.as_ref(), Some(user_id)).await {
        match event.data.as_str() {
            admin::CB_SET_STAFF_CHAT => spawn_flow(ctx, "set staff chat", move |ctx| async move {
                admin::set_staff_chat(&ctx, event).await
            }),
            admin::CB_SET_GA_CHAT => spawn_flow(ctx, "set community chat", move |ctx| async move {
                admin::set_ga_chat(&ctx, event).await
            }),
            admin::CB_SET_FORM_LINK => spawn_flow(ctx, "set form link", move |ctx| async move {
                admin::set_form_link(&ctx, event).await
            }),
            admin::CB_BROADCAST => spawn_flow(ctx, "broadcast", move |ctx| async move {
                admin::broadcast(&ctx, event).await
            }),
            admin::CB_BAN_USER => spawn_flow(ctx, "ban user", move |ctx| async move {
                admin::ban_user(&ctx, event).await
            }),
            admin::CB_LIST_BANNED => spawn_flow(ctx, "banned list", move |ctx| async move {
                admin::list_banned(&ctx, event).await
            }),
            admin::CB_STATISTICS => spawn_flow(ctx, "statistics", move |ctx| async move {
                admin::statistics(&ctx, event).await
            }),
            admin::CB_ADD_ADMIN => spawn_flow(ctx, "add admin", move |ctx| async move {
                admin::add_admin(&ctx, event).await
            }),
            admin::CB_MANAGE_ADMINS => spawn_flow(ctx, "manage admins", move |ctx| async move {
                admin::manage_admins(&ctx, event).await
            }),
            admin::CB_BACK => spawn_flow(ctx, "admin menu", move |ctx| async move {
                admin::go_back(&ctx, event).await
            }),
            _ => {} // stale confirmation button from a finished wizard
        }
        return Ok(());
    }

    if filters::is_allowed_user(ctx.store.as_ref(), Some(user_id), ctx.bot_id).await {
        match event.data.as_str() {
            user::CB_FILLED_FORM => spawn_flow(ctx, "form filled", move |ctx| async move {
                user::filled_form(&ctx, event).await
            }),
            user::CB_REFILL_FORM => spawn_flow(ctx, "form refill", move |ctx| async move {
                user::refill_form(&ctx, event).await
            }),
            user::CB_CONTACT_STAFF => spawn_flow(ctx, "contact staff", move |ctx| async move {
                user::contact_staff(&ctx, event).await
            }),
            user::CB_USER_BACK => spawn_flow(ctx, "user menu", move |ctx| async move {
                user::go_back(&ctx, event).await
            }),
            _ => {}
        }
    }

    Ok(())
}
