//! User-facing flows: onboarding, the assessment form, contacting staff.
//!
//! Users are anonymous. Everything staff ever see of them is the serial
//! number (plus an optional staff-assigned name), so no flow here may leak
//! a Telegram name or handle into the staff chat.

use crate::{
    domain::UserId,
    flows::{next_choice, show, FlowContext},
    formatting::escape_html,
    messaging::types::{CallbackEvent, InlineButton, InlineKeyboard, MessageEvent},
    models::HotlineUser,
    store::require_config,
    Result,
};

pub const CB_FILLED_FORM: &str = "filled_form";
pub const CB_REFILL_FORM: &str = "refill_form";
pub const CB_CONTACT_STAFF: &str = "contact_staff";
pub const CB_USER_BACK: &str = "user_back";
pub const CB_CONFIRM_CONTACT: &str = "confirm_contact";

const MAINTENANCE: &str = "The bot is under maintenance right now, please try again later.";

fn fill_form_keyboard() -> InlineKeyboard {
    InlineKeyboard::row(vec![InlineButton::new(
        "I have filled the form",
        CB_FILLED_FORM,
    )])
}

fn back_keyboard() -> InlineKeyboard {
    InlineKeyboard::row(vec![InlineButton::new("Go back", CB_USER_BACK)])
}

fn menu_keyboard() -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![InlineButton::new("Contact the support team", CB_CONTACT_STAFF)],
        vec![InlineButton::new("Refill the assessment form", CB_REFILL_FORM)],
    ])
}

const MENU_TEXT: &str = "What would you like to do?";

/// `/start` in a user's private chat.
pub async fn start(ctx: &FlowContext, user_id: UserId) -> Result<()> {
    let chat = user_id.private_chat();
    ctx.listeners.cancel(chat, user_id);

    let config = require_config(ctx.store.as_ref()).await?;

    let Some(form_link) = config.assessment_form_link.clone() else {
        ctx.messenger.send_html(chat, MAINTENANCE).await?;
        return Ok(());
    };
    if config.staff_chat_id.is_none() {
        ctx.messenger.send_html(chat, MAINTENANCE).await?;
        return Ok(());
    }

    // Membership gate, when one is configured. An unanswerable check lets
    // the user through; only a definite "not a member" refuses.
    if let Some(gate_chat) = config.ga_chat_id {
        match ctx.messenger.is_chat_member(gate_chat, user_id).await {
            Ok(true) => {}
            Ok(false) => {
                ctx.messenger
                    .send_html(
                        chat,
                        "Sorry, this bot only serves members of the community group.",
                    )
                    .await?;
                return Ok(());
            }
            Err(err) => {
                ctx.oplog
                    .record(&format!("Could not verify group membership: {err}"))
                    .await;
            }
        }
    }

    let user = match ctx.store.find_user(user_id).await? {
        Some(user) => user,
        None => {
            let serial = ctx.store.count_users().await? as i64 + 1;
            let user = HotlineUser::new(user_id, serial);
            ctx.store.create_user(&user).await?;

            let welcome = format!(
                "Welcome! This bot connects you with the support team, anonymously.\n\n\
                 First, please fill the assessment form: {form_link}\n\n\
                 You are <b>User #{serial}</b> here. The team will only ever see that \
                 number, never your name or handle.\n\n\
                 Press the button below once you have filled the form."
            );
            ctx.messenger
                .send_with_keyboard(chat, &welcome, fill_form_keyboard().into())
                .await?;
            return Ok(());
        }
    };

    if !user.filled_form {
        let prompt = format!(
            "Please fill the assessment form first: {form_link}\n\n\
             You are <b>User #{}</b>. Press the button below once you are done.",
            user.serial_number
        );
        ctx.messenger
            .send_with_keyboard(chat, &prompt, fill_form_keyboard().into())
            .await?;
        return Ok(());
    }

    ctx.messenger
        .send_with_keyboard(chat, MENU_TEXT, menu_keyboard().into())
        .await?;
    Ok(())
}

/// "I have filled the form" button.
pub async fn filled_form(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    let Some(user) = ctx.store.find_user(event.user_id).await? else {
        return Ok(());
    };

    let Some(staff_chat) = config.staff_chat_id else {
        show(ctx, event.chat_id, event.message, MAINTENANCE, None).await?;
        return Ok(());
    };

    let notice = format!(
        "<b>{}</b> says they have filled the assessment form. Check the \
         responses and reach out with <code>/reply {} &lt;text&gt;</code>.",
        escape_html(&user.display_tag()),
        user.serial_number
    );
    if let Err(err) = ctx.messenger.send_html(staff_chat, &notice).await {
        // Staff chat unreachable: fall back to messaging the admins so the
        // form notification is not lost.
        ctx.oplog
            .record(&format!("Could not notify the staff chat: {err}"))
            .await;
        for admin in &config.admins_list {
            if let Err(err) = ctx.messenger.send_html(admin.private_chat(), &notice).await {
                ctx.oplog
                    .record(&format!("Could not notify admin {}: {err}", admin.0))
                    .await;
            }
        }
    }

    ctx.store.mark_form_filled(user.id).await?;

    show(
        ctx,
        event.chat_id,
        event.message,
        "Thank you! The support team has been notified. You can write to them \
         here any time.",
        Some(back_keyboard()),
    )
    .await?;
    Ok(())
}

/// "Refill the assessment form" button. Sends the link again; the filled
/// flag stays set, the form itself tracks resubmissions.
pub async fn refill_form(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    let Some(user) = ctx.store.find_user(event.user_id).await? else {
        return Ok(());
    };
    let Some(form_link) = config.assessment_form_link else {
        show(ctx, event.chat_id, event.message, MAINTENANCE, None).await?;
        return Ok(());
    };

    let prompt = format!(
        "Here is the assessment form: {form_link}\n\n\
         You are <b>User #{}</b>. Press the button below when you are done.",
        user.serial_number
    );
    let mut keyboard = fill_form_keyboard();
    keyboard
        .buttons
        .push(vec![InlineButton::new("Go back", CB_USER_BACK)]);
    show(ctx, event.chat_id, event.message, &prompt, Some(keyboard)).await?;
    Ok(())
}

/// "Contact the support team" button: take one text message, confirm, and
/// deliver it to the staff chat under the serial number.
pub async fn contact_staff(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    let config = require_config(ctx.store.as_ref()).await?;
    let Some(user) = ctx.store.find_user(event.user_id).await? else {
        return Ok(());
    };
    let Some(staff_chat) = config.staff_chat_id else {
        show(ctx, event.chat_id, event.message, MAINTENANCE, None).await?;
        return Ok(());
    };

    let prompt = format!(
        "Write your message to the support team. It will be delivered as \
         <b>{}</b>; your identity stays hidden.",
        escape_html(&user.display_tag())
    );
    show(ctx, event.chat_id, event.message, &prompt, Some(back_keyboard())).await?;

    let text = loop {
        let Ok(message) = ctx.listeners.next_message(event.chat_id, event.user_id).await else {
            return Ok(());
        };
        match message.text {
            Some(text) => break text,
            None => {
                ctx.messenger
                    .send_html(event.chat_id, "Please send a text message.")
                    .await?;
            }
        }
    };

    let confirm = ctx
        .messenger
        .send_with_keyboard(
            event.chat_id,
            &format!(
                "Send this message to the support team?\n\n<i>{}</i>",
                escape_html(&text)
            ),
            InlineKeyboard::row(vec![
                InlineButton::new("Send", CB_CONFIRM_CONTACT),
                InlineButton::new("Cancel", CB_USER_BACK),
            ])
            .into(),
        )
        .await?;

    let Ok(choice) = next_choice(
        ctx,
        event.chat_id,
        event.user_id,
        &[CB_CONFIRM_CONTACT, CB_USER_BACK],
    )
    .await
    else {
        return Ok(());
    };
    if choice.data == CB_USER_BACK {
        return go_back(ctx, choice).await;
    }

    let anchor = choice.message.or(Some(confirm));
    let delivery = format!(
        "You have a new message from <b>{}</b>:\n\n<i>{}</i>\n\n\
         Reply with <code>/reply {} &lt;text&gt;</code>.",
        escape_html(&user.display_tag()),
        escape_html(&text),
        user.serial_number
    );
    match ctx.messenger.send_html(staff_chat, &delivery).await {
        Ok(_) => {
            ctx.store.incr_user_messages().await?;
            show(
                ctx,
                event.chat_id,
                anchor,
                "Your message has been delivered. The support team will reply to \
                 you right here.",
                Some(back_keyboard()),
            )
            .await?;
        }
        Err(err) => {
            ctx.oplog
                .record(&format!("Could not deliver a user message to staff: {err}"))
                .await;
            show(
                ctx,
                event.chat_id,
                anchor,
                "Your message could not be delivered, please try again later.",
                None,
            )
            .await?;
        }
    }
    Ok(())
}

/// "Go back" button: abandon whatever wizard is running and return to the
/// menu. Quiet unless this person is a fully onboarded user.
pub async fn go_back(ctx: &FlowContext, event: CallbackEvent) -> Result<()> {
    ctx.listeners.cancel(event.chat_id, event.user_id);

    let config = require_config(ctx.store.as_ref()).await?;
    if !config.is_configured() {
        return Ok(());
    }
    let Some(user) = ctx.store.find_user(event.user_id).await? else {
        return Ok(());
    };
    if !user.filled_form {
        return Ok(());
    }

    show(ctx, event.chat_id, event.message, MENU_TEXT, Some(menu_keyboard())).await?;
    Ok(())
}

/// Plain text in a user's private chat that no wizard was waiting for.
pub async fn stray_text(ctx: &FlowContext, event: MessageEvent) -> Result<()> {
    ctx.messenger
        .send_html(event.chat_id, "Use /start to open the menu.")
        .await?;
    Ok(())
}
