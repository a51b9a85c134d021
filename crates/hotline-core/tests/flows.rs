//! End-to-end flow tests: each test spawns a flow task and feeds it events
//! through the listener registry, the way the router does in production.

use std::time::Duration;

use hotline_core::{
    domain::{ChatId, UserId},
    errors::TransportError,
    filters,
    flows::{admin, staff, user},
    listen::ListenKind,
    messaging::InboundEvent,
    models::{HotlineConfig, HotlineUser},
    testing::{
        callback, deliver_eventually, harness_with_config, media_message, text_message, Harness,
    },
};

const BOT: UserId = UserId(999);
const SUPER: UserId = UserId(10);
const STAFFER: UserId = UserId(20);
const ALICE: UserId = UserId(100);
const STAFF: ChatId = ChatId(-7000);

fn configured() -> HotlineConfig {
    let mut config = HotlineConfig::bootstrap(SUPER, None);
    config.staff_chat_id = Some(STAFF);
    config.assessment_form_link = Some("https://forms.example/intake".to_string());
    config
}

fn harness() -> Harness {
    harness_with_config(configured(), BOT)
}

fn onboarded(id: UserId, serial: i64) -> HotlineUser {
    let mut user = HotlineUser::new(id, serial);
    user.filled_form = true;
    user
}

#[tokio::test]
async fn contact_staff_delivers_anonymously_and_counts() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));
    let chat = ALICE.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, ALICE, None, user::CB_CONTACT_STAFF);
    let flow = tokio::spawn(async move { user::contact_staff(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, ALICE, 2, "I <need> help")),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, ALICE, None, user::CB_CONFIRM_CONTACT)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    let delivered = &h.messenger.sent_to(STAFF)[0];
    assert!(delivered.contains("User #1"));
    assert!(delivered.contains("I &lt;need&gt; help"));
    assert!(delivered.contains("/reply 1"));
    // The user's Telegram id never shows up in the staff chat.
    assert!(!delivered.contains("100"));

    assert_eq!(h.store.statistics_snapshot().users_messages_counter, 1);
    assert_eq!(h.store.statistics_snapshot().staff_replies_counter, 0);

    let receipt = h.messenger.last_edit_in(chat).unwrap();
    assert!(receipt.html.contains("has been delivered"));
}

#[tokio::test]
async fn contact_staff_cancel_returns_to_the_menu() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));
    let chat = ALICE.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, ALICE, None, user::CB_CONTACT_STAFF);
    let flow = tokio::spawn(async move { user::contact_staff(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, ALICE, 2, "draft I regret")),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, ALICE, None, user::CB_USER_BACK)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert!(h.messenger.sent_to(STAFF).is_empty());
    assert_eq!(h.store.statistics_snapshot().users_messages_counter, 0);
}

#[tokio::test]
async fn reply_reaches_the_user_and_counts() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));

    let ctx = h.ctx.clone();
    let command = text_message(STAFF, STAFFER, 1, "/reply 1 We got you <3");
    let flow = tokio::spawn(async move { staff::reply(&ctx, command).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(STAFF, STAFFER, None, staff::CB_CONFIRM_REPLY)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    let inbox = h.messenger.sent_to(ALICE.private_chat());
    assert_eq!(inbox[0], "You have received a reply from the support team:");
    assert_eq!(inbox[1], "We got you &lt;3");
    assert_eq!(h.store.statistics_snapshot().staff_replies_counter, 1);
    assert!(h
        .messenger
        .last_edit_in(STAFF)
        .unwrap()
        .html
        .contains("delivered"));
}

#[tokio::test]
async fn reply_to_a_blocked_user_reports_it_without_counting() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));
    h.messenger
        .fail_always(ALICE.private_chat(), TransportError::Blocked);

    let ctx = h.ctx.clone();
    let command = text_message(STAFF, STAFFER, 1, "/reply 1 hello");
    let flow = tokio::spawn(async move { staff::reply(&ctx, command).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(STAFF, STAFFER, None, staff::CB_CONFIRM_REPLY)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert!(h
        .messenger
        .last_edit_in(STAFF)
        .unwrap()
        .html
        .contains("blocked the bot"));
    assert_eq!(h.store.statistics_snapshot().staff_replies_counter, 0);
}

#[tokio::test]
async fn send_flow_copies_the_replied_content() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));

    let ctx = h.ctx.clone();
    let command = text_message(STAFF, STAFFER, 1, "/send 1");
    let flow = tokio::spawn(async move { staff::send_to_user(&ctx, command).await });

    // Chatter that is not a reply to the request is ignored.
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(STAFF, STAFFER, 2, "unrelated note")),
        )
        .await
    );

    // The request message is the first send into the staff chat.
    let request_id = h.messenger.last_sent_to(STAFF).unwrap().message_id;
    let mut content = media_message(STAFF, STAFFER, 3);
    content.reply_to = Some(request_id);
    assert!(deliver_eventually(&h.ctx.listeners, InboundEvent::Message(content)).await);

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(STAFF, STAFFER, None, staff::CB_CONFIRM_SEND)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    // One copy back into the staff chat as a preview, one to the user.
    assert_eq!(h.messenger.copies_to(STAFF).len(), 1);
    assert_eq!(h.messenger.copies_to(ALICE.private_chat()).len(), 1);
    assert_eq!(
        h.messenger.sent_to(ALICE.private_chat())[0],
        "You have received a reply from the support team:"
    );
    assert_eq!(h.store.statistics_snapshot().staff_replies_counter, 1);
}

#[tokio::test]
async fn send_flow_aborts_on_cancel() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));

    let ctx = h.ctx.clone();
    let command = text_message(STAFF, STAFFER, 1, "/send 1");
    let flow = tokio::spawn(async move { staff::send_to_user(&ctx, command).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(STAFF, STAFFER, 2, "  CANCEL  ")),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert!(h.messenger.copies().is_empty());
    assert!(h
        .messenger
        .sent_to(STAFF)
        .iter()
        .any(|m| m.contains("Send cancelled")));
}

#[tokio::test]
async fn assigned_names_stick_and_show_up_in_later_prompts() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));

    let ctx = h.ctx.clone();
    let command = text_message(STAFF, STAFFER, 1, "/assign 1 night owl");
    let flow = tokio::spawn(async move { staff::assign_name(&ctx, command).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(STAFF, STAFFER, None, staff::CB_CONFIRM_ASSIGN)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert_eq!(
        h.store.user_snapshot(ALICE).unwrap().custom_name.as_deref(),
        Some("night owl")
    );

    // A later reply addresses the user by the assigned name.
    let ctx = h.ctx.clone();
    let command = text_message(STAFF, STAFFER, 4, "/reply 1 hi");
    let flow = tokio::spawn(async move { staff::reply(&ctx, command).await });
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(STAFF, STAFFER, None, staff::CB_CANCEL_REPLY)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert!(h
        .messenger
        .sent_to(STAFF)
        .iter()
        .any(|m| m.contains("User #1 (night owl)")));
}

#[tokio::test]
async fn starting_over_cancels_a_waiting_wizard() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));
    let chat = ALICE.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, ALICE, None, user::CB_CONTACT_STAFF);
    let flow = tokio::spawn(async move { user::contact_staff(&ctx, press).await });

    // Let the wizard reach its message wait, then start over.
    while !h.ctx.listeners.has_listener(chat, ALICE, ListenKind::Message) {
        tokio::task::yield_now().await;
    }
    user::start(&h.ctx, ALICE).await.unwrap();

    // The wizard winds down quietly; its slot is gone, so the next text
    // falls through to normal routing instead of the dead wizard.
    flow.await.unwrap().unwrap();
    assert!(
        !h.ctx
            .listeners
            .deliver(InboundEvent::Message(text_message(chat, ALICE, 9, "hello")))
    );
    assert!(h.messenger.sent_to(STAFF).is_empty());
}

#[tokio::test]
async fn form_link_wizard_updates_the_config() {
    let h = harness_with_config(HotlineConfig::bootstrap(SUPER, None), BOT);
    let chat = SUPER.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_SET_FORM_LINK);
    let flow = tokio::spawn(async move { admin::set_form_link(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 2, "https://forms.example/v2")),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, SUPER, None, admin::CB_CONFIRM_FORM_LINK)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert_eq!(
        h.store.config_snapshot().unwrap().assessment_form_link.as_deref(),
        Some("https://forms.example/v2")
    );
    assert!(h
        .messenger
        .last_edit_in(chat)
        .unwrap()
        .html
        .contains("set successfully"));
}

#[tokio::test]
async fn form_link_cancel_leaves_the_prior_value_alone() {
    // Never set before: cancelling keeps it unset.
    let h = harness_with_config(HotlineConfig::bootstrap(SUPER, None), BOT);
    let chat = SUPER.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_SET_FORM_LINK);
    let flow = tokio::spawn(async move { admin::set_form_link(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 2, "https://forms.example/v2")),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, SUPER, None, admin::CB_CANCEL_FORM_LINK)),
        )
        .await
    );
    flow.await.unwrap().unwrap();
    assert_eq!(h.store.config_snapshot().unwrap().assessment_form_link, None);

    // Already set: cancelling keeps the old link.
    let h = harness();
    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_SET_FORM_LINK);
    let flow = tokio::spawn(async move { admin::set_form_link(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 2, "https://forms.example/v2")),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, SUPER, None, admin::CB_CANCEL_FORM_LINK)),
        )
        .await
    );
    flow.await.unwrap().unwrap();
    assert_eq!(
        h.store.config_snapshot().unwrap().assessment_form_link.as_deref(),
        Some("https://forms.example/intake")
    );
}

#[tokio::test]
async fn staff_chat_wizard_saves_greets_and_installs_commands() {
    let h = harness_with_config(HotlineConfig::bootstrap(SUPER, None), BOT);
    let chat = SUPER.private_chat();
    h.messenger.set_chat_title(ChatId(-7500), "Support HQ");

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_SET_STAFF_CHAT);
    let flow = tokio::spawn(async move { admin::set_staff_chat(&ctx, press).await });

    // A plain text that is neither button is rejected.
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 2, "what?")),
        )
        .await
    );
    let mut share = media_message(chat, SUPER, 3);
    share.shared_chat_id = Some(ChatId(-7500));
    assert!(deliver_eventually(&h.ctx.listeners, InboundEvent::Message(share)).await);
    flow.await.unwrap().unwrap();

    assert_eq!(
        h.store.config_snapshot().unwrap().staff_chat_id,
        Some(ChatId(-7500))
    );
    assert_eq!(h.messenger.staff_commands_installed_in(), vec![ChatId(-7500)]);
    assert!(h.messenger.sent_to(ChatId(-7500))[0].contains("staff chat"));
    assert!(h
        .messenger
        .sent_to(chat)
        .iter()
        .any(|m| m.contains("Support HQ") && m.contains("✅")));
}

#[tokio::test]
async fn staff_chat_wizard_keeps_the_setting_when_the_group_is_write_protected() {
    let h = harness_with_config(HotlineConfig::bootstrap(SUPER, None), BOT);
    let chat = SUPER.private_chat();
    h.messenger.set_chat_title(ChatId(-7500), "Support HQ");
    h.messenger
        .fail_always(ChatId(-7500), TransportError::WriteForbidden);

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_SET_STAFF_CHAT);
    let flow = tokio::spawn(async move { admin::set_staff_chat(&ctx, press).await });

    let mut share = media_message(chat, SUPER, 2);
    share.shared_chat_id = Some(ChatId(-7500));
    assert!(deliver_eventually(&h.ctx.listeners, InboundEvent::Message(share)).await);
    flow.await.unwrap().unwrap();

    // Saved anyway; the admin is told to fix permissions.
    assert_eq!(
        h.store.config_snapshot().unwrap().staff_chat_id,
        Some(ChatId(-7500))
    );
    assert!(h
        .messenger
        .sent_to(chat)
        .iter()
        .any(|m| m.contains("not allowed to write")));
}

#[tokio::test]
async fn membership_gate_can_be_disabled_from_the_picker() {
    let h = harness();
    h.store.mutate_config(|c| c.ga_chat_id = Some(ChatId(-8000)));
    let chat = SUPER.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_SET_GA_CHAT);
    let flow = tokio::spawn(async move { admin::set_ga_chat(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(
                chat,
                SUPER,
                2,
                "Disable the membership check"
            )),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert_eq!(h.store.config_snapshot().unwrap().ga_chat_id, None);
    assert!(h
        .messenger
        .sent_to(chat)
        .iter()
        .any(|m| m.contains("Membership check disabled")));
}

#[tokio::test(start_paused = true)]
async fn broadcast_retries_flood_waits_and_skips_blocked_users() {
    let h = harness();
    for (id, serial) in [(100, 1), (101, 2), (102, 3)] {
        h.store.insert_user(onboarded(UserId(id), serial));
    }
    h.messenger.fail_once(
        UserId(101).private_chat(),
        TransportError::FloodWait(Duration::from_secs(3)),
    );
    h.messenger
        .fail_always(UserId(102).private_chat(), TransportError::Blocked);
    let chat = SUPER.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_BROADCAST);
    let flow = tokio::spawn(async move { admin::broadcast(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(media_message(chat, SUPER, 2)),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, SUPER, None, admin::CB_CONFIRM_BROADCAST)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert_eq!(h.messenger.copies_to(UserId(100).private_chat()).len(), 1);
    // Flood-waited user got the retry, the blocked one was skipped.
    assert_eq!(h.messenger.copies_to(UserId(101).private_chat()).len(), 1);
    assert!(h.messenger.copies_to(UserId(102).private_chat()).is_empty());
    assert!(h
        .messenger
        .sent_to(chat)
        .iter()
        .any(|m| m.contains("broadcast to 2 of 3")));
}

#[tokio::test(start_paused = true)]
async fn broadcast_gives_a_rate_limited_user_exactly_one_retry() {
    let h = harness();
    h.store.insert_user(onboarded(UserId(100), 1));
    h.store.insert_user(onboarded(UserId(101), 2));
    // Rate-limited on the first attempt and on the retry: the user is
    // skipped rather than hammered with further attempts.
    let wait = TransportError::FloodWait(Duration::from_secs(3));
    h.messenger.fail_once(UserId(101).private_chat(), wait.clone());
    h.messenger.fail_once(UserId(101).private_chat(), wait);
    let chat = SUPER.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_BROADCAST);
    let flow = tokio::spawn(async move { admin::broadcast(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(media_message(chat, SUPER, 2)),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, SUPER, None, admin::CB_CONFIRM_BROADCAST)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert!(h.messenger.copies_to(UserId(101).private_chat()).is_empty());
    assert!(h
        .messenger
        .sent_to(chat)
        .iter()
        .any(|m| m.contains("broadcast to 1 of 2")));
}

#[tokio::test]
async fn superadmin_transfer_commits_after_confirmation() {
    let h = harness();
    h.store.mutate_config(|c| c.admins_list.push(UserId(11)));
    let chat = SUPER.private_chat();

    let ctx = h.ctx.clone();
    let command = text_message(chat, SUPER, 1, "/transfer_super_admin_11");
    let flow = tokio::spawn(async move { admin::transfer_super_admin(&ctx, command).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Callback(callback(chat, SUPER, None, admin::CB_CONFIRM_TRANSFER)),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    let config = h.store.config_snapshot().unwrap();
    assert_eq!(config.super_admin_id, UserId(11));
    // Both stay on the admin roster; only the role moved.
    assert!(config.is_admin(SUPER));
    assert!(config.is_admin(UserId(11)));
}

#[tokio::test]
async fn ban_wizard_retries_bad_input_and_bans_on_the_spot() {
    let h = harness();
    h.store.insert_user(onboarded(ALICE, 1));
    let chat = SUPER.private_chat();

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_BAN_USER);
    let flow = tokio::spawn(async move { admin::ban_user(&ctx, press).await });

    for bad in ["not a number", "42"] {
        assert!(
            deliver_eventually(
                &h.ctx.listeners,
                InboundEvent::Message(text_message(chat, SUPER, 2, bad)),
            )
            .await
        );
    }
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 3, "1")),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    let replies = h.messenger.sent_to(chat);
    assert!(replies.iter().any(|m| m.contains("valid serial number")));
    assert!(replies.iter().any(|m| m.contains("no bot user with that number")));
    assert!(replies.iter().any(|m| m.contains("has been banned")));

    // The ban shows up on the very next routing decision.
    assert!(!filters::is_allowed_user(h.store.as_ref(), Some(ALICE), BOT).await);
}

#[tokio::test]
async fn add_admin_resolves_usernames_with_retry() {
    let h = harness();
    let chat = SUPER.private_chat();
    h.messenger.add_resolvable(
        "dana",
        hotline_core::messaging::ResolvedUser {
            id: UserId(55),
            first_name: "Dana".to_string(),
            username: Some("dana".to_string()),
        },
    );

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_ADD_ADMIN);
    let flow = tokio::spawn(async move { admin::add_admin(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 2, "@nobody_here")),
        )
        .await
    );
    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 3, "@dana")),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert!(h.store.config_snapshot().unwrap().is_admin(UserId(55)));
    let replies = h.messenger.sent_to(chat);
    assert!(replies.iter().any(|m| m.contains("valid user id or @username")));
    assert!(replies.iter().any(|m| m.contains("@dana is now one of the bot admins")));
}

#[tokio::test]
async fn add_admin_accepts_a_numeric_id() {
    let h = harness();
    let chat = SUPER.private_chat();
    h.messenger.add_resolvable(
        "55",
        hotline_core::messaging::ResolvedUser {
            id: UserId(55),
            first_name: "Dana".to_string(),
            username: None,
        },
    );

    let ctx = h.ctx.clone();
    let press = callback(chat, SUPER, None, admin::CB_ADD_ADMIN);
    let flow = tokio::spawn(async move { admin::add_admin(&ctx, press).await });

    assert!(
        deliver_eventually(
            &h.ctx.listeners,
            InboundEvent::Message(text_message(chat, SUPER, 2, "55")),
        )
        .await
    );
    flow.await.unwrap().unwrap();

    assert!(h.store.config_snapshot().unwrap().is_admin(UserId(55)));
    // No username on record, so the confirmation falls back to the name.
    assert!(h
        .messenger
        .sent_to(chat)
        .iter()
        .any(|m| m.contains("Dana is now one of the bot admins")));
}
