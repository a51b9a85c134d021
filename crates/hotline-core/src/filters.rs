//! Role predicates used by the update router.
//!
//! Every check reads the config document fresh. Bans, promotions and staff
//! chat changes therefore apply on the very next update, with no cached
//! role state anywhere. A store failure denies: better to drop an update
//! than to route it with a guessed role.

use crate::{
    domain::{ChatId, UserId},
    store::HotlineStore,
};

pub async fn is_admin(store: &dyn HotlineStore, user: Option<UserId>) -> bool {
    let Some(user) = user else {
        return false;
    };
    match store.load_config().await {
        Ok(Some(config)) => config.is_admin(user),
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(error = %err, "admin check failed, denying");
            false
        }
    }
}

pub async fn is_staff_chat(store: &dyn HotlineStore, chat: ChatId) -> bool {
    match store.load_config().await {
        Ok(Some(config)) => config.staff_chat_id == Some(chat),
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(error = %err, "staff chat check failed, denying");
            false
        }
    }
}

/// Ordinary-user gate: not banned, not the bot itself, not an admin.
/// Admin private chats belong to the settings menu, never to user intake.
pub async fn is_allowed_user(
    store: &dyn HotlineStore,
    user: Option<UserId>,
    bot_id: UserId,
) -> bool {
    let Some(user) = user else {
        return false;
    };
    if user == bot_id {
        return false;
    }
    match store.load_config().await {
        Ok(Some(config)) => !config.is_banned(user) && !config.is_admin(user),
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(error = %err, "user gate check failed, denying");
            false
        }
    }
}
