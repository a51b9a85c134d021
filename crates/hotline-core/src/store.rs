//! Persistence port.
//!
//! Flows and filters never touch the database driver; they talk to this
//! trait. The production implementation lives in the store adapter crate,
//! tests use the in-memory one from [`crate::testing`].

use async_trait::async_trait;

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    models::{HotlineConfig, HotlineUser, Statistics},
    Result,
};

#[async_trait]
pub trait HotlineStore: Send + Sync {
    // === Config document ===

    /// `None` means the bot has never been bootstrapped.
    async fn load_config(&self) -> Result<Option<HotlineConfig>>;
    async fn seed_config(&self, config: &HotlineConfig) -> Result<()>;

    async fn set_staff_chat(&self, chat: ChatId) -> Result<()>;
    /// `None` switches the membership gate off.
    async fn set_ga_chat(&self, chat: Option<ChatId>) -> Result<()>;
    async fn set_form_link(&self, link: &str) -> Result<()>;

    async fn add_admin(&self, user: UserId) -> Result<()>;
    async fn remove_admin(&self, user: UserId) -> Result<()>;
    async fn set_super_admin(&self, user: UserId) -> Result<()>;

    async fn ban_user(&self, user: UserId) -> Result<()>;
    async fn unban_user(&self, user: UserId) -> Result<()>;

    // === Users ===

    async fn find_user(&self, id: UserId) -> Result<Option<HotlineUser>>;
    async fn find_user_by_serial(&self, serial: i64) -> Result<Option<HotlineUser>>;
    async fn find_user_by_custom_name(&self, name: &str) -> Result<Option<HotlineUser>>;
    async fn create_user(&self, user: &HotlineUser) -> Result<()>;
    async fn count_users(&self) -> Result<u64>;
    async fn list_users(&self) -> Result<Vec<HotlineUser>>;
    async fn mark_form_filled(&self, id: UserId) -> Result<()>;
    async fn set_custom_name(&self, id: UserId, name: &str) -> Result<()>;

    // === Statistics ===

    async fn load_statistics(&self) -> Result<Option<Statistics>>;
    async fn seed_statistics(&self) -> Result<()>;
    async fn incr_staff_replies(&self) -> Result<()>;
    async fn incr_user_messages(&self) -> Result<()>;
}

/// Load the config document, treating its absence as a store error.
///
/// Valid anywhere past startup: the bootstrap sequence seeds the document
/// before the dispatcher accepts a single update.
pub async fn require_config(store: &dyn HotlineStore) -> Result<HotlineConfig> {
    store
        .load_config()
        .await?
        .ok_or_else(|| Error::Store("config document is missing".to_string()))
}
