//! MongoDB implementation of the hotline store port.
//!
//! Three collections: `config` and `statistics` are singletons addressed
//! with an empty filter, `users` is keyed by the Telegram user id. All
//! list-valued updates go through `$addToSet`/`$pull` and counters through
//! `$inc`, so concurrent flows cannot clobber each other's writes.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, Bson},
    options::{ClientOptions, FindOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database,
};

use hotline_core::{
    domain::{ChatId, UserId},
    errors::Error,
    models::{HotlineConfig, HotlineUser, Statistics},
    store::HotlineStore,
    Result,
};

pub struct MongoStore {
    config: Collection<HotlineConfig>,
    users: Collection<HotlineUser>,
    statistics: Collection<Statistics>,
}

impl MongoStore {
    /// Connect, pin the stable server API, and ping once so a bad URI or
    /// credentials fail at startup instead of on the first update.
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await.map_err(store_err)?;
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
        options.app_name = Some("hotline-bot".to_string());

        let client = Client::with_options(options).map_err(store_err)?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(store_err)?;
        tracing::info!(database, "connected to MongoDB");

        Ok(Self::with_database(&db))
    }

    pub fn with_database(db: &Database) -> Self {
        Self {
            config: db.collection("config"),
            users: db.collection("users"),
            statistics: db.collection("statistics"),
        }
    }

    async fn update_config(&self, update: mongodb::bson::Document) -> Result<()> {
        self.config
            .update_one(doc! {}, update, None)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_user(&self, id: UserId, update: mongodb::bson::Document) -> Result<()> {
        self.users
            .update_one(doc! { "_id": id.0 }, update, None)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn incr_counter(&self, field: &str) -> Result<()> {
        self.statistics
            .update_one(doc! {}, doc! { "$inc": { field: 1_i64 } }, None)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

fn store_err(err: mongodb::error::Error) -> Error {
    Error::Store(err.to_string())
}

#[async_trait]
impl HotlineStore for MongoStore {
    async fn load_config(&self) -> Result<Option<HotlineConfig>> {
        self.config.find_one(doc! {}, None).await.map_err(store_err)
    }

    async fn seed_config(&self, config: &HotlineConfig) -> Result<()> {
        self.config.insert_one(config, None).await.map_err(store_err)?;
        Ok(())
    }

    async fn set_staff_chat(&self, chat: ChatId) -> Result<()> {
        self.update_config(doc! { "$set": { "staff_chat_id": chat.0 } })
            .await
    }

    async fn set_ga_chat(&self, chat: Option<ChatId>) -> Result<()> {
        let value = match chat {
            Some(chat) => Bson::Int64(chat.0),
            None => Bson::Null,
        };
        self.update_config(doc! { "$set": { "ga_chat_id": value } })
            .await
    }

    async fn set_form_link(&self, link: &str) -> Result<()> {
        self.update_config(doc! { "$set": { "assessment_form_link": link } })
            .await
    }

    async fn add_admin(&self, user: UserId) -> Result<()> {
        self.update_config(doc! { "$addToSet": { "admins_list": user.0 } })
            .await
    }

    async fn remove_admin(&self, user: UserId) -> Result<()> {
        self.update_config(doc! { "$pull": { "admins_list": user.0 } })
            .await
    }

    async fn set_super_admin(&self, user: UserId) -> Result<()> {
        self.update_config(doc! { "$set": { "super_admin_id": user.0 } })
            .await
    }

    async fn ban_user(&self, user: UserId) -> Result<()> {
        self.update_config(doc! { "$addToSet": { "banned_users": user.0 } })
            .await
    }

    async fn unban_user(&self, user: UserId) -> Result<()> {
        self.update_config(doc! { "$pull": { "banned_users": user.0 } })
            .await
    }

    async fn find_user(&self, id: UserId) -> Result<Option<HotlineUser>> {
        self.users
            .find_one(doc! { "_id": id.0 }, None)
            .await
            .map_err(store_err)
    }

    async fn find_user_by_serial(&self, serial: i64) -> Result<Option<HotlineUser>> {
        self.users
            .find_one(doc! { "serial_number": serial }, None)
            .await
            .map_err(store_err)
    }

    async fn find_user_by_custom_name(&self, name: &str) -> Result<Option<HotlineUser>> {
        self.users
            .find_one(doc! { "custom_name": name }, None)
            .await
            .map_err(store_err)
    }

    async fn create_user(&self, user: &HotlineUser) -> Result<()> {
        self.users.insert_one(user, None).await.map_err(store_err)?;
        Ok(())
    }

    async fn count_users(&self) -> Result<u64> {
        self.users
            .count_documents(doc! {}, None)
            .await
            .map_err(store_err)
    }

    async fn list_users(&self) -> Result<Vec<HotlineUser>> {
        let options = FindOptions::builder()
            .sort(doc! { "serial_number": 1 })
            .build();
        let mut cursor = self.users.find(doc! {}, options).await.map_err(store_err)?;

        let mut users = Vec::new();
        while let Some(user) = cursor.try_next().await.map_err(store_err)? {
            users.push(user);
        }
        Ok(users)
    }

    async fn mark_form_filled(&self, id: UserId) -> Result<()> {
        self.update_user(id, doc! { "$set": { "filled_form": true } })
            .await
    }

    async fn set_custom_name(&self, id: UserId, name: &str) -> Result<()> {
        self.update_user(id, doc! { "$set": { "custom_name": name } })
            .await
    }

    async fn load_statistics(&self) -> Result<Option<Statistics>> {
        self.statistics
            .find_one(doc! {}, None)
            .await
            .map_err(store_err)
    }

    async fn seed_statistics(&self) -> Result<()> {
        if self.load_statistics().await?.is_none() {
            self.statistics
                .insert_one(Statistics::default(), None)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    async fn incr_staff_replies(&self) -> Result<()> {
        self.incr_counter("staff_replies_counter").await
    }

    async fn incr_user_messages(&self) -> Result<()> {
        self.incr_counter("users_messages_counter").await
    }
}
