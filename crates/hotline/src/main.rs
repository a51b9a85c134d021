use std::sync::Arc;

use hotline_core::config::Config;
use hotline_store::MongoStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hotline_core::logging::init();

    let config = Arc::new(Config::load()?);
    let store = Arc::new(MongoStore::connect(&config.mongodb_uri, &config.mongodb_database).await?);

    hotline_telegram::router::run_polling(config, store).await
}
