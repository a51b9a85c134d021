use std::{env, fs, path::Path};

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    Result,
};

/// Typed process configuration.
///
/// Everything here comes from the environment (with an optional `.env` file
/// for development). Identity values live in the store, not here: the GA chat
/// id below only seeds the config document on the very first run.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub mongodb_uri: String,
    pub mongodb_database: String,

    /// Seed admin for the first run; ignored once a config document exists.
    pub default_admin_id: UserId,

    /// Public URL of this service, fetched by the keep-alive loop.
    pub service_url: Option<String>,

    /// Seed value for the membership-gate chat on the first run.
    pub ga_chat_id: Option<ChatId>,

    /// Operator log channel. Unset disables the channel (tracing only).
    pub log_channel_id: Option<ChatId>,

    /// Port for the keep-alive HTTP endpoint.
    pub keepalive_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let mongodb_uri = env_str("MONGODB_URI").unwrap_or_default();
        if mongodb_uri.trim().is_empty() {
            return Err(Error::Config(
                "MONGODB_URI environment variable is required".to_string(),
            ));
        }
        let mongodb_database = env_str("MONGODB_DATABASE")
            .and_then(non_empty)
            .unwrap_or_else(|| "hotline".to_string());

        let default_admin_id = env_i64("DEFAULT_ADMIN_ID").map(UserId).ok_or_else(|| {
            Error::Config("DEFAULT_ADMIN_ID environment variable is required".to_string())
        })?;

        let service_url = env_str("SERVICE_URL").and_then(non_empty);
        let ga_chat_id = env_i64("GA_CHAT_ID").map(ChatId);
        let log_channel_id = env_i64("LOG_CHANNEL_ID").map(ChatId);
        let keepalive_port = env_u16("KEEPALIVE_PORT").unwrap_or(8000);

        Ok(Self {
            telegram_bot_token,
            mongodb_uri,
            mongodb_database,
            default_admin_id,
            service_url,
            ga_chat_id,
            log_channel_id,
            keepalive_port,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
