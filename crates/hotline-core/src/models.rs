//! Persistent documents: bot config, users, counters.
//!
//! Field names match the stored documents one to one, so these structs
//! double as the wire schema for the store adapter.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, UserId};

/// Singleton configuration document.
///
/// Identity and moderation state lives here rather than in the environment,
/// so admins can rewire the bot from inside Telegram without a redeploy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HotlineConfig {
    pub super_admin_id: UserId,
    pub admins_list: Vec<UserId>,
    #[serde(default)]
    pub staff_chat_id: Option<ChatId>,
    #[serde(default)]
    pub assessment_form_link: Option<String>,
    /// Chat the user must be a member of before the bot talks to them.
    /// `None` disables the membership gate.
    #[serde(default)]
    pub ga_chat_id: Option<ChatId>,
    #[serde(default)]
    pub banned_users: Vec<UserId>,
}

impl HotlineConfig {
    /// First-run document: the seed admin is the sole admin and superadmin.
    pub fn bootstrap(admin: UserId, ga_chat_id: Option<ChatId>) -> Self {
        Self {
            super_admin_id: admin,
            admins_list: vec![admin],
            staff_chat_id: None,
            assessment_form_link: None,
            ga_chat_id,
            banned_users: Vec::new(),
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins_list.contains(&user)
    }

    pub fn is_banned(&self, user: UserId) -> bool {
        self.banned_users.contains(&user)
    }

    /// The bot serves users only once both user-facing settings exist.
    pub fn is_configured(&self) -> bool {
        self.staff_chat_id.is_some() && self.assessment_form_link.is_some()
    }
}

/// One bot user. `_id` is the Telegram user id; the serial number is the
/// stable anonymous handle staff see instead.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HotlineUser {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub serial_number: i64,
    pub filled_form: bool,
    #[serde(default)]
    pub custom_name: Option<String>,
}

impl HotlineUser {
    pub fn new(id: UserId, serial_number: i64) -> Self {
        Self {
            id,
            serial_number,
            filled_form: false,
            custom_name: None,
        }
    }

    /// Staff-facing handle: `User #7`, or `User #7 (night owl)` once a
    /// custom name is assigned. Never exposes the Telegram identity.
    pub fn display_tag(&self) -> String {
        match &self.custom_name {
            Some(name) => format!("User #{} ({})", self.serial_number, name),
            None => format!("User #{}", self.serial_number),
        }
    }
}

/// Singleton counters document. Only ever mutated through `$inc`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statistics {
    pub staff_replies_counter: i64,
    pub users_messages_counter: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_seeds_a_single_superadmin() {
        let cfg = HotlineConfig::bootstrap(UserId(42), Some(ChatId(-100)));
        assert_eq!(cfg.super_admin_id, UserId(42));
        assert_eq!(cfg.admins_list, vec![UserId(42)]);
        assert!(cfg.admins_list.contains(&cfg.super_admin_id));
        assert!(cfg.is_admin(UserId(42)));
        assert!(!cfg.is_admin(UserId(43)));
        assert!(!cfg.is_configured());
    }

    #[test]
    fn configured_requires_both_settings() {
        let mut cfg = HotlineConfig::bootstrap(UserId(1), None);
        cfg.staff_chat_id = Some(ChatId(-5));
        assert!(!cfg.is_configured());
        cfg.assessment_form_link = Some("https://forms.example/f".to_string());
        assert!(cfg.is_configured());
    }

    #[test]
    fn user_serializes_platform_id_as_document_id() {
        let user = HotlineUser::new(UserId(777), 3);
        let doc = serde_json::to_value(&user).unwrap();
        assert_eq!(doc["_id"], 777);
        assert_eq!(doc["serial_number"], 3);
        assert_eq!(doc["filled_form"], false);

        let back: HotlineUser = serde_json::from_value(doc).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn display_tag_prefers_custom_name() {
        let mut user = HotlineUser::new(UserId(1), 9);
        assert_eq!(user.display_tag(), "User #9");
        user.custom_name = Some("night owl".to_string());
        assert_eq!(user.display_tag(), "User #9 (night owl)");
    }

    #[test]
    fn config_tolerates_missing_optional_fields() {
        let cfg: HotlineConfig = serde_json::from_value(serde_json::json!({
            "super_admin_id": 10,
            "admins_list": [10, 11],
        }))
        .unwrap();
        assert_eq!(cfg.staff_chat_id, None);
        assert!(cfg.banned_users.is_empty());
        assert!(cfg.is_admin(UserId(11)));
    }
}
