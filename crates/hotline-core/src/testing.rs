//! In-memory fakes for the store and messenger ports.
//!
//! Compiled into the crate (not behind `cfg(test)`) so integration tests
//! can drive whole flows against them. Nothing here talks to a network.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::{Error, TransportError},
    flows::FlowContext,
    listen::Listeners,
    messaging::{
        types::{CallbackEvent, InlineKeyboard, Keyboard, MessageEvent, ResolvedUser},
        MessengerPort,
    },
    models::{HotlineConfig, HotlineUser, Statistics},
    oplog::OpsLog,
    store::HotlineStore,
    Result,
};

// === Event builders ===

pub fn text_message(chat_id: ChatId, user_id: UserId, message_id: i32, text: &str) -> MessageEvent {
    MessageEvent {
        chat_id,
        user_id,
        message_id: MessageId(message_id),
        text: Some(text.to_string()),
        shared_chat_id: None,
        reply_to: None,
    }
}

pub fn media_message(chat_id: ChatId, user_id: UserId, message_id: i32) -> MessageEvent {
    MessageEvent {
        chat_id,
        user_id,
        message_id: MessageId(message_id),
        text: None,
        shared_chat_id: None,
        reply_to: None,
    }
}

pub fn callback(chat_id: ChatId, user_id: UserId, message: Option<MessageRef>, data: &str) -> CallbackEvent {
    CallbackEvent {
        chat_id,
        user_id,
        message,
        data: data.to_string(),
    }
}

/// Keep offering an event to the registry until some flow task has
/// registered a listener for it. Returns whether it was ever consumed.
pub async fn deliver_eventually(listeners: &Listeners, event: crate::messaging::InboundEvent) -> bool {
    for _ in 0..10_000 {
        if listeners.deliver(event.clone()) {
            return true;
        }
        tokio::task::yield_now().await;
    }
    false
}

// === Store fake ===

#[derive(Default)]
struct StoreState {
    config: Option<HotlineConfig>,
    users: Vec<HotlineUser>,
    statistics: Option<Statistics>,
}

/// `HotlineStore` backed by a mutex-wrapped struct with the same update
/// semantics as the real collections (`$addToSet`, `$pull`, `$inc`).
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HotlineConfig) -> Self {
        let store = Self::new();
        store.lock().config = Some(config);
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edit the config document directly, bypassing the port.
    pub fn mutate_config(&self, f: impl FnOnce(&mut HotlineConfig)) {
        if let Some(config) = self.lock().config.as_mut() {
            f(config);
        }
    }

    pub fn insert_user(&self, user: HotlineUser) {
        self.lock().users.push(user);
    }

    pub fn config_snapshot(&self) -> Option<HotlineConfig> {
        self.lock().config.clone()
    }

    pub fn user_snapshot(&self, id: UserId) -> Option<HotlineUser> {
        self.lock().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn statistics_snapshot(&self) -> Statistics {
        self.lock().statistics.clone().unwrap_or_default()
    }
}

fn config_mut(state: &mut StoreState) -> Result<&mut HotlineConfig> {
    state
        .config
        .as_mut()
        .ok_or_else(|| Error::Store("config document is missing".to_string()))
}

#[async_trait]
impl HotlineStore for MemoryStore {
    async fn load_config(&self) -> Result<Option<HotlineConfig>> {
        Ok(self.lock().config.clone())
    }

    async fn seed_config(&self, config: &HotlineConfig) -> Result<()> {
        self.lock().config = Some(config.clone());
        Ok(())
    }

    async fn set_staff_chat(&self, chat: ChatId) -> Result<()> {
        config_mut(&mut self.lock())?.staff_chat_id = Some(chat);
        Ok(())
    }

    async fn set_ga_chat(&self, chat: Option<ChatId>) -> Result<()> {
        config_mut(&mut self.lock())?.ga_chat_id = chat;
        Ok(())
    }

    async fn set_form_link(&self, link: &str) -> Result<()> {
        config_mut(&mut self.lock())?.assessment_form_link = Some(link.to_string());
        Ok(())
    }

    async fn add_admin(&self, user: UserId) -> Result<()> {
        let mut state = self.lock();
        let config = config_mut(&mut state)?;
        if !config.admins_list.contains(&user) {
            config.admins_list.push(user);
        }
        Ok(())
    }

    async fn remove_admin(&self, user: UserId) -> Result<()> {
        config_mut(&mut self.lock())?.admins_list.retain(|a| *a != user);
        Ok(())
    }

    async fn set_super_admin(&self, user: UserId) -> Result<()> {
        config_mut(&mut self.lock())?.super_admin_id = user;
        Ok(())
    }

    async fn ban_user(&self, user: UserId) -> Result<()> {
        let mut state = self.lock();
        let config = config_mut(&mut state)?;
        if !config.banned_users.contains(&user) {
            config.banned_users.push(user);
        }
        Ok(())
    }

    async fn unban_user(&self, user: UserId) -> Result<()> {
        config_mut(&mut self.lock())?.banned_users.retain(|b| *b != user);
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<HotlineUser>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_serial(&self, serial: i64) -> Result<Option<HotlineUser>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.serial_number == serial)
            .cloned())
    }

    async fn find_user_by_custom_name(&self, name: &str) -> Result<Option<HotlineUser>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.custom_name.as_deref() == Some(name))
            .cloned())
    }

    async fn create_user(&self, user: &HotlineUser) -> Result<()> {
        self.lock().users.push(user.clone());
        Ok(())
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.lock().users.len() as u64)
    }

    async fn list_users(&self) -> Result<Vec<HotlineUser>> {
        Ok(self.lock().users.clone())
    }

    async fn mark_form_filled(&self, id: UserId) -> Result<()> {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == id) {
            user.filled_form = true;
        }
        Ok(())
    }

    async fn set_custom_name(&self, id: UserId, name: &str) -> Result<()> {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == id) {
            user.custom_name = Some(name.to_string());
        }
        Ok(())
    }

    async fn load_statistics(&self) -> Result<Option<Statistics>> {
        Ok(self.lock().statistics.clone())
    }

    async fn seed_statistics(&self) -> Result<()> {
        let mut state = self.lock();
        if state.statistics.is_none() {
            state.statistics = Some(Statistics::default());
        }
        Ok(())
    }

    async fn incr_staff_replies(&self) -> Result<()> {
        self.lock()
            .statistics
            .get_or_insert_with(Statistics::default)
            .staff_replies_counter += 1;
        Ok(())
    }

    async fn incr_user_messages(&self) -> Result<()> {
        self.lock()
            .statistics
            .get_or_insert_with(Statistics::default)
            .users_messages_counter += 1;
        Ok(())
    }
}

// === Messenger fake ===

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub html: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Clone, Debug)]
pub struct EditedMessage {
    pub message: MessageRef,
    pub html: String,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Clone, Debug)]
pub struct CopiedMessage {
    pub to: ChatId,
    pub source: MessageRef,
    pub result: MessageRef,
}

#[derive(Default)]
struct MessengerState {
    next_message_id: i32,
    sent: Vec<SentMessage>,
    edits: Vec<EditedMessage>,
    deleted: Vec<MessageRef>,
    copies: Vec<CopiedMessage>,
    // scripted behavior
    fail_once: HashMap<ChatId, VecDeque<TransportError>>,
    fail_always: HashMap<ChatId, TransportError>,
    chat_titles: HashMap<ChatId, String>,
    members: HashSet<(ChatId, UserId)>,
    unreachable_membership: HashSet<ChatId>,
    resolvable: HashMap<String, ResolvedUser>,
    display_names: HashMap<UserId, String>,
    staff_commands: Vec<ChatId>,
    user_commands_installed: bool,
}

/// `MessengerPort` that records outbound traffic and can be scripted to
/// fail per target chat.
#[derive(Default)]
pub struct RecordingMessenger {
    state: Mutex<MessengerState>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        let messenger = Self::default();
        messenger.lock().next_message_id = 1000;
        messenger
    }

    fn lock(&self) -> MutexGuard<'_, MessengerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- scripting ---

    /// Fail the next delivery attempt into `chat`, then recover.
    pub fn fail_once(&self, chat: ChatId, error: TransportError) {
        self.lock().fail_once.entry(chat).or_default().push_back(error);
    }

    /// Fail every delivery attempt into `chat`.
    pub fn fail_always(&self, chat: ChatId, error: TransportError) {
        self.lock().fail_always.insert(chat, error);
    }

    pub fn set_chat_title(&self, chat: ChatId, title: &str) {
        self.lock().chat_titles.insert(chat, title.to_string());
    }

    pub fn add_chat_member(&self, chat: ChatId, user: UserId) {
        self.lock().members.insert((chat, user));
    }

    /// Make membership checks against `chat` fail outright.
    pub fn break_membership_checks(&self, chat: ChatId) {
        self.lock().unreachable_membership.insert(chat);
    }

    pub fn add_resolvable(&self, handle: &str, user: ResolvedUser) {
        self.lock().resolvable.insert(handle.to_string(), user);
    }

    pub fn set_display_name(&self, user: UserId, name: &str) {
        self.lock().display_names.insert(user, name.to_string());
    }

    // --- inspection ---

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Message bodies sent into one chat, in order.
    pub fn sent_to(&self, chat: ChatId) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.chat_id == chat)
            .map(|m| m.html.clone())
            .collect()
    }

    pub fn last_sent_to(&self, chat: ChatId) -> Option<SentMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.chat_id == chat)
            .last()
            .cloned()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.lock().edits.clone()
    }

    pub fn edits_of(&self, message: MessageRef) -> Vec<EditedMessage> {
        self.lock()
            .edits
            .iter()
            .filter(|e| e.message == message)
            .cloned()
            .collect()
    }

    pub fn last_edit_in(&self, chat: ChatId) -> Option<EditedMessage> {
        self.lock()
            .edits
            .iter()
            .filter(|e| e.message.chat_id == chat)
            .last()
            .cloned()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.lock().deleted.clone()
    }

    pub fn copies(&self) -> Vec<CopiedMessage> {
        self.lock().copies.clone()
    }

    pub fn copies_to(&self, chat: ChatId) -> Vec<CopiedMessage> {
        self.lock()
            .copies
            .iter()
            .filter(|c| c.to == chat)
            .cloned()
            .collect()
    }

    pub fn staff_commands_installed_in(&self) -> Vec<ChatId> {
        self.lock().staff_commands.clone()
    }

    pub fn user_commands_installed(&self) -> bool {
        self.lock().user_commands_installed
    }

    // --- internals ---

    fn next_ref(state: &mut MessengerState, chat: ChatId) -> MessageRef {
        state.next_message_id += 1;
        MessageRef {
            chat_id: chat,
            message_id: MessageId(state.next_message_id),
        }
    }

    fn scripted_failure(state: &mut MessengerState, chat: ChatId) -> Option<TransportError> {
        if let Some(queue) = state.fail_once.get_mut(&chat) {
            if let Some(error) = queue.pop_front() {
                return Some(error);
            }
        }
        state.fail_always.get(&chat).cloned()
    }

    fn deliver(&self, chat: ChatId, html: &str, keyboard: Option<Keyboard>) -> Result<MessageRef> {
        let mut state = self.lock();
        if let Some(error) = Self::scripted_failure(&mut state, chat) {
            return Err(Error::Transport(error));
        }
        let message = Self::next_ref(&mut state, chat);
        state.sent.push(SentMessage {
            chat_id: chat,
            message_id: message.message_id,
            html: html.to_string(),
            keyboard,
        });
        Ok(message)
    }
}

#[async_trait]
impl MessengerPort for RecordingMessenger {
    async fn send_html(&self, chat: ChatId, html: &str) -> Result<MessageRef> {
        self.deliver(chat, html, None)
    }

    async fn send_with_keyboard(
        &self,
        chat: ChatId,
        html: &str,
        keyboard: Keyboard,
    ) -> Result<MessageRef> {
        self.deliver(chat, html, Some(keyboard))
    }

    async fn edit_html(
        &self,
        message: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        self.lock().edits.push(EditedMessage {
            message,
            html: html.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        self.lock().deleted.push(message);
        Ok(())
    }

    async fn copy_message(&self, to: ChatId, source: MessageRef) -> Result<MessageRef> {
        let mut state = self.lock();
        if let Some(error) = Self::scripted_failure(&mut state, to) {
            return Err(Error::Transport(error));
        }
        let result = Self::next_ref(&mut state, to);
        state.copies.push(CopiedMessage { to, source, result });
        Ok(result)
    }

    async fn chat_title(&self, chat: ChatId) -> Result<String> {
        self.lock()
            .chat_titles
            .get(&chat)
            .cloned()
            .ok_or_else(|| Error::Transport(TransportError::ChatNotFound))
    }

    async fn is_chat_member(&self, chat: ChatId, user: UserId) -> Result<bool> {
        let state = self.lock();
        if state.unreachable_membership.contains(&chat) {
            return Err(Error::Transport(TransportError::Other(
                "membership check unavailable".to_string(),
            )));
        }
        Ok(state.members.contains(&(chat, user)))
    }

    async fn resolve_user(&self, handle: &str) -> Result<ResolvedUser> {
        self.lock()
            .resolvable
            .get(handle.trim_start_matches('@'))
            .cloned()
            .ok_or_else(|| Error::Transport(TransportError::Other("no such user".to_string())))
    }

    async fn user_display_name(&self, user: UserId) -> Result<String> {
        self.lock()
            .display_names
            .get(&user)
            .cloned()
            .ok_or_else(|| Error::Transport(TransportError::Other("no such user".to_string())))
    }

    async fn install_staff_commands(&self, chat: ChatId) -> Result<()> {
        self.lock().staff_commands.push(chat);
        Ok(())
    }

    async fn install_user_commands(&self) -> Result<()> {
        self.lock().user_commands_installed = true;
        Ok(())
    }
}

// === Harness ===

/// Everything a flow test needs, wired together with the log channel off.
pub struct Harness {
    pub ctx: FlowContext,
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
}

pub fn harness_with_config(config: HotlineConfig, bot_id: UserId) -> Harness {
    let store = Arc::new(MemoryStore::with_config(config));
    let messenger = Arc::new(RecordingMessenger::new());
    let ctx = FlowContext {
        store: store.clone(),
        messenger: messenger.clone(),
        listeners: Arc::new(Listeners::new()),
        oplog: OpsLog::disabled(messenger.clone()),
        bot_id,
    };
    Harness {
        ctx,
        store,
        messenger,
    }
}
