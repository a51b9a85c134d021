//! Listener registry: lets a flow block on "the next thing this person
//! sends in this chat".
//!
//! One slot per (chat, user, kind). Registering over an occupied slot
//! cancels the previous waiter, so starting a new wizard implicitly tears
//! down the old one instead of leaving two flows fighting over updates.
//! Cancellation is an ordinary value ([`Cancelled`]), not an error to log.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use tokio::sync::oneshot;

use crate::{
    domain::{ChatId, UserId},
    messaging::types::{CallbackEvent, InboundEvent, MessageEvent},
};

/// Which kind of inbound event a slot is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenKind {
    Message,
    Callback,
}

/// A wait ended without an event: replaced, cancelled, or shut down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("wait for the next event was cancelled")]
pub struct Cancelled;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ListenerKey {
    chat_id: ChatId,
    user_id: UserId,
    kind: ListenKind,
}

struct Slot {
    /// Registration ticket; guards against a stale waiter removing the
    /// slot of the waiter that replaced it.
    ticket: u64,
    tx: oneshot::Sender<InboundEvent>,
}

#[derive(Default)]
pub struct Listeners {
    inner: Mutex<HashMap<ListenerKey, Slot>>,
    next_ticket: AtomicU64,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<ListenerKey, Slot>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for (chat, user, kind). Any previous waiter on the
    /// same slot observes [`Cancelled`].
    pub fn register(&self, chat_id: ChatId, user_id: UserId, kind: ListenKind) -> PendingWait<'_> {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let key = ListenerKey {
            chat_id,
            user_id,
            kind,
        };

        // Dropping the displaced slot closes its sender, which is what the
        // previous waiter sees as cancellation.
        self.map().insert(key, Slot { ticket, tx });

        PendingWait {
            listeners: self,
            key,
            ticket,
            rx,
        }
    }

    /// Hand an event to the matching waiter, if any. Returns whether the
    /// event was consumed; unconsumed events go through normal routing.
    pub fn deliver(&self, event: InboundEvent) -> bool {
        let (chat_id, user_id, kind) = match &event {
            InboundEvent::Message(m) => (m.chat_id, m.user_id, ListenKind::Message),
            InboundEvent::Callback(c) => (c.chat_id, c.user_id, ListenKind::Callback),
        };
        let key = ListenerKey {
            chat_id,
            user_id,
            kind,
        };

        let Some(slot) = self.map().remove(&key) else {
            return false;
        };
        // A closed receiver means the waiting flow is already gone; let the
        // event take the normal route instead of vanishing.
        slot.tx.send(event).is_ok()
    }

    /// Whether a waiter currently holds this slot.
    pub fn has_listener(&self, chat_id: ChatId, user_id: UserId, kind: ListenKind) -> bool {
        self.map().contains_key(&ListenerKey {
            chat_id,
            user_id,
            kind,
        })
    }

    /// Drop both slots for (chat, user). Used when a person starts over
    /// (`/start`, "go back") while a wizard is mid-flight.
    pub fn cancel(&self, chat_id: ChatId, user_id: UserId) {
        let mut map = self.map();
        for kind in [ListenKind::Message, ListenKind::Callback] {
            map.remove(&ListenerKey {
                chat_id,
                user_id,
                kind,
            });
        }
    }

    pub async fn next_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MessageEvent, Cancelled> {
        match self
            .register(chat_id, user_id, ListenKind::Message)
            .wait()
            .await?
        {
            InboundEvent::Message(ev) => Ok(ev),
            InboundEvent::Callback(_) => Err(Cancelled),
        }
    }

    pub async fn next_callback(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<CallbackEvent, Cancelled> {
        match self
            .register(chat_id, user_id, ListenKind::Callback)
            .wait()
            .await?
        {
            InboundEvent::Callback(ev) => Ok(ev),
            InboundEvent::Message(_) => Err(Cancelled),
        }
    }
}

/// An armed slot. Await [`PendingWait::wait`] to block until delivery or
/// cancellation; dropping it un-registers the slot.
pub struct PendingWait<'a> {
    listeners: &'a Listeners,
    key: ListenerKey,
    ticket: u64,
    rx: oneshot::Receiver<InboundEvent>,
}

impl PendingWait<'_> {
    pub async fn wait(mut self) -> Result<InboundEvent, Cancelled> {
        (&mut self.rx).await.map_err(|_| Cancelled)
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        let mut map = self.listeners.map();
        // Only remove the slot we still own; a newer registration keeps its.
        if map.get(&self.key).is_some_and(|slot| slot.ticket == self.ticket) {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    fn message_event(chat: i64, user: i64, text: &str) -> InboundEvent {
        InboundEvent::Message(MessageEvent {
            chat_id: ChatId(chat),
            user_id: UserId(user),
            message_id: MessageId(1),
            text: Some(text.to_string()),
            shared_chat_id: None,
            reply_to: None,
        })
    }

    fn callback_event(chat: i64, user: i64, data: &str) -> InboundEvent {
        InboundEvent::Callback(CallbackEvent {
            chat_id: ChatId(chat),
            user_id: UserId(user),
            message: None,
            data: data.to_string(),
        })
    }

    #[tokio::test]
    async fn deliver_wakes_the_matching_waiter() {
        let listeners = Listeners::new();
        let pending = listeners.register(ChatId(1), UserId(2), ListenKind::Message);

        assert!(listeners.deliver(message_event(1, 2, "hi")));
        let ev = pending.wait().await.unwrap();
        assert_eq!(ev.as_message().unwrap().text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn deliver_without_a_waiter_falls_through() {
        let listeners = Listeners::new();
        assert!(!listeners.deliver(message_event(1, 2, "hi")));

        // Wrong kind does not consume either.
        let _pending = listeners.register(ChatId(1), UserId(2), ListenKind::Callback);
        assert!(!listeners.deliver(message_event(1, 2, "hi")));
    }

    #[tokio::test]
    async fn registering_again_cancels_the_previous_waiter() {
        let listeners = Listeners::new();
        let first = listeners.register(ChatId(1), UserId(2), ListenKind::Message);
        let second = listeners.register(ChatId(1), UserId(2), ListenKind::Message);

        assert_eq!(first.wait().await, Err(Cancelled));

        assert!(listeners.deliver(message_event(1, 2, "still works")));
        assert!(second.wait().await.is_ok());
    }

    #[tokio::test]
    async fn cancel_clears_both_kinds() {
        let listeners = Listeners::new();
        let msg_wait = listeners.register(ChatId(1), UserId(2), ListenKind::Message);
        let cb_wait = listeners.register(ChatId(1), UserId(2), ListenKind::Callback);

        listeners.cancel(ChatId(1), UserId(2));

        assert_eq!(msg_wait.wait().await, Err(Cancelled));
        assert_eq!(cb_wait.wait().await, Err(Cancelled));
        assert!(!listeners.deliver(message_event(1, 2, "late")));
        assert!(!listeners.deliver(callback_event(1, 2, "late")));
    }

    #[tokio::test]
    async fn dropping_a_stale_wait_keeps_the_new_slot() {
        let listeners = Listeners::new();
        let first = listeners.register(ChatId(1), UserId(2), ListenKind::Message);
        let second = listeners.register(ChatId(1), UserId(2), ListenKind::Message);

        // The replaced waiter going away must not tear down the live slot.
        drop(first);
        assert!(listeners.deliver(message_event(1, 2, "for the second")));
        assert!(second.wait().await.is_ok());
    }

    #[tokio::test]
    async fn slots_are_scoped_per_chat_user_pair() {
        let listeners = Listeners::new();
        let pending = listeners.register(ChatId(1), UserId(2), ListenKind::Message);

        assert!(!listeners.deliver(message_event(1, 3, "other user")));
        assert!(!listeners.deliver(message_event(9, 2, "other chat")));
        assert!(listeners.deliver(message_event(1, 2, "ours")));
        assert!(pending.wait().await.is_ok());
    }
}
