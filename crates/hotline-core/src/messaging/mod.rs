//! Messenger port and the platform-neutral message/keyboard types.

pub mod port;
pub mod types;

pub use port::MessengerPort;
pub use types::{
    CallbackEvent, InboundEvent, InlineButton, InlineKeyboard, Keyboard, MessageEvent,
    RequestChatKeyboard, ResolvedUser,
};
