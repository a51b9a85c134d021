use std::time::Duration;

/// Core error type for the hotline bot.
///
/// Adapter crates map their specific errors into this type so the flows can
/// handle failures consistently (report to the actor vs retry vs skip).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Delivery failures the flows branch on.
///
/// The Telegram adapter classifies raw API errors into these variants; the
/// broadcast and reply flows only ever look at the variant, never at the
/// underlying error text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Rate limited; wait at least this long before retrying.
    #[error("flood wait for {0:?}")]
    FloodWait(Duration),

    /// The recipient blocked the bot (or deleted their account).
    #[error("recipient blocked the bot")]
    Blocked,

    /// The bot may not post in the target chat.
    #[error("no permission to write in the target chat")]
    WriteForbidden,

    #[error("chat not found")]
    ChatNotFound,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The transport classification of this error, if it is one.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_accessor_only_matches_transport_errors() {
        let e = Error::from(TransportError::Blocked);
        assert_eq!(e.transport(), Some(&TransportError::Blocked));

        let e = Error::Config("missing token".to_string());
        assert!(e.transport().is_none());
    }
}
