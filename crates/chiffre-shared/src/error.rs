use thiserror::Error;

use crate::constants::{MAX_CONTENT_LEN, MAX_TITLE_LEN};
use crate::types::{FieldKind, MessageId};

/// Input problems caught before any proof generation or ledger call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title is empty")]
    EmptyTitle,

    #[error("Content is empty")]
    EmptyContent,

    #[error("Title is {0} characters (max {})", MAX_TITLE_LEN)]
    TitleTooLong(usize),

    #[error("Content is {0} characters (max {})", MAX_CONTENT_LEN)]
    ContentTooLong(usize),
}

/// Errors surfaced by the board client.
///
/// `StaleContext` never reaches a caller as a user-visible failure: the
/// operations that detect it discard their result and report nothing.
#[derive(Error, Debug, Clone)]
pub enum BoardError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// A submit is already in flight for this signer; retry once it settles.
    #[error("A submission is already in flight for this signer")]
    Busy,

    /// A second, different pair of handles was recorded for the same id.
    /// Handles are immutable once observed; this is a protocol violation
    /// upstream and the message is marked permanently unreadable.
    #[error("Conflicting ciphertext handles for message {id}")]
    Conflict { id: MessageId },

    /// A decrypted value changed between two decryptions of the same field.
    #[error("Decrypted {field:?} for message {id} changed between reads")]
    Integrity { id: MessageId, field: FieldKind },

    #[error("Decryption authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Chain or signer changed while the operation was in flight.
    #[error("Session context changed mid-operation")]
    StaleContext,

    /// Ledger call reverted or the transport failed; retryable.
    #[error("Gateway failure: {0}")]
    Gateway(String),

    /// The decryption oracle round trip failed; retryable.
    #[error("Oracle failure: {0}")]
    Oracle(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Unknown message {0}")]
    UnknownMessage(MessageId),

    #[error("Message {0} is permanently unreadable")]
    Unreadable(MessageId),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BoardError>;
