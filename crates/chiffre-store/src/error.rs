use thiserror::Error;

use chiffre_shared::types::{FieldKind, MessageId};
use chiffre_shared::BoardError;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `record_handles` was called twice for the same id with different
    /// handle values. Handles are immutable once observed.
    #[error("Conflicting handles recorded for message {0}")]
    HandleConflict(MessageId),

    /// `record_plaintext` was called twice for the same field with
    /// different values. A decrypted value must never change.
    #[error("Decrypted {1:?} of message {0} changed between recordings")]
    PlaintextIntegrity(MessageId, FieldKind),

    /// Plaintext was recorded for an id whose handles were never observed.
    #[error("Message {0} has no recorded handles")]
    Unknown(MessageId),
}

impl From<StoreError> for BoardError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::HandleConflict(id) => BoardError::Conflict { id },
            StoreError::PlaintextIntegrity(id, field) => BoardError::Integrity { id, field },
            StoreError::Unknown(id) => BoardError::UnknownMessage(id),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
