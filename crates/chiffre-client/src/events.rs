//! Board change notifications.
//!
//! The state machine publishes one [`BoardEvent`] per state transition on a
//! broadcast channel; any number of observers (typically the presentation
//! layer) may subscribe and re-render. Event order matches the order of the
//! underlying transitions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use chiffre_shared::types::{Address, DecryptionState, MessageId};

/// Notification of a board state transition.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum BoardEvent {
    /// A message became known locally (via submit, refresh or a live
    /// creation event).
    MessageDiscovered {
        id: MessageId,
        author: Address,
        timestamp: DateTime<Utc>,
    },

    /// A message's decryption lifecycle state changed.
    StateChanged {
        id: MessageId,
        state: DecryptionState,
    },

    /// A message went public on the ledger.
    VisibilityChanged { id: MessageId },

    /// A refresh replaced the board snapshot.
    SnapshotReplaced { count: usize },

    /// An on-chain decryption request was observed.
    DecryptionRequested {
        id: MessageId,
        requester: Address,
    },
}
