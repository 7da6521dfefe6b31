//! Ciphertext handle registry.
//!
//! Maps each message's encrypted fields to their on-chain handles and caches
//! decrypted plaintext once available. Recording is idempotent: replaying the
//! same observation is a no-op, while a *different* value for an
//! already-recorded slot is a protocol violation upstream and fails with a
//! typed error instead of overwriting.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use chiffre_shared::types::{CiphertextHandle, FieldKind, MessageId};

use crate::error::{Result, StoreError};

/// Best-known view of one encrypted field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldView {
    /// Decrypted value, cached for the rest of the session.
    Plain(String),
    /// Ciphertext only so far.
    Pending,
}

impl FieldView {
    pub fn is_pending(&self) -> bool {
        matches!(self, FieldView::Pending)
    }
}

/// Best-known view of a whole message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub title: FieldView,
    pub content: FieldView,
}

impl MessageView {
    /// True once both fields have decrypted values.
    pub fn is_complete(&self) -> bool {
        !self.title.is_pending() && !self.content.is_pending()
    }

    fn pending() -> Self {
        Self {
            title: FieldView::Pending,
            content: FieldView::Pending,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    title_handle: CiphertextHandle,
    content_handle: CiphertextHandle,
    title_plain: Option<String>,
    content_plain: Option<String>,
}

/// Registry of ciphertext handles and cached plaintext.
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    inner: Arc<RwLock<HashMap<MessageId, Entry>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the handle pair for a message.
    ///
    /// Idempotent for identical values; a different pair for an
    /// already-known id fails with [`StoreError::HandleConflict`].
    pub async fn record_handles(
        &self,
        id: MessageId,
        title_handle: CiphertextHandle,
        content_handle: CiphertextHandle,
    ) -> Result<()> {
        let mut map = self.inner.write().await;
        match map.get(&id) {
            Some(existing) => {
                if existing.title_handle != title_handle
                    || existing.content_handle != content_handle
                {
                    return Err(StoreError::HandleConflict(id));
                }
                Ok(())
            }
            None => {
                debug!(%id, title = %title_handle, "recording handles");
                map.insert(
                    id,
                    Entry {
                        title_handle,
                        content_handle,
                        title_plain: None,
                        content_plain: None,
                    },
                );
                Ok(())
            }
        }
    }

    /// Record the decrypted value of one field.
    ///
    /// Idempotent for the same value; a different value for an
    /// already-decrypted field fails with [`StoreError::PlaintextIntegrity`].
    pub async fn record_plaintext(&self, id: MessageId, field: FieldKind, value: &str) -> Result<()> {
        let mut map = self.inner.write().await;
        let entry = map.get_mut(&id).ok_or(StoreError::Unknown(id))?;
        let slot = match field {
            FieldKind::Title => &mut entry.title_plain,
            FieldKind::Content => &mut entry.content_plain,
        };
        match slot {
            Some(existing) if existing != value => {
                Err(StoreError::PlaintextIntegrity(id, field))
            }
            Some(_) => Ok(()),
            None => {
                *slot = Some(value.to_owned());
                Ok(())
            }
        }
    }

    /// Best-known view for a message: plaintext where present, else pending.
    /// Unknown ids read as fully pending.
    pub async fn get_view(&self, id: MessageId) -> MessageView {
        let map = self.inner.read().await;
        match map.get(&id) {
            Some(entry) => MessageView {
                title: entry
                    .title_plain
                    .clone()
                    .map(FieldView::Plain)
                    .unwrap_or(FieldView::Pending),
                content: entry
                    .content_plain
                    .clone()
                    .map(FieldView::Plain)
                    .unwrap_or(FieldView::Pending),
            },
            None => MessageView::pending(),
        }
    }

    /// The recorded handle pair, if the message has been observed.
    pub async fn handles(&self, id: MessageId) -> Option<(CiphertextHandle, CiphertextHandle)> {
        let map = self.inner.read().await;
        map.get(&id).map(|e| (e.title_handle, e.content_handle))
    }

    /// Drop everything. Used when the (chain, contract) context changes and
    /// message ids stop being comparable.
    pub async fn clear(&self) {
        let mut map = self.inner.write().await;
        let dropped = map.len();
        map.clear();
        if dropped > 0 {
            debug!(dropped, "cleared handle registry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(b: u8) -> CiphertextHandle {
        CiphertextHandle([b; 32])
    }

    #[tokio::test]
    async fn record_handles_is_idempotent() {
        let reg = HandleRegistry::new();
        let id = MessageId(1);
        reg.record_handles(id, handle(1), handle(2)).await.unwrap();
        reg.record_handles(id, handle(1), handle(2)).await.unwrap();
        assert_eq!(reg.handles(id).await, Some((handle(1), handle(2))));
    }

    #[tokio::test]
    async fn record_handles_rejects_mutation() {
        let reg = HandleRegistry::new();
        let id = MessageId(1);
        reg.record_handles(id, handle(1), handle(2)).await.unwrap();
        let err = reg.record_handles(id, handle(1), handle(3)).await.unwrap_err();
        assert_eq!(err, StoreError::HandleConflict(id));
    }

    #[tokio::test]
    async fn plaintext_set_at_most_once() {
        let reg = HandleRegistry::new();
        let id = MessageId(7);
        reg.record_handles(id, handle(1), handle(2)).await.unwrap();

        reg.record_plaintext(id, FieldKind::Title, "Hello").await.unwrap();
        // Same value again is fine.
        reg.record_plaintext(id, FieldKind::Title, "Hello").await.unwrap();
        // A different value is an integrity violation.
        let err = reg
            .record_plaintext(id, FieldKind::Title, "Tampered")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::PlaintextIntegrity(id, FieldKind::Title));

        let view = reg.get_view(id).await;
        assert_eq!(view.title, FieldView::Plain("Hello".into()));
        assert!(view.content.is_pending());
        assert!(!view.is_complete());
    }

    #[tokio::test]
    async fn plaintext_requires_known_handles() {
        let reg = HandleRegistry::new();
        let err = reg
            .record_plaintext(MessageId(9), FieldKind::Content, "x")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Unknown(MessageId(9)));
    }

    #[tokio::test]
    async fn unknown_id_reads_pending() {
        let reg = HandleRegistry::new();
        let view = reg.get_view(MessageId(42)).await;
        assert!(view.title.is_pending());
        assert!(view.content.is_pending());
    }

    #[tokio::test]
    async fn clear_drops_all_entries() {
        let reg = HandleRegistry::new();
        reg.record_handles(MessageId(1), handle(1), handle(2))
            .await
            .unwrap();
        reg.clear().await;
        assert!(reg.handles(MessageId(1)).await.is_none());
    }
}
