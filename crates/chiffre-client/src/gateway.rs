//! Ports to the external collaborators.
//!
//! The ledger, the encryption/proof engine, the decryption oracle and the
//! authorization service are all external; the board client only sees these
//! traits. Implementations translate to actual contract calls, wallet
//! prompts and oracle round trips.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chiffre_shared::types::{
    Address, CiphertextHandle, FieldKind, MessageId, MetadataLookup, ValidityProof,
};
use chiffre_shared::Result;
use chiffre_store::AuthorizationArtifact;

/// Thin typed wrapper over the message board contract.
///
/// Write failures (reverts, transport errors) surface as
/// [`BoardError::Gateway`](chiffre_shared::BoardError::Gateway); the client
/// treats ledger rejection as authoritative.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Submit a new encrypted message; returns the ledger-assigned id.
    async fn submit_message(
        &self,
        title_handle: CiphertextHandle,
        title_proof: ValidityProof,
        content_handle: CiphertextHandle,
        content_proof: ValidityProof,
    ) -> Result<MessageId>;

    /// All message ids currently on the board.
    async fn list_message_ids(&self) -> Result<Vec<MessageId>>;

    /// Author and creation time for one id, or `NotFound`.
    async fn message_metadata(&self, id: MessageId) -> Result<MetadataLookup>;

    async fn title_handle(&self, id: MessageId) -> Result<CiphertextHandle>;

    async fn content_handle(&self, id: MessageId) -> Result<CiphertextHandle>;

    /// Emit an on-chain decryption request event correlating id and
    /// requester.
    async fn request_decryption(&self, id: MessageId) -> Result<()>;

    /// Flip a message to public visibility. Author-only, enforced by the
    /// ledger.
    async fn make_public(&self, id: MessageId) -> Result<()>;
}

/// Contract events consumed live to update local state without a full
/// refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    MessageCreated {
        id: MessageId,
        author: Address,
        timestamp: DateTime<Utc>,
    },
    DecryptionRequested {
        id: MessageId,
        requester: Address,
    },
}

/// The encryption/proof engine: turns plaintext into a ciphertext handle
/// plus a zero-knowledge validity proof the ledger checks at submission.
#[async_trait]
pub trait EncryptionEngine: Send + Sync {
    async fn encrypt(
        &self,
        plaintext: &str,
        field: FieldKind,
    ) -> Result<(CiphertextHandle, ValidityProof)>;
}

/// The decryption oracle: converts (handle, authorization) into plaintext.
///
/// `artifact = None` is valid only for handles belonging to a publicly
/// readable message.
#[async_trait]
pub trait DecryptionOracle: Send + Sync {
    async fn decrypt(
        &self,
        handle: CiphertextHandle,
        artifact: Option<&AuthorizationArtifact>,
    ) -> Result<String>;
}

/// The authorization service: prompts the signer for a fresh, time-bounded
/// decryption credential scoped to one contract.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, signer: Address, contract: Address) -> Result<AuthorizationArtifact>;
}
