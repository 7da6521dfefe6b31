use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ADDRESS_SIZE, HANDLE_SIZE};

/// Ledger-assigned message identifier (monotonic, unique per contract).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// EIP-155 style chain identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Account or contract identifier (20 bytes, EVM-style)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        if bytes.len() != ADDRESS_SIZE {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Shortened display form (`0x1234...abcd`).
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}...{}", &full[..4], &full[full.len() - 4..])
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Opaque reference to an encrypted on-chain value (bytes32 on the ledger).
///
/// A handle is not itself decryptable; it must go through the decryption
/// oracle together with an authorization artifact (or none, for handles of
/// publicly readable messages).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CiphertextHandle(pub [u8; HANDLE_SIZE]);

impl CiphertextHandle {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        if bytes.len() != HANDLE_SIZE {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; HANDLE_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Zero-knowledge validity proof attached to a freshly encrypted handle,
/// checked by the ledger at submission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidityProof(pub Bytes);

/// The two encrypted fields of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Title,
    Content,
}

///// Message visibility on the ledger. The transition is one-way:
/// `Private` → `Public`, never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
}

/// Per-message decryption lifecycle state.
///
/// `Unknown` from the lifecycle diagram is represented by absence from the
/// board map. `Unreadable` is terminal: a handle or plaintext consistency
/// violation was detected and the message will never decrypt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DecryptionState {
    /// Discovered via listing or a creation event; ciphertext only.
    Listed,
    /// A decryption round trip is in flight.
    Decrypting,
    /// Plaintext is cached; no further authorization will ever be needed.
    Decrypted,
    /// Made public on the ledger; decryptable by anyone without a
    /// per-identity authorization artifact.
    PubliclyReadable,
    /// Handle or plaintext mutation detected upstream; permanently dead.
    Unreadable,
}

/// State-machine-owned metadata for one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub author: Address,
    /// Ledger-assigned creation time, immutable.
    pub timestamp: DateTime<Utc>,
    pub visibility: Visibility,
    pub state: DecryptionState,
}

/// Result of a metadata read. The ledger exposes an `exists` flag; this
/// forces callers to handle absence explicitly instead of a nullable author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetadataLookup {
    Found {
        author: Address,
        timestamp: DateTime<Utc>,
    },
    NotFound,
}

/// The (chain, signer) pair an operation runs under.
///
/// Captured at operation start and re-checked before committing any
/// asynchronous result; a mismatch means the user switched context and the
/// result is discarded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionContext {
    pub chain_id: ChainId,
    pub signer: Address,
}
