//! # chiffre-store
//!
//! The two cross-cutting stores of the chiffre client core:
//!
//! - [`HandleRegistry`] maps each message's encrypted fields to their opaque
//!   ciphertext handles and caches decrypted plaintext once available.
//! - [`AuthorizationCache`] holds time-bounded, identity-scoped decryption
//!   authorization artifacts and collapses concurrent authorization
//!   requests for the same (signer, contract) into a single round trip.
//!
//! Both stores support concurrent reads; writes go through idempotent
//! contracts so no external lock is needed. Nothing outside this crate
//! mutates their data directly.

pub mod authorization;
pub mod registry;

mod error;

pub use authorization::{
    ArtifactStore, AuthorizationArtifact, AuthorizationCache, InMemoryArtifactStore,
};
pub use error::StoreError;
pub use registry::{FieldView, HandleRegistry, MessageView};
