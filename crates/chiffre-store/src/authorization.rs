//! Decryption authorization cache.
//!
//! Decrypting a private handle requires a time-bounded, identity-scoped
//! authorization artifact (a signed credential covering one signer and one
//! contract). Obtaining one usually means a wallet prompt, so artifacts are
//! cached and reused across requests, and concurrent requests for the same
//! (signer, contract) collapse into a single authorization round trip.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use chiffre_shared::types::Address;
use chiffre_shared::{BoardError, Result};

/// A signed, time-bounded credential permitting one identity to decrypt one
/// contract's private values.
///
/// Never valid across a different signer or contract, never used past
/// `valid_until`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationArtifact {
    pub signer: Address,
    pub contract: Address,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// The materialized proof / signature blob handed to the oracle.
    pub signature: Bytes,
}

impl AuthorizationArtifact {
    /// Returns `true` while the artifact may still be used.
    pub fn is_fresh(&self) -> bool {
        let now = Utc::now();
        self.valid_from <= now && now < self.valid_until
    }
}

/// Pluggable storage collaborator for artifacts.
///
/// In-memory by default; artifacts never outlive whatever process lifetime
/// the chosen store implies.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, signer: Address, contract: Address) -> Option<AuthorizationArtifact>;

    /// Insert an artifact, superseding any prior entry for the same
    /// (signer, contract) key.
    async fn put(&self, artifact: AuthorizationArtifact);

    /// Drop every artifact held for a signer (account switch).
    async fn evict_signer(&self, signer: Address);

    async fn clear(&self);
}

/// Default artifact store: a process-local map.
#[derive(Clone, Default)]
pub struct InMemoryArtifactStore {
    map: Arc<RwLock<HashMap<(Address, Address), AuthorizationArtifact>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, signer: Address, contract: Address) -> Option<AuthorizationArtifact> {
        let map = self.map.read().await;
        map.get(&(signer, contract)).cloned()
    }

    async fn put(&self, artifact: AuthorizationArtifact) {
        let mut map = self.map.write().await;
        map.insert((artifact.signer, artifact.contract), artifact);
    }

    async fn evict_signer(&self, signer: Address) {
        let mut map = self.map.write().await;
        let before = map.len();
        map.retain(|(s, _), _| *s != signer);
        let removed = before - map.len();
        if removed > 0 {
            debug!(signer = %signer.short(), removed, "evicted artifacts for signer");
        }
    }

    async fn clear(&self) {
        let mut map = self.map.write().await;
        map.clear();
    }
}

/// Caches authorization artifacts and single-flights their acquisition.
///
/// Cheap to clone; all clones share the same store and in-flight table.
#[derive(Clone)]
pub struct AuthorizationCache {
    store: Arc<dyn ArtifactStore>,
    /// Per-key acquisition locks. Whoever holds the lock performs the
    /// authorization round trip; everyone else waits and then reads the
    /// populated cache.
    inflight: Arc<Mutex<HashMap<(Address, Address), Arc<Mutex<()>>>>>,
}

impl AuthorizationCache {
    /// Cache backed by the default in-memory store.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemoryArtifactStore::new()))
    }

    /// Cache backed by a caller-provided store.
    pub fn with_store(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A cached artifact, if one exists and is still within its validity
    /// window.
    pub async fn get(&self, signer: Address, contract: Address) -> Option<AuthorizationArtifact> {
        let artifact = self.store.get(signer, contract).await?;
        if artifact.is_fresh() {
            Some(artifact)
        } else {
            None
        }
    }

    /// Insert an artifact, evicting any prior entry for its key.
    pub async fn put(&self, artifact: AuthorizationArtifact) {
        self.store.put(artifact).await;
    }

    /// Drop every artifact for a signer. Called on account switch: artifacts
    /// are signer-scoped and must not survive the identity they were issued
    /// to.
    pub async fn evict_signer(&self, signer: Address) {
        self.store.evict_signer(signer).await;
    }

    /// Get a fresh artifact, fetching one via `fetch` if needed.
    ///
    /// Single-flight: concurrent callers for the same (signer, contract)
    /// share one underlying authorization request. The caller that wins the
    /// per-key lock performs the round trip and populates the cache; the
    /// rest find the cache populated when the lock frees.
    pub async fn obtain<F, Fut>(
        &self,
        signer: Address,
        contract: Address,
        fetch: F,
    ) -> Result<AuthorizationArtifact>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthorizationArtifact>>,
    {
        if let Some(artifact) = self.get(signer, contract).await {
            return Ok(artifact);
        }

        let key_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry((signer, contract))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        // A concurrent caller may have populated the cache while we waited.
        if let Some(artifact) = self.get(signer, contract).await {
            debug!(signer = %signer.short(), "authorization served from cache after wait");
            return Ok(artifact);
        }

        let artifact = fetch().await?;
        if artifact.signer != signer || artifact.contract != contract {
            return Err(BoardError::AuthorizationDenied(
                "artifact scoped to a different signer or contract".into(),
            ));
        }
        if !artifact.is_fresh() {
            return Err(BoardError::AuthorizationDenied(
                "artifact expired on arrival".into(),
            ));
        }

        info!(
            signer = %signer.short(),
            contract = %contract.short(),
            until = %artifact.valid_until,
            "authorization artifact cached"
        );
        self.store.put(artifact.clone()).await;
        Ok(artifact)
    }
}
