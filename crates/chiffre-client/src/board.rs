//! The message board state machine.
//!
//! [`BoardClient`] is the per-message lifecycle controller: it drives
//! submission, listing, targeted decryption and make-public transitions,
//! reconciling local state against asynchronous, possibly-reordered,
//! possibly-failing ledger and oracle operations.
//!
//! Concurrency contract:
//! - `submit` calls are strictly serialized per signer; a second call while
//!   one is pending fails fast with `Busy` instead of queueing.
//! - `decrypt` calls for different ids run concurrently; calls for the same
//!   id collapse onto one outstanding operation.
//! - overlapping `refresh_all` calls are resolved last-writer-wins by
//!   completion time.
//! - every operation captures a session guard at entry; results whose
//!   context went stale are discarded without touching board state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chiffre_shared::constants::{MAX_CONTENT_LEN, MAX_TITLE_LEN};
use chiffre_shared::types::{
    Address, CiphertextHandle, DecryptionState, FieldKind, MessageId, MessageRecord,
    MetadataLookup, SessionContext, Visibility,
};
use chiffre_shared::{BoardError, Result, ValidationError};
use chiffre_store::{ArtifactStore, AuthorizationCache, HandleRegistry, MessageView, StoreError};

use crate::config::ClientConfig;
use crate::events::BoardEvent;
use crate::gateway::{Authorizer, ChainEvent, ContractGateway, DecryptionOracle, EncryptionEngine};
use crate::session::{ContextGuard, SessionHandle};

/// Fetch status of the board snapshot.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Error(String),
}

/// Ordered view of the board as currently known locally.
///
/// Ids appear in discovery order, not necessarily ledger id order. The
/// snapshot is wholly replaced (never merged) by each completing refresh.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub order: Vec<MessageId>,
    pub status: FetchStatus,
}

impl BoardSnapshot {
    fn empty() -> Self {
        Self {
            order: Vec::new(),
            status: FetchStatus::Idle,
        }
    }
}

/// State owned exclusively by the state machine.
struct BoardState {
    snapshot: BoardSnapshot,
    messages: HashMap<MessageId, MessageRecord>,
}

/// Releases the per-signer submit slot when the operation settles.
struct SubmitSlot {
    slots: Arc<StdMutex<HashSet<Address>>>,
    signer: Address,
}

impl Drop for SubmitSlot {
    fn drop(&mut self) {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.remove(&self.signer);
    }
}

/// The message board client core.
///
/// Cheap to clone; all clones share state, stores and the event channel.
/// One instance serves one (chain, contract) deployment.
#[derive(Clone)]
pub struct BoardClient {
    gateway: Arc<dyn ContractGateway>,
    engine: Arc<dyn EncryptionEngine>,
    oracle: Arc<dyn DecryptionOracle>,
    authorizer: Arc<dyn Authorizer>,
    registry: HandleRegistry,
    authorizations: AuthorizationCache,
    session: SessionHandle,
    contract: Address,
    state: Arc<RwLock<BoardState>>,
    /// Signers with a submit currently in flight.
    submit_slots: Arc<StdMutex<HashSet<Address>>>,
    /// Per-id decryption locks (single-flight).
    decrypt_locks: Arc<Mutex<HashMap<MessageId, Arc<Mutex<()>>>>>,
    events: broadcast::Sender<BoardEvent>,
}

impl BoardClient {
    /// Build a client with the default in-memory artifact store.
    pub fn new(
        config: ClientConfig,
        session: SessionHandle,
        gateway: Arc<dyn ContractGateway>,
        engine: Arc<dyn EncryptionEngine>,
        oracle: Arc<dyn DecryptionOracle>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self::with_artifact_store(
            config,
            session,
            gateway,
            engine,
            oracle,
            authorizer,
            AuthorizationCache::in_memory(),
        )
    }

    /// Build a client over a caller-provided artifact store.
    ///
    /// Must be called from within a tokio runtime: the client spawns a
    /// background task watching for chain and signer switches.
    pub fn with_artifact_store(
        config: ClientConfig,
        session: SessionHandle,
        gateway: Arc<dyn ContractGateway>,
        engine: Arc<dyn EncryptionEngine>,
        oracle: Arc<dyn DecryptionOracle>,
        authorizer: Arc<dyn Authorizer>,
        authorizations: AuthorizationCache,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let client = Self {
            gateway,
            engine,
            oracle,
            authorizer,
            registry: HandleRegistry::new(),
            authorizations,
            session,
            contract: config.contract,
            state: Arc::new(RwLock::new(BoardState {
                snapshot: BoardSnapshot::empty(),
                messages: HashMap::new(),
            })),
            submit_slots: Arc::new(StdMutex::new(HashSet::new())),
            decrypt_locks: Arc::new(Mutex::new(HashMap::new())),
            events,
        };
        client.spawn_session_watcher();
        client
    }

    /// Convenience constructor over a source of artifacts.
    pub fn with_store(
        config: ClientConfig,
        session: SessionHandle,
        gateway: Arc<dyn ContractGateway>,
        engine: Arc<dyn EncryptionEngine>,
        oracle: Arc<dyn DecryptionOracle>,
        authorizer: Arc<dyn Authorizer>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self::with_artifact_store(
            config,
            session,
            gateway,
            engine,
            oracle,
            authorizer,
            AuthorizationCache::with_store(store),
        )
    }

    /// Subscribe to board change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// The handle/plaintext registry (read access for the presentation
    /// layer; mutation goes through the board operations).
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Current board snapshot.
    pub async fn snapshot(&self) -> BoardSnapshot {
        self.state.read().await.snapshot.clone()
    }

    /// Lifecycle record for one message, if known.
    pub async fn message(&self, id: MessageId) -> Option<MessageRecord> {
        self.state.read().await.messages.get(&id).cloned()
    }

    /// All known message records, in snapshot order.
    pub async fn messages(&self) -> Vec<MessageRecord> {
        let state = self.state.read().await;
        state
            .snapshot
            .order
            .iter()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect()
    }

    /// Best-known field view for a message.
    pub async fn view(&self, id: MessageId) -> MessageView {
        self.registry.get_view(id).await
    }

    // -----------------------------------------------------------------------
    // Submit
    // -----------------------------------------------------------------------

    /// Submit a new encrypted message.
    ///
    /// Validates locally before any proof generation, encrypts both fields
    /// through the engine, sends the ledger write and lists the new message
    /// as soon as its id is known. At most one submit is in flight per
    /// signer; a concurrent call fails fast with [`BoardError::Busy`].
    pub async fn submit(&self, title: &str, content: &str) -> Result<MessageId> {
        let title = title.trim();
        let content = content.trim();
        validate_inputs(title, content)?;

        let guard = self.session.guard();
        let ctx = guard.captured();
        let op = Uuid::new_v4();

        // Serialize per signer: fail fast instead of queueing, to avoid
        // nonce/ordering ambiguity on the ledger side.
        let _slot = self.acquire_submit_slot(ctx.signer)?;

        debug!(%op, signer = %ctx.signer.short(), "encrypting message fields");
        let (title_handle, title_proof) = self.engine.encrypt(title, FieldKind::Title).await?;
        let (content_handle, content_proof) =
            self.engine.encrypt(content, FieldKind::Content).await?;

        let id = self
            .gateway
            .submit_message(title_handle, title_proof, content_handle, content_proof)
            .await?;

        if !guard.still_current() {
            debug!(%op, %id, "session changed during submit; discarding result");
            return Err(BoardError::StaleContext);
        }

        // Prefer ledger metadata; fall back to what we know locally if the
        // read lags behind the write.
        let (author, timestamp) = match self.gateway.message_metadata(id).await {
            Ok(MetadataLookup::Found { author, timestamp }) => (author, timestamp),
            _ => (ctx.signer, chrono::Utc::now()),
        };

        self.registry
            .record_handles(id, title_handle, content_handle)
            .await?;

        {
            let mut state = self.state.write().await;
            state.messages.insert(
                id,
                MessageRecord {
                    id,
                    author,
                    timestamp,
                    visibility: Visibility::Private,
                    state: DecryptionState::Listed,
                },
            );
            state.snapshot.order.push(id);
        }
        self.emit(BoardEvent::MessageDiscovered {
            id,
            author,
            timestamp,
        });
        self.emit(BoardEvent::StateChanged {
            id,
            state: DecryptionState::Listed,
        });

        info!(%op, %id, author = %author.short(), "message submitted");
        Ok(id)
    }

    fn acquire_submit_slot(&self, signer: Address) -> Result<SubmitSlot> {
        let mut slots = match self.submit_slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !slots.insert(signer) {
            return Err(BoardError::Busy);
        }
        Ok(SubmitSlot {
            slots: self.submit_slots.clone(),
            signer,
        })
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Re-fetch the full id set and per-id metadata, replacing the board
    /// snapshot atomically.
    ///
    /// In-flight refreshes do not block new ones; whichever refresh
    /// *completes* last wins. A refresh whose session context went stale
    /// before completion is dropped without touching the board.
    pub async fn refresh_all(&self) -> Result<()> {
        let guard = self.session.guard();
        let op = Uuid::new_v4();

        {
            let mut state = self.state.write().await;
            state.snapshot.status = FetchStatus::Loading;
        }

        match self.fetch_board(&guard, op).await {
            Ok(fetched) => {
                if !guard.still_current() {
                    debug!(%op, "session changed during refresh; dropping snapshot");
                    return Err(BoardError::StaleContext);
                }
                self.commit_refresh(fetched, op).await
            }
            Err(BoardError::StaleContext) => Err(BoardError::StaleContext),
            Err(e) => {
                // Leave the current snapshot in place; only flag the status.
                if guard.still_current() {
                    let mut state = self.state.write().await;
                    state.snapshot.status = FetchStatus::Error(e.to_string());
                }
                warn!(%op, error = %e, "refresh failed");
                Err(e)
            }
        }
    }

    async fn fetch_board(&self, guard: &ContextGuard, op: Uuid) -> Result<Vec<FetchedMessage>> {
        let ids = self.gateway.list_message_ids().await?;
        debug!(%op, count = ids.len(), "refreshing board");

        let mut fetched = Vec::with_capacity(ids.len());
        for id in ids {
            if !guard.still_current() {
                return Err(BoardError::StaleContext);
            }
            let (author, timestamp) = match self.gateway.message_metadata(id).await? {
                MetadataLookup::Found { author, timestamp } => (author, timestamp),
                MetadataLookup::NotFound => {
                    debug!(%op, %id, "listed id has no metadata; skipped");
                    continue;
                }
            };
            let (title_handle, content_handle) = futures::future::try_join(
                self.gateway.title_handle(id),
                self.gateway.content_handle(id),
            )
            .await?;
            fetched.push(FetchedMessage {
                id,
                author,
                timestamp,
                title_handle,
                content_handle,
            });
        }
        Ok(fetched)
    }

    async fn commit_refresh(&self, fetched: Vec<FetchedMessage>, op: Uuid) -> Result<()> {
        let count = fetched.len();
        let mut order = Vec::with_capacity(count);

        let mut state = self.state.write().await;
        for msg in fetched {
            order.push(msg.id);
            match self
                .registry
                .record_handles(msg.id, msg.title_handle, msg.content_handle)
                .await
            {
                Ok(()) => {}
                Err(StoreError::HandleConflict(id)) => {
                    // Protocol violation upstream: keep the board alive but
                    // never try to decrypt this message again.
                    error!(%op, %id, "handle conflict; marking message unreadable");
                    if let Some(rec) = state.messages.get_mut(&id) {
                        rec.state = DecryptionState::Unreadable;
                    }
                    let _ = self.events.send(BoardEvent::StateChanged {
                        id,
                        state: DecryptionState::Unreadable,
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            state.messages.entry(msg.id).or_insert(MessageRecord {
                id: msg.id,
                author: msg.author,
                timestamp: msg.timestamp,
                visibility: Visibility::Private,
                state: DecryptionState::Listed,
            });
        }

        // Whole replacement, never a merge: last completed refresh wins.
        state.snapshot = BoardSnapshot {
            order,
            status: FetchStatus::Idle,
        };
        drop(state);

        self.emit(BoardEvent::SnapshotReplaced { count });
        info!(%op, count, "board snapshot replaced");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Decrypt
    // -----------------------------------------------------------------------

    /// Decrypt a message's title and content.
    ///
    /// Private messages need an authorization artifact for the current
    /// signer (fetched once and cached). Publicly readable messages skip
    /// authorization. Once decrypted, later calls return the cached view
    /// without another oracle round trip. Duplicate concurrent calls for
    /// the same id collapse onto one execution.
    pub async fn decrypt(&self, id: MessageId) -> Result<MessageView> {
        let guard = self.session.guard();
        let ctx = guard.captured();

        let lock = self.decrypt_lock(id).await;
        let _flight = lock.lock().await;

        // Re-read under the lock: an earlier caller may have finished.
        let record = self
            .message(id)
            .await
            .ok_or(BoardError::UnknownMessage(id))?;
        let prior = record.state;
        match prior {
            DecryptionState::Decrypted => {
                let view = self.registry.get_view(id).await;
                debug!(%id, "decrypt served from cache");
                return Ok(view);
            }
            DecryptionState::Unreadable => return Err(BoardError::Unreadable(id)),
            DecryptionState::Listed
            | DecryptionState::PubliclyReadable
            | DecryptionState::Decrypting => {}
        }

        self.set_state(id, DecryptionState::Decrypting).await;

        match self.run_decryption(id, &record, ctx, &guard).await {
            Ok(view) => {
                self.set_state(id, DecryptionState::Decrypted).await;
                info!(%id, "message decrypted");
                Ok(view)
            }
            Err(BoardError::StaleContext) => {
                // Silent discard: restore whatever state the message was in.
                self.set_state_quiet(id, prior).await;
                Err(BoardError::StaleContext)
            }
            Err(e @ (BoardError::Conflict { .. } | BoardError::Integrity { .. })) => {
                error!(%id, error = %e, "integrity violation; marking message unreadable");
                self.set_state(id, DecryptionState::Unreadable).await;
                Err(e)
            }
            Err(e) => {
                // Recoverable: back to where we started, caller may retry.
                warn!(%id, error = %e, "decrypt failed");
                self.set_state(id, prior).await;
                Err(e)
            }
        }
    }

    async fn run_decryption(
        &self,
        id: MessageId,
        record: &MessageRecord,
        ctx: SessionContext,
        guard: &ContextGuard,
    ) -> Result<MessageView> {
        let (title_handle, content_handle) = match self.registry.handles(id).await {
            Some(pair) => pair,
            None => {
                // Event-discovered message: handles not yet observed.
                let (th, ch) = futures::future::try_join(
                    self.gateway.title_handle(id),
                    self.gateway.content_handle(id),
                )
                .await?;
                self.registry.record_handles(id, th, ch).await?;
                (th, ch)
            }
        };

        let artifact = if record.visibility == Visibility::Public
            || record.state == DecryptionState::PubliclyReadable
        {
            None
        } else {
            let authorizer = self.authorizer.clone();
            let contract = self.contract;
            Some(
                self.authorizations
                    .obtain(ctx.signer, contract, || async move {
                        authorizer.authorize(ctx.signer, contract).await
                    })
                    .await?,
            )
        };

        let title = self.oracle.decrypt(title_handle, artifact.as_ref()).await?;
        let content = self
            .oracle
            .decrypt(content_handle, artifact.as_ref())
            .await?;

        if !guard.still_current() {
            debug!(%id, "session changed during decrypt; discarding plaintext");
            return Err(BoardError::StaleContext);
        }

        self.registry
            .record_plaintext(id, FieldKind::Title, &title)
            .await?;
        self.registry
            .record_plaintext(id, FieldKind::Content, &content)
            .await?;
        Ok(self.registry.get_view(id).await)
    }

    async fn decrypt_lock(&self, id: MessageId) -> Arc<Mutex<()>> {
        let mut locks = self.decrypt_locks.lock().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // -----------------------------------------------------------------------
    // Make public
    // -----------------------------------------------------------------------

    /// Flip a message to public visibility.
    ///
    /// Author-only; the ledger's rejection is authoritative and surfaces as
    /// a gateway error. On confirmation the message becomes publicly
    /// readable and a decrypt is triggered eagerly so the plaintext shows
    /// up without further user action.
    pub async fn make_public(&self, id: MessageId) -> Result<()> {
        let guard = self.session.guard();

        let record = self
            .message(id)
            .await
            .ok_or(BoardError::UnknownMessage(id))?;
        if record.state == DecryptionState::Unreadable {
            return Err(BoardError::Unreadable(id));
        }

        self.gateway.make_public(id).await?;

        if !guard.still_current() {
            debug!(%id, "session changed during make_public; discarding result");
            return Err(BoardError::StaleContext);
        }

        let already_decrypted = {
            let mut state = self.state.write().await;
            let rec = state
                .messages
                .get_mut(&id)
                .ok_or(BoardError::UnknownMessage(id))?;
            rec.visibility = Visibility::Public;
            let done = rec.state == DecryptionState::Decrypted;
            if !done {
                rec.state = DecryptionState::PubliclyReadable;
            }
            done
        };
        self.emit(BoardEvent::VisibilityChanged { id });
        if !already_decrypted {
            self.emit(BoardEvent::StateChanged {
                id,
                state: DecryptionState::PubliclyReadable,
            });
        }
        info!(%id, "message made public");

        // Eager decrypt: public plaintext should appear without the user
        // asking again. Failure is retryable and does not undo make_public.
        if !already_decrypted {
            if let Err(e) = self.decrypt(id).await {
                warn!(%id, error = %e, "eager decrypt after make_public failed");
            }
        }
        Ok(())
    }

    /// Emit an on-chain decryption request for observers.
    pub async fn request_decryption(&self, id: MessageId) -> Result<()> {
        if self.message(id).await.is_none() {
            return Err(BoardError::UnknownMessage(id));
        }
        self.gateway.request_decryption(id).await
    }

    // -----------------------------------------------------------------------
    // Live events
    // -----------------------------------------------------------------------

    /// Apply a live contract event to local state without a full refresh.
    /// Idempotent: replayed events are no-ops.
    pub async fn apply_event(&self, event: ChainEvent) {
        match event {
            ChainEvent::MessageCreated {
                id,
                author,
                timestamp,
            } => {
                let inserted = {
                    let mut state = self.state.write().await;
                    if state.messages.contains_key(&id) {
                        false
                    } else {
                        state.messages.insert(
                            id,
                            MessageRecord {
                                id,
                                author,
                                timestamp,
                                visibility: Visibility::Private,
                                state: DecryptionState::Listed,
                            },
                        );
                        state.snapshot.order.push(id);
                        true
                    }
                };
                if inserted {
                    debug!(%id, author = %author.short(), "message discovered via event");
                    self.emit(BoardEvent::MessageDiscovered {
                        id,
                        author,
                        timestamp,
                    });
                    self.emit(BoardEvent::StateChanged {
                        id,
                        state: DecryptionState::Listed,
                    });
                }
            }
            ChainEvent::DecryptionRequested { id, requester } => {
                debug!(%id, requester = %requester.short(), "decryption requested on-chain");
                self.emit(BoardEvent::DecryptionRequested { id, requester });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Session watcher
    // -----------------------------------------------------------------------

    /// Watch for chain or signer switches. A chain switch discards the
    /// whole board (ids are per-deployment facts); a signer switch evicts
    /// the old signer's authorization artifacts. In-flight operations are
    /// already covered by their own context guards.
    fn spawn_session_watcher(&self) {
        let mut rx = self.session.subscribe();
        let state = self.state.clone();
        let registry = self.registry.clone();
        let authorizations = self.authorizations.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut prev = *rx.borrow();
            while rx.changed().await.is_ok() {
                let next = *rx.borrow_and_update();
                if next.signer != prev.signer {
                    info!(
                        old = %prev.signer.short(),
                        new = %next.signer.short(),
                        "signer changed; evicting authorization artifacts"
                    );
                    authorizations.evict_signer(prev.signer).await;
                }
                if next.chain_id != prev.chain_id {
                    info!(old = %prev.chain_id, new = %next.chain_id, "chain changed; resetting board");
                    {
                        let mut state = state.write().await;
                        state.snapshot = BoardSnapshot::empty();
                        state.messages.clear();
                    }
                    registry.clear().await;
                    let _ = events.send(BoardEvent::SnapshotReplaced { count: 0 });
                }
                prev = next;
            }
        });
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn set_state(&self, id: MessageId, to: DecryptionState) {
        self.set_state_quiet(id, to).await;
        self.emit(BoardEvent::StateChanged { id, state: to });
    }

    async fn set_state_quiet(&self, id: MessageId, to: DecryptionState) {
        let mut state = self.state.write().await;
        if let Some(rec) = state.messages.get_mut(&id) {
            rec.state = to;
        }
    }

    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine; the channel only matters to live observers.
        let _ = self.events.send(event);
    }
}

struct FetchedMessage {
    id: MessageId,
    author: Address,
    timestamp: chrono::DateTime<chrono::Utc>,
    title_handle: CiphertextHandle,
    content_handle: CiphertextHandle,
}

fn validate_inputs(title: &str, content: &str) -> Result<()> {
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle.into());
    }
    if content.is_empty() {
        return Err(ValidationError::EmptyContent.into());
    }
    let title_len = title.chars().count();
    if title_len > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong(title_len).into());
    }
    let content_len = content.chars().count();
    if content_len > MAX_CONTENT_LEN {
        return Err(ValidationError::ContentTooLong(content_len).into());
    }
    Ok(())
}
