//! Mock collaborators: an in-process ledger, encryption engine, decryption
//! oracle and authorization service, all sharing one `MockChain` so tests
//! can drive multi-client scenarios and inject failures and delays.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use chiffre_client::gateway::{Authorizer, ContractGateway, DecryptionOracle, EncryptionEngine};
use chiffre_client::{BoardClient, ClientConfig, SessionHandle};
use chiffre_shared::types::{
    Address, ChainId, CiphertextHandle, FieldKind, MessageId, MetadataLookup, SessionContext,
    ValidityProof,
};
use chiffre_shared::{BoardError, Result};
use chiffre_store::AuthorizationArtifact;

pub const CONTRACT: Address = Address([0xC0; 20]);

pub fn addr(b: u8) -> Address {
    Address([b; 20])
}

pub fn ctx(chain: u64, signer: Address) -> SessionContext {
    SessionContext {
        chain_id: ChainId(chain),
        signer,
    }
}

struct StoredMessage {
    author: Address,
    timestamp: chrono::DateTime<Utc>,
    title_handle: CiphertextHandle,
    content_handle: CiphertextHandle,
}

#[derive(Default)]
struct ChainInner {
    next_id: u64,
    messages: HashMap<MessageId, StoredMessage>,
    plaintexts: HashMap<CiphertextHandle, String>,
    public: HashSet<MessageId>,
}

/// Shared fake ledger + oracle backend.
#[derive(Default)]
pub struct MockChain {
    inner: Mutex<ChainInner>,
    pub encrypt_calls: AtomicUsize,
    pub oracle_calls: AtomicUsize,
    fail_submits: AtomicUsize,
    fail_lists: AtomicUsize,
    fail_oracle: AtomicUsize,
    encrypt_delay: Mutex<Duration>,
    submit_delay: Mutex<Duration>,
    oracle_delay: Mutex<Duration>,
    list_delays: Mutex<VecDeque<Duration>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fresh_handle(&self) -> CiphertextHandle {
        CiphertextHandle(rand::random::<[u8; 32]>())
    }

    /// Put a message directly on the fake ledger (another user posted it).
    pub fn seed_message(&self, author: Address, title: &str, content: &str) -> MessageId {
        let title_handle = self.fresh_handle();
        let content_handle = self.fresh_handle();
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = MessageId(inner.next_id);
        inner.plaintexts.insert(title_handle, title.to_owned());
        inner.plaintexts.insert(content_handle, content.to_owned());
        inner.messages.insert(
            id,
            StoredMessage {
                author,
                timestamp: Utc::now(),
                title_handle,
                content_handle,
            },
        );
        id
    }

    /// Swap a message's title handle for a different one, simulating an
    /// upstream protocol violation.
    pub fn tamper_title_handle(&self, id: MessageId) {
        let fresh = self.fresh_handle();
        let mut inner = self.inner.lock().unwrap();
        let plain = {
            let msg = inner.messages.get(&id).expect("message exists");
            inner.plaintexts[&msg.title_handle].clone()
        };
        inner.plaintexts.insert(fresh, plain);
        inner.messages.get_mut(&id).unwrap().title_handle = fresh;
    }

    pub fn fail_next_submit(&self) {
        self.fail_submits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fail_next_list(&self) {
        self.fail_lists.fetch_add(1, Ordering::SeqCst);
    }

    /// Fail the next `n` oracle round trips.
    pub fn fail_oracle(&self, n: usize) {
        self.fail_oracle.fetch_add(n, Ordering::SeqCst);
    }

    pub fn set_encrypt_delay(&self, d: Duration) {
        *self.encrypt_delay.lock().unwrap() = d;
    }

    pub fn set_submit_delay(&self, d: Duration) {
        *self.submit_delay.lock().unwrap() = d;
    }

    pub fn set_oracle_delay(&self, d: Duration) {
        *self.oracle_delay.lock().unwrap() = d;
    }

    /// Queue per-call delays for `list_message_ids`, consumed in order.
    pub fn push_list_delay(&self, d: Duration) {
        self.list_delays.lock().unwrap().push_back(d);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct MockEngine {
    chain: Arc<MockChain>,
}

#[async_trait]
impl EncryptionEngine for MockEngine {
    async fn encrypt(
        &self,
        plaintext: &str,
        _field: FieldKind,
    ) -> Result<(CiphertextHandle, ValidityProof)> {
        self.chain.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.chain.encrypt_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        let handle = self.chain.fresh_handle();
        self.chain
            .inner
            .lock()
            .unwrap()
            .plaintexts
            .insert(handle, plaintext.to_owned());
        Ok((handle, ValidityProof(Bytes::from_static(b"proof"))))
    }
}

pub struct MockGateway {
    chain: Arc<MockChain>,
    /// Identity the gateway signs writes with.
    author: Address,
}

#[async_trait]
impl ContractGateway for MockGateway {
    async fn submit_message(
        &self,
        title_handle: CiphertextHandle,
        _title_proof: ValidityProof,
        content_handle: CiphertextHandle,
        _content_proof: ValidityProof,
    ) -> Result<MessageId> {
        let delay = *self.chain.submit_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        if MockChain::take_failure(&self.chain.fail_submits) {
            return Err(BoardError::Gateway("transaction reverted".into()));
        }

        let mut inner = self.chain.inner.lock().unwrap();
        inner.next_id += 1;
        let id = MessageId(inner.next_id);
        inner.messages.insert(
            id,
            StoredMessage {
                author: self.author,
                timestamp: Utc::now(),
                title_handle,
                content_handle,
            },
        );
        Ok(id)
    }

    async fn list_message_ids(&self) -> Result<Vec<MessageId>> {
        let delay = self
            .chain
            .list_delays
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        tokio::time::sleep(delay).await;
        if MockChain::take_failure(&self.chain.fail_lists) {
            return Err(BoardError::Gateway("rpc unreachable".into()));
        }

        let inner = self.chain.inner.lock().unwrap();
        let mut ids: Vec<_> = inner.messages.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn message_metadata(&self, id: MessageId) -> Result<MetadataLookup> {
        let inner = self.chain.inner.lock().unwrap();
        Ok(match inner.messages.get(&id) {
            Some(msg) => MetadataLookup::Found {
                author: msg.author,
                timestamp: msg.timestamp,
            },
            None => MetadataLookup::NotFound,
        })
    }

    async fn title_handle(&self, id: MessageId) -> Result<CiphertextHandle> {
        let inner = self.chain.inner.lock().unwrap();
        inner
            .messages
            .get(&id)
            .map(|m| m.title_handle)
            .ok_or_else(|| BoardError::Gateway("no such message".into()))
    }

    async fn content_handle(&self, id: MessageId) -> Result<CiphertextHandle> {
        let inner = self.chain.inner.lock().unwrap();
        inner
            .messages
            .get(&id)
            .map(|m| m.content_handle)
            .ok_or_else(|| BoardError::Gateway("no such message".into()))
    }

    async fn request_decryption(&self, id: MessageId) -> Result<()> {
        let inner = self.chain.inner.lock().unwrap();
        if inner.messages.contains_key(&id) {
            Ok(())
        } else {
            Err(BoardError::Gateway("no such message".into()))
        }
    }

    async fn make_public(&self, id: MessageId) -> Result<()> {
        let mut inner = self.chain.inner.lock().unwrap();
        if !inner.messages.contains_key(&id) {
            return Err(BoardError::Gateway("no such message".into()));
        }
        inner.public.insert(id);
        Ok(())
    }
}

pub struct MockOracle {
    chain: Arc<MockChain>,
}

#[async_trait]
impl DecryptionOracle for MockOracle {
    async fn decrypt(
        &self,
        handle: CiphertextHandle,
        artifact: Option<&AuthorizationArtifact>,
    ) -> Result<String> {
        self.chain.oracle_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.chain.oracle_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        if MockChain::take_failure(&self.chain.fail_oracle) {
            return Err(BoardError::Oracle("oracle timeout".into()));
        }

        let inner = self.chain.inner.lock().unwrap();
        let public = inner
            .messages
            .iter()
            .find(|(_, m)| m.title_handle == handle || m.content_handle == handle)
            .map(|(id, _)| inner.public.contains(id))
            .unwrap_or(false);

        if !public {
            match artifact {
                Some(a) if a.is_fresh() => {}
                _ => {
                    return Err(BoardError::AuthorizationDenied(
                        "private handle requires a fresh artifact".into(),
                    ))
                }
            }
        }

        inner
            .plaintexts
            .get(&handle)
            .cloned()
            .ok_or_else(|| BoardError::Oracle("unknown handle".into()))
    }
}

pub struct MockAuthorizer {
    allowed: HashSet<Address>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn authorize(&self, signer: Address, contract: Address) -> Result<AuthorizationArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.allowed.contains(&signer) {
            return Err(BoardError::AuthorizationDenied("user rejected".into()));
        }
        Ok(AuthorizationArtifact {
            signer,
            contract,
            valid_from: Utc::now() - chrono::Duration::seconds(1),
            valid_until: Utc::now() + chrono::Duration::hours(1),
            signature: Bytes::from_static(b"mock-signature"),
        })
    }
}

/// Everything a test needs to drive one user's client.
pub struct Harness {
    pub chain: Arc<MockChain>,
    pub session: SessionHandle,
    pub client: BoardClient,
    pub authorizer: Arc<MockAuthorizer>,
}

/// Build a client for `signer` on `chain`, authorizing exactly the signers
/// in `allowed`.
pub fn harness(chain: &Arc<MockChain>, signer: Address, allowed: &[Address]) -> Harness {
    let session = SessionHandle::new(ctx(1, signer));
    let authorizer = Arc::new(MockAuthorizer {
        allowed: allowed.iter().copied().collect(),
        calls: AtomicUsize::new(0),
    });
    let client = BoardClient::new(
        ClientConfig::new(CONTRACT),
        session.clone(),
        Arc::new(MockGateway {
            chain: chain.clone(),
            author: signer,
        }),
        Arc::new(MockEngine {
            chain: chain.clone(),
        }),
        Arc::new(MockOracle {
            chain: chain.clone(),
        }),
        authorizer.clone(),
    );
    Harness {
        chain: chain.clone(),
        session,
        client,
        authorizer,
    }
}
