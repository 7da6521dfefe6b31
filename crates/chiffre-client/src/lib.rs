//! # chiffre-client
//!
//! Client core for a confidential on-chain message board. Messages live on
//! the ledger as homomorphically-encrypted values; this crate drives their
//! full lifecycle (submission with validity proofs, listing, targeted
//! decryption through an oracle, make-public transitions) and reconciles
//! local state against asynchronous, possibly-reordered, possibly-failing
//! operations.
//!
//! The ledger, the encryption/proof engine, the decryption oracle and the
//! authorization service are external collaborators behind the traits in
//! [`gateway`]; the wallet session is an explicit [`session::SessionHandle`]
//! threaded into every operation. No UI concerns live here: this is a
//! library consumed by a presentation layer, which observes changes through
//! [`BoardClient::subscribe`](board::BoardClient::subscribe).

pub mod board;
pub mod config;
pub mod events;
pub mod gateway;
pub mod session;

pub use board::{BoardClient, BoardSnapshot, FetchStatus};
pub use config::ClientConfig;
pub use events::BoardEvent;
pub use gateway::{Authorizer, ChainEvent, ContractGateway, DecryptionOracle, EncryptionEngine};
pub use session::{ContextGuard, SessionHandle};

use tracing_subscriber::{fmt, EnvFilter};

/// Install a tracing subscriber with sensible defaults.
///
/// Opt-in: embedding applications usually bring their own subscriber.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chiffre_client=debug,chiffre_store=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(())
}
