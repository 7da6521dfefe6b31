//! Chain/session consistency guard.
//!
//! The wallet's (chain id, signer) pair is threaded into every operation as
//! an explicit [`SessionContext`] instead of being read from ambient global
//! state. Each asynchronous operation captures a [`ContextGuard`] at entry
//! and re-checks it before committing its result; a mismatch means the user
//! switched network or account mid-flight and the stale result is discarded
//! silently. This is the only cancellation mechanism: abandoned results are
//! rendered inert rather than interrupted.

use std::sync::Arc;

use tokio::sync::watch;

use chiffre_shared::types::SessionContext;

/// Shared handle to the current session context.
///
/// Cheap to clone; the wallet integration calls [`update`](Self::update) on
/// chain or account switches, and every clone (including the board client's
/// background watcher) observes the change.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Arc<watch::Sender<SessionContext>>,
}

impl SessionHandle {
    pub fn new(initial: SessionContext) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// The context right now.
    pub fn current(&self) -> SessionContext {
        *self.tx.borrow()
    }

    /// Publish a new context (chain and/or signer changed).
    pub fn update(&self, ctx: SessionContext) {
        self.tx.send_replace(ctx);
    }

    /// A receiver for observing context changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionContext> {
        self.tx.subscribe()
    }

    /// Capture the current context for a staleness re-check later.
    pub fn guard(&self) -> ContextGuard {
        ContextGuard {
            captured: self.current(),
            rx: self.tx.subscribe(),
        }
    }
}

/// Snapshot of the session context at operation start.
#[derive(Debug)]
pub struct ContextGuard {
    captured: SessionContext,
    rx: watch::Receiver<SessionContext>,
}

impl ContextGuard {
    /// The context the operation started under.
    pub fn captured(&self) -> SessionContext {
        self.captured
    }

    /// True while chain id and signer still match the captured values.
    pub fn still_current(&self) -> bool {
        *self.rx.borrow() == self.captured
    }
}
