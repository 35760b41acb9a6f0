//! Per-request context and cancellation.

use std::future::Future;
use std::sync::Arc;

use lodestone_session::{CharacterId, SessionRecord, UserId};
use tokio::sync::watch;

use crate::{GateError, RequestPolicy};

/// Cooperative cancellation for one request.
///
/// Clones share the same flag. Once [`cancel`](Self::cancel) is called
/// every gate aborts at its next external call, and neither the handler
/// nor the commit runs.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    /// Creates a signal that is not cancelled.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancels every clone of this signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is cancelled. Pending forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this can't see a closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Runs `fut` unless the signal fires first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, GateError> {
        if self.is_cancelled() {
            return Err(GateError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(GateError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// What the gates know about the request being evaluated.
///
/// Created by [`GateChain::execute`](crate::GateChain::execute) and
/// dropped when it returns. Gates fill in `session` and `character` as
/// they verify them, so the handler doesn't have to look them up again.
#[derive(Debug)]
pub struct GateContext {
    identity: Option<UserId>,
    policy: RequestPolicy,
    cancel: CancelSignal,
    pub(crate) session: Option<SessionRecord>,
    pub(crate) character: Option<CharacterId>,
}

impl GateContext {
    /// Creates a context for one request.
    pub fn new(identity: Option<UserId>, policy: RequestPolicy, cancel: CancelSignal) -> Self {
        Self {
            identity,
            policy,
            cancel,
            session: None,
            character: None,
        }
    }

    /// The authenticated caller, if any.
    pub fn identity(&self) -> Option<&UserId> {
        self.identity.as_ref()
    }

    /// The policy declared by the request type.
    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// The request's cancellation signal.
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// The session verified by the session gate.
    pub fn session(&self) -> Option<&SessionRecord> {
        self.session.as_ref()
    }

    /// The character verified by the character gate.
    pub fn character(&self) -> Option<CharacterId> {
        self.character
    }

    pub(crate) fn user(&self) -> Result<UserId, GateError> {
        self.identity
            .clone()
            .ok_or_else(|| GateError::Unauthorized("no authenticated identity".into()))
    }
}
