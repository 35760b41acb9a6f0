//! The traits a request flows through: [`GameRequest`], [`Gate`],
//! [`Handler`], and the [`Next`] continuation that links them.
//!
//! A gate receives the request plus a `Next` holding the rest of the
//! chain. It either returns early with a [`GateError`] or calls
//! `next.run(..)` and (optionally) inspects the result:
//!
//! ```text
//! gate₁.handle ─→ next.run ─→ gate₂.handle ─→ ... ─→ handler.handle
//!      ↑                                                   │
//!      └──────────────── Result<Response, GateError> ──────┘
//! ```

use async_trait::async_trait;

use crate::{FieldError, GateContext, GateError, RequestPolicy};

/// A request type the gate chain can run.
///
/// # Example
///
/// ```rust
/// use lodestone_gate::{FieldError, GameRequest, RequestPolicy, SessionPolicy};
///
/// struct RenameCharacter {
///     name: String,
/// }
///
/// impl GameRequest for RenameCharacter {
///     const POLICY: RequestPolicy =
///         RequestPolicy::new().with_session(SessionPolicy::new());
///     type Response = ();
///
///     fn validate(&self) -> Vec<FieldError> {
///         if self.name.trim().is_empty() {
///             vec![FieldError::new("name", "must not be empty")]
///         } else {
///             Vec::new()
///         }
///     }
/// }
/// ```
pub trait GameRequest: Send + Sync + 'static {
    /// Who may run this request. Read by the gates, never at runtime
    /// from the request value.
    const POLICY: RequestPolicy;

    /// What the handler returns on success.
    type Response: Send + 'static;

    /// Field-level checks. Every failing field should be reported, not
    /// just the first.
    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }
}

/// Business logic for one request type. Runs only after every gate
/// has passed.
#[async_trait]
pub trait Handler<R: GameRequest>: Send + Sync {
    async fn handle(&self, ctx: &GateContext, request: &R) -> Result<R::Response, GateError>;
}

/// One policy check in the chain.
#[async_trait]
pub trait Gate<R: GameRequest>: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError>;
}

/// The rest of the chain after the current gate.
pub struct Next<'a, R: GameRequest> {
    gates: &'a [&'a dyn Gate<R>],
    handler: &'a dyn Handler<R>,
}

impl<'a, R: GameRequest> Next<'a, R> {
    pub(crate) fn new(gates: &'a [&'a dyn Gate<R>], handler: &'a dyn Handler<R>) -> Self {
        Self { gates, handler }
    }

    /// Runs the remaining gates, then the handler.
    pub async fn run(self, ctx: &mut GateContext, request: &R) -> Result<R::Response, GateError> {
        match self.gates.split_first() {
            Some((gate, rest)) => {
                gate.handle(ctx, request, Next::new(rest, self.handler))
                    .await
            }
            None => self.handler.handle(ctx, request).await,
        }
    }
}
