use std::sync::Arc;

use lodestone_session::{IdentityProvider, SessionDataStore, SessionManager, UserId};

use crate::gates::{
    AuthenticationGate, AuthorizationGate, CatchAllGate, CharacterGate, CommitGate, SessionGate,
    ValidationGate,
};
use crate::{
    AccountProfiles, CancelSignal, CharacterDirectory, GameRequest, Gate, GateContext, GateError,
    Handler, Next, UnitOfWork,
};

/// Runs requests through the gates in their fixed order:
///
/// ```text
/// catch-all → authentication → session → character → authorization
///           → validation → commit → handler
/// ```
///
/// The order is not configurable. Each gate assumes the ones before it
/// have passed: the session gate relies on an identity, the character
/// gate on a session, and so on.
pub struct GateChain {
    catch_all: CatchAllGate,
    authentication: AuthenticationGate,
    session: SessionGate,
    character: CharacterGate,
    authorization: AuthorizationGate,
    validation: ValidationGate,
    commit: CommitGate,
}

impl GateChain {
    /// Builds a chain over the shared session state and collaborators.
    pub fn new(
        manager: Arc<SessionManager>,
        data: SessionDataStore,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn AccountProfiles>,
        characters: Arc<dyn CharacterDirectory>,
        unit_of_work: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            catch_all: CatchAllGate,
            authentication: AuthenticationGate,
            session: SessionGate {
                manager: Arc::clone(&manager),
                profiles,
            },
            character: CharacterGate {
                manager,
                data,
                characters,
            },
            authorization: AuthorizationGate { identity },
            validation: ValidationGate,
            commit: CommitGate { unit_of_work },
        }
    }

    /// Evaluates every gate for `request`, then runs `handler`.
    ///
    /// `identity` is whoever the transport layer authenticated, or `None`
    /// for an anonymous caller.
    pub async fn execute<R: GameRequest>(
        &self,
        identity: Option<UserId>,
        cancel: CancelSignal,
        request: R,
        handler: &dyn Handler<R>,
    ) -> Result<R::Response, GateError> {
        let mut ctx = GateContext::new(identity, R::POLICY, cancel);
        let gates: [&dyn Gate<R>; 7] = [
            &self.catch_all,
            &self.authentication,
            &self.session,
            &self.character,
            &self.authorization,
            &self.validation,
            &self.commit,
        ];
        Next::new(&gates, handler).run(&mut ctx, &request).await
    }
}
