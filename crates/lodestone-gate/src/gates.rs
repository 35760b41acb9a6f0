//! The seven gates, outermost first.
//!
//! Each gate is generic over the request type, so one instance serves
//! every request the chain runs. A gate whose policy section is absent
//! calls `next` immediately. On a failure path a gate returns before
//! touching any state; the session gate in particular only refreshes
//! once all of its checks have passed.

use std::any::type_name;
use std::sync::Arc;

use async_trait::async_trait;
use lodestone_session::{
    IdentityError, IdentityProvider, SessionDataStore, SessionManager, SessionStatus, UserId,
};
use tracing::{debug, error};

use crate::{
    AccountProfiles, CharacterDirectory, GameRequest, Gate, GateContext, GateError, Next,
    UnitOfWork,
};

// ---------------------------------------------------------------------------
// 0. Catch-all
// ---------------------------------------------------------------------------

/// Logs unexpected failures once, then returns them unchanged.
pub(crate) struct CatchAllGate;

#[async_trait]
impl<R: GameRequest> Gate<R> for CatchAllGate {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError> {
        let result = next.run(ctx, request).await;
        if let Err(GateError::Unexpected(message)) = &result {
            error!(
                request = type_name::<R>(),
                user_id = ?ctx.identity(),
                error = %message,
                "unexpected failure while handling request"
            );
        }
        result
    }
}

// ---------------------------------------------------------------------------
// 1. Authentication
// ---------------------------------------------------------------------------

pub(crate) struct AuthenticationGate;

#[async_trait]
impl<R: GameRequest> Gate<R> for AuthenticationGate {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError> {
        if ctx.identity().is_none() {
            debug!(request = type_name::<R>(), "rejected: no identity");
            return Err(GateError::Unauthorized("no authenticated identity".into()));
        }
        next.run(ctx, request).await
    }
}

// ---------------------------------------------------------------------------
// 2. Session required
// ---------------------------------------------------------------------------

pub(crate) struct SessionGate {
    pub(crate) manager: Arc<SessionManager>,
    pub(crate) profiles: Arc<dyn AccountProfiles>,
}

#[async_trait]
impl<R: GameRequest> Gate<R> for SessionGate {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError> {
        let Some(policy) = ctx.policy().session else {
            return next.run(ctx, request).await;
        };
        let user_id = ctx.user()?;

        let (record, live) = match self.manager.status(&user_id) {
            SessionStatus::Active(record) => (record, true),
            SessionStatus::Expired(record) if policy.allow_expired => (record, false),
            _ => {
                debug!(%user_id, request = type_name::<R>(), "rejected: no session");
                return Err(GateError::SessionRequired);
            }
        };

        if let Some(min_level) = policy.min_account_level {
            let profile = ctx
                .cancel_signal()
                .guard(self.profiles.get_profile(&user_id))
                .await??;
            match profile {
                Some(p) if p.level >= min_level => {}
                Some(p) => {
                    return Err(GateError::Forbidden(format!(
                        "account level {} is below the required {min_level}",
                        p.level
                    )));
                }
                None => return Err(GateError::Forbidden("account profile not found".into())),
            }
        }

        // Renew on use. A revoke that landed after the status read wins.
        if live && !self.manager.refresh_session(&user_id) {
            return Err(GateError::SessionRequired);
        }

        ctx.session = Some(record);
        next.run(ctx, request).await
    }
}

// ---------------------------------------------------------------------------
// 3. Character required
// ---------------------------------------------------------------------------

pub(crate) struct CharacterGate {
    pub(crate) manager: Arc<SessionManager>,
    pub(crate) data: SessionDataStore,
    pub(crate) characters: Arc<dyn CharacterDirectory>,
}

#[async_trait]
impl<R: GameRequest> Gate<R> for CharacterGate {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError> {
        let Some(policy) = ctx.policy().character else {
            return next.run(ctx, request).await;
        };
        let user_id = ctx.user()?;

        // A session gate that admitted an expired session needs the bag of
        // that same, not yet swept, entry.
        let admits_expired = ctx.policy().session.is_some_and(|p| p.allow_expired);
        let data = if admits_expired {
            self.data.peek_data(&user_id)
        } else {
            self.data.get_data(&user_id)
        };
        let Some(character_id) = data.and_then(|d| d.selected_character_id()) else {
            if policy.allow_unselected {
                return next.run(ctx, request).await;
            }
            debug!(%user_id, request = type_name::<R>(), "rejected: no character selected");
            return Err(GateError::CharacterRequired);
        };

        if let Some(min_level) = policy.min_character_level {
            let character = ctx
                .cancel_signal()
                .guard(self.characters.get_character(character_id))
                .await??
                .ok_or(GateError::CharacterRequired)?;

            let session_account = match ctx.session() {
                Some(record) => Some(record.account_id),
                None => self.manager.get_session(&user_id).map(|r| r.account_id),
            };
            if session_account != Some(character.account_id) {
                return Err(GateError::Forbidden(format!(
                    "character {character_id} does not belong to this account"
                )));
            }
            if character.level < min_level {
                return Err(GateError::Forbidden(format!(
                    "character level {} is below the required {min_level}",
                    character.level
                )));
            }
        }

        ctx.character = Some(character_id);
        next.run(ctx, request).await
    }
}

// ---------------------------------------------------------------------------
// 4. Authorization
// ---------------------------------------------------------------------------

pub(crate) struct AuthorizationGate {
    pub(crate) identity: Arc<dyn IdentityProvider>,
}

impl AuthorizationGate {
    fn map_provider_error(user_id: &UserId, err: IdentityError) -> GateError {
        match err {
            IdentityError::UnknownIdentity(_) => {
                GateError::Unauthorized(format!("unknown identity {user_id}"))
            }
            other => GateError::Unexpected(other.to_string()),
        }
    }
}

#[async_trait]
impl<R: GameRequest> Gate<R> for AuthorizationGate {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError> {
        let policy = *ctx.policy();
        if policy.roles.is_empty() && policy.policy.is_none() {
            return next.run(ctx, request).await;
        }
        let user_id = ctx.user()?;

        for role in policy.roles {
            let has_role = ctx
                .cancel_signal()
                .guard(self.identity.has_role(&user_id, role))
                .await?
                .map_err(|e| Self::map_provider_error(&user_id, e))?;
            if !has_role {
                return Err(GateError::Forbidden(format!("missing role '{role}'")));
            }
        }

        if let Some(name) = policy.policy {
            let allowed = ctx
                .cancel_signal()
                .guard(self.identity.satisfies_policy(&user_id, name))
                .await?
                .map_err(|e| Self::map_provider_error(&user_id, e))?;
            if !allowed {
                return Err(GateError::Forbidden(format!("policy '{name}' not satisfied")));
            }
        }

        next.run(ctx, request).await
    }
}

// ---------------------------------------------------------------------------
// 5. Validation
// ---------------------------------------------------------------------------

pub(crate) struct ValidationGate;

#[async_trait]
impl<R: GameRequest> Gate<R> for ValidationGate {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError> {
        let errors = request.validate();
        if !errors.is_empty() {
            return Err(GateError::ValidationFailed(errors));
        }
        next.run(ctx, request).await
    }
}

// ---------------------------------------------------------------------------
// 6. Commit
// ---------------------------------------------------------------------------

/// Runs the handler, then flushes the unit of work if it succeeded.
pub(crate) struct CommitGate {
    pub(crate) unit_of_work: Arc<dyn UnitOfWork>,
}

#[async_trait]
impl<R: GameRequest> Gate<R> for CommitGate {
    async fn handle(
        &self,
        ctx: &mut GateContext,
        request: &R,
        next: Next<'_, R>,
    ) -> Result<R::Response, GateError> {
        if ctx.cancel_signal().is_cancelled() {
            return Err(GateError::Cancelled);
        }
        let response = next.run(ctx, request).await?;
        ctx.cancel_signal()
            .guard(self.unit_of_work.commit())
            .await??;
        Ok(response)
    }
}
