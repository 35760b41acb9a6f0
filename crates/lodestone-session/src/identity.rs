//! The identity provider seam: durable claims, roles, and policies.
//!
//! Lodestone doesn't own identities. Tokens, users, roles, and claims
//! live in an external provider; this module defines the
//! [`IdentityProvider`] trait the session layer and gate chain talk to.
//!
//! The session layer uses claims for one thing: mirroring the ephemeral
//! cache state into a durable [`ACCOUNT_ID_CLAIM`] so a restarted process
//! can recover who was logged into which account, and so cleanup after
//! expiry has something concrete to remove.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{IdentityError, UserId};

/// Claim type that mirrors the account a user is logged into.
pub const ACCOUNT_ID_CLAIM: &str = "AccountId";

/// Claims, roles, and policy checks backed by an external identity store.
///
/// # Trait bounds
///
/// - `Send + Sync` → one provider is shared by every request task and
///   the expiration worker.
/// - `'static` → it lives as long as the session layer.
///
/// Implementations should make `remove_claim` idempotent: removing a
/// claim that doesn't exist returns `Ok(false)`, not an error. Cleanup
/// is at-least-once and may run twice for the same user.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Returns `true` if the user holds a claim of this type.
    async fn has_claim(
        &self,
        user_id: &UserId,
        claim_type: &str,
    ) -> Result<bool, IdentityError>;

    /// Returns the value of the user's claim of this type, if any.
    async fn get_claim_value(
        &self,
        user_id: &UserId,
        claim_type: &str,
    ) -> Result<Option<String>, IdentityError>;

    /// Adds a claim. Callers remove a stale value first.
    async fn add_claim(
        &self,
        user_id: &UserId,
        claim_type: &str,
        value: &str,
    ) -> Result<(), IdentityError>;

    /// Removes the claim; `Ok(false)` if there was nothing to remove.
    async fn remove_claim(
        &self,
        user_id: &UserId,
        claim_type: &str,
    ) -> Result<bool, IdentityError>;

    /// Returns `true` if the user is in `role`.
    ///
    /// # Errors
    /// [`IdentityError::UnknownIdentity`] if the provider doesn't know the
    /// user at all.
    async fn has_role(
        &self,
        user_id: &UserId,
        role: &str,
    ) -> Result<bool, IdentityError>;

    /// Returns `true` if the user satisfies the named authorization policy.
    async fn satisfies_policy(
        &self,
        user_id: &UserId,
        policy: &str,
    ) -> Result<bool, IdentityError>;
}

/// An in-process [`IdentityProvider`] for tests, demos, and local runs.
///
/// Claims can be written for any user. Roles and policies are only
/// answered for users registered with [`register`](Self::register);
/// everyone else is [`IdentityError::UnknownIdentity`].
///
/// Faults queued with [`fail_next`](Self::fail_next) are returned, one per
/// call, by the next provider calls in FIFO order. A latency set with
/// [`set_latency`](Self::set_latency) delays every provider call.
#[derive(Default)]
pub struct InMemoryIdentity {
    claims: Mutex<HashMap<UserId, HashMap<String, String>>>,
    roles: Mutex<HashMap<UserId, HashSet<String>>>,
    faults: Mutex<VecDeque<IdentityError>>,
    latency: Mutex<Duration>,
    remove_calls: AtomicUsize,
}

impl InMemoryIdentity {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the user known, with the given roles and policies.
    ///
    /// Policies share the role namespace with a `policy:` prefix.
    pub fn register(&self, user_id: impl Into<UserId>, roles: &[&str]) {
        let set = roles.iter().map(|r| (*r).to_string()).collect();
        lock(&self.roles).insert(user_id.into(), set);
    }

    /// Grants a named policy to an already-registered user.
    pub fn grant_policy(&self, user_id: impl Into<UserId>, policy: &str) {
        lock(&self.roles)
            .entry(user_id.into())
            .or_default()
            .insert(format!("policy:{policy}"));
    }

    /// Queues an error for the next provider call.
    pub fn fail_next(&self, error: IdentityError) {
        lock(&self.faults).push_back(error);
    }

    /// Makes every provider call sleep for `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Synchronous claim read, for assertions.
    pub fn claim(&self, user_id: &UserId, claim_type: &str) -> Option<String> {
        lock(&self.claims)
            .get(user_id)
            .and_then(|c| c.get(claim_type).cloned())
    }

    /// How many times `remove_claim` was called (including failed calls).
    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_fault(&self) -> Result<(), IdentityError> {
        match lock(&self.faults).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_known(&self, user_id: &UserId) -> Result<(), IdentityError> {
        if lock(&self.roles).contains_key(user_id) {
            Ok(())
        } else {
            Err(IdentityError::UnknownIdentity(user_id.clone()))
        }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    async fn has_claim(
        &self,
        user_id: &UserId,
        claim_type: &str,
    ) -> Result<bool, IdentityError> {
        self.delay().await;
        self.take_fault()?;
        Ok(self.claim(user_id, claim_type).is_some())
    }

    async fn get_claim_value(
        &self,
        user_id: &UserId,
        claim_type: &str,
    ) -> Result<Option<String>, IdentityError> {
        self.delay().await;
        self.take_fault()?;
        Ok(self.claim(user_id, claim_type))
    }

    async fn add_claim(
        &self,
        user_id: &UserId,
        claim_type: &str,
        value: &str,
    ) -> Result<(), IdentityError> {
        self.delay().await;
        self.take_fault()?;
        lock(&self.claims)
            .entry(user_id.clone())
            .or_default()
            .insert(claim_type.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_claim(
        &self,
        user_id: &UserId,
        claim_type: &str,
    ) -> Result<bool, IdentityError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.take_fault()?;
        let mut claims = lock(&self.claims);
        Ok(claims
            .get_mut(user_id)
            .and_then(|c| c.remove(claim_type))
            .is_some())
    }

    async fn has_role(
        &self,
        user_id: &UserId,
        role: &str,
    ) -> Result<bool, IdentityError> {
        self.delay().await;
        self.take_fault()?;
        self.check_known(user_id)?;
        Ok(lock(&self.roles)
            .get(user_id)
            .is_some_and(|roles| roles.contains(role)))
    }

    async fn satisfies_policy(
        &self,
        user_id: &UserId,
        policy: &str,
    ) -> Result<bool, IdentityError> {
        self.delay().await;
        self.take_fault()?;
        self.check_known(user_id)?;
        let key = format!("policy:{policy}");
        Ok(lock(&self.roles)
            .get(user_id)
            .is_some_and(|roles| roles.contains(&key)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
