//! Ordered policy gates in front of game request handlers.
//!
//! Every request type declares a [`RequestPolicy`] as an associated
//! const. [`GateChain::execute`] checks that policy against the live
//! session state before the handler runs, and commits the handler's
//! writes afterwards:
//!
//! 1. **Authentication**: there must be an identity.
//! 2. **Session**: a live (or tolerated expired) game session, refreshed
//!    on use, with an optional minimum account level.
//! 3. **Character**: a selected character, optionally of a minimum level
//!    and owned by the session's account.
//! 4. **Authorization**: roles and named policies from the identity
//!    provider.
//! 5. **Validation**: every field error, aggregated.
//! 6. **Commit**: handler, then unit-of-work commit on success.
//!
//! An outermost catch-all logs [`GateError::Unexpected`] failures. Policy
//! failures pass through it untouched.

mod chain;
mod collab;
mod context;
mod error;
mod gate;
mod gates;
mod policy;

pub use chain::GateChain;
pub use collab::{
    AccountProfile, AccountProfiles, CharacterDirectory, CharacterProfile, CollaboratorError,
    CountingUnitOfWork, InMemoryCharacters, InMemoryProfiles, UnitOfWork,
};
pub use context::{CancelSignal, GateContext};
pub use error::{FieldError, GateError};
pub use gate::{GameRequest, Gate, Handler, Next};
pub use policy::{CharacterPolicy, RequestPolicy, SessionPolicy};
