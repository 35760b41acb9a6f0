//! # Lodestone
//!
//! The game session layer of an account backend.
//!
//! Lodestone tracks which authenticated identities are logged into a game
//! account, which character each has selected, and runs every game
//! request through an ordered chain of policy gates before its handler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lodestone::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), LodestoneError> {
//! let identity = Arc::new(InMemoryIdentity::new());
//! let mut layer = SessionLayer::builder().build(identity);
//! layer.start();
//!
//! let user = UserId::from("player-1");
//! layer.manager().set_session(&user, AccountId(42), None).await?;
//! layer.data().select_character(&user, CharacterId(7))?;
//!
//! layer.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`cache`]: the TTL cache with sliding expiration and eviction
//!   listener.
//! - [`session`]: session manager, data store, expiration queue and
//!   worker.
//! - [`gate`]: request policies and the gate chain.

mod error;
mod layer;

pub use error::LodestoneError;
pub use layer::{LodestoneConfig, SessionLayer, SessionLayerBuilder};

pub use lodestone_cache as cache;
pub use lodestone_gate as gate;
pub use lodestone_session as session;

/// Everything a server needs to wire the layer and declare requests.
pub mod prelude {
    pub use crate::{LodestoneConfig, LodestoneError, SessionLayer, SessionLayerBuilder};
    pub use lodestone_cache::CacheConfig;
    pub use lodestone_gate::{
        AccountProfile, AccountProfiles, CancelSignal, CharacterDirectory, CharacterPolicy,
        CharacterProfile, CollaboratorError, FieldError, GameRequest, GateChain, GateContext,
        GateError, Handler, RequestPolicy, SessionPolicy, UnitOfWork,
    };
    pub use lodestone_session::{
        AccountId, CharacterId, IdentityError, IdentityProvider, InMemoryIdentity,
        SessionData, SessionError, SessionStatus, UserId, WorkerConfig,
    };
}
