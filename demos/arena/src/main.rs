use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lodestone::gate::{CountingUnitOfWork, InMemoryCharacters, InMemoryProfiles};
use lodestone::prelude::*;
use lodestone::session::SessionDataStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Anyone signed in may look at the leaderboard.
struct Leaderboard;

impl GameRequest for Leaderboard {
    const POLICY: RequestPolicy = RequestPolicy::PUBLIC;
    type Response = Vec<&'static str>;
}

/// Picks the character to play with for the rest of the session.
struct SelectCharacter {
    character_id: CharacterId,
}

impl GameRequest for SelectCharacter {
    const POLICY: RequestPolicy = RequestPolicy::new()
        .with_session(SessionPolicy::new())
        .with_character(CharacterPolicy::new().allow_unselected());
    type Response = ();

    fn validate(&self) -> Vec<FieldError> {
        if self.character_id.0 == 0 {
            vec![FieldError::new("character_id", "must be non-zero")]
        } else {
            Vec::new()
        }
    }
}

/// Queue for a ranked match. Needs a level 10 character.
struct EnterArena;

#[derive(Debug, Serialize)]
struct ArenaTicket {
    character_id: CharacterId,
    queue_position: u32,
}

impl GameRequest for EnterArena {
    const POLICY: RequestPolicy = RequestPolicy::new()
        .with_session(SessionPolicy::new())
        .with_character(CharacterPolicy::new().min_level(10));
    type Response = ArenaTicket;
}

/// Moderator tool.
struct KickPlayer;

impl GameRequest for KickPlayer {
    const POLICY: RequestPolicy = RequestPolicy::new()
        .with_session(SessionPolicy::new())
        .with_roles(&["moderator"]);
    type Response = ();
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

struct Arena {
    data: SessionDataStore,
    characters: Arc<InMemoryCharacters>,
}

#[async_trait]
impl Handler<Leaderboard> for Arena {
    async fn handle(
        &self,
        _: &GateContext,
        _: &Leaderboard,
    ) -> Result<Vec<&'static str>, GateError> {
        Ok(vec!["ember", "quartz", "mallow"])
    }
}

#[async_trait]
impl Handler<SelectCharacter> for Arena {
    async fn handle(&self, ctx: &GateContext, req: &SelectCharacter) -> Result<(), GateError> {
        let (Some(user), Some(session)) = (ctx.identity(), ctx.session()) else {
            return Err(GateError::SessionRequired);
        };
        let owned = self
            .characters
            .get_character(req.character_id)
            .await?
            .is_some_and(|c| c.account_id == session.account_id);
        if !owned {
            return Err(GateError::Forbidden(format!(
                "{} is not one of your characters",
                req.character_id
            )));
        }
        self.data
            .select_character(user, req.character_id)
            .map_err(|_| GateError::SessionRequired)
    }
}

#[async_trait]
impl Handler<EnterArena> for Arena {
    async fn handle(&self, ctx: &GateContext, _: &EnterArena) -> Result<ArenaTicket, GateError> {
        let character_id = ctx.character().ok_or(GateError::CharacterRequired)?;
        Ok(ArenaTicket {
            character_id,
            queue_position: 1,
        })
    }
}

#[async_trait]
impl Handler<KickPlayer> for Arena {
    async fn handle(&self, _: &GateContext, _: &KickPlayer) -> Result<(), GateError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Short TTLs so the expiry path is visible in a few seconds.
fn demo_config() -> Result<LodestoneConfig, LodestoneError> {
    if let Ok(json) = std::env::var("LODESTONE_CONFIG") {
        return LodestoneConfig::from_json(&json);
    }
    Ok(LodestoneConfig {
        cache: CacheConfig {
            default_ttl: Duration::from_secs(3),
            sweep_interval: Duration::from_millis(250),
        },
        worker: WorkerConfig {
            poll_interval: Duration::from_secs(1),
            ..WorkerConfig::default()
        },
    })
}

/// Logs a response the way a client would receive it.
fn report<T: Serialize>(label: &str, result: &Result<T, GateError>) {
    match result {
        Ok(value) => match serde_json::to_string(value) {
            Ok(body) => tracing::info!(request = label, %body, "ok"),
            Err(e) => tracing::warn!(request = label, error = %e, "response not serializable"),
        },
        Err(e) => tracing::info!(request = label, error = %e, "refused"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lodestone=debug")),
        )
        .init();

    let identity = Arc::new(InMemoryIdentity::new());
    identity.register("mira", &["player"]);
    identity.register("oskar", &["player", "moderator"]);

    let profiles = Arc::new(InMemoryProfiles::new());
    let characters = Arc::new(InMemoryCharacters::new());
    characters.insert(CharacterProfile {
        id: CharacterId(11),
        account_id: AccountId(1),
        level: 4,
    });
    characters.insert(CharacterProfile {
        id: CharacterId(12),
        account_id: AccountId(1),
        level: 23,
    });

    let mut layer = SessionLayer::builder().config(demo_config()?).build(identity.clone());
    layer.start();
    let chain = layer.gate_chain(
        profiles,
        characters.clone(),
        Arc::new(CountingUnitOfWork::new()),
    );
    let arena = Arena {
        data: layer.data().clone(),
        characters,
    };

    let mira = UserId::from("mira");
    let oskar = UserId::from("oskar");
    let as_mira = || Some(mira.clone());

    // Anonymous callers stop at the first gate.
    let result = chain.execute(None, CancelSignal::new(), Leaderboard, &arena).await;
    report("leaderboard", &result);

    // No game session yet.
    let result = chain.execute(as_mira(), CancelSignal::new(), EnterArena, &arena).await;
    report("enter-arena", &result);

    layer.manager().set_session(&mira, AccountId(1), None).await?;
    layer.manager().set_session(&oskar, AccountId(2), None).await?;

    // C-11 is level 4 and bounces off the arena; C-12 gets in.
    for character_id in [CharacterId(11), CharacterId(12)] {
        let select = SelectCharacter { character_id };
        let result = chain.execute(as_mira(), CancelSignal::new(), select, &arena).await;
        report("select-character", &result);

        let result = chain.execute(as_mira(), CancelSignal::new(), EnterArena, &arena).await;
        report("enter-arena", &result);
    }

    let result = chain.execute(as_mira(), CancelSignal::new(), KickPlayer, &arena).await;
    report("kick-player", &result);
    let result = chain
        .execute(Some(oskar.clone()), CancelSignal::new(), KickPlayer, &arena)
        .await;
    report("kick-player", &result);

    layer.manager().revoke_session(&oskar).await?;

    // Let mira's session lapse and watch the worker clean up the claim.
    tokio::time::sleep(Duration::from_secs(5)).await;
    tracing::info!(
        mira = ?layer.manager().status(&mira),
        claim = ?identity.claim(&mira, lodestone::session::ACCOUNT_ID_CLAIM),
        "after expiry"
    );

    let drained = layer.shutdown().await?;
    tracing::info!(?drained, "bye");
    Ok(())
}
