use std::sync::Arc;

use tracing::info;

use crate::combat::directory::{CombatDirectory, CombatRoster};
use crate::effects::catalog::EffectCatalog;
use crate::effects::expiry::ExpiryIndex;
use crate::effects::handlers;
use crate::effects::instance::{ApplyParams, EffectInstance};
use crate::effects::registry::EffectRegistry;
use crate::effects::scheduler::{EffectScheduler, SchedulerConfig};
use crate::entities::ids::{EntityId, EntityKind, RoomId};
use crate::error::TickError;
use crate::net::messaging::{Messenger, Outbox};
use crate::persistence::store::{CharacterStore, MemoryStore};
use crate::world::random::{RandomSource, ThreadRandom};
use crate::world::tick::PeriodicScheduler;
use crate::world::time::{Clock, SystemClock, Timestamp};

/// Everything the effect engine shares, built once per process and passed
/// to every component that needs it.
pub struct EngineContext {
    registry: Arc<EffectRegistry>,
    expiry: Arc<ExpiryIndex>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    messenger: Arc<dyn Messenger>,
    combat: Arc<dyn CombatDirectory>,
    store: Arc<dyn CharacterStore>,
}

impl EngineContext {
    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn expiry(&self) -> &ExpiryIndex {
        &self.expiry
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn random(&self) -> &dyn RandomSource {
        self.random.as_ref()
    }

    pub fn messenger(&self) -> &dyn Messenger {
        self.messenger.as_ref()
    }

    pub fn combat(&self) -> &dyn CombatDirectory {
        self.combat.as_ref()
    }

    pub fn store(&self) -> &dyn CharacterStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Entry point for game actions.
    pub fn apply(
        &self,
        def_id: &str,
        caster: Option<EntityId>,
        target: EntityId,
        params: &ApplyParams,
    ) -> Option<Arc<EffectInstance>> {
        self.registry.apply(self, def_id, caster, target, params)
    }

    /// Name for narration: live participant, then persisted record, then a fallback.
    pub fn display_name(&self, id: Option<EntityId>, fallback: &str) -> String {
        let Some(id) = id else {
            return fallback.to_string();
        };
        if let Some(character) = self.combat.participant(id) {
            if let Ok(character) = character.lock() {
                return character.name.clone();
            }
        }
        let stored = match id.kind() {
            Some(EntityKind::Player(player)) => self
                .store
                .find_by_id(player)
                .ok()
                .flatten()
                .map(|record| record.name),
            Some(EntityKind::Mob(mob)) => self.store.mob_name(mob).ok().flatten(),
            None => None,
        };
        stored.unwrap_or_else(|| fallback.to_string())
    }

    /// Room observers of `id` are in: its combat, else its live or saved location.
    pub fn room_of(&self, id: EntityId) -> Option<RoomId> {
        if let Some(room) = self.combat.combat_room(id) {
            return Some(room);
        }
        if let Some(character) = self.combat.participant(id) {
            if let Ok(character) = character.lock() {
                if character.room.is_some() {
                    return character.room;
                }
            }
        }
        match id.kind() {
            Some(EntityKind::Player(player)) => self
                .store
                .find_by_id(player)
                .ok()
                .flatten()
                .and_then(|record| record.room),
            _ => None,
        }
    }

    /// Sends `to_target` to the target and `to_room` to its room, if known.
    pub fn narrate(&self, target: EntityId, to_target: Option<&str>, to_room: Option<&str>) {
        if let Some(text) = to_target {
            self.messenger.send_to(target, text);
        }
        if let Some(text) = to_room {
            if let Some(room) = self.room_of(target) {
                self.messenger.broadcast_room(room, text);
            }
        }
    }
}

pub struct EngineBuilder {
    catalog: EffectCatalog,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    messenger: Arc<dyn Messenger>,
    combat: Arc<dyn CombatDirectory>,
    store: Arc<dyn CharacterStore>,
    scheduler: SchedulerConfig,
    default_handlers: bool,
}

impl EngineBuilder {
    pub fn new(catalog: EffectCatalog) -> Self {
        Self {
            catalog,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            messenger: Arc::new(Outbox::new()),
            combat: Arc::new(CombatRoster::new()),
            store: Arc::new(MemoryStore::new()),
            scheduler: SchedulerConfig::default(),
            default_handlers: true,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    pub fn combat(mut self, combat: Arc<dyn CombatDirectory>) -> Self {
        self.combat = combat;
        self
    }

    pub fn store(mut self, store: Arc<dyn CharacterStore>) -> Self {
        self.store = store;
        self
    }

    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    /// Skips binding the built-in category handlers.
    pub fn without_default_handlers(mut self) -> Self {
        self.default_handlers = false;
        self
    }

    pub fn build(self) -> Engine {
        let expiry = Arc::new(ExpiryIndex::new());
        let registry = Arc::new(EffectRegistry::new(
            Arc::new(self.catalog),
            Arc::clone(&expiry),
        ));
        if self.default_handlers {
            handlers::register_defaults(&registry);
        }
        let context = Arc::new(EngineContext {
            registry,
            expiry,
            clock: self.clock,
            random: self.random,
            messenger: self.messenger,
            combat: self.combat,
            store: self.store,
        });
        let scheduler = Arc::new(EffectScheduler::new(Arc::clone(&context), self.scheduler));
        Engine { context, scheduler }
    }
}

/// The context plus its single scheduler.
pub struct Engine {
    context: Arc<EngineContext>,
    scheduler: Arc<EffectScheduler>,
}

impl Engine {
    pub fn builder(catalog: EffectCatalog) -> EngineBuilder {
        EngineBuilder::new(catalog)
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn scheduler(&self) -> &Arc<EffectScheduler> {
        &self.scheduler
    }

    /// Hooks the scheduler onto `facility`. Calling it again is a no-op.
    pub fn start(&self, facility: &dyn PeriodicScheduler) -> Result<bool, TickError> {
        let started = self.scheduler.initialize(facility)?;
        if started {
            info!(
                definitions = self.context.registry().catalog().len(),
                "effect engine started"
            );
        }
        Ok(started)
    }
}
