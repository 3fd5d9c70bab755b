use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::combat::directory::CombatRoster;
use crate::context::{Engine, EngineContext};
use crate::effects::catalog::EffectCatalog;
use crate::effects::definition::EffectDefinition;
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::{EffectInstance, RuntimeState};
use crate::effects::scheduler::SchedulerConfig;
use crate::entities::character::{Character, SharedCharacter, Vitals};
use crate::entities::ids::{EntityId, RoomId};
use crate::error::EffectError;
use crate::net::messaging::Outbox;
use crate::persistence::store::{CharacterRecord, MemoryStore};
use crate::world::random::{FixedRandom, RandomSource};
use crate::world::time::{ManualClock, Timestamp};

pub(crate) const START: Timestamp = Timestamp(1_000_000);

/// An engine over in-memory collaborators with handles to each of them.
pub(crate) struct Harness {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub roster: Arc<CombatRoster>,
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<Outbox>,
}

impl Harness {
    pub fn new(definitions: Vec<EffectDefinition>) -> Self {
        let random = Arc::new(FixedRandom::new(3, false));
        Self::build(definitions, random, true, SchedulerConfig::default())
    }

    pub fn with_random(definitions: Vec<EffectDefinition>, random: Arc<dyn RandomSource>) -> Self {
        Self::build(definitions, random, true, SchedulerConfig::default())
    }

    /// No handlers bound; tests register their own.
    pub fn bare(definitions: Vec<EffectDefinition>) -> Self {
        Self::bare_with(definitions, SchedulerConfig::default())
    }

    pub fn bare_with(definitions: Vec<EffectDefinition>, config: SchedulerConfig) -> Self {
        Self::build(definitions, Arc::new(FixedRandom::new(3, false)), false, config)
    }

    fn build(
        definitions: Vec<EffectDefinition>,
        random: Arc<dyn RandomSource>,
        default_handlers: bool,
        config: SchedulerConfig,
    ) -> Self {
        let catalog = EffectCatalog::from_definitions(definitions).expect("catalog");
        let clock = Arc::new(ManualClock::new(START));
        let roster = Arc::new(CombatRoster::new());
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(Outbox::new());
        let mut builder = Engine::builder(catalog)
            .clock(clock.clone())
            .random(random)
            .combat(roster.clone())
            .store(store.clone())
            .messenger(outbox.clone())
            .scheduler(config);
        if !default_handlers {
            builder = builder.without_default_handlers();
        }
        Self {
            engine: builder.build(),
            clock,
            roster,
            store,
            outbox,
        }
    }

    pub fn ctx(&self) -> &EngineContext {
        self.engine.context()
    }

    pub fn now(&self) -> Timestamp {
        self.ctx().now()
    }

    pub fn advance_secs(&self, secs: u64) -> Timestamp {
        self.clock.advance(Duration::from_secs(secs))
    }

    /// Puts a live character into combat.
    pub fn spawn(&self, id: EntityId, name: &str, hp: u32, alliance: u8, room: RoomId) -> SharedCharacter {
        let character = Character::new(id, name, Vitals::full(hp, 50, 50))
            .in_room(room)
            .into_shared();
        self.roster.join(character.clone(), alliance, room);
        character
    }

    /// Saves an out-of-combat player record.
    pub fn persist(&self, id: u32, name: &str, hp: u32) {
        self.store
            .insert(CharacterRecord::new(id, name, Vitals::full(hp, 50, 50)).in_room(RoomId(3)))
            .expect("insert");
    }
}

/// Handler that counts its calls and can be told to panic.
#[derive(Default)]
pub(crate) struct Recording {
    pub duration_ms: u64,
    pub panic_on_tick: bool,
    pub panic_on_expire: bool,
    pub applied: AtomicUsize,
    pub admitted: AtomicUsize,
    pub ticked: AtomicUsize,
    pub expired: AtomicUsize,
    pub evicted: AtomicUsize,
}

impl Recording {
    pub fn lasting(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            ..Self::default()
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl EffectHandler for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn apply(
        &self,
        _ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(Some(EffectInstance::new(
            def.id.clone(),
            request.caster,
            request.target,
            request.now,
            self.duration_ms,
            def.priority,
            RuntimeState::from_params(request.params),
        )))
    }

    fn admitted(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        self.admitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn tick(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
        _now: Timestamp,
    ) -> Result<(), EffectError> {
        if self.panic_on_tick {
            panic!("tick exploded");
        }
        self.ticked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn expire(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        self.expired.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_expire {
            panic!("expire exploded");
        }
        Ok(())
    }

    fn evicted(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        self.evicted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
