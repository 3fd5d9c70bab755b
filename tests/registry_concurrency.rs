//! Concurrent applies against one target through the public engine API.

use std::sync::Arc;
use std::thread;

use mudfx::combat::directory::CombatRoster;
use mudfx::effects::definition::{EffectCategory, EffectDefinition, EffectParams, StackPolicy};
use mudfx::entities::character::{Character, SharedCharacter, Vitals};
use mudfx::entities::ids::{EntityId, RoomId};
use mudfx::entities::stats::{ModifierOp, Stat};
use mudfx::persistence::store::{CharacterRecord, CharacterStore, MemoryStore};
use mudfx::world::time::{ManualClock, Timestamp};
use mudfx::{ApplyParams, Engine, EffectCatalog};

const THREADS: usize = 8;
const CASTS_PER_THREAD: usize = 25;

fn bless(policy: StackPolicy) -> EffectDefinition {
    EffectDefinition::new(
        "bless",
        EffectCategory::Modifier,
        EffectParams::Modifier {
            stat: Stat::Strength,
            op: ModifierOp::Add,
            value: 2.0,
        },
    )
    .with_name("bless")
    .with_duration_secs(30.0)
    .with_stack_policy(policy)
}

fn engine_with_target(policy: StackPolicy) -> (Engine, SharedCharacter) {
    let catalog = EffectCatalog::from_definitions(vec![bless(policy)]).expect("catalog");
    let roster = Arc::new(CombatRoster::new());
    let knight = Character::new(EntityId::player(1), "Aldric", Vitals::full(80, 20, 40))
        .in_room(RoomId(5))
        .into_shared();
    roster.join(knight.clone(), 0, RoomId(5));
    let engine = Engine::builder(catalog)
        .clock(Arc::new(ManualClock::new(Timestamp::from_secs(100))))
        .combat(roster)
        .build();
    (engine, knight)
}

/// Every thread casts from `caster(i)` at the same target.
fn cast_concurrently(engine: &Engine, caster: impl Fn(usize) -> EntityId + Sync) -> usize {
    let ctx = engine.context();
    thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let caster = caster(i);
                scope.spawn(move || {
                    ctx.apply("bless", Some(caster), EntityId::player(1), &ApplyParams::new())
                        .is_some()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("apply thread"))
            .filter(|admitted| *admitted)
            .count()
    })
}

fn modifier_count(knight: &SharedCharacter) -> usize {
    knight
        .lock()
        .expect("lock")
        .stats
        .modifiers_for(Stat::Strength)
        .len()
}

#[test]
fn refresh_from_one_caster_leaves_one_instance() {
    let (engine, knight) = engine_with_target(StackPolicy::Refresh);
    let admitted = cast_concurrently(&engine, |_| EntityId::player(2));
    assert_eq!(admitted, THREADS);

    let ctx = engine.context();
    let active = ctx.registry().active_for_target(EntityId::player(1), ctx.now());
    assert_eq!(active.len(), 1);
    assert_eq!(modifier_count(&knight), 1);
}

#[test]
fn stack_keeps_every_instance() {
    let (engine, knight) = engine_with_target(StackPolicy::Stack);
    let admitted = cast_concurrently(&engine, |_| EntityId::player(2));
    assert_eq!(admitted, THREADS);

    let ctx = engine.context();
    assert_eq!(ctx.registry().active_for_target(EntityId::player(1), ctx.now()).len(), THREADS);
    assert_eq!(modifier_count(&knight), THREADS);
    let strength = knight.lock().expect("lock").stats.stat(Stat::Strength, ctx.now());
    assert_eq!(strength, 2.0 * THREADS as f64);
}

#[test]
fn unique_admits_exactly_one_caster() {
    let (engine, knight) = engine_with_target(StackPolicy::Unique);
    let admitted = cast_concurrently(&engine, |i| EntityId::player(10 + i as u32));
    assert_eq!(admitted, 1);

    let ctx = engine.context();
    assert_eq!(ctx.registry().active_for_target(EntityId::player(1), ctx.now()).len(), 1);
    // losers of the admission race roll their modifier back
    assert_eq!(modifier_count(&knight), 1);
}

#[test]
fn offline_player_keeps_one_saved_modifier_per_instance() {
    let catalog = EffectCatalog::from_definitions(vec![bless(StackPolicy::Stack)]).expect("catalog");
    let store = Arc::new(MemoryStore::new());
    store
        .insert(CharacterRecord::new(5, "Brenna", Vitals::full(60, 20, 40)))
        .expect("insert");
    let engine = Engine::builder(catalog)
        .clock(Arc::new(ManualClock::new(Timestamp::from_secs(100))))
        .store(store.clone())
        .build();
    let ctx = engine.context();

    let instances: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    (0..CASTS_PER_THREAD)
                        .filter_map(|_| {
                            ctx.apply("bless", None, EntityId::player(5), &ApplyParams::new())
                        })
                        .map(|instance| instance.id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("apply thread"))
            .collect()
    });
    assert_eq!(instances.len(), THREADS * CASTS_PER_THREAD);
    assert_eq!(ctx.registry().len(), instances.len());
    assert_eq!(store.load_modifiers(5).expect("load").len(), instances.len());

    thread::scope(|scope| {
        for chunk in instances.chunks(CASTS_PER_THREAD) {
            scope.spawn(move || {
                for id in chunk {
                    ctx.registry().expire_instance(ctx, *id);
                }
            });
        }
    });
    assert!(ctx.registry().is_empty());
    assert!(store.load_modifiers(5).expect("load").is_empty());
}
