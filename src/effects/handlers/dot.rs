use tracing::debug;

use crate::combat::damage::{self, HpChange};
use crate::context::EngineContext;
use crate::effects::definition::{DotParams, EffectDefinition, EffectParams};
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::{EffectInstance, RuntimeState};
use crate::effects::scaling::Proficiency;
use crate::entities::ids::EntityId;
use crate::error::EffectError;
use crate::world::time::Timestamp;

/// Persisted players can be ground down to zero by damage over time.
const OFFLINE_FLOOR: u32 = 0;

/// Periodic damage: one hit on apply, then one per tick interval.
pub struct DotHandler;

impl EffectHandler for DotHandler {
    fn name(&self) -> &'static str {
        "dot"
    }

    fn apply(
        &self,
        _ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        start(def, request)
    }

    fn admitted(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        begin(ctx, def, instance)
    }

    fn tick(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
        now: Timestamp,
    ) -> Result<(), EffectError> {
        tick_due(ctx, def, instance, now)?;
        Ok(())
    }

    fn expire(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        finish(ctx, def, instance.target());
        Ok(())
    }
}

pub(crate) fn dot_params(def: &EffectDefinition) -> Option<&DotParams> {
    match &def.params {
        EffectParams::Dot(dot) => Some(dot),
        EffectParams::SpreadingDot { dot, .. } => Some(dot),
        _ => None,
    }
}

pub(crate) fn start(
    def: &EffectDefinition,
    request: ApplyRequest<'_>,
) -> Result<Option<EffectInstance>, EffectError> {
    if dot_params(def).is_none() {
        debug!(def = %def.id, "dot handler bound to non-dot params");
        return Ok(None);
    }
    let proficiency = request.params.proficiency();
    let mut state = RuntimeState::from_params(request.params);
    state.last_tick = Some(request.now);
    let instance = EffectInstance::new(
        def.id.clone(),
        request.caster,
        request.target,
        request.now,
        def.scaled_duration_ms(proficiency),
        def.priority,
        state,
    );
    Ok(Some(instance))
}

/// Announces an admitted affliction and lands its first hit.
pub(crate) fn begin(
    ctx: &EngineContext,
    def: &EffectDefinition,
    instance: &EffectInstance,
) -> Result<(), EffectError> {
    let target = instance.target();
    let proficiency = instance.state()?.proficiency;
    let target_name = ctx.display_name(Some(target), "someone");
    ctx.narrate(
        target,
        Some(&format!("You are afflicted by {}!", def.name)),
        Some(&format!("{} is afflicted by {}!", target_name, def.name)),
    );
    hit(ctx, def, target, proficiency)?;
    Ok(())
}

/// Runs one damage tick if the interval has passed since the last one.
/// Returns the damage dealt, or `None` when the tick was not due.
pub(crate) fn tick_due(
    ctx: &EngineContext,
    def: &EffectDefinition,
    instance: &EffectInstance,
    now: Timestamp,
) -> Result<Option<HpChange>, EffectError> {
    let Some(dot) = dot_params(def) else {
        return Ok(None);
    };
    let proficiency = {
        let mut state = instance.state()?;
        let due = state
            .last_tick
            .map_or(true, |last| now.since(last) >= dot.tick_interval_ms);
        if !due {
            return Ok(None);
        }
        state.last_tick = Some(now);
        state.proficiency
    };
    hit(ctx, def, instance.target(), proficiency)
}

fn hit(
    ctx: &EngineContext,
    def: &EffectDefinition,
    target: EntityId,
    proficiency: Proficiency,
) -> Result<Option<HpChange>, EffectError> {
    let Some(dice) = def.scaled_dice(proficiency) else {
        debug!(def = %def.id, "dot without dice skips its roll");
        return Ok(None);
    };
    let amount = dice.roll(ctx.random());
    let change = damage::deal_damage(ctx, target, amount, OFFLINE_FLOOR)?;
    if change.amount > 0 {
        let damage_type = dot_params(def).map_or("magical", |dot| dot.damage_type.as_str());
        ctx.narrate(
            target,
            Some(&format!(
                "{} deals {} {} damage to you.",
                def.name, change.amount, damage_type
            )),
            None,
        );
    }
    Ok(Some(change))
}

pub(crate) fn finish(ctx: &EngineContext, def: &EffectDefinition, target: EntityId) {
    let target_name = ctx.display_name(Some(target), "someone");
    ctx.narrate(
        target,
        Some(&format!("The {} afflicting you subsides.", def.name)),
        Some(&format!("The {} afflicting {} subsides.", def.name, target_name)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::definition::{EffectCategory, ProficiencyImpact};
    use crate::effects::dice::DiceSpec;
    use crate::effects::instance::ApplyParams;
    use crate::entities::ids::RoomId;
    use crate::persistence::store::CharacterStore;
    use crate::test_support::Harness;

    fn acid() -> EffectDefinition {
        EffectDefinition::new(
            "acid",
            EffectCategory::Dot,
            EffectParams::Dot(DotParams {
                tick_interval_ms: 3_000,
                damage_type: "acid".into(),
            }),
        )
        .with_name("acid arrow")
        .with_duration_secs(15.0)
        .with_dice(DiceSpec::new(3, 6))
        .with_impact(ProficiencyImpact::DiceMultiplier)
    }

    #[test]
    fn damages_on_apply_then_self_gates() {
        let harness = Harness::new(vec![acid()]);
        let goblin = harness.spawn(EntityId::mob(7), "goblin", 100, 1, RoomId(2));
        let instance = harness
            .ctx()
            .apply(
                "acid",
                Some(EntityId::player(1)),
                EntityId::mob(7),
                &ApplyParams::new().with_proficiency(50),
            )
            .expect("instance");
        // one scaled die showing 3
        assert_eq!(goblin.lock().expect("lock").vitals.hp, 97);

        let def = acid();
        let early = harness.advance_secs(2);
        assert!(tick_due(harness.ctx(), &def, &instance, early).expect("tick").is_none());

        let due = harness.advance_secs(1);
        let change = tick_due(harness.ctx(), &def, &instance, due).expect("tick").expect("fired");
        assert_eq!(change.amount, 3);
        assert_eq!(goblin.lock().expect("lock").vitals.hp, 94);
    }

    #[test]
    fn offline_player_floors_at_zero() {
        let harness = Harness::new(vec![acid().with_dice(DiceSpec::new(20, 6))]);
        harness.persist(3, "Dara", 10);
        harness
            .ctx()
            .apply("acid", None, EntityId::player(3), &ApplyParams::new().with_proficiency(100))
            .expect("instance");
        let saved = harness
            .store
            .find_by_id(3)
            .expect("find")
            .expect("record");
        assert_eq!(saved.vitals.hp, 0);
    }

    #[test]
    fn expire_narrates_to_target_and_room() {
        let harness = Harness::new(vec![acid()]);
        harness.spawn(EntityId::player(4), "Eve", 100, 0, RoomId(9));
        let instance = harness
            .ctx()
            .apply("acid", None, EntityId::player(4), &ApplyParams::new())
            .expect("instance");
        harness.outbox.drain();

        harness.ctx().registry().expire_instance(harness.ctx(), instance.id());
        assert_eq!(
            harness.outbox.lines_for(EntityId::player(4)),
            vec!["The acid arrow afflicting you subsides.".to_string()]
        );
        assert_eq!(
            harness.outbox.room_lines(RoomId(9)),
            vec!["The acid arrow afflicting Eve subsides.".to_string()]
        );
    }
}
