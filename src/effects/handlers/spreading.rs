use tracing::debug;

use crate::context::EngineContext;
use crate::effects::definition::{EffectDefinition, EffectParams};
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::handlers::dot;
use crate::effects::instance::{ApplyParams, EffectInstance};
use crate::effects::queries;
use crate::error::EffectError;
use crate::world::time::Timestamp;

/// A dot that may jump to an ally of its victim each time it burns.
pub struct SpreadingDotHandler;

impl EffectHandler for SpreadingDotHandler {
    fn name(&self) -> &'static str {
        "spreading_dot"
    }

    fn apply(
        &self,
        _ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        dot::start(def, request)
    }

    fn admitted(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        dot::begin(ctx, def, instance)
    }

    fn tick(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
        now: Timestamp,
    ) -> Result<(), EffectError> {
        let Some(change) = dot::tick_due(ctx, def, instance, now)? else {
            return Ok(());
        };
        if change.amount == 0 {
            return Ok(());
        }
        let EffectParams::SpreadingDot { spread_chance, .. } = def.params else {
            return Ok(());
        };
        if !ctx.random().chance(spread_chance) {
            return Ok(());
        }
        spread(ctx, def, instance);
        Ok(())
    }

    fn expire(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        dot::finish(ctx, def, instance.target());
        Ok(())
    }
}

fn spread(ctx: &EngineContext, def: &EffectDefinition, instance: &EffectInstance) {
    let candidates: Vec<_> = ctx
        .combat()
        .allies_of(instance.target())
        .into_iter()
        .filter(|ally| !queries::has_effect(ctx, *ally, def.id.as_str()))
        .collect();
    if candidates.is_empty() {
        return;
    }
    let next = candidates[ctx.random().pick(candidates.len()).min(candidates.len() - 1)];

    let Some(state) = instance.snapshot() else {
        return;
    };
    let params = ApplyParams {
        proficiency: Some(state.proficiency),
        caster_level: Some(state.caster_level),
        ..ApplyParams::default()
    };
    let from = ctx.display_name(Some(instance.target()), "someone");
    let to = ctx.display_name(Some(next), "someone");
    if ctx.apply(def.id.as_str(), instance.caster(), next, &params).is_some() {
        debug!(def = %def.id, from = %instance.target(), to = %next, "effect spread");
        ctx.narrate(
            next,
            Some(&format!("The {} spreads from {} to you!", def.name, from)),
            Some(&format!("The {} spreads from {} to {}!", def.name, from, to)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::definition::{DotParams, EffectCategory};
    use crate::effects::dice::DiceSpec;
    use crate::entities::ids::{EntityId, RoomId};
    use crate::test_support::Harness;
    use crate::world::random::FixedRandom;
    use std::sync::Arc;

    fn burning_hands(spread_chance: f64) -> EffectDefinition {
        EffectDefinition::new(
            "burning_hands",
            EffectCategory::BurningHands,
            EffectParams::SpreadingDot {
                dot: DotParams {
                    tick_interval_ms: 3_000,
                    damage_type: "fire".into(),
                },
                spread_chance,
            },
        )
        .with_name("burning hands")
        .with_duration_secs(12.0)
        .with_dice(DiceSpec::new(1, 4))
    }

    #[test]
    fn spreads_to_an_unburnt_ally_on_a_damaging_tick() {
        let harness =
            Harness::with_random(vec![burning_hands(1.0)], Arc::new(FixedRandom::new(2, true)));
        harness.spawn(EntityId::mob(1), "orc", 50, 1, RoomId(4));
        let ally = harness.spawn(EntityId::mob(2), "orc shaman", 50, 1, RoomId(4));
        harness.spawn(EntityId::player(9), "Aria", 50, 0, RoomId(4));

        let caster = Some(EntityId::player(9));
        let params = ApplyParams::new().with_proficiency(80);
        let first = harness
            .ctx()
            .apply("burning_hands", caster, EntityId::mob(1), &params)
            .expect("instance");

        let def = burning_hands(1.0);
        let later = harness.advance_secs(3);
        SpreadingDotHandler
            .tick(harness.ctx(), &def, &first, later)
            .expect("tick");

        let spread = harness
            .ctx()
            .registry()
            .active_for_target(EntityId::mob(2), later);
        assert_eq!(spread.len(), 1);
        assert_eq!(spread[0].caster(), caster);
        assert_eq!(spread[0].snapshot().map(|s| s.proficiency.value()), Some(80));
        assert_eq!(ally.lock().expect("lock").vitals.hp, 48);
        assert!(!queries::has_effect(harness.ctx(), EntityId::player(9), "burning_hands"));
    }

    #[test]
    fn no_spread_when_the_roll_fails() {
        let harness = Harness::new(vec![burning_hands(0.25)]);
        harness.spawn(EntityId::mob(1), "orc", 50, 1, RoomId(4));
        harness.spawn(EntityId::mob(2), "orc shaman", 50, 1, RoomId(4));
        let first = harness
            .ctx()
            .apply("burning_hands", None, EntityId::mob(1), &ApplyParams::new())
            .expect("instance");

        let later = harness.advance_secs(3);
        SpreadingDotHandler
            .tick(harness.ctx(), &burning_hands(0.25), &first, later)
            .expect("tick");
        assert!(!queries::has_effect(harness.ctx(), EntityId::mob(2), "burning_hands"));
    }
}
