use crate::context::EngineContext;
use crate::effects::definition::{EffectDefinition, EffectParams, FLYING_MIN_DURATION_SECS};
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::{EffectInstance, RuntimeState};
use crate::effects::scaling;
use crate::error::EffectError;

pub struct FlyingHandler;

impl EffectHandler for FlyingHandler {
    fn name(&self) -> &'static str {
        "flying"
    }

    fn apply(
        &self,
        _ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        let min_secs = match def.params {
            EffectParams::Flying { min_duration_secs } => min_duration_secs,
            _ => FLYING_MIN_DURATION_SECS,
        };
        let max_secs = if def.duration_secs > 0.0 {
            def.duration_secs
        } else {
            min_secs
        };
        let secs = scaling::linear_duration(min_secs, max_secs, request.params.proficiency());
        let instance = EffectInstance::new(
            def.id.clone(),
            request.caster,
            request.target,
            request.now,
            scaling::secs_to_ms(secs),
            def.priority,
            RuntimeState::from_params(request.params),
        );
        Ok(Some(instance))
    }

    fn admitted(
        &self,
        ctx: &EngineContext,
        _def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        let name = ctx.display_name(Some(instance.target()), "someone");
        ctx.narrate(
            instance.target(),
            Some("You rise up into the air."),
            Some(&format!("{} rises up into the air.", name)),
        );
        Ok(())
    }

    fn expire(
        &self,
        ctx: &EngineContext,
        _def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        let name = ctx.display_name(Some(instance.target()), "someone");
        ctx.narrate(
            instance.target(),
            Some("You float gently back to the ground."),
            Some(&format!("{} floats gently back to the ground.", name)),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::definition::EffectCategory;
    use crate::effects::instance::ApplyParams;
    use crate::entities::ids::{EntityId, RoomId};
    use crate::test_support::Harness;

    #[test]
    fn duration_scales_from_one_minute() {
        let fly = EffectDefinition::new(
            "fly",
            EffectCategory::Flying,
            EffectParams::Flying {
                min_duration_secs: FLYING_MIN_DURATION_SECS,
            },
        )
        .with_duration_secs(300.0);
        let harness = Harness::new(vec![fly]);
        harness.spawn(EntityId::player(1), "Aria", 30, 0, RoomId(1));

        let params = ApplyParams::new().with_proficiency(100);
        let instance = harness
            .ctx()
            .apply("fly", None, EntityId::player(1), &params)
            .expect("instance");
        assert_eq!(instance.remaining_ms(harness.now()), Some(300_000));

        let params = ApplyParams::new().with_proficiency(50);
        let instance = harness
            .ctx()
            .apply("fly", None, EntityId::player(1), &params)
            .expect("instance");
        assert_eq!(instance.remaining_ms(harness.now()), Some(180_000));
    }

    #[test]
    fn short_flights_shrink_with_skill() {
        let fly = EffectDefinition::new(
            "hop",
            EffectCategory::Flying,
            EffectParams::Flying {
                min_duration_secs: FLYING_MIN_DURATION_SECS,
            },
        )
        .with_duration_secs(30.0);
        let harness = Harness::new(vec![fly]);
        harness.spawn(EntityId::player(1), "Aria", 30, 0, RoomId(1));

        let params = ApplyParams::new().with_proficiency(100);
        let instance = harness
            .ctx()
            .apply("hop", None, EntityId::player(1), &params)
            .expect("instance");
        assert_eq!(instance.remaining_ms(harness.now()), Some(30_000));
    }
}
