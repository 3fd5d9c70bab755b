use crate::context::EngineContext;
use crate::effects::definition::{EffectDefinition, EffectParams, ProficiencyImpact};
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::{EffectInstance, RuntimeState};
use crate::effects::scaling;
use crate::error::EffectError;

/// Changes how a weapon family behaves while active. Combat asks for the
/// infusion through `queries::active_infusion`.
pub struct InfusionHandler;

impl InfusionHandler {
    /// Infusions scale their whole duration with proficiency, not half of it.
    pub fn duration_ms(def: &EffectDefinition, proficiency: scaling::Proficiency) -> u64 {
        let base = def.base_duration_ms();
        if def.has_impact(ProficiencyImpact::Duration) {
            scaling::proportional_duration_ms(base, proficiency)
        } else {
            base
        }
    }
}

impl EffectHandler for InfusionHandler {
    fn name(&self) -> &'static str {
        "weapon_infusion"
    }

    fn apply(
        &self,
        _ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        if !matches!(def.params, EffectParams::Infusion(_)) {
            return Ok(None);
        }
        let proficiency = request.params.proficiency();
        let instance = EffectInstance::new(
            def.id.clone(),
            request.caster,
            request.target,
            request.now,
            Self::duration_ms(def, proficiency),
            def.priority,
            RuntimeState::from_params(request.params),
        );
        Ok(Some(instance))
    }

    fn admitted(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        let EffectParams::Infusion(params) = &def.params else {
            return Ok(());
        };
        ctx.narrate(
            instance.target(),
            Some(&format!(
                "Your {} weapons hum with {} energy.",
                params.weapon_family.to_ascii_lowercase(),
                params.infusion_type.to_ascii_lowercase()
            )),
            None,
        );
        Ok(())
    }

    fn expire(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        ctx.narrate(
            instance.target(),
            Some(&format!("The {} fades from your weapons.", def.name)),
            None,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::definition::{EffectCategory, InfusionParams};
    use crate::effects::scaling::Proficiency;
    use crate::entities::stats::Stat;

    #[test]
    fn proportional_duration_only_with_impact() {
        let def = EffectDefinition::new(
            "arcane_edge",
            EffectCategory::WeaponInfusion,
            EffectParams::Infusion(InfusionParams {
                weapon_family: "SWORD".into(),
                infusion_type: "ARCANE".into(),
                attack_stat: Stat::Intelligence,
                defense_stat: Stat::Armor,
                ranged: false,
                aoe: false,
            }),
        )
        .with_duration_secs(600.0);
        assert_eq!(InfusionHandler::duration_ms(&def, Proficiency::new(25)), 600_000);

        let def = def.with_impact(ProficiencyImpact::Duration);
        assert_eq!(InfusionHandler::duration_ms(&def, Proficiency::new(25)), 150_000);
        assert_eq!(InfusionHandler::duration_ms(&def, Proficiency::MIN), 6_000);
    }
}
