use crate::context::EngineContext;
use crate::effects::definition::EffectDefinition;
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::{EffectInstance, RuntimeState};
use crate::error::EffectError;

pub const INVISIBILITY: &str = "invisibility";
pub const SEE_INVISIBILITY: &str = "see_invisibility";
pub const GM_INVISIBILITY: &str = "gm_invisibility";
pub const INSIGHT: &str = "insight";

pub const IDS: [&str; 4] = [INVISIBILITY, SEE_INVISIBILITY, GM_INVISIBILITY, INSIGHT];

/// Presence-only effects read by the visibility queries. Bound by id, so
/// the catalog category does not matter.
pub struct VisibilityHandler;

fn lines(def_id: &str) -> Option<(&'static str, &'static str, &'static str, &'static str)> {
    match def_id {
        INVISIBILITY => Some((
            "You fade out of sight.",
            "fades out of sight.",
            "You fade back into view.",
            "fades back into view.",
        )),
        SEE_INVISIBILITY => Some((
            "Your eyes tingle.",
            "'s eyes shimmer briefly.",
            "Your eyes stop tingling.",
            "'s eyes dim.",
        )),
        INSIGHT => Some((
            "Your mind sharpens to your foes' condition.",
            "looks more perceptive.",
            "Your battle insight fades.",
            "looks less perceptive.",
        )),
        _ => None,
    }
}

fn joined(name: &str, tail: &str) -> String {
    if tail.starts_with('\'') {
        format!("{}{}", name, tail)
    } else {
        format!("{} {}", name, tail)
    }
}

impl EffectHandler for VisibilityHandler {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn apply(
        &self,
        _ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        let instance = EffectInstance::new(
            def.id.clone(),
            request.caster,
            request.target,
            request.now,
            def.scaled_duration_ms(request.params.proficiency()),
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
        // gm invisibility is silent
        if let Some((to_target, to_room, _, _)) = lines(def.id.as_str()) {
            let name = ctx.display_name(Some(instance.target()), "someone");
            ctx.narrate(instance.target(), Some(to_target), Some(&joined(&name, to_room)));
        }
        Ok(())
    }

    fn expire(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        if let Some((_, _, to_target, to_room)) = lines(def.id.as_str()) {
            let name = ctx.display_name(Some(instance.target()), "someone");
            ctx.narrate(instance.target(), Some(to_target), Some(&joined(&name, to_room)));
        }
        Ok(())
    }
}
