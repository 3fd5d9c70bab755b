use tracing::debug;

use crate::context::EngineContext;
use crate::effects::definition::{DebuffFlag, EffectDefinition, EffectParams, BLIND_FALLBACK_MAX_SECS};
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::{EffectInstance, RuntimeState};
use crate::effects::scaling;
use crate::error::EffectError;

struct Lines {
    on_target: &'static str,
    on_room: &'static str,
    off_target: &'static str,
    off_room: &'static str,
}

fn lines(flag: DebuffFlag) -> Lines {
    match flag {
        DebuffFlag::Blind => Lines {
            on_target: "You are blinded!",
            on_room: "{} is blinded!",
            off_target: "You can see again.",
            off_room: "{} can see again.",
        },
        DebuffFlag::Slow => Lines {
            on_target: "You feel yourself slowing down.",
            on_room: "{} begins to move sluggishly.",
            off_target: "You feel yourself speed up again.",
            off_room: "{} is moving normally again.",
        },
        DebuffFlag::Confused => Lines {
            on_target: "You feel very confused.",
            on_room: "{} looks confused.",
            off_target: "Your head clears.",
            off_room: "{} looks less confused.",
        },
        DebuffFlag::Paralyzed => Lines {
            on_target: "You are paralyzed!",
            on_room: "{} is paralyzed!",
            off_target: "You can move again.",
            off_room: "{} can move again.",
        },
        DebuffFlag::Cursed => Lines {
            on_target: "You feel a curse settle upon you.",
            on_room: "A dark aura surrounds {}.",
            off_target: "The curse upon you lifts.",
            off_room: "The dark aura around {} fades.",
        },
    }
}

fn fill(template: &str, name: &str) -> String {
    template.replacen("{}", name, 1)
}

/// Blind, slow, confusion, paralysis and curses: a timed flag with no
/// side effects beyond narration. Queries read the flag off the registry.
pub struct FlagDebuffHandler;

impl FlagDebuffHandler {
    /// Seconds the flag lasts: linear from the minimum toward the definition's
    /// duration (30s for blindness without one). A duration below the minimum
    /// shortens the flag as proficiency rises.
    pub fn duration_secs(
        def: &EffectDefinition,
        flag: DebuffFlag,
        min_secs: f64,
        proficiency: scaling::Proficiency,
    ) -> f64 {
        let max_secs = if def.duration_secs > 0.0 {
            def.duration_secs
        } else if flag == DebuffFlag::Blind {
            BLIND_FALLBACK_MAX_SECS
        } else {
            min_secs
        };
        scaling::linear_duration(min_secs, max_secs, proficiency)
    }
}

impl EffectHandler for FlagDebuffHandler {
    fn name(&self) -> &'static str {
        "flag_debuff"
    }

    fn apply(
        &self,
        _ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        let EffectParams::Flag(params) = &def.params else {
            debug!(def = %def.id, "flag handler bound to non-flag params");
            return Ok(None);
        };
        let proficiency = request.params.proficiency();
        let secs = Self::duration_secs(def, params.flag, params.min_duration_secs, proficiency);

        let mut state = RuntimeState::from_params(request.params);
        if let Some((base, max)) = params.fail_chance {
            state.fail_chance = Some(scaling::fail_chance(base, max, proficiency).clamp(0.0, 1.0));
        }
        let instance = EffectInstance::new(
            def.id.clone(),
            request.caster,
            request.target,
            request.now,
            scaling::secs_to_ms(secs),
            def.priority,
            state,
        );
        Ok(Some(instance))
    }

    fn admitted(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        let EffectParams::Flag(params) = &def.params else {
            return Ok(());
        };
        let text = lines(params.flag);
        let name = ctx.display_name(Some(instance.target()), "someone");
        ctx.narrate(instance.target(), Some(text.on_target), Some(&fill(text.on_room, &name)));
        Ok(())
    }

    fn expire(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        let EffectParams::Flag(params) = &def.params else {
            return Ok(());
        };
        let text = lines(params.flag);
        let name = ctx.display_name(Some(instance.target()), "someone");
        ctx.narrate(instance.target(), Some(text.off_target), Some(&fill(text.off_room, &name)));
        Ok(())
    }
}
