use tracing::debug;

use crate::combat::damage;
use crate::context::EngineContext;
use crate::effects::definition::{EffectDefinition, EffectParams};
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::EffectInstance;
use crate::effects::scaling;
use crate::error::EffectError;

/// Out-of-combat players keep at least one hit point after an instant hit.
const OFFLINE_FLOOR: u32 = 1;

fn roll(ctx: &EngineContext, def: &EffectDefinition, request: &ApplyRequest<'_>) -> i64 {
    match def.scaled_dice(request.params.proficiency()) {
        Some(dice) => i64::from(dice.roll(ctx.random())),
        None => {
            debug!(def = %def.id, "instant effect without dice skips its roll");
            0
        }
    }
}

fn clamp_amount(amount: i64) -> u32 {
    u32::try_from(amount.max(0)).unwrap_or(u32::MAX)
}

fn hurt(
    ctx: &EngineContext,
    def: &EffectDefinition,
    request: &ApplyRequest<'_>,
    amount: u32,
) -> Result<(), EffectError> {
    let change = damage::deal_damage(ctx, request.target, amount, OFFLINE_FLOOR)?;
    let target_name = ctx.display_name(Some(request.target), "someone");
    ctx.narrate(
        request.target,
        Some(&format!("{} hits you for {} damage!", def.name, change.amount)),
        Some(&format!("{} is struck by {}!", target_name, def.name)),
    );
    Ok(())
}

fn mend(
    ctx: &EngineContext,
    def: &EffectDefinition,
    request: &ApplyRequest<'_>,
    amount: u32,
) -> Result<(), EffectError> {
    let change = damage::restore_hp(ctx, request.target, amount)?;
    ctx.narrate(
        request.target,
        Some(&format!("{} restores {} hit points.", def.name, change.amount)),
        None,
    );
    Ok(())
}

/// Dice plus bonus, scaled by the call's damage multiplier. Resolves in `apply`.
pub struct InstantDamageHandler;

impl EffectHandler for InstantDamageHandler {
    fn name(&self) -> &'static str {
        "instant_damage"
    }

    fn apply(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        let bonus = match def.params {
            EffectParams::InstantDamage { bonus } => i64::from(bonus),
            _ => 0,
        };
        let raw = roll(ctx, def, &request) + bonus;
        let amount = (raw as f64 * request.params.damage_multiplier()).round() as i64;
        let amount = clamp_amount(amount);
        if amount > 0 {
            hurt(ctx, def, &request, amount)?;
        }
        Ok(None)
    }
}

/// Dice plus `level_multiplier * caster_level` plus bonus, capped at max hp.
pub struct InstantHealHandler;

impl EffectHandler for InstantHealHandler {
    fn name(&self) -> &'static str {
        "instant_heal"
    }

    fn apply(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        let bonus = match def.params {
            EffectParams::InstantHeal { bonus } => i64::from(bonus),
            _ => 0,
        };
        let level = i64::from(def.level_multiplier) * i64::from(request.params.caster_level());
        let amount = clamp_amount(roll(ctx, def, &request) + level + bonus);
        if amount > 0 {
            mend(ctx, def, &request, amount)?;
        }
        Ok(None)
    }
}

/// Cause wounds: hurts the living, heals the undead.
pub struct WoundsHandler;

impl EffectHandler for WoundsHandler {
    fn name(&self) -> &'static str {
        "wounds"
    }

    fn apply(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        let proficiency = request.params.proficiency();
        let bonus = scaling::level_bonus(request.params.caster_level(), proficiency);
        let amount = clamp_amount(roll(ctx, def, &request) + i64::from(bonus));
        if amount == 0 {
            return Ok(None);
        }
        let undead = request.params.target_is_undead
            || ctx
                .combat()
                .participant(request.target)
                .and_then(|character| character.lock().ok().map(|c| c.undead))
                .unwrap_or(false);
        if undead {
            mend(ctx, def, &request, amount)?;
        } else {
            hurt(ctx, def, &request, amount)?;
        }
        Ok(None)
    }
}
