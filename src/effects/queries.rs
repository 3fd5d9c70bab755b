use std::sync::Arc;

use crate::context::EngineContext;
use crate::effects::definition::{
    DebuffFlag, EffectCategory, EffectDefinition, EffectParams, InfusionParams,
};
use crate::effects::handlers::visibility::{
    GM_INVISIBILITY, INSIGHT, INVISIBILITY, SEE_INVISIBILITY,
};
use crate::effects::instance::EffectInstance;
use crate::effects::scaling::Proficiency;
use crate::entities::ids::EntityId;

/// Live instances on `target` paired with their definitions.
pub fn active_effects(
    ctx: &EngineContext,
    target: EntityId,
) -> Vec<(Arc<EffectDefinition>, Arc<EffectInstance>)> {
    let registry = ctx.registry();
    registry
        .active_for_target(target, ctx.now())
        .into_iter()
        .filter_map(|instance| {
            registry
                .definition(instance.def_id().as_str())
                .map(|def| (def, instance))
        })
        .collect()
}

pub fn has_effect(ctx: &EngineContext, target: EntityId, def_id: &str) -> bool {
    ctx.registry()
        .active_for_target(target, ctx.now())
        .iter()
        .any(|instance| instance.def_id().as_str() == def_id)
}

pub fn has_category(ctx: &EngineContext, target: EntityId, category: EffectCategory) -> bool {
    active_effects(ctx, target)
        .iter()
        .any(|(def, _)| def.category == category)
}

fn has_flag(ctx: &EngineContext, target: EntityId, flag: DebuffFlag) -> bool {
    active_effects(ctx, target)
        .iter()
        .any(|(def, _)| def.category.debuff_flag() == Some(flag))
}

pub fn is_blind(ctx: &EngineContext, target: EntityId) -> bool {
    has_flag(ctx, target, DebuffFlag::Blind)
}

pub fn is_slowed(ctx: &EngineContext, target: EntityId) -> bool {
    has_flag(ctx, target, DebuffFlag::Slow)
}

pub fn is_confused(ctx: &EngineContext, target: EntityId) -> bool {
    has_flag(ctx, target, DebuffFlag::Confused)
}

pub fn is_paralyzed(ctx: &EngineContext, target: EntityId) -> bool {
    has_flag(ctx, target, DebuffFlag::Paralyzed)
}

pub fn is_cursed(ctx: &EngineContext, target: EntityId) -> bool {
    has_flag(ctx, target, DebuffFlag::Cursed)
}

pub fn is_flying(ctx: &EngineContext, target: EntityId) -> bool {
    has_category(ctx, target, EffectCategory::Flying)
}

pub fn is_invisible(ctx: &EngineContext, target: EntityId) -> bool {
    has_effect(ctx, target, INVISIBILITY) || has_effect(ctx, target, GM_INVISIBILITY)
}

pub fn is_gm_invisible(ctx: &EngineContext, target: EntityId) -> bool {
    has_effect(ctx, target, GM_INVISIBILITY)
}

pub fn can_see_invisible(ctx: &EngineContext, observer: EntityId) -> bool {
    has_effect(ctx, observer, SEE_INVISIBILITY)
}

/// Lets the holder read enemy health in combat.
pub fn has_insight(ctx: &EngineContext, target: EntityId) -> bool {
    has_effect(ctx, target, INSIGHT)
}

/// Whether `observer` can perceive `target`. Everyone sees themselves.
/// Blindness hides everyone else, GM invisibility cannot be pierced, and
/// plain invisibility needs see-invisible.
pub fn can_see(ctx: &EngineContext, observer: EntityId, target: EntityId) -> bool {
    if observer == target {
        return true;
    }
    if is_blind(ctx, observer) || is_gm_invisible(ctx, target) {
        return false;
    }
    !has_effect(ctx, target, INVISIBILITY) || can_see_invisible(ctx, observer)
}

/// Strips plain invisibility without narration, as when combat starts.
/// GM invisibility stays. Returns how many instances went.
pub fn remove_invisibility(ctx: &EngineContext, target: EntityId) -> usize {
    let registry = ctx.registry();
    registry
        .active_for_target(target, ctx.now())
        .into_iter()
        .filter(|instance| instance.def_id().as_str() == INVISIBILITY)
        .filter(|instance| registry.remove_instance(instance.id()).is_some())
        .count()
}

/// Rolls the strongest active curse's fail chance. True means the action fails.
pub fn curse_blocks_action(ctx: &EngineContext, target: EntityId) -> bool {
    let chance = active_effects(ctx, target)
        .iter()
        .filter(|(def, _)| def.category.debuff_flag() == Some(DebuffFlag::Cursed))
        .filter_map(|(_, instance)| instance.snapshot().and_then(|state| state.fail_chance))
        .fold(None, |best: Option<f64>, chance| Some(best.map_or(chance, |b| b.max(chance))));
    match chance {
        Some(chance) if chance > 0.0 => ctx.random().chance(chance),
        _ => false,
    }
}

/// An infusion currently shaping one weapon family.
#[derive(Debug, Clone)]
pub struct ActiveInfusion {
    pub definition: Arc<EffectDefinition>,
    pub instance: Arc<EffectInstance>,
}

impl ActiveInfusion {
    pub fn params(&self) -> Option<&InfusionParams> {
        match &self.definition.params {
            EffectParams::Infusion(params) => Some(params),
            _ => None,
        }
    }
}

/// Highest-priority live infusion on `target` for `weapon_family`.
pub fn active_infusion(
    ctx: &EngineContext,
    target: EntityId,
    weapon_family: &str,
) -> Option<ActiveInfusion> {
    active_effects(ctx, target)
        .into_iter()
        .filter(|(def, _)| match &def.params {
            EffectParams::Infusion(params) => {
                params.weapon_family.eq_ignore_ascii_case(weapon_family)
            }
            _ => false,
        })
        .max_by_key(|(_, instance)| instance.priority())
        .map(|(definition, instance)| ActiveInfusion { definition, instance })
}

/// Ends `def_id` on `target` early, running each instance's expire.
pub fn remove_effects(ctx: &EngineContext, target: EntityId, def_id: &str) -> usize {
    ctx.registry().dispel(ctx, target, def_id)
}

pub fn scaled_cooldown(def: &EffectDefinition, proficiency: Proficiency) -> u64 {
    def.scaled_cooldown_secs(proficiency)
}
