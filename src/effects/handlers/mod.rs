pub mod dot;
pub mod flag;
pub mod flying;
pub mod infusion;
pub mod instant;
pub mod modifier;
pub mod spreading;
pub mod visibility;

use std::sync::Arc;

use crate::effects::definition::EffectCategory;
use crate::effects::handler::{EffectHandler, HandlerKey};
use crate::effects::registry::EffectRegistry;

/// Binds the built-in handler for every category that has one. HEAL and
/// UNDEAD are markers read by other systems and stay unbound.
pub fn register_defaults(registry: &EffectRegistry) {
    let bind = |category: EffectCategory, handler: Arc<dyn EffectHandler>| {
        registry.register_handler(HandlerKey::Category(category), handler);
    };
    let instant_damage: Arc<dyn EffectHandler> = Arc::new(instant::InstantDamageHandler);
    let flag_debuff: Arc<dyn EffectHandler> = Arc::new(flag::FlagDebuffHandler);

    bind(EffectCategory::Modifier, Arc::new(modifier::ModifierHandler));
    bind(EffectCategory::InstantDamage, Arc::clone(&instant_damage));
    bind(EffectCategory::Custom, Arc::clone(&instant_damage));
    bind(EffectCategory::CallLightning, instant_damage);
    bind(EffectCategory::InstantHeal, Arc::new(instant::InstantHealHandler));
    bind(EffectCategory::CauseWounds, Arc::new(instant::WoundsHandler));
    bind(EffectCategory::Dot, Arc::new(dot::DotHandler));
    bind(EffectCategory::BurningHands, Arc::new(spreading::SpreadingDotHandler));
    for category in [
        EffectCategory::Debuff,
        EffectCategory::Slow,
        EffectCategory::Confused,
        EffectCategory::Paralyzed,
        EffectCategory::Cursed,
    ] {
        bind(category, Arc::clone(&flag_debuff));
    }
    bind(EffectCategory::Flying, Arc::new(flying::FlyingHandler));
    bind(EffectCategory::WeaponInfusion, Arc::new(infusion::InfusionHandler));

    let visibility: Arc<dyn EffectHandler> = Arc::new(visibility::VisibilityHandler);
    for id in visibility::IDS {
        registry.register_handler(HandlerKey::Id(id.into()), Arc::clone(&visibility));
    }
}
