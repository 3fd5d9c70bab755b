use tracing::debug;

use crate::context::EngineContext;
use crate::effects::definition::{EffectDefinition, EffectParams};
use crate::effects::expiry::ExpiryKey;
use crate::effects::handler::{ApplyRequest, EffectHandler};
use crate::effects::instance::{EffectInstance, RuntimeState};
use crate::entities::ids::{EntityId, EntityKind};
use crate::entities::stats::{Modifier, ModifierId};
use crate::error::EffectError;
use crate::world::time::Timestamp;

/// Installs one stat modifier for the instance's lifetime.
pub struct ModifierHandler;

impl EffectHandler for ModifierHandler {
    fn name(&self) -> &'static str {
        "modifier"
    }

    fn apply(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError> {
        let EffectParams::Modifier { stat, op, value } = def.params else {
            debug!(def = %def.id, "modifier handler bound to non-modifier params");
            return Ok(None);
        };
        let proficiency = request.params.proficiency();
        let instance = EffectInstance::new(
            def.id.clone(),
            request.caster,
            request.target,
            request.now,
            def.scaled_duration_ms(proficiency),
            def.priority,
            RuntimeState::from_params(request.params),
        );

        let source = format!("{} ({})", def.name, ctx.display_name(request.caster, "unknown"));
        let mut modifier = Modifier::new(source, stat, op, value)
            .with_id(instance.id().as_modifier_id())
            .with_priority(def.priority);
        if let Some(at) = instance.expires_at() {
            modifier = modifier.expiring_at(at);
        }
        if !install(ctx, request.target, modifier)? {
            debug!(def = %def.id, target = %request.target, "modifier target not found");
            return Ok(None);
        }
        if let Some(at) = instance.expires_at() {
            ctx.expiry().schedule(
                ExpiryKey::Modifier {
                    owner: request.target,
                    id: instance.id().as_modifier_id(),
                },
                at,
            );
        }
        Ok(Some(instance))
    }

    fn expire(
        &self,
        ctx: &EngineContext,
        _def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        uninstall(ctx, instance)
    }

    fn evicted(
        &self,
        ctx: &EngineContext,
        _def: &EffectDefinition,
        instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        uninstall(ctx, instance)
    }
}

fn uninstall(ctx: &EngineContext, instance: &EffectInstance) -> Result<(), EffectError> {
    let owner = instance.target();
    let id = instance.id().as_modifier_id();
    ctx.expiry().cancel(&ExpiryKey::Modifier { owner, id });
    remove(ctx, owner, id)?;
    Ok(())
}

/// Adds `modifier` to the live character, else to the saved list of an
/// offline player. False when neither exists.
pub fn install(ctx: &EngineContext, owner: EntityId, modifier: Modifier) -> Result<bool, EffectError> {
    if let Some(character) = ctx.combat().participant(owner) {
        let mut character = character
            .lock()
            .map_err(|_| EffectError::Poisoned("character"))?;
        character.stats.add_modifier(modifier);
        return Ok(true);
    }
    let Some(EntityKind::Player(player)) = owner.kind() else {
        return Ok(false);
    };
    let mut pending = Some(modifier);
    let found = ctx.store().update_modifiers(player, &mut |saved| {
        saved.extend(pending.take());
        true
    })?;
    Ok(found)
}

/// Removes modifier `id` from whichever copy of `owner` holds it.
pub fn remove(ctx: &EngineContext, owner: EntityId, id: ModifierId) -> Result<Option<Modifier>, EffectError> {
    if let Some(character) = ctx.combat().participant(owner) {
        let removed = character
            .lock()
            .map_err(|_| EffectError::Poisoned("character"))?
            .stats
            .remove_modifier(id);
        if removed.is_some() {
            return Ok(removed);
        }
    }
    let Some(EntityKind::Player(player)) = owner.kind() else {
        return Ok(None);
    };
    let mut removed = None;
    ctx.store().update_modifiers(player, &mut |saved| {
        match saved.iter().position(|modifier| modifier.id == id) {
            Some(index) => {
                removed = Some(saved.remove(index));
                true
            }
            None => false,
        }
    })?;
    Ok(removed)
}

/// Drops every expired modifier `owner` carries. Returns how many went.
pub fn sweep_expired(ctx: &EngineContext, owner: EntityId, now: Timestamp) -> Result<usize, EffectError> {
    if let Some(character) = ctx.combat().participant(owner) {
        let evicted = character
            .lock()
            .map_err(|_| EffectError::Poisoned("character"))?
            .stats
            .evict_expired(now);
        return Ok(evicted.len());
    }
    let Some(EntityKind::Player(player)) = owner.kind() else {
        return Ok(0);
    };
    let mut swept = 0;
    ctx.store().update_modifiers(player, &mut |saved| {
        let before = saved.len();
        saved.retain(|modifier| !modifier.is_expired(now));
        swept = before - saved.len();
        swept > 0
    })?;
    Ok(swept)
}
