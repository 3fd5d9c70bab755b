use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::entities::character::Vitals;
use crate::entities::ids::{EntityId, EntityKind};
use crate::error::EffectError;
use crate::persistence::store::CharacterState;

/// Which copy of the character took the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpPath {
    /// In-combat participant, mutated directly.
    Live,
    /// Player not in combat; the saved record was rewritten.
    Persisted,
    /// Nobody to hit: a mob outside combat, or an unknown player.
    Fizzled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpChange {
    pub path: HpPath,
    /// Hit points actually lost or restored.
    pub amount: u32,
    pub hp_after: Option<u32>,
}

impl HpChange {
    fn fizzled() -> Self {
        Self {
            path: HpPath::Fizzled,
            amount: 0,
            hp_after: None,
        }
    }
}

/// Deals `amount` to `target`. Live targets can drop to 0; persisted
/// players never go below `offline_floor`.
pub fn deal_damage(
    ctx: &EngineContext,
    target: EntityId,
    amount: u32,
    offline_floor: u32,
) -> Result<HpChange, EffectError> {
    change_hp(ctx, target, |vitals, live| {
        if live {
            vitals.apply_raw_damage(amount)
        } else {
            vitals.apply_damage_floored(amount, offline_floor)
        }
    })
}

/// Heals `target` up to its max hit points on whichever path holds it.
pub fn restore_hp(ctx: &EngineContext, target: EntityId, amount: u32) -> Result<HpChange, EffectError> {
    change_hp(ctx, target, |vitals, _| vitals.apply_heal(amount))
}

fn change_hp(
    ctx: &EngineContext,
    target: EntityId,
    apply: impl FnOnce(&mut Vitals, bool) -> u32,
) -> Result<HpChange, EffectError> {
    if let Some(character) = ctx.combat().participant(target) {
        let (amount, hp_after, name, state) = {
            let mut character = character
                .lock()
                .map_err(|_| EffectError::Poisoned("character"))?;
            let amount = apply(&mut character.vitals, true);
            let state = CharacterState::of(&character.vitals, character.room);
            (amount, character.vitals.hp, character.name.clone(), state)
        };
        if target.is_player() {
            if let Err(err) = ctx.store().save_state(&name, state) {
                warn!(%target, error = %err, "hp write-back failed");
            }
        }
        return Ok(HpChange {
            path: HpPath::Live,
            amount,
            hp_after: Some(hp_after),
        });
    }

    let Some(EntityKind::Player(player)) = target.kind() else {
        debug!(%target, "hp change fizzled outside combat");
        return Ok(HpChange::fizzled());
    };
    let Some(mut record) = ctx.store().find_by_id(player)? else {
        debug!(%target, "hp change for unknown player");
        return Ok(HpChange::fizzled());
    };
    let amount = apply(&mut record.vitals, false);
    ctx.store()
        .save_state(&record.name, CharacterState::of(&record.vitals, record.room))?;
    Ok(HpChange {
        path: HpPath::Persisted,
        amount,
        hp_after: Some(record.vitals.hp),
    })
}
