//! What happens when an effect lands on a target already carrying it.

use std::sync::Arc;

use crate::effects::definition::{EffectId, StackPolicy};
use crate::effects::instance::{EffectInstance, InstanceId};
use crate::entities::ids::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackDecision {
    /// Register the newcomer after removing `evict`.
    Admit { evict: Vec<InstanceId> },
    /// Leave the target alone; `blocking` is already active.
    Reject { blocking: InstanceId },
}

/// Decides admission of a new `def_id` instance from `caster` given the
/// target's currently unexpired instances.
///
/// REPLACE_HIGHER_PRIORITY behaves exactly like REFRESH: priority is not
/// consulted. UNIQUE rejects while any instance of the definition is active,
/// whoever cast it. An absent caster never matches for REFRESH.
pub fn resolve(
    policy: StackPolicy,
    def_id: &EffectId,
    caster: Option<EntityId>,
    active: &[Arc<EffectInstance>],
) -> StackDecision {
    match policy {
        StackPolicy::Stack => StackDecision::Admit { evict: Vec::new() },
        StackPolicy::Refresh | StackPolicy::ReplaceHigherPriority => {
            let evict = match caster {
                Some(caster) => active
                    .iter()
                    .filter(|inst| inst.def_id() == def_id && inst.caster() == Some(caster))
                    .map(|inst| inst.id())
                    .collect(),
                None => Vec::new(),
            };
            StackDecision::Admit { evict }
        }
        StackPolicy::Unique => match active.iter().find(|inst| inst.def_id() == def_id) {
            Some(existing) => StackDecision::Reject {
                blocking: existing.id(),
            },
            None => StackDecision::Admit { evict: Vec::new() },
        },
    }
}
