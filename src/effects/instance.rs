use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::effects::definition::EffectId;
use crate::effects::scaling::Proficiency;
use crate::entities::ids::EntityId;
use crate::entities::stats::ModifierId;
use crate::error::EffectError;
use crate::world::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn random() -> Self {
        InstanceId(Uuid::new_v4())
    }

    /// Modifier installed on behalf of this instance shares its id.
    pub fn as_modifier_id(self) -> ModifierId {
        ModifierId(self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Call-site values for one `apply`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyParams {
    pub proficiency: Option<Proficiency>,
    pub caster_level: Option<u32>,
    /// Weather or situational damage multiplier.
    pub damage_multiplier: Option<f64>,
    pub target_is_undead: bool,
    pub extra: BTreeMap<String, String>,
}

impl ApplyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proficiency(mut self, proficiency: i64) -> Self {
        self.proficiency = Some(Proficiency::new(proficiency));
        self
    }

    pub fn with_caster_level(mut self, level: u32) -> Self {
        self.caster_level = Some(level);
        self
    }

    pub fn with_damage_multiplier(mut self, multiplier: f64) -> Self {
        self.damage_multiplier = Some(multiplier);
        self
    }

    pub fn undead_target(mut self) -> Self {
        self.target_is_undead = true;
        self
    }

    /// Builds params from untyped command-layer pairs. Unparsable numbers fall
    /// back to their defaults; unknown keys are kept in `extra`.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut params = ApplyParams::default();
        for (key, value) in pairs {
            match key {
                "proficiency" => params.proficiency = Some(Proficiency::parse(value)),
                "caster_level" | "casterLevel" => {
                    params.caster_level = Some(value.trim().parse::<u32>().unwrap_or(1));
                }
                "damage_multiplier" | "damageMultiplier" => {
                    let multiplier = value
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|m| m.is_finite() && *m >= 0.0)
                        .unwrap_or(1.0);
                    params.damage_multiplier = Some(multiplier);
                }
                "target_is_undead" | "targetIsUndead" => {
                    params.target_is_undead = value.trim().eq_ignore_ascii_case("true");
                }
                _ => {
                    params.extra.insert(key.to_string(), value.to_string());
                }
            }
        }
        params
    }

    pub fn proficiency(&self) -> Proficiency {
        self.proficiency.unwrap_or_default()
    }

    pub fn caster_level(&self) -> u32 {
        self.caster_level.unwrap_or(1)
    }

    pub fn damage_multiplier(&self) -> f64 {
        self.damage_multiplier.unwrap_or(1.0)
    }
}

/// Mutable per-instance state owned by the instance's handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeState {
    pub proficiency: Proficiency,
    pub caster_level: u32,
    pub last_tick: Option<Timestamp>,
    pub fail_chance: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

impl RuntimeState {
    pub fn from_params(params: &ApplyParams) -> Self {
        Self {
            proficiency: params.proficiency(),
            caster_level: params.caster_level(),
            last_tick: None,
            fail_chance: None,
            extra: params.extra.clone(),
        }
    }
}

/// One live application of a definition to a target.
#[derive(Debug)]
pub struct EffectInstance {
    id: InstanceId,
    def_id: EffectId,
    caster: Option<EntityId>,
    target: EntityId,
    started_at: Timestamp,
    expires_at: Option<Timestamp>,
    priority: i32,
    state: Mutex<RuntimeState>,
    expiring: AtomicBool,
}

impl EffectInstance {
    /// `duration_ms == 0` means no expiry.
    pub fn new(
        def_id: EffectId,
        caster: Option<EntityId>,
        target: EntityId,
        started_at: Timestamp,
        duration_ms: u64,
        priority: i32,
        state: RuntimeState,
    ) -> Self {
        let expires_at = (duration_ms > 0).then(|| started_at.saturating_add_millis(duration_ms));
        Self {
            id: InstanceId::random(),
            def_id,
            caster,
            target,
            started_at,
            expires_at,
            priority,
            state: Mutex::new(state),
            expiring: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn def_id(&self) -> &EffectId {
        &self.def_id
    }

    pub fn caster(&self) -> Option<EntityId> {
        self.caster
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn remaining_ms(&self, now: Timestamp) -> Option<u64> {
        self.expires_at.map(|at| at.since(now))
    }

    pub fn state(&self) -> Result<MutexGuard<'_, RuntimeState>, EffectError> {
        self.state
            .lock()
            .map_err(|_| EffectError::Poisoned("effect instance state"))
    }

    /// First caller wins; used so `expire` runs once even when the scheduler
    /// and a dispel race on the same instance.
    pub(crate) fn claim_expiry(&self) -> bool {
        self.expiring
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Copy of the runtime state, for queries that must not hold the lock.
    pub fn snapshot(&self) -> Option<RuntimeState> {
        self.state.lock().ok().map(|state| state.clone())
    }
}
