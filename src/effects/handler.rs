use std::panic::{self, AssertUnwindSafe};

use crate::context::EngineContext;
use crate::effects::definition::{EffectCategory, EffectDefinition, EffectId};
use crate::effects::instance::{ApplyParams, EffectInstance};
use crate::entities::ids::EntityId;
use crate::error::EffectError;
use crate::world::time::Timestamp;

/// Everything a handler learns about one `apply` call.
#[derive(Debug, Clone, Copy)]
pub struct ApplyRequest<'a> {
    pub caster: Option<EntityId>,
    pub target: EntityId,
    pub params: &'a ApplyParams,
    pub now: Timestamp,
}

/// Behaviour bound to one or more effect definitions.
///
/// `apply` returns the instance to schedule, or `None` when the effect
/// resolved completely inside `apply` (instant damage or healing). `tick`
/// runs on the scheduler thread about once a second; handlers wanting a
/// slower cadence keep their own last-fire time in the instance state.
/// `admitted` runs once the registry has accepted the instance, so side
/// effects placed there never happen for an instance stacking rejects.
/// `expire` runs once, right before the instance is removed.
pub trait EffectHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        request: ApplyRequest<'_>,
    ) -> Result<Option<EffectInstance>, EffectError>;

    fn admitted(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        Ok(())
    }

    fn tick(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
        _now: Timestamp,
    ) -> Result<(), EffectError> {
        Ok(())
    }

    fn expire(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        Ok(())
    }

    /// Called when stacking replaces `instance` with a newer one. Narration-free;
    /// only undoes side effects the replacement would otherwise duplicate.
    fn evicted(
        &self,
        _ctx: &EngineContext,
        _def: &EffectDefinition,
        _instance: &EffectInstance,
    ) -> Result<(), EffectError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Id(EffectId),
    Category(EffectCategory),
}

/// Why an isolated handler call did not complete.
#[derive(Debug)]
pub enum HandlerFailure {
    Error(EffectError),
    Panic(String),
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerFailure::Error(err) => write!(f, "{}", err),
            HandlerFailure::Panic(message) => write!(f, "panic: {}", message),
        }
    }
}

/// Runs a handler callback so neither an error nor a panic escapes.
pub(crate) fn run_isolated<T>(
    call: impl FnOnce() -> Result<T, EffectError>,
) -> Result<T, HandlerFailure> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(HandlerFailure::Error(err)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(HandlerFailure::Panic(message))
        }
    }
}
