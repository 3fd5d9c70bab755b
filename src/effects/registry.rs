use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::effects::catalog::EffectCatalog;
use crate::effects::definition::{EffectCategory, EffectDefinition, EffectId, StackPolicy};
use crate::effects::expiry::{ExpiryIndex, ExpiryKey};
use crate::effects::handler::{run_isolated, ApplyRequest, EffectHandler, HandlerFailure, HandlerKey};
use crate::effects::instance::{ApplyParams, EffectInstance, InstanceId};
use crate::effects::stacking::{self, StackDecision};
use crate::entities::ids::EntityId;
use crate::world::time::Timestamp;

/// Result of asking the registry to expire one instance.
#[derive(Debug)]
pub enum ExpireOutcome {
    /// Not live (already removed, or never registered).
    Missing,
    /// Another caller is expiring it right now.
    InProgress,
    Expired,
    /// `expire` failed; the instance was removed anyway.
    Failed(HandlerFailure),
}

/// Concurrent directory of definitions, handlers and live instances.
///
/// `apply` is the only way a live instance comes into existence. Admission
/// is serialized per target, so racing applies on one target resolve their
/// stacking policy one after another.
pub struct EffectRegistry {
    catalog: Arc<EffectCatalog>,
    expiry: Arc<ExpiryIndex>,
    id_handlers: DashMap<EffectId, Arc<dyn EffectHandler>>,
    category_handlers: DashMap<EffectCategory, Arc<dyn EffectHandler>>,
    instances: DashMap<InstanceId, Arc<EffectInstance>>,
    by_target: DashMap<EntityId, Vec<InstanceId>>,
}

impl EffectRegistry {
    pub fn new(catalog: Arc<EffectCatalog>, expiry: Arc<ExpiryIndex>) -> Self {
        Self {
            catalog,
            expiry,
            id_handlers: DashMap::new(),
            category_handlers: DashMap::new(),
            instances: DashMap::new(),
            by_target: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<EffectCatalog> {
        &self.catalog
    }

    pub fn definition(&self, id: &str) -> Option<Arc<EffectDefinition>> {
        self.catalog.get(id)
    }

    /// Binds a handler, returning the one it replaced.
    pub fn register_handler(
        &self,
        key: HandlerKey,
        handler: Arc<dyn EffectHandler>,
    ) -> Option<Arc<dyn EffectHandler>> {
        debug!(handler = handler.name(), key = ?key, "effect handler bound");
        match key {
            HandlerKey::Id(id) => self.id_handlers.insert(id, handler),
            HandlerKey::Category(category) => self.category_handlers.insert(category, handler),
        }
    }

    /// Exact id binding first, then the definition's category.
    pub fn handler_for(&self, def: &EffectDefinition) -> Option<Arc<dyn EffectHandler>> {
        if let Some(handler) = self.id_handlers.get(&def.id) {
            return Some(Arc::clone(handler.value()));
        }
        self.category_handlers
            .get(&def.category)
            .map(|handler| Arc::clone(handler.value()))
    }

    /// Applies `def_id` to `target`. `None` covers unknown ids, missing
    /// handlers, stacking rejection, handler failure and instant effects
    /// that already resolved.
    pub fn apply(
        &self,
        ctx: &EngineContext,
        def_id: &str,
        caster: Option<EntityId>,
        target: EntityId,
        params: &ApplyParams,
    ) -> Option<Arc<EffectInstance>> {
        let Some(def) = self.definition(def_id) else {
            debug!(def = def_id, "apply for unknown effect ignored");
            return None;
        };
        let Some(handler) = self.handler_for(&def) else {
            debug!(def = def_id, category = %def.category, "no handler bound");
            return None;
        };
        let now = ctx.now();

        if def.stack_policy == StackPolicy::Unique {
            let active = self.active_for_target(target, now);
            if let StackDecision::Reject { blocking } =
                stacking::resolve(def.stack_policy, &def.id, caster, &active)
            {
                debug!(def = def_id, %target, %blocking, "unique effect already active");
                return None;
            }
        }

        let request = ApplyRequest {
            caster,
            target,
            params,
            now,
        };
        let instance = match run_isolated(|| handler.apply(ctx, &def, request)) {
            Ok(Some(instance)) => instance,
            Ok(None) => return None,
            Err(failure) => {
                warn!(def = def_id, %target, handler = handler.name(), %failure, "effect apply failed");
                return None;
            }
        };
        self.admit(ctx, &def, &handler, instance, now)
    }

    fn admit(
        &self,
        ctx: &EngineContext,
        def: &EffectDefinition,
        handler: &Arc<dyn EffectHandler>,
        instance: EffectInstance,
        now: Timestamp,
    ) -> Option<Arc<EffectInstance>> {
        let instance = Arc::new(instance);
        let target = instance.target();
        let mut evicted = Vec::new();
        {
            let mut ids = self.by_target.entry(target).or_default();
            ids.retain(|id| self.instances.contains_key(id));
            let active: Vec<Arc<EffectInstance>> = ids
                .iter()
                .filter_map(|id| self.instances.get(id).map(|entry| Arc::clone(entry.value())))
                .filter(|existing| !existing.is_expired(now))
                .collect();

            match stacking::resolve(def.stack_policy, &def.id, instance.caster(), &active) {
                StackDecision::Reject { blocking } => {
                    drop(ids);
                    debug!(def = %def.id, %target, %blocking, "unique effect lost admission race");
                    if let Err(failure) = run_isolated(|| handler.evicted(ctx, def, &instance)) {
                        warn!(def = %def.id, %failure, "rollback of rejected effect failed");
                    }
                    return None;
                }
                StackDecision::Admit { evict } => {
                    for id in &evict {
                        if let Some((_, old)) = self.instances.remove(id) {
                            evicted.push(old);
                        }
                    }
                    ids.retain(|id| !evict.contains(id));
                    ids.push(instance.id());
                    self.instances.insert(instance.id(), Arc::clone(&instance));
                }
            }
        }

        for old in evicted {
            self.expiry.cancel(&ExpiryKey::Instance(old.id()));
            debug!(def = %def.id, %target, evicted = %old.id(), "stacking evicted instance");
            if let Err(failure) = run_isolated(|| handler.evicted(ctx, def, &old)) {
                warn!(def = %def.id, %failure, "evicted hook failed");
            }
        }
        if let Some(expires_at) = instance.expires_at() {
            self.expiry
                .schedule(ExpiryKey::Instance(instance.id()), expires_at);
        }
        if let Err(failure) = run_isolated(|| handler.admitted(ctx, def, &instance)) {
            warn!(def = %def.id, instance = %instance.id(), %failure, "admitted hook failed");
        }
        debug!(
            def = %def.id,
            instance = %instance.id(),
            %target,
            expires_at = instance.expires_at().map(|at| at.millis()),
            "effect instance registered"
        );
        Some(instance)
    }

    pub fn instance(&self, id: InstanceId) -> Option<Arc<EffectInstance>> {
        self.instances.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Fresh snapshot of `target`'s unexpired instances at `now`.
    pub fn active_for_target(&self, target: EntityId, now: Timestamp) -> Vec<Arc<EffectInstance>> {
        let ids = match self.by_target.get(&target) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.instance(*id))
            .filter(|instance| !instance.is_expired(now))
            .collect()
    }

    /// Every live instance, expired or not. The scheduler's read path.
    pub fn all_instances(&self) -> Vec<Arc<EffectInstance>> {
        self.instances
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|entry| *entry.key()).collect()
    }

    /// Idempotent: removing an absent id returns `None`.
    pub fn remove_instance(&self, id: InstanceId) -> Option<Arc<EffectInstance>> {
        let (_, instance) = self.instances.remove(&id)?;
        let target = instance.target();
        if let Some(mut ids) = self.by_target.get_mut(&target) {
            ids.retain(|existing| *existing != id);
        }
        self.by_target.remove_if(&target, |_, ids| ids.is_empty());
        self.expiry.cancel(&ExpiryKey::Instance(id));
        Some(instance)
    }

    /// Runs `expire` once and then removes the instance, whatever `expire` did.
    pub fn expire_instance(&self, ctx: &EngineContext, id: InstanceId) -> ExpireOutcome {
        let Some(instance) = self.instance(id) else {
            return ExpireOutcome::Missing;
        };
        if !instance.claim_expiry() {
            return ExpireOutcome::InProgress;
        }
        let result = match self.definition(instance.def_id().as_str()) {
            Some(def) => match self.handler_for(&def) {
                Some(handler) => run_isolated(|| handler.expire(ctx, &def, &instance)),
                None => Ok(()),
            },
            None => Ok(()),
        };
        self.remove_instance(id);
        match result {
            Ok(()) => {
                debug!(def = %instance.def_id(), instance = %id, target = %instance.target(), "effect expired");
                ExpireOutcome::Expired
            }
            Err(failure) => {
                warn!(def = %instance.def_id(), instance = %id, %failure, "effect expire failed");
                ExpireOutcome::Failed(failure)
            }
        }
    }

    /// Ends every active instance of `def_id` on `target` early, running
    /// `expire` for each. Returns how many ended.
    pub fn dispel(&self, ctx: &EngineContext, target: EntityId, def_id: &str) -> usize {
        let now = ctx.now();
        self.active_for_target(target, now)
            .into_iter()
            .filter(|instance| instance.def_id().as_str() == def_id)
            .filter(|instance| {
                matches!(
                    self.expire_instance(ctx, instance.id()),
                    ExpireOutcome::Expired | ExpireOutcome::Failed(_)
                )
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::definition::EffectParams;
    use crate::test_support::{Harness, Recording};
    use crate::error::EffectError;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ward(policy: StackPolicy) -> EffectDefinition {
        EffectDefinition::new("ward", EffectCategory::Modifier, EffectParams::Marker)
            .with_stack_policy(policy)
    }

    fn bound(policy: StackPolicy, handler: &Arc<Recording>) -> Harness {
        let harness = Harness::bare(vec![ward(policy)]);
        harness.ctx().registry().register_handler(
            HandlerKey::Category(EffectCategory::Modifier),
            Arc::clone(handler) as Arc<dyn EffectHandler>,
        );
        harness
    }

    const TARGET: EntityId = EntityId(-5);

    #[test]
    fn unknown_ids_and_unbound_categories_yield_nothing() {
        let harness = Harness::bare(vec![ward(StackPolicy::Stack)]);
        let ctx = harness.ctx();
        assert!(ctx.apply("nope", None, TARGET, &ApplyParams::new()).is_none());
        assert!(ctx.apply("ward", None, TARGET, &ApplyParams::new()).is_none());
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn id_binding_beats_category_binding() {
        let by_category = Arc::new(Recording::lasting(5_000));
        let harness = bound(StackPolicy::Stack, &by_category);
        let ctx = harness.ctx();
        ctx.apply("ward", None, TARGET, &ApplyParams::new()).expect("instance");
        assert_eq!(Recording::count(&by_category.applied), 1);

        let by_id = Arc::new(Recording::lasting(5_000));
        ctx.registry().register_handler(
            HandlerKey::Id(EffectId::from("ward")),
            Arc::clone(&by_id) as Arc<dyn EffectHandler>,
        );
        ctx.apply("ward", None, TARGET, &ApplyParams::new()).expect("instance");
        assert_eq!(Recording::count(&by_category.applied), 1);
        assert_eq!(Recording::count(&by_id.applied), 1);
    }

    #[test]
    fn refresh_keeps_one_instance_per_caster() {
        let handler = Arc::new(Recording::lasting(10_000));
        let harness = bound(StackPolicy::Refresh, &handler);
        let ctx = harness.ctx();
        let caster = Some(EntityId::player(1));

        let first = ctx.apply("ward", caster, TARGET, &ApplyParams::new()).expect("first");
        harness.advance_secs(4);
        let second = ctx.apply("ward", caster, TARGET, &ApplyParams::new()).expect("second");

        let active = ctx.registry().active_for_target(TARGET, harness.now());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), second.id());
        assert!(ctx.registry().instance(first.id()).is_none());
        assert_eq!(second.remaining_ms(harness.now()), Some(10_000));
        assert_eq!(Recording::count(&handler.evicted), 1);
        assert_eq!(Recording::count(&handler.expired), 0);

        ctx.apply("ward", Some(EntityId::player(2)), TARGET, &ApplyParams::new())
            .expect("other caster");
        assert_eq!(ctx.registry().active_for_target(TARGET, harness.now()).len(), 2);
    }

    #[test]
    fn stack_lets_instances_coexist() {
        let handler = Arc::new(Recording::lasting(10_000));
        let harness = bound(StackPolicy::Stack, &handler);
        for _ in 0..3 {
            harness.ctx().apply("ward", None, TARGET, &ApplyParams::new()).expect("instance");
        }
        assert_eq!(harness.ctx().registry().active_for_target(TARGET, harness.now()).len(), 3);
    }

    #[test]
    fn unique_rejects_any_second_caster() {
        let handler = Arc::new(Recording::lasting(10_000));
        let harness = bound(StackPolicy::Unique, &handler);
        let ctx = harness.ctx();
        ctx.apply("ward", Some(EntityId::player(1)), TARGET, &ApplyParams::new())
            .expect("first");
        assert!(ctx
            .apply("ward", Some(EntityId::player(2)), TARGET, &ApplyParams::new())
            .is_none());
        assert_eq!(Recording::count(&handler.applied), 1);

        harness.advance_secs(11);
        assert!(ctx
            .apply("ward", Some(EntityId::player(2)), TARGET, &ApplyParams::new())
            .is_some());
    }

    /// Lets another caster land the same effect while the first apply is
    /// still inside its handler.
    struct CutIn {
        inner: Recording,
        done: AtomicBool,
    }

    impl EffectHandler for CutIn {
        fn name(&self) -> &'static str {
            "cut_in"
        }

        fn apply(
            &self,
            ctx: &EngineContext,
            def: &EffectDefinition,
            request: ApplyRequest<'_>,
        ) -> Result<Option<EffectInstance>, EffectError> {
            if !self.done.swap(true, Ordering::SeqCst) {
                ctx.apply(def.id.as_str(), Some(EntityId::player(99)), request.target, request.params)
                    .expect("cut in");
            }
            self.inner.apply(ctx, def, request)
        }

        fn admitted(
            &self,
            ctx: &EngineContext,
            def: &EffectDefinition,
            instance: &EffectInstance,
        ) -> Result<(), EffectError> {
            self.inner.admitted(ctx, def, instance)
        }

        fn evicted(
            &self,
            ctx: &EngineContext,
            def: &EffectDefinition,
            instance: &EffectInstance,
        ) -> Result<(), EffectError> {
            self.inner.evicted(ctx, def, instance)
        }
    }

    #[test]
    fn unique_loser_never_sees_admission() {
        let handler = Arc::new(CutIn {
            inner: Recording::lasting(10_000),
            done: AtomicBool::new(false),
        });
        let harness = Harness::bare(vec![ward(StackPolicy::Unique)]);
        let ctx = harness.ctx();
        ctx.registry().register_handler(
            HandlerKey::Category(EffectCategory::Modifier),
            Arc::clone(&handler) as Arc<dyn EffectHandler>,
        );

        assert!(ctx
            .apply("ward", Some(EntityId::player(1)), TARGET, &ApplyParams::new())
            .is_none());
        let active = ctx.registry().active_for_target(TARGET, harness.now());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].caster(), Some(EntityId::player(99)));
        assert_eq!(Recording::count(&handler.inner.applied), 2);
        assert_eq!(Recording::count(&handler.inner.admitted), 1);
        assert_eq!(Recording::count(&handler.inner.evicted), 1);
    }

    #[test]
    fn remove_twice_is_harmless() {
        let handler = Arc::new(Recording::lasting(10_000));
        let harness = bound(StackPolicy::Stack, &handler);
        let ctx = harness.ctx();
        let instance = ctx.apply("ward", None, TARGET, &ApplyParams::new()).expect("instance");

        assert!(ctx.registry().remove_instance(instance.id()).is_some());
        assert!(ctx.registry().remove_instance(instance.id()).is_none());
        assert!(ctx.registry().is_empty());
        assert!(ctx.expiry().is_empty());
    }

    #[test]
    fn expire_runs_once_and_always_removes() {
        let handler = Arc::new(Recording {
            duration_ms: 10_000,
            panic_on_expire: true,
            ..Recording::default()
        });
        let harness = bound(StackPolicy::Stack, &handler);
        let ctx = harness.ctx();
        let instance = ctx.apply("ward", None, TARGET, &ApplyParams::new()).expect("instance");

        let outcome = ctx.registry().expire_instance(ctx, instance.id());
        assert!(matches!(outcome, ExpireOutcome::Failed(HandlerFailure::Panic(_))));
        assert!(matches!(
            ctx.registry().expire_instance(ctx, instance.id()),
            ExpireOutcome::Missing
        ));
        assert_eq!(Recording::count(&handler.expired), 1);
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn dispel_only_touches_the_named_effect() {
        let handler = Arc::new(Recording::lasting(10_000));
        let harness = bound(StackPolicy::Stack, &handler);
        let ctx = harness.ctx();
        ctx.apply("ward", None, TARGET, &ApplyParams::new()).expect("one");
        ctx.apply("ward", None, TARGET, &ApplyParams::new()).expect("two");
        ctx.apply("ward", None, EntityId(-6), &ApplyParams::new()).expect("elsewhere");

        assert_eq!(ctx.registry().dispel(ctx, TARGET, "ward"), 2);
        assert_eq!(ctx.registry().dispel(ctx, TARGET, "other"), 0);
        assert_eq!(Recording::count(&handler.expired), 2);
        assert_eq!(ctx.registry().len(), 1);
    }
}
