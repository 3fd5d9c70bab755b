use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::effects::expiry::ExpiryKey;
use crate::effects::handler::run_isolated;
use crate::effects::handlers::modifier;
use crate::effects::instance::InstanceId;
use crate::effects::registry::ExpireOutcome;
use crate::error::TickError;
use crate::world::tick::PeriodicScheduler;
use crate::world::time::Timestamp;

pub const SCHEDULER_TASK: &str = "effect-scheduler";
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(1000);
pub const DEFAULT_BATCH_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub period: Duration,
    pub initial_delay: Duration,
    /// Most expirations plus ticks handled in one firing.
    pub batch_cap: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            initial_delay: DEFAULT_PERIOD,
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiringReport {
    pub ticked: usize,
    pub expired: usize,
    pub modifiers_swept: usize,
    pub failures: usize,
    /// Instances still waiting for a tick when the budget ran out.
    pub carried: usize,
}

/// Ticks and expires live instances on a fixed-rate timer.
///
/// Each firing first drains due entries from the expiry index, then spends
/// what is left of the batch budget on a queue of live instance ids that is
/// refilled from the registry whenever it runs dry. Work beyond the budget
/// waits for the next firing.
pub struct EffectScheduler {
    ctx: Arc<EngineContext>,
    config: SchedulerConfig,
    pending: Mutex<VecDeque<InstanceId>>,
    initialized: AtomicBool,
}

impl EffectScheduler {
    pub fn new(ctx: Arc<EngineContext>, config: SchedulerConfig) -> Self {
        Self {
            ctx,
            config,
            pending: Mutex::new(VecDeque::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Registers the firing with `facility`. Returns false if already done.
    pub fn initialize(self: &Arc<Self>, facility: &dyn PeriodicScheduler) -> Result<bool, TickError> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }
        let scheduler = Arc::clone(self);
        let scheduled = facility.schedule_at_fixed_rate(
            SCHEDULER_TASK,
            Box::new(move || {
                let now = scheduler.ctx.now();
                scheduler.run_once(now);
            }),
            self.config.initial_delay,
            self.config.period,
        );
        if let Err(err) = scheduled {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(true)
    }

    /// One firing at `now`. Holding the queue lock for the whole firing
    /// keeps any instance from being ticked by two threads at once.
    pub fn run_once(&self, now: Timestamp) -> FiringReport {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = FiringReport::default();
        let mut budget = self.config.batch_cap.max(1);

        for key in self.ctx.expiry().pop_due(now, budget) {
            budget -= 1;
            match key {
                ExpiryKey::Instance(id) => self.expire(id, &mut report),
                ExpiryKey::Modifier { owner, id } => {
                    match modifier::sweep_expired(&self.ctx, owner, now) {
                        Ok(swept) => report.modifiers_swept += swept,
                        Err(err) => {
                            report.failures += 1;
                            warn!(%owner, modifier = %id, error = %err, "modifier sweep failed");
                        }
                    }
                }
            }
        }

        if pending.is_empty() {
            pending.extend(self.ctx.registry().instance_ids());
        }
        while budget > 0 {
            let Some(id) = pending.pop_front() else {
                break;
            };
            let Some(instance) = self.ctx.registry().instance(id) else {
                continue;
            };
            budget -= 1;
            if instance.is_expired(now) {
                self.expire(id, &mut report);
                continue;
            }
            let registry = self.ctx.registry();
            let Some(def) = registry.definition(instance.def_id().as_str()) else {
                continue;
            };
            let Some(handler) = registry.handler_for(&def) else {
                continue;
            };
            match run_isolated(|| handler.tick(&self.ctx, &def, &instance, now)) {
                Ok(()) => report.ticked += 1,
                Err(failure) => {
                    report.failures += 1;
                    warn!(
                        def = %def.id,
                        instance = %id,
                        handler = handler.name(),
                        %failure,
                        "effect tick failed"
                    );
                }
            }
        }

        report.carried = pending.len();
        if report.carried > 0 {
            debug!(carried = report.carried, "effect tick budget exhausted");
        }
        report
    }

    fn expire(&self, id: InstanceId, report: &mut FiringReport) {
        match self.ctx.registry().expire_instance(&self.ctx, id) {
            ExpireOutcome::Expired => report.expired += 1,
            ExpireOutcome::Failed(_) => {
                report.expired += 1;
                report.failures += 1;
            }
            ExpireOutcome::Missing | ExpireOutcome::InProgress => {}
        }
    }
}
