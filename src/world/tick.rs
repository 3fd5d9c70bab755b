use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::error::TickError;

/// Longest single sleep of a timer thread, so shutdown and cancel are noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

pub type TickTask = Box<dyn FnMut() + Send + 'static>;

/// Fixed-rate periodic callback facility. The effect engine owns no timer
/// thread itself; whoever hosts it supplies one of these.
pub trait PeriodicScheduler: Send + Sync {
    fn schedule_at_fixed_rate(
        &self,
        name: &str,
        task: TickTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<(), TickError>;
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceSignal {
    Running = 0,
    Shutdown = 1,
}

#[derive(Debug)]
pub struct ServiceControl {
    signal: AtomicU8,
}

impl Default for ServiceControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceControl {
    pub fn new() -> Self {
        Self {
            signal: AtomicU8::new(ServiceSignal::Running as u8),
        }
    }

    pub fn request_shutdown(&self) {
        self.signal
            .store(ServiceSignal::Shutdown as u8, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.signal.load(Ordering::SeqCst) == ServiceSignal::Running as u8
    }
}

struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

/// Thread-backed [`PeriodicScheduler`]: one named timer thread per task.
pub struct TickService {
    control: Arc<ServiceControl>,
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl Default for TickService {
    fn default() -> Self {
        Self::new()
    }
}

impl TickService {
    pub fn new() -> Self {
        Self::with_control(Arc::new(ServiceControl::new()))
    }

    pub fn with_control(control: Arc<ServiceControl>) -> Self {
        Self {
            control,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn control(&self) -> Arc<ServiceControl> {
        Arc::clone(&self.control)
    }

    pub fn task_names(&self) -> Vec<String> {
        match self.tasks.lock() {
            Ok(tasks) => {
                let mut names: Vec<String> = tasks.keys().cloned().collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    /// Stops one task. Returns false if no task by that name is scheduled.
    pub fn cancel(&self, name: &str) -> Result<bool, TickError> {
        let handle = {
            let mut tasks = self.tasks.lock().map_err(|_| TickError::Poisoned)?;
            tasks.remove(name)
        };
        let Some(handle) = handle else {
            return Ok(false);
        };
        handle.cancelled.store(true, Ordering::SeqCst);
        if handle.thread.join().is_err() {
            warn!(task = name, "tick task panicked before cancel");
        }
        debug!(task = name, "tick task cancelled");
        Ok(true)
    }

    /// Signals every timer thread to stop and waits for them.
    pub fn shutdown(&self) -> Result<(), TickError> {
        self.control.request_shutdown();
        let drained: Vec<(String, TaskHandle)> = {
            let mut tasks = self.tasks.lock().map_err(|_| TickError::Poisoned)?;
            tasks.drain().collect()
        };
        for (name, handle) in drained {
            handle.cancelled.store(true, Ordering::SeqCst);
            if handle.thread.join().is_err() {
                warn!(task = %name, "tick task panicked before shutdown");
            }
        }
        info!("tick service stopped");
        Ok(())
    }
}

impl PeriodicScheduler for TickService {
    fn schedule_at_fixed_rate(
        &self,
        name: &str,
        mut task: TickTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<(), TickError> {
        if period.is_zero() {
            return Err(TickError::ZeroPeriod(name.to_string()));
        }
        if !self.control.is_running() {
            return Err(TickError::ShutDown);
        }
        let mut tasks = self.tasks.lock().map_err(|_| TickError::Poisoned)?;
        if tasks.contains_key(name) {
            return Err(TickError::Duplicate(name.to_string()));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let control = Arc::clone(&self.control);
        let stop = Arc::clone(&cancelled);
        let task_name = name.to_string();
        let thread = thread::Builder::new()
            .name(format!("tick-{}", name))
            .spawn(move || {
                let mut next = Instant::now() + initial_delay;
                while control.is_running() && !stop.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now >= next {
                        task();
                        next += period;
                        let after = Instant::now();
                        if next <= after {
                            // Missed firings are dropped rather than replayed in a burst.
                            let behind = after.duration_since(next);
                            let skipped = behind.as_millis() / period.as_millis().max(1) + 1;
                            debug!(task = %task_name, skipped = skipped as u64, "tick overran period");
                            while next <= after {
                                next += period;
                            }
                        }
                        continue;
                    }
                    thread::sleep((next - now).min(SLEEP_SLICE));
                }
            })
            .map_err(|err| {
                error!(task = name, error = %err, "tick thread spawn failed");
                TickError::Spawn(err.to_string())
            })?;

        tasks.insert(name.to_string(), TaskHandle { cancelled, thread });
        info!(
            task = name,
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "tick task scheduled"
        );
        Ok(())
    }
}

impl Drop for TickService {
    fn drop(&mut self) {
        self.control.request_shutdown();
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, handle) in tasks.drain() {
                handle.cancelled.store(true, Ordering::SeqCst);
                let _ = handle.thread.join();
            }
        }
    }
}
