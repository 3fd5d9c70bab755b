use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::effects::scheduler::{SchedulerConfig, DEFAULT_BATCH_CAP, DEFAULT_PERIOD};

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub root: PathBuf,
    pub catalog_path: PathBuf,
    /// Seconds to run the tick service; 0 reports and exits.
    pub run_secs: u64,
    pub tick_period: Duration,
    pub batch_cap: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        Self::from_sources(args, |key| std::env::var(key).ok())
    }

    /// `env` is consulted for the `MUDFX_*` overrides.
    pub fn from_sources(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: mudfx <data-root> [run_secs]".to_string());
        }

        let root = Path::new(&args[1]).to_path_buf();
        let run_secs = match args.get(2) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("run_secs must be a whole number, got {}", raw))?,
            None => 0,
        };
        let lookup = |key: &str| {
            env(key).and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };

        let tick_period = match lookup("MUDFX_TICK_MS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(format!("MUDFX_TICK_MS must be a positive integer, got {}", raw)),
            },
            None => DEFAULT_PERIOD,
        };
        let batch_cap = match lookup("MUDFX_BATCH_CAP") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(cap) if cap > 0 => cap,
                _ => return Err(format!("MUDFX_BATCH_CAP must be a positive integer, got {}", raw)),
            },
            None => DEFAULT_BATCH_CAP,
        };
        let log_level = lookup("MUDFX_LOG").unwrap_or_else(|| "info".to_string());
        let catalog_path = lookup("MUDFX_CATALOG")
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("data").join("effects.yaml"));

        Ok(Self {
            root,
            catalog_path,
            run_secs,
            tick_period,
            batch_cap,
            log_level,
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            period: self.tick_period,
            initial_delay: DEFAULT_PERIOD,
            batch_cap: self.batch_cap,
        }
    }
}
