pub mod combat;
pub mod config;
pub mod context;
pub mod effects;
pub mod entities;
pub mod error;
pub mod net;
pub mod persistence;
pub mod telemetry;
pub mod world;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

pub use context::{Engine, EngineBuilder, EngineContext};
pub use effects::catalog::{CatalogReport, EffectCatalog};
pub use effects::instance::ApplyParams;

use persistence::store::SaveStore;
use world::tick::TickService;

pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::from_args(args)?;
    let log_path = telemetry::logging::init(&config.root, &config.log_level)?;
    let (catalog, report) =
        EffectCatalog::load(&config.catalog_path).map_err(|err| err.to_string())?;

    println!("mudfx: effect catalog");
    println!("- root: {}", config.root.display());
    println!("- catalog: {}", config.catalog_path.display());
    println!(
        "- records: {}, loaded: {}, errors: {}, warnings: {}",
        report.records,
        report.loaded,
        report.errors.len(),
        report.warnings.len()
    );
    for (category, count) in catalog.count_by_category() {
        println!("- {}: {}", category, count);
    }
    println!("- log: {}", log_path.display());
    for err in &report.errors {
        eprintln!("mudfx: catalog {}", err);
    }
    for warning in &report.warnings {
        warn!(warning = %warning, "catalog warning");
    }

    let store = Arc::new(SaveStore::from_root(&config.root));
    let engine = Engine::builder(catalog)
        .store(store)
        .scheduler(config.scheduler())
        .build();
    if config.run_secs == 0 {
        return Ok(());
    }

    let ticks = TickService::new();
    engine.start(&ticks).map_err(|err| err.to_string())?;
    println!("mudfx: running for {}s", config.run_secs);
    std::thread::sleep(Duration::from_secs(config.run_secs));
    ticks.shutdown().map_err(|err| err.to_string())?;

    let live = engine.context().registry().len();
    info!(live, "effect engine stopped");
    println!("mudfx: stopped with {} live effect instances", live);
    Ok(())
}
