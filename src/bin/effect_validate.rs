use std::path::Path;
use std::sync::Arc;

use mudfx::effects::catalog::EffectCatalog;
use mudfx::effects::definition::{EffectCategory, EffectDefinition, EffectParams};
use mudfx::effects::expiry::ExpiryIndex;
use mudfx::effects::handlers::register_defaults;
use mudfx::effects::registry::EffectRegistry;

fn rolls_dice(def: &EffectDefinition) -> bool {
    matches!(
        def.params,
        EffectParams::Dot(_)
            | EffectParams::SpreadingDot { .. }
            | EffectParams::InstantDamage { .. }
            | EffectParams::InstantHeal { .. }
            | EffectParams::Wounds { .. }
    )
}

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        return Err("usage: effect_validate <catalog.yaml>".to_string());
    };
    let (catalog, report) = EffectCatalog::load(Path::new(path)).map_err(|err| err.to_string())?;
    let catalog = Arc::new(catalog);
    let registry = EffectRegistry::new(Arc::clone(&catalog), Arc::new(ExpiryIndex::new()));
    register_defaults(&registry);

    let mut unbound = Vec::new();
    let mut diceless = Vec::new();
    for def in catalog.iter() {
        let marker = matches!(def.category, EffectCategory::Heal | EffectCategory::Undead);
        let handler = registry.handler_for(def);
        if !marker && handler.is_none() {
            unbound.push(format!("{} ({})", def.id, def.category));
        }
        let presence_only = handler.is_some_and(|handler| handler.name() == "visibility");
        if rolls_dice(def) && !presence_only && def.dice.is_none() {
            diceless.push(format!("{} ({})", def.id, def.category));
        }
    }

    println!("effect catalog check:");
    println!("- file: {}", path);
    println!("- records: {}", report.records);
    println!("- loaded: {}", report.loaded);
    for (category, count) in catalog.count_by_category() {
        println!("- {}: {}", category, count);
    }
    println!("- warnings: {}", report.warnings.len());
    println!("- without handler: {}", unbound.len());
    println!("- damage/heal without dice: {}", diceless.len());
    println!("- errors: {}", report.errors.len());
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    for id in &diceless {
        println!("no dice: {}", id);
    }
    if !unbound.is_empty() {
        println!("without handler:");
        for id in &unbound {
            println!("- {}", id);
        }
    }
    if !report.errors.is_empty() {
        println!("errors:");
        for err in &report.errors {
            println!("- {}", err);
        }
        return Err("effect catalog errors detected".to_string());
    }

    Ok(())
}
