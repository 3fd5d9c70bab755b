use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::effects::definition::{
    EffectCategory, EffectDefinition, EffectId, EffectParams, ProficiencyImpact, StackPolicy,
};
use crate::effects::dice::DiceSpec;
use crate::error::CatalogError;

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    effects: Vec<EffectRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct EffectRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    cooldown: Option<f64>,
    #[serde(default)]
    dice_multiplier: Option<Value>,
    #[serde(default)]
    level_multiplier: Option<i32>,
    #[serde(default)]
    proficiency_impact: Option<ImpactField>,
    #[serde(default, rename = "profficiency_impact")]
    legacy_proficiency_impact: Option<ImpactField>,
    #[serde(default, rename = "stackPolicy")]
    stack_policy: Option<String>,
    #[serde(default)]
    persistent: Option<bool>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    params: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImpactField {
    List(Vec<String>),
    Text(String),
}

impl ImpactField {
    fn into_set(self) -> BTreeSet<ProficiencyImpact> {
        let tokens: Vec<String> = match self {
            ImpactField::List(items) => items,
            ImpactField::Text(text) => text
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::to_string)
                .collect(),
        };
        tokens
            .iter()
            .filter(|token| !token.trim().is_empty())
            .filter_map(|token| token.parse::<ProficiencyImpact>().ok())
            .collect()
    }
}

/// Renders a YAML scalar the way a config author wrote it.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => None,
        other => serde_yaml::to_string(other)
            .ok()
            .map(|text| text.trim().to_string()),
    }
}

/// Outcome of a catalog load: what made it in and what was skipped.
#[derive(Debug, Default, Clone)]
pub struct CatalogReport {
    pub records: usize,
    pub loaded: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CatalogReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Immutable, process-wide table of effect definitions.
#[derive(Debug, Default)]
pub struct EffectCatalog {
    definitions: HashMap<EffectId, Arc<EffectDefinition>>,
    order: Vec<EffectId>,
}

impl EffectCatalog {
    /// Builds a catalog from already-typed definitions. Duplicate ids are an error.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = EffectDefinition>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = EffectCatalog::default();
        for definition in definitions {
            catalog.insert(definition)?;
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<(Self, CatalogReport), CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let (catalog, report) = Self::from_yaml_str(&text)?;
        info!(
            path = %path.display(),
            loaded = report.loaded,
            errors = report.errors.len(),
            "effect catalog loaded"
        );
        Ok((catalog, report))
    }

    /// Parses the `effects:` list. Malformed YAML fails the whole load; a bad
    /// record is reported and skipped.
    pub fn from_yaml_str(text: &str) -> Result<(Self, CatalogReport), CatalogError> {
        let file: CatalogFile = if text.trim().is_empty() {
            CatalogFile::default()
        } else {
            serde_yaml::from_str(text)?
        };
        let mut catalog = EffectCatalog::default();
        let mut report = CatalogReport {
            records: file.effects.len(),
            ..CatalogReport::default()
        };

        for (index, record) in file.effects.into_iter().enumerate() {
            match build_definition(index, record, &mut report.warnings) {
                Ok(definition) => match catalog.insert(definition) {
                    Ok(()) => report.loaded += 1,
                    Err(err) => report.errors.push(err.to_string()),
                },
                Err(err) => report.errors.push(err.to_string()),
            }
        }
        for error in &report.errors {
            warn!(error = %error, "effect record skipped");
        }
        Ok((catalog, report))
    }

    fn insert(&mut self, definition: EffectDefinition) -> Result<(), CatalogError> {
        if self.definitions.contains_key(&definition.id) {
            return Err(CatalogError::DuplicateId(definition.id.to_string()));
        }
        debug!(id = %definition.id, category = %definition.category, "effect definition registered");
        self.order.push(definition.id.clone());
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<EffectDefinition>> {
        self.definitions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// Definitions in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EffectDefinition>> {
        self.order.iter().filter_map(|id| self.definitions.get(id))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn count_by_category(&self) -> BTreeMap<EffectCategory, usize> {
        let mut counts = BTreeMap::new();
        for definition in self.definitions.values() {
            *counts.entry(definition.category).or_insert(0) += 1;
        }
        counts
    }
}

fn build_definition(
    index: usize,
    record: EffectRecord,
    warnings: &mut Vec<String>,
) -> Result<EffectDefinition, CatalogError> {
    let id = record
        .id
        .as_ref()
        .and_then(scalar_to_string)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| index.to_string());
    let name = record
        .name
        .clone()
        .unwrap_or_else(|| format!("effect_{}", id));

    let category = match record.kind.as_deref() {
        None => EffectCategory::Modifier,
        Some(kind) => EffectCategory::parse(kind).unwrap_or_else(|| {
            warnings.push(format!("effect {}: unknown type {}, using MODIFIER", id, kind));
            EffectCategory::Modifier
        }),
    };
    let stack_policy = match record.stack_policy.as_deref() {
        None => StackPolicy::Refresh,
        Some(policy) => StackPolicy::parse(policy).unwrap_or_else(|| {
            warnings.push(format!("effect {}: unknown stackPolicy {}, using REFRESH", id, policy));
            StackPolicy::Refresh
        }),
    };
    let impacts = record
        .legacy_proficiency_impact
        .or(record.proficiency_impact)
        .map(ImpactField::into_set)
        .unwrap_or_default();

    let mut raw: BTreeMap<String, String> = record
        .params
        .iter()
        .filter_map(|(key, value)| scalar_to_string(value).map(|value| (key.clone(), value)))
        .collect();

    let dice_text = record
        .dice_multiplier
        .as_ref()
        .and_then(scalar_to_string)
        .filter(|text| !text.trim().is_empty())
        .or_else(|| raw.remove("dice"));
    raw.remove("dice");
    let dice = match dice_text {
        Some(text) => match DiceSpec::parse(&text) {
            Ok(dice) => Some(dice),
            Err(err) => {
                warnings.push(format!("effect {}: {}", id, err));
                None
            }
        },
        None => None,
    };

    let params = EffectParams::from_raw(category, &mut raw)
        .map_err(|reason| CatalogError::InvalidParams {
            id: id.clone(),
            reason,
        })?;

    Ok(EffectDefinition {
        id: EffectId(id),
        name,
        category,
        params,
        extra: raw,
        duration_secs: record.duration.unwrap_or(0.0).max(0.0),
        cooldown_secs: record.cooldown.unwrap_or(0.0).max(0.0),
        dice,
        level_multiplier: record.level_multiplier.unwrap_or(0),
        impacts,
        stack_policy,
        persistent: record.persistent.unwrap_or(true),
        priority: record.priority.unwrap_or(0),
    })
}
