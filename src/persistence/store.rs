use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entities::character::Vitals;
use crate::entities::ids::RoomId;
use crate::entities::stats::Modifier;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: u32,
    pub name: String,
    pub vitals: Vitals,
    #[serde(default)]
    pub room: Option<RoomId>,
}

impl CharacterRecord {
    pub fn new(id: u32, name: impl Into<String>, vitals: Vitals) -> Self {
        Self {
            id,
            name: name.into(),
            vitals,
            room: None,
        }
    }

    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room = Some(room);
        self
    }
}

/// Volatile character state written back after damage or healing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterState {
    pub hp: u32,
    pub mp: u32,
    pub mv: u32,
    pub room: Option<RoomId>,
}

impl CharacterState {
    pub fn of(vitals: &Vitals, room: Option<RoomId>) -> Self {
        Self {
            hp: vitals.hp,
            mp: vitals.mp,
            mv: vitals.mv,
            room,
        }
    }
}

/// What the effect engine needs from persistence and nothing more.
pub trait CharacterStore: Send + Sync {
    fn find_by_id(&self, id: u32) -> Result<Option<CharacterRecord>, StoreError>;
    fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError>;
    fn save_state(&self, name: &str, state: CharacterState) -> Result<(), StoreError>;
    fn load_modifiers(&self, id: u32) -> Result<Vec<Modifier>, StoreError>;
    fn save_modifiers(&self, id: u32, modifiers: &[Modifier]) -> Result<(), StoreError>;
    /// Loads, mutates and saves player `id`'s modifier list as one step.
    /// `update` returns whether it changed the list. False when the
    /// player has no record, in which case `update` is never called.
    fn update_modifiers(
        &self,
        id: u32,
        update: &mut dyn FnMut(&mut Vec<Modifier>) -> bool,
    ) -> Result<bool, StoreError>;
    fn mob_name(&self, instance_id: u32) -> Result<Option<String>, StoreError>;
}

fn apply_state(record: &mut CharacterRecord, state: CharacterState) {
    record.vitals.hp = state.hp;
    record.vitals.mp = state.mp;
    record.vitals.mv = state.mv;
    record.room = state.room;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    characters: RwLock<HashMap<u32, CharacterRecord>>,
    modifiers: RwLock<HashMap<u32, Vec<Modifier>>>,
    mobs: RwLock<HashMap<u32, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: CharacterRecord) -> Result<(), StoreError> {
        let mut characters = self.characters.write().map_err(|_| StoreError::Poisoned)?;
        characters.insert(record.id, record);
        Ok(())
    }

    pub fn insert_mob(&self, instance_id: u32, name: impl Into<String>) -> Result<(), StoreError> {
        let mut mobs = self.mobs.write().map_err(|_| StoreError::Poisoned)?;
        mobs.insert(instance_id, name.into());
        Ok(())
    }
}

impl CharacterStore for MemoryStore {
    fn find_by_id(&self, id: u32) -> Result<Option<CharacterRecord>, StoreError> {
        let characters = self.characters.read().map_err(|_| StoreError::Poisoned)?;
        Ok(characters.get(&id).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError> {
        let characters = self.characters.read().map_err(|_| StoreError::Poisoned)?;
        Ok(characters
            .values()
            .find(|record| record.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn save_state(&self, name: &str, state: CharacterState) -> Result<(), StoreError> {
        let mut characters = self.characters.write().map_err(|_| StoreError::Poisoned)?;
        let record = characters
            .values_mut()
            .find(|record| record.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        apply_state(record, state);
        Ok(())
    }

    fn load_modifiers(&self, id: u32) -> Result<Vec<Modifier>, StoreError> {
        let modifiers = self.modifiers.read().map_err(|_| StoreError::Poisoned)?;
        Ok(modifiers.get(&id).cloned().unwrap_or_default())
    }

    fn save_modifiers(&self, id: u32, list: &[Modifier]) -> Result<(), StoreError> {
        let mut modifiers = self.modifiers.write().map_err(|_| StoreError::Poisoned)?;
        if list.is_empty() {
            modifiers.remove(&id);
        } else {
            modifiers.insert(id, list.to_vec());
        }
        Ok(())
    }

    fn update_modifiers(
        &self,
        id: u32,
        update: &mut dyn FnMut(&mut Vec<Modifier>) -> bool,
    ) -> Result<bool, StoreError> {
        let mut modifiers = self.modifiers.write().map_err(|_| StoreError::Poisoned)?;
        {
            let characters = self.characters.read().map_err(|_| StoreError::Poisoned)?;
            if !characters.contains_key(&id) {
                return Ok(false);
            }
        }
        let mut list = modifiers.remove(&id).unwrap_or_default();
        update(&mut list);
        if !list.is_empty() {
            modifiers.insert(id, list);
        }
        Ok(true)
    }

    fn mob_name(&self, instance_id: u32) -> Result<Option<String>, StoreError> {
        let mobs = self.mobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(mobs.get(&instance_id).cloned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CharacterSave {
    record: CharacterRecord,
    #[serde(default)]
    modifiers: Vec<Modifier>,
}

/// One YAML file per character under `<root>/characters`, with a `.bak`
/// copy of the previous save. Mob names come from `<root>/mobs.yaml`.
#[derive(Debug)]
pub struct SaveStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl SaveStore {
    pub fn from_root(root: &Path) -> Self {
        Self::new(root.join("save"))
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn character_dir(&self) -> PathBuf {
        self.root.join("characters")
    }

    fn character_path(&self, id: u32) -> PathBuf {
        self.character_dir().join(format!("{}.yaml", id))
    }

    fn read_save(&self, path: &Path) -> Result<Option<CharacterSave>, StoreError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "read {} failed: {}",
                    path.display(),
                    err
                )))
            }
        };
        serde_yaml::from_str(&data)
            .map(Some)
            .map_err(|err| StoreError::Backend(format!("parse {} failed: {}", path.display(), err)))
    }

    fn write_save(&self, save: &CharacterSave) -> Result<(), StoreError> {
        let dir = self.character_dir();
        fs::create_dir_all(&dir).map_err(|err| {
            StoreError::Backend(format!("create {} failed: {}", dir.display(), err))
        })?;
        let path = self.character_path(save.record.id);
        if path.exists() {
            let backup = path.with_extension("yaml.bak");
            fs::copy(&path, &backup).map_err(|err| {
                StoreError::Backend(format!("backup {} failed: {}", backup.display(), err))
            })?;
        }
        let data = serde_yaml::to_string(save)
            .map_err(|err| StoreError::Backend(format!("encode {} failed: {}", path.display(), err)))?;
        fs::write(&path, data)
            .map_err(|err| StoreError::Backend(format!("write {} failed: {}", path.display(), err)))?;
        debug!(path = %path.display(), "character saved");
        Ok(())
    }

    fn all_saves(&self) -> Result<Vec<CharacterSave>, StoreError> {
        let dir = self.character_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "read {} failed: {}",
                    dir.display(),
                    err
                )))
            }
        };
        let mut saves = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
                continue;
            }
            match self.read_save(&path) {
                Ok(Some(save)) => saves.push(save),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "unreadable character save skipped"),
            }
        }
        Ok(saves)
    }

    /// Creates or replaces a character's record, keeping its modifiers.
    pub fn put_record(&self, record: CharacterRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let modifiers = self
            .read_save(&self.character_path(record.id))?
            .map(|save| save.modifiers)
            .unwrap_or_default();
        self.write_save(&CharacterSave { record, modifiers })
    }
}

impl CharacterStore for SaveStore {
    fn find_by_id(&self, id: u32) -> Result<Option<CharacterRecord>, StoreError> {
        Ok(self.read_save(&self.character_path(id))?.map(|save| save.record))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError> {
        Ok(self
            .all_saves()?
            .into_iter()
            .map(|save| save.record)
            .find(|record| record.name.eq_ignore_ascii_case(name)))
    }

    fn save_state(&self, name: &str, state: CharacterState) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut save = self
            .all_saves()?
            .into_iter()
            .find(|save| save.record.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        apply_state(&mut save.record, state);
        self.write_save(&save)
    }

    fn load_modifiers(&self, id: u32) -> Result<Vec<Modifier>, StoreError> {
        Ok(self
            .read_save(&self.character_path(id))?
            .map(|save| save.modifiers)
            .unwrap_or_default())
    }

    fn save_modifiers(&self, id: u32, modifiers: &[Modifier]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut save = self
            .read_save(&self.character_path(id))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        save.modifiers = modifiers.to_vec();
        self.write_save(&save)
    }

    fn update_modifiers(
        &self,
        id: u32,
        update: &mut dyn FnMut(&mut Vec<Modifier>) -> bool,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let Some(mut save) = self.read_save(&self.character_path(id))? else {
            return Ok(false);
        };
        if update(&mut save.modifiers) {
            self.write_save(&save)?;
        }
        Ok(true)
    }

    fn mob_name(&self, instance_id: u32) -> Result<Option<String>, StoreError> {
        let path = self.root.join("mobs.yaml");
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "read {} failed: {}",
                    path.display(),
                    err
                )))
            }
        };
        let names: BTreeMap<u32, String> = serde_yaml::from_str(&data)
            .map_err(|err| StoreError::Backend(format!("parse {} failed: {}", path.display(), err)))?;
        Ok(names.get(&instance_id).cloned())
    }
}
