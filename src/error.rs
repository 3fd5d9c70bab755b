use thiserror::Error;

use crate::effects::dice::DiceParseError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("read catalog {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse catalog failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("duplicate effect id {0}")]
    DuplicateId(String),
    #[error("effect {id}: {reason}")]
    InvalidParams { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("character {0} not found")]
    NotFound(String),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TickError {
    #[error("tick task {0} already scheduled")]
    Duplicate(String),
    #[error("tick task {0} has a zero period")]
    ZeroPeriod(String),
    #[error("tick service is shut down")]
    ShutDown,
    #[error("tick thread spawn failed: {0}")]
    Spawn(String),
    #[error("tick service lock poisoned")]
    Poisoned,
}

/// Failure inside a handler. Never escapes the registry or scheduler; it is
/// logged there and turned into "no instance" or "tick skipped".
#[derive(Debug, Error)]
pub enum EffectError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dice(#[from] DiceParseError),
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
    #[error("effect {0} has no usable dice")]
    MissingDice(String),
}
