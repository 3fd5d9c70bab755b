pub mod catalog;
pub mod definition;
pub mod dice;
pub mod expiry;
pub mod handler;
pub mod handlers;
pub mod instance;
pub mod queries;
pub mod registry;
pub mod scaling;
pub mod scheduler;
pub mod stacking;
