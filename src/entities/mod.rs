pub mod character;
pub mod ids;
pub mod modifiers;
pub mod stats;
