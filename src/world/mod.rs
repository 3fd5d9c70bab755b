pub mod random;
pub mod tick;
pub mod time;
