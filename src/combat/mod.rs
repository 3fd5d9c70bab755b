pub mod damage;
pub mod directory;
