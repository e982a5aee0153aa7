pub mod health;
pub mod mappings;
pub mod replay;
pub mod training;
