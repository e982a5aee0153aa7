pub mod engine;
pub mod pacing;
pub mod plan;
pub mod strategies;

pub use engine::{ReplayEngine, ReplayEvent, ReplayHandle};
pub use pacing::Pacing;
pub use plan::ReplayPlan;
