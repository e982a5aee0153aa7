pub mod extractor;
pub mod field_names;
pub mod normalizer;
pub mod trainer;

pub use extractor::{extract_mappings, infer_field, pick_canonical};
pub use field_names::normalize_field_name;
pub use normalizer::{normalize, normalize_str};
pub use trainer::{Trainer, TrainingReport};
