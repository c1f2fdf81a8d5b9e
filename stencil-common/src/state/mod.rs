mod base;
mod template;

pub use base::BaseDbTrait;
pub use template::{ArchiveOutcome, TemplateDbTrait};

/// Combined trait for all storage operations
/// Should be used through dyn dispatch at the top level
/// to pass the complete storage interface
pub trait DatabaseTrait: TemplateDbTrait {}
