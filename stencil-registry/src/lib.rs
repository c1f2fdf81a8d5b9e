pub mod catalog;
pub mod config;
pub mod generator;
pub mod ledger;
mod mapping;
pub mod parser;
pub mod schema;
pub mod server;

pub use catalog::TemplateCatalog;
pub use generator::{GeneratedTemplate, GenerationContext, TemplateGenerator};
pub use ledger::VersionLedger;
pub use parser::parse_manifest;
