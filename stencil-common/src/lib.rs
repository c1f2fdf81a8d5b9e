pub mod common;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod state;
pub mod template;
