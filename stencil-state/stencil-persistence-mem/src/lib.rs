pub mod db;
mod event_logging;
mod trait_impl;

pub use db::InMemoryStateDb;
