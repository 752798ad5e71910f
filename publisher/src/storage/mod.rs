//! Local storage

pub mod config_store;
pub mod layout;
pub mod settings;
