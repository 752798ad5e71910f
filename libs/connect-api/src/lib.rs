//! Wire records for the notebook publishing endpoints

pub mod models;

pub use models::*;
