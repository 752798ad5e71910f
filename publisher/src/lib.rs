//! Notebook Publisher Library
//!
//! Core modules for publishing notebooks to a content server through the
//! notebook server's publishing endpoints.

pub mod app;
pub mod deploy;
pub mod environment;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod notebook;
pub mod registry;
pub mod search;
pub mod storage;
pub mod utils;
pub mod verify;
