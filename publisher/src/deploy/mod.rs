//! Deploy module

pub mod fsm;
pub mod orchestrator;
pub mod poller;
