//! Rehearsal API Library Crate
//!
//! This library contains the web service of the roleplay voice trainer:
//! configuration, application state, the agent and scenario REST handlers,
//! routing, and the WebSocket relay to the upstream voice service. The
//! `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
