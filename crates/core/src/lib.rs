//! Core domain of the roleplay voice trainer: scenarios, agent profiles,
//! the agent registry shared by relay sessions, and the remote agent API.

pub mod agent;
pub mod registry;
pub mod remote;
pub mod scenario;

pub use agent::AgentProfile;
pub use registry::{AgentRegistry, RegistryError};
