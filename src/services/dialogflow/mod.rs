//! Dialogflow ES agents

mod agent;

pub use agent::{Agent, AgentState};
