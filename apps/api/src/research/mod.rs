//! Job research: the agent, the durable workflow that runs it, and the HTTP
//! endpoints that submit and poll research jobs.

pub mod agent;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod workflow;
