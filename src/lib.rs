// The binary is a thin stdin driver; integration tests use the library directly.
pub mod brain;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod evaluation;
pub mod guardrails;
pub mod logging;
pub mod planner;
pub mod provider_gateway;
pub mod registry;
pub mod retrieval;
pub mod types;
pub mod workflow;
