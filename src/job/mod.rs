//! Compilation of deployment requests into orchestrator jobs.

pub mod proxy;
pub mod resources;
pub mod template;
