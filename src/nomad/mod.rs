//! Orchestrator access.
//!
//! The rest of the crate talks to the orchestrator only through the
//! [`Orchestrator`] trait, so the deployment service can be exercised against
//! an in-memory fake.

pub mod client;
pub mod model;

use async_trait::async_trait;
use thiserror::Error;

use model::{AllocationListStub, Job};

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response code: {code} ({body})")]
    Status { code: u16, body: String },
    #[error("invalid orchestrator address '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: url::ParseError,
    },
    #[error("orchestrator client not initialized")]
    NotInitialized,
}

/// Black-box view of the container orchestrator.
///
/// Implementations must be usable from many concurrent requests at once
/// without external locking.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Registers (or updates) a job and returns the evaluation id.
    async fn submit(&self, job: &Job) -> Result<String>;
    /// Removes a job. `force` purges it immediately instead of letting it drain.
    async fn deregister(&self, job_id: &str, force: bool) -> Result<()>;
    async fn info(&self, job_id: &str) -> Result<Job>;
    async fn allocations(&self, job_id: &str) -> Result<Vec<AllocationListStub>>;
    /// Queries the local agent; success means the orchestrator is reachable.
    async fn agent_self(&self) -> Result<()>;
}
