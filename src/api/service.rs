use std::sync::Arc;

use crate::api::types::{
    DeleteRequest, DeleteResponse, DeployRequest, DeployResponse, DeployStatus,
    HealthCheckResponse, HealthStatus, StatusRequest, StatusResponse,
};
use crate::config::NomadConfig;
use crate::job::{
    proxy::ProxySpec,
    resources::cpu_units,
    template::{JobTemplate, ResourceSpec},
};
use crate::nomad::{Orchestrator, OrchestratorError, model::Job};
use crate::status::StatusReport;

pub const STATUS_RETRIEVED: &str = "Application status retrieved successfully";

/// Compilation settings that come from configuration rather than requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefaults {
    pub datacenters: Vec<String>,
    pub driver: String,
    pub region: Option<String>,
}

impl From<&NomadConfig> for JobDefaults {
    fn from(config: &NomadConfig) -> Self {
        Self {
            datacenters: config.datacenters.clone(),
            driver: config.driver.clone(),
            region: config.region.clone(),
        }
    }
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self::from(&NomadConfig::default())
    }
}

/// Deploy, delete, status and health operations on top of one shared
/// orchestrator handle.
///
/// Orchestrator failures are never returned as errors: every operation
/// answers with a structured response describing the failure.
pub struct DeploymentService {
    orchestrator: Option<Arc<dyn Orchestrator>>,
    defaults: JobDefaults,
}

impl DeploymentService {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, defaults: JobDefaults) -> Self {
        Self {
            orchestrator: Some(orchestrator),
            defaults,
        }
    }

    /// A service whose orchestrator handle could not be created. Every
    /// operation reports the missing handle.
    pub fn uninitialized(defaults: JobDefaults) -> Self {
        Self {
            orchestrator: None,
            defaults,
        }
    }

    fn orchestrator(&self) -> Result<&dyn Orchestrator, OrchestratorError> {
        self.orchestrator
            .as_deref()
            .ok_or(OrchestratorError::NotInitialized)
    }

    /// Translates a deploy request into a job template.
    pub fn build_template(&self, request: DeployRequest) -> JobTemplate {
        let mut template = JobTemplate::new(request.name, request.image);
        template.instances = request.replicas;
        template.region = Some(request.region)
            .filter(|r| !r.is_empty())
            .or_else(|| self.defaults.region.clone());
        template.datacenters = self.defaults.datacenters.clone();
        template.driver = self.defaults.driver.clone();
        template.network = request.network_mode.resolve();
        template.resources = ResourceSpec {
            cpu_units: Some(cpu_units(request.cpu)),
            memory_mb: Some(request.memory),
            ..ResourceSpec::default()
        };
        template.environment = request.labels;
        template.proxy = request.proxy.map(ProxySpec::from).unwrap_or_default();
        template
    }

    pub async fn deploy(&self, request: DeployRequest) -> DeployResponse {
        log::info!(
            "Deploying {} ({}, {} replicas, {} env vars)",
            request.name,
            request.image,
            request.replicas,
            request.labels.len()
        );
        let template = self.build_template(request);
        let job = template.to_job();
        log::debug!("Compiled job for {}: {}", template.name, job_summary(&job));

        let result = match self.orchestrator() {
            Ok(orchestrator) => orchestrator.submit(&job).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(eval_id) => {
                log::info!("Submitted {} (evaluation {eval_id})", template.name);
                DeployResponse {
                    deployment_id: eval_id,
                    status: DeployStatus::Submitted,
                    message: "Application deployment submitted successfully".to_string(),
                }
            }
            Err(e) => {
                log::warn!("Failed to deploy {}: {e}", template.name);
                DeployResponse {
                    deployment_id: String::new(),
                    status: DeployStatus::Failed,
                    message: format!("Failed to deploy application: {e}"),
                }
            }
        }
    }

    pub async fn delete(&self, request: DeleteRequest) -> DeleteResponse {
        let id = request.deployment_id;
        log::info!("Deleting {id}");

        let result = match self.orchestrator() {
            Ok(orchestrator) => orchestrator.deregister(&id, true).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => DeleteResponse {
                success: true,
                message: "Application deleted successfully".to_string(),
            },
            Err(e) => {
                log::warn!("Failed to delete {id}: {e}");
                DeleteResponse {
                    success: false,
                    message: format!("Failed to delete application: {e}"),
                }
            }
        }
    }

    pub async fn status(&self, request: StatusRequest) -> StatusResponse {
        let id = request.deployment_id;
        log::info!("Getting status of {id}");
        match self.lookup(&id).await {
            Ok(report) => StatusResponse::from_report(report, STATUS_RETRIEVED),
            Err(e) => {
                log::warn!("Failed to get status of {id}: {e}");
                StatusResponse::failed(&id, format!("Failed to get application status: {e}"))
            }
        }
    }

    async fn lookup(&self, id: &str) -> Result<StatusReport, OrchestratorError> {
        let orchestrator = self.orchestrator()?;
        let job = orchestrator.info(id).await?;
        let allocations = orchestrator.allocations(id).await?;
        Ok(StatusReport::aggregate(id, &job, &allocations))
    }

    pub async fn health_check(&self) -> HealthCheckResponse {
        log::info!("Checking orchestrator health");
        let (status, message) = match self.orchestrator() {
            Ok(orchestrator) => match orchestrator.agent_self().await {
                Ok(()) => (HealthStatus::Serving, "Service is healthy".to_string()),
                Err(e) => (HealthStatus::NotServing, format!("Nomad client unhealthy: {e}")),
            },
            Err(_) => (HealthStatus::NotServing, "Nomad client not initialized".to_string()),
        };
        if status == HealthStatus::NotServing {
            log::warn!("Health check failed: {message}");
        }

        HealthCheckResponse {
            status,
            message,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Debug rendering of a compiled job. Environment values are redacted by
/// `Task`'s `Debug` impl.
fn job_summary(job: &Job) -> String {
    format!("{:?}", job.task_groups)
}
