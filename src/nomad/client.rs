//! HTTP client for the Nomad API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};

use crate::config::NomadConfig;
use crate::nomad::model::{AllocationListStub, Job, JobRegisterRequest, JobRegisterResponse};
use crate::nomad::{Orchestrator, OrchestratorError, Result};

const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Shared connection to a Nomad agent.
///
/// `reqwest::Client` pools connections internally and is cheap to share, so
/// one instance serves every request for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct NomadClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl NomadClient {
    pub fn new(config: &NomadConfig) -> Result<Self> {
        url::Url::parse(&config.address).map_err(|source| OrchestratorError::InvalidAddress {
            address: config.address.clone(),
            source,
        })?;

        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        log::info!("Using Nomad agent at {}", config.address);
        Ok(Self {
            client,
            base_url: config.address.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
        })
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/v1/job/{}", self.base_url, urlencoding::encode(job_id))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(OrchestratorError::Status {
            code: status.as_u16(),
            body: body.trim().to_owned(),
        })
    }
}

#[async_trait]
impl Orchestrator for NomadClient {
    async fn submit(&self, job: &Job) -> Result<String> {
        let url = format!("{}/v1/jobs", self.base_url);
        let request = self.client.post(&url).json(&JobRegisterRequest { job });
        let response: JobRegisterResponse = self.send(request).await?.json().await?;
        log::debug!("Registered job {:?}, evaluation {}", job.id, response.eval_id);
        Ok(response.eval_id)
    }

    async fn deregister(&self, job_id: &str, force: bool) -> Result<()> {
        let request = self
            .client
            .delete(self.job_url(job_id))
            .query(&[("purge", force)]);
        self.send(request).await?;
        log::debug!("Deregistered job {job_id} (purge: {force})");
        Ok(())
    }

    async fn info(&self, job_id: &str) -> Result<Job> {
        let request = self.client.get(self.job_url(job_id));
        Ok(self.send(request).await?.json().await?)
    }

    async fn allocations(&self, job_id: &str) -> Result<Vec<AllocationListStub>> {
        let url = format!("{}/allocations", self.job_url(job_id));
        let request = self.client.get(&url).query(&[("all", false)]);
        let allocations: Option<Vec<AllocationListStub>> = self.send(request).await?.json().await?;
        Ok(allocations.unwrap_or_default())
    }

    async fn agent_self(&self) -> Result<()> {
        let url = format!("{}/v1/agent/self", self.base_url);
        self.send(self.client.get(&url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str) -> NomadConfig {
        NomadConfig {
            address: address.to_string(),
            ..NomadConfig::default()
        }
    }

    #[test]
    fn test_job_url_encodes_id() {
        let client = NomadClient::new(&config("http://nomad.local:4646/")).unwrap();
        assert_eq!(
            client.job_url("my app/v1"),
            "http://nomad.local:4646/v1/job/my%20app%2Fv1"
        );
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let err = NomadClient::new(&config("not a url")).unwrap_err();
        assert!(
            matches!(err, OrchestratorError::InvalidAddress { .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_unreachable_agent_reports_http_error() {
        // Port 9 (discard) is practically never listening on loopback.
        let client = NomadClient::new(&NomadConfig {
            address: "http://127.0.0.1:9".to_string(),
            timeout_secs: Some(2),
            ..NomadConfig::default()
        })
        .unwrap();
        let err = client.agent_self().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Http(_)), "{err:?}");
    }
}
