use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use log::{debug, info, warn};

use super::service::DeploymentService;
use super::types::{
    DeleteRequest, DeleteResponse, DeployRequest, DeployResponse, HealthCheckResponse,
    StatusRequest, StatusResponse,
};

/// Prefix shared by every RPC route.
pub const SERVICE_PATH: &str = "/controlplane.ControlPlane";
/// Per-call deadline header, `<digits><unit>` with unit one of `HMSmun`.
pub const TIMEOUT_HEADER: &str = "grpc-timeout";

type Rejection = (StatusCode, String);

pub fn router(service: Arc<DeploymentService>) -> Router {
    Router::new()
        .route(
            &format!("{SERVICE_PATH}/DeployApplication"),
            post(deploy_application),
        )
        .route(
            &format!("{SERVICE_PATH}/DeleteApplication"),
            post(delete_application),
        )
        .route(
            &format!("{SERVICE_PATH}/GetApplicationStatus"),
            post(get_application_status),
        )
        .route(&format!("{SERVICE_PATH}/HealthCheck"), post(health_check))
        .with_state(service)
}

/// Serves the RPCs until SIGINT or SIGTERM, then drains in-flight calls.
pub async fn serve(listen: SocketAddr, service: Arc<DeploymentService>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Control plane listening on {}", listener.local_addr()?);

    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Control plane stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Stopping]);
}

/// Parses a `grpc-timeout` value such as `30S` or `250m`.
pub fn parse_grpc_timeout(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let Some(unit) = value.chars().last() else {
        return Err("empty timeout".to_string());
    };
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid timeout value '{value}'"));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid timeout value '{value}'"))?;

    let duration = match unit {
        'H' => Duration::from_secs(amount * 3600),
        'M' => Duration::from_secs(amount * 60),
        'S' => Duration::from_secs(amount),
        'm' => Duration::from_millis(amount),
        'u' => Duration::from_micros(amount),
        'n' => Duration::from_nanos(amount),
        other => return Err(format!("invalid timeout unit '{other}'")),
    };
    Ok(duration)
}

fn deadline(headers: &HeaderMap) -> Result<Option<Duration>, Rejection> {
    let Some(value) = headers.get(TIMEOUT_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .map_err(|e| e.to_string())
        .and_then(parse_grpc_timeout)
        .map(Some)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}

/// Runs `call` under the caller's deadline, if one was sent.
async fn within_deadline<T>(
    headers: &HeaderMap,
    call: impl Future<Output = T>,
) -> Result<Json<T>, Rejection> {
    match deadline(headers)? {
        Some(limit) => tokio::time::timeout(limit, call).await.map(Json).map_err(|_| {
            warn!("Call exceeded its deadline of {limit:?}");
            (StatusCode::GATEWAY_TIMEOUT, "deadline exceeded".to_string())
        }),
        None => Ok(Json(call.await)),
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Rejection> {
    payload
        .map(|Json(request)| request)
        .map_err(|rejection| (StatusCode::BAD_REQUEST, rejection.body_text()))
}

async fn deploy_application(
    State(service): State<Arc<DeploymentService>>,
    headers: HeaderMap,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, Rejection> {
    let request = body(payload)?;
    debug!("DeployApplication {}", request.name);
    within_deadline(&headers, service.deploy(request)).await
}

async fn delete_application(
    State(service): State<Arc<DeploymentService>>,
    headers: HeaderMap,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, Rejection> {
    let request = body(payload)?;
    debug!("DeleteApplication {}", request.deployment_id);
    within_deadline(&headers, service.delete(request)).await
}

async fn get_application_status(
    State(service): State<Arc<DeploymentService>>,
    headers: HeaderMap,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, Rejection> {
    let request = body(payload)?;
    debug!("GetApplicationStatus {}", request.deployment_id);
    within_deadline(&headers, service.status(request)).await
}

async fn health_check(
    State(service): State<Arc<DeploymentService>>,
    headers: HeaderMap,
) -> Result<Json<HealthCheckResponse>, Rejection> {
    within_deadline(&headers, service.health_check()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::service::{tests::FakeOrchestrator, JobDefaults};
    use crate::api::types::{DeployStatus, HealthStatus};
    use crate::nomad::{
        model::{AllocationListStub, Job},
        Orchestrator,
    };
    use async_trait::async_trait;

    /// Answers health checks only after a long pause.
    struct SlowOrchestrator;

    #[async_trait]
    impl Orchestrator for SlowOrchestrator {
        async fn submit(&self, _job: &Job) -> crate::nomad::Result<String> {
            Ok("eval".to_string())
        }
        async fn deregister(&self, _job_id: &str, _force: bool) -> crate::nomad::Result<()> {
            Ok(())
        }
        async fn info(&self, _job_id: &str) -> crate::nomad::Result<Job> {
            Ok(Job::default())
        }
        async fn allocations(
            &self,
            _job_id: &str,
        ) -> crate::nomad::Result<Vec<AllocationListStub>> {
            Ok(Vec::new())
        }
        async fn agent_self(&self) -> crate::nomad::Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    async fn spawn(orchestrator: Arc<dyn Orchestrator>) -> String {
        let service = Arc::new(DeploymentService::new(orchestrator, JobDefaults::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(service)).await.unwrap();
        });
        format!("http://{addr}{SERVICE_PATH}")
    }

    #[test]
    fn test_parse_grpc_timeout() {
        assert_eq!(parse_grpc_timeout("30S"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_grpc_timeout("2H"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("5M"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_grpc_timeout("250m"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("10u"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_grpc_timeout("99999999n"), Ok(Duration::from_nanos(99_999_999)));
    }

    #[test]
    fn test_parse_grpc_timeout_rejects() {
        for value in ["", "S", "30", "30s", "123456789S", "-1S", "1.5S", "3 S"] {
            assert!(parse_grpc_timeout(value).is_err(), "{value:?}");
        }
    }

    #[tokio::test]
    async fn test_rpc_round_trip() {
        let base = spawn(Arc::new(FakeOrchestrator::default())).await;
        let client = reqwest::Client::new();

        let deploy: DeployResponse = client
            .post(format!("{base}/DeployApplication"))
            .header(TIMEOUT_HEADER, "10S")
            .json(&DeployRequest {
                name: "web".to_string(),
                image: "nginx:latest".to_string(),
                replicas: 1,
                cpu: 0.1,
                memory: 128,
                ..DeployRequest::default()
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(deploy.status, DeployStatus::Submitted);
        assert_eq!(deploy.deployment_id, "eval-web");

        let status: StatusResponse = client
            .post(format!("{base}/GetApplicationStatus"))
            .json(&StatusRequest {
                deployment_id: "web".to_string(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.desired_instances, 1);
        assert_eq!(status.job_type, "service");

        let delete: DeleteResponse = client
            .post(format!("{base}/DeleteApplication"))
            .json(&DeleteRequest {
                deployment_id: "ghost".to_string(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!delete.success);

        let health: HealthCheckResponse = client
            .post(format!("{base}/HealthCheck"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.status, HealthStatus::Serving);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let base = spawn(Arc::new(FakeOrchestrator::default())).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/DeployApplication"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_deadline_is_bad_request() {
        let base = spawn(Arc::new(FakeOrchestrator::default())).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/HealthCheck"))
            .header(TIMEOUT_HEADER, "soon")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let base = spawn(Arc::new(SlowOrchestrator)).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/HealthCheck"))
            .header(TIMEOUT_HEADER, "50m")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    }
}
