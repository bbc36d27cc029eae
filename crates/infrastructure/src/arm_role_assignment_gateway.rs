//! Azure Resource Manager implementation of the role assignment gateway.

use std::time::Duration;

use async_trait::async_trait;
use polgrant_application::{
    CreateRoleAssignmentRequest, RemoteRoleAssignment, RoleAssignmentGateway,
};
use polgrant_core::{AppError, AppResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Default ARM endpoint for the public cloud.
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Default `api-version` for `Microsoft.Authorization/roleAssignments`.
pub const DEFAULT_ROLE_ASSIGNMENT_API_VERSION: &str = "2022-04-01";

/// Connection settings for [`ArmRoleAssignmentGateway`].
#[derive(Debug, Clone)]
pub struct ArmGatewaySettings {
    /// ARM base URL without a trailing path.
    pub endpoint: Url,
    /// `api-version` query value sent with every request.
    pub api_version: String,
    /// Bearer token accepted by ARM.
    pub access_token: String,
    /// Attempts per request for throttled or unavailable responses.
    pub max_attempts: u8,
    /// Linear backoff step between attempts.
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Serialize)]
struct CreateRoleAssignmentBody<'a> {
    properties: CreateRoleAssignmentProperties<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoleAssignmentProperties<'a> {
    role_definition_id: &'a str,
    principal_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RoleAssignmentResponse {
    id: String,
    properties: RoleAssignmentResponseProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignmentResponseProperties {
    principal_id: String,
    role_definition_id: String,
    scope: String,
}

#[derive(Debug, Deserialize)]
struct ArmErrorResponse {
    error: ArmErrorBody,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    code: String,
    message: String,
}

/// HTTP gateway creating, reading and deleting ARM role assignments.
pub struct ArmRoleAssignmentGateway {
    http_client: reqwest::Client,
    endpoint: Url,
    api_version: String,
    access_token: String,
    max_attempts: u8,
    retry_backoff_ms: u64,
}

impl ArmRoleAssignmentGateway {
    /// Creates a gateway on top of a configured HTTP client.
    #[must_use]
    pub fn new(http_client: reqwest::Client, settings: ArmGatewaySettings) -> Self {
        Self {
            http_client,
            endpoint: settings.endpoint,
            api_version: settings.api_version,
            access_token: settings.access_token,
            max_attempts: settings.max_attempts.max(1),
            retry_backoff_ms: settings.retry_backoff_ms.max(50),
        }
    }

    fn resource_url(&self, resource_path: &str) -> AppResult<Url> {
        if !resource_path.starts_with('/') {
            return Err(AppError::Validation(format!(
                "ARM resource path '{resource_path}' must start with '/'"
            )));
        }

        let base = self.endpoint.as_str().trim_end_matches('/');
        let mut url = Url::parse(format!("{base}{resource_path}").as_str()).map_err(|error| {
            AppError::Validation(format!(
                "invalid ARM resource path '{resource_path}': {error}"
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("api-version", self.api_version.as_str());

        Ok(url)
    }

    fn assignment_url(&self, scope: &str, name: &str) -> AppResult<Url> {
        let scope = scope.trim_end_matches('/');
        self.resource_url(
            format!("{scope}/providers/Microsoft.Authorization/roleAssignments/{name}").as_str(),
        )
    }

    async fn send_with_retry<F>(
        &self,
        operation: &str,
        mut build: F,
    ) -> AppResult<reqwest::Response>
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);
            let response = build(&self.http_client)
                .bearer_auth(self.access_token.as_str())
                .send()
                .await;

            match response {
                Ok(response) if is_transient_status(response.status()) => {
                    last_error = Some(format!(
                        "transient HTTP status {} for role assignment {operation}",
                        response.status()
                    ));
                }
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_error = Some(format!(
                        "role assignment {operation} transport error: {error}"
                    ));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                debug!(operation, attempt, delay_ms = delay, "retrying ARM request");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Internal(last_error.unwrap_or_else(|| {
            format!("role assignment {operation} exhausted retries")
        })))
    }
}

#[async_trait]
impl RoleAssignmentGateway for ArmRoleAssignmentGateway {
    async fn create_role_assignment(
        &self,
        request: CreateRoleAssignmentRequest,
    ) -> AppResult<String> {
        let name = request.name.to_string();
        let url = self.assignment_url(request.scope.as_str(), name.as_str())?;
        let body = CreateRoleAssignmentBody {
            properties: CreateRoleAssignmentProperties {
                role_definition_id: request.role_definition_id.as_str(),
                principal_id: request.principal_id.as_str(),
            },
        };

        let response = self
            .send_with_retry("create", |client| client.put(url.clone()).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("create", response).await);
        }

        let assignment = parse_assignment("create", response).await?;
        Ok(assignment.id)
    }

    async fn get_role_assignment(&self, resource_id: &str) -> AppResult<RemoteRoleAssignment> {
        let url = self.resource_url(resource_id)?;
        let response = self
            .send_with_retry("read", |client| client.get(url.clone()))
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("read", response).await);
        }

        let assignment = parse_assignment("read", response).await?;
        Ok(RemoteRoleAssignment {
            principal_id: assignment.properties.principal_id,
            scope: assignment.properties.scope,
            role_definition_id: assignment.properties.role_definition_id,
        })
    }

    async fn delete_role_assignment(&self, resource_id: &str) -> AppResult<()> {
        let url = self.resource_url(resource_id)?;
        let response = self
            .send_with_retry("delete", |client| client.delete(url.clone()))
            .await?;

        // ARM answers 204 when the assignment is already absent.
        match response.status() {
            StatusCode::NO_CONTENT => Err(AppError::NotFound(format!(
                "role assignment '{resource_id}' does not exist"
            ))),
            status if status.is_success() => Ok(()),
            _ => Err(error_from_response("delete", response).await),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

async fn parse_assignment(
    operation: &str,
    response: reqwest::Response,
) -> AppResult<RoleAssignmentResponse> {
    response
        .json::<RoleAssignmentResponse>()
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to parse role assignment {operation} response body: {error}"
            ))
        })
}

async fn error_from_response(operation: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_owned());

    map_error_status(operation, status, body.as_str())
}

fn map_error_status(operation: &str, status: StatusCode, body: &str) -> AppError {
    let detail = match serde_json::from_str::<ArmErrorResponse>(body) {
        Ok(parsed) => format!("{}: {}", parsed.error.code, parsed.error.message),
        Err(_) => body.to_owned(),
    };
    let message = format!(
        "role assignment {operation} returned status {}: {detail}",
        status.as_u16()
    );

    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::BAD_REQUEST => AppError::Validation(message),
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        _ => AppError::Internal(message),
    }
}
