//! Polgrant role assignment reconciler runtime.

#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use polgrant_application::{ReconcileMode, ReconcileRun, RoleAssignmentReconciler};
use polgrant_core::{AppError, AppResult, DiagnosticSeverity};
use polgrant_domain::{PlanStep, ReconciliationPlan};
use polgrant_infrastructure::{
    ArmGatewaySettings, ArmRoleAssignmentGateway, DEFAULT_ARM_ENDPOINT,
    DEFAULT_ROLE_ASSIGNMENT_API_VERSION, JsonFileAssignmentStateStore,
    JsonFileDesiredAssignmentSource,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone)]
struct ReconcilerConfig {
    mode: ReconcileMode,
    arm_endpoint: Url,
    api_version: String,
    access_token: String,
    http_timeout_seconds: u64,
    max_attempts: u8,
    retry_backoff_ms: u64,
    desired_path: Option<PathBuf>,
    state_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ReconcilerConfig::load()?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let gateway = ArmRoleAssignmentGateway::new(
        http_client,
        ArmGatewaySettings {
            endpoint: config.arm_endpoint.clone(),
            api_version: config.api_version.clone(),
            access_token: config.access_token.clone(),
            max_attempts: config.max_attempts,
            retry_backoff_ms: config.retry_backoff_ms,
        },
    );
    let reconciler = RoleAssignmentReconciler::new(Arc::new(gateway));
    let state_store = JsonFileAssignmentStateStore::new(config.state_path.clone());

    info!(
        mode = config.mode.as_str(),
        arm_endpoint = %config.arm_endpoint,
        state_path = %config.state_path.display(),
        "polgrant-reconciler started"
    );

    let desired = match config.desired_path.as_ref() {
        Some(path) if config.mode.requires_desired_assignments() => {
            JsonFileDesiredAssignmentSource::new(path.clone())
                .load()
                .await?
        }
        _ => Vec::new(),
    };

    let run = reconciler.run(config.mode, desired, &state_store).await?;
    report(&run);

    let error_count = run.outcome.diagnostics.error_count();
    if error_count > 0 {
        return Err(AppError::Internal(format!(
            "{} run finished with {error_count} error diagnostic(s)",
            run.mode.as_str()
        )));
    }

    Ok(())
}

fn report(run: &ReconcileRun) {
    if let Some(plan) = run.plan.as_ref() {
        report_plan(plan);
    }

    for diagnostic in run.outcome.diagnostics.iter() {
        match diagnostic.severity {
            DiagnosticSeverity::Error => error!(
                summary = %diagnostic.summary,
                detail = %diagnostic.detail,
                "reconciliation error"
            ),
            DiagnosticSeverity::Warning => warn!(
                summary = %diagnostic.summary,
                detail = %diagnostic.detail,
                "reconciliation warning"
            ),
        }
    }
}

fn report_plan(plan: &ReconciliationPlan) {
    for step in plan.steps() {
        match step {
            PlanStep::Create(desired) => info!(
                principal_id = %desired.principal_id(),
                scope = %desired.scope(),
                role_definition_id = %desired.role_definition_id(),
                "plan: create role assignment"
            ),
            PlanStep::Refresh { current, .. } => info!(
                assignment_key = %current.assignment_key(),
                resource_id = current.resource_id().unwrap_or("<none>"),
                "plan: refresh role assignment"
            ),
        }
    }

    for deletion in plan.deletions() {
        info!(
            assignment_key = %deletion.assignment_key(),
            resource_id = deletion.resource_id().unwrap_or("<none>"),
            "plan: delete role assignment"
        );
    }

    info!(
        create = plan.create_count(),
        refresh = plan.refresh_count(),
        delete = plan.delete_count(),
        converged = plan.is_converged(),
        "reconciliation plan"
    );
}

impl ReconcilerConfig {
    fn load() -> AppResult<Self> {
        let mode = env::var("RECONCILE_MODE")
            .ok()
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| ReconcileMode::Apply.as_str().to_owned())
            .parse::<ReconcileMode>()?;

        let endpoint =
            env::var("ARM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ARM_ENDPOINT.to_owned());
        let arm_endpoint = Url::parse(endpoint.trim_end_matches('/')).map_err(|error| {
            AppError::Validation(format!("invalid ARM_ENDPOINT value '{endpoint}': {error}"))
        })?;
        let api_version = env::var("ARM_ROLE_ASSIGNMENT_API_VERSION")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE_ASSIGNMENT_API_VERSION.to_owned());
        let access_token = if mode.requires_gateway() {
            required_env("ARM_ACCESS_TOKEN")?
        } else {
            env::var("ARM_ACCESS_TOKEN").unwrap_or_default()
        };
        let http_timeout_seconds = parse_env_u64("ARM_HTTP_TIMEOUT_SECONDS", 30)?;
        let max_attempts = parse_env_u8("ARM_MAX_ATTEMPTS", 3)?;
        let retry_backoff_ms = parse_env_u64("ARM_RETRY_BACKOFF_MS", 500)?;
        let desired_path = if mode.requires_desired_assignments() {
            Some(PathBuf::from(required_env("ROLE_ASSIGNMENTS_DESIRED_PATH")?))
        } else {
            env::var("ROLE_ASSIGNMENTS_DESIRED_PATH")
                .ok()
                .map(PathBuf::from)
        };
        let state_path = env::var("ROLE_ASSIGNMENTS_STATE_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("role-assignments.state.json"));

        if access_token.trim().is_empty() && mode.requires_gateway() {
            return Err(AppError::Validation(
                "ARM_ACCESS_TOKEN must not be empty".to_owned(),
            ));
        }

        if http_timeout_seconds == 0 {
            return Err(AppError::Validation(
                "ARM_HTTP_TIMEOUT_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if max_attempts == 0 {
            return Err(AppError::Validation(
                "ARM_MAX_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            mode,
            arm_endpoint,
            api_version,
            access_token,
            http_timeout_seconds,
            max_attempts,
            retry_backoff_ms,
            desired_path,
            state_path,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u8(name: &str, default: u8) -> AppResult<u8> {
    match env::var(name) {
        Ok(value) => value.parse::<u8>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
