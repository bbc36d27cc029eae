use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use polgrant_core::{AppError, AppResult};
use polgrant_domain::{AppliedAssignment, AssignmentKey, DesiredAssignment};

use crate::role_assignment_ports::{
    AssignmentState, AssignmentStateStore, CreateRoleAssignmentRequest, RemoteRoleAssignment,
    RoleAssignmentGateway,
};

use super::{ReconcileMode, RoleAssignmentReconciler};

const SCOPED_ROLE: &str =
    "/subscriptions/sub1/providers/Microsoft.Authorization/roleDefinitions/role1";
const ROOT_ROLE: &str = "/providers/Microsoft.Authorization/roleDefinitions/role1";

#[derive(Debug, Clone, PartialEq, Eq)]
enum GatewayCall {
    Create(CreateRoleAssignmentRequest),
    Get(String),
    Delete(String),
}

#[derive(Default)]
struct FakeRoleAssignmentGateway {
    assignments: Mutex<HashMap<String, RemoteRoleAssignment>>,
    calls: Mutex<Vec<GatewayCall>>,
    failing_principals: Mutex<HashSet<String>>,
    failing_resources: Mutex<HashSet<String>>,
}

impl FakeRoleAssignmentGateway {
    async fn fail_principal(&self, principal_id: &str) {
        self.failing_principals
            .lock()
            .await
            .insert(principal_id.to_owned());
    }

    async fn fail_resource(&self, resource_id: &str) {
        self.failing_resources
            .lock()
            .await
            .insert(resource_id.to_owned());
    }

    async fn remove_remotely(&self, resource_id: &str) {
        self.assignments.lock().await.remove(resource_id);
    }

    async fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().await.clone()
    }

    async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    async fn count(&self, matcher: fn(&GatewayCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|call| matcher(call)).count()
    }
}

fn is_create(call: &GatewayCall) -> bool {
    matches!(call, GatewayCall::Create(_))
}

fn is_get(call: &GatewayCall) -> bool {
    matches!(call, GatewayCall::Get(_))
}

fn is_delete(call: &GatewayCall) -> bool {
    matches!(call, GatewayCall::Delete(_))
}

fn resource_id_for(scope: &str, name: AssignmentKey) -> String {
    format!("{scope}/providers/Microsoft.Authorization/roleAssignments/{name}")
}

#[async_trait]
impl RoleAssignmentGateway for FakeRoleAssignmentGateway {
    async fn create_role_assignment(
        &self,
        request: CreateRoleAssignmentRequest,
    ) -> AppResult<String> {
        self.calls
            .lock()
            .await
            .push(GatewayCall::Create(request.clone()));

        if self
            .failing_principals
            .lock()
            .await
            .contains(request.principal_id.as_str())
        {
            return Err(AppError::Internal("create rejected".to_owned()));
        }

        // Stored in cloud spelling: trimmed scope, lower-case principal.
        let scope = request.scope.trim_end_matches('/').to_owned();
        let resource_id = resource_id_for(scope.as_str(), request.name);
        self.assignments.lock().await.insert(
            resource_id.clone(),
            RemoteRoleAssignment {
                principal_id: request.principal_id.to_ascii_lowercase(),
                scope,
                role_definition_id: request.role_definition_id,
            },
        );
        Ok(resource_id)
    }

    async fn get_role_assignment(&self, resource_id: &str) -> AppResult<RemoteRoleAssignment> {
        self.calls
            .lock()
            .await
            .push(GatewayCall::Get(resource_id.to_owned()));

        if self.failing_resources.lock().await.contains(resource_id) {
            return Err(AppError::Internal("read rejected".to_owned()));
        }

        self.assignments
            .lock()
            .await
            .get(resource_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(resource_id.to_owned()))
    }

    async fn delete_role_assignment(&self, resource_id: &str) -> AppResult<()> {
        self.calls
            .lock()
            .await
            .push(GatewayCall::Delete(resource_id.to_owned()));

        if self.failing_resources.lock().await.contains(resource_id) {
            return Err(AppError::Internal("delete rejected".to_owned()));
        }

        self.assignments
            .lock()
            .await
            .remove(resource_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(resource_id.to_owned()))
    }
}

#[derive(Default)]
struct FakeAssignmentStateStore {
    state: Mutex<AssignmentState>,
    saves: Mutex<usize>,
}

#[async_trait]
impl AssignmentStateStore for FakeAssignmentStateStore {
    async fn load(&self) -> AppResult<AssignmentState> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &AssignmentState) -> AppResult<()> {
        *self.state.lock().await = state.clone();
        *self.saves.lock().await += 1;
        Ok(())
    }
}

fn desired(principal_id: &str, scope: &str, role_definition_id: &str) -> DesiredAssignment {
    match DesiredAssignment::new(principal_id, scope, role_definition_id) {
        Ok(value) => value,
        Err(error) => panic!("valid desired assignment rejected: {error}"),
    }
}

fn reconciler() -> (RoleAssignmentReconciler, Arc<FakeRoleAssignmentGateway>) {
    let gateway = Arc::new(FakeRoleAssignmentGateway::default());
    (RoleAssignmentReconciler::new(gateway.clone()), gateway)
}

async fn applied_state(
    reconciler: &RoleAssignmentReconciler,
    entries: Vec<DesiredAssignment>,
) -> Vec<AppliedAssignment> {
    let outcome = reconciler.create(entries).await;
    assert!(!outcome.has_errors());
    outcome.assignments
}

#[tokio::test]
async fn create_names_assignment_by_key() {
    let (reconciler, gateway) = reconciler();
    let entry = desired("p1", "s1", "r1");

    let outcome = reconciler.create(vec![entry.clone()]).await;

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        GatewayCall::Create(CreateRoleAssignmentRequest {
            scope: "s1".to_owned(),
            name: AssignmentKey::derive("p1", "s1", "r1"),
            principal_id: "p1".to_owned(),
            role_definition_id: "r1".to_owned(),
        })
    );
    assert_eq!(outcome.assignments.len(), 1);
    assert_eq!(
        outcome.assignments[0].resource_id(),
        Some(resource_id_for("s1", entry.assignment_key()).as_str())
    );
    assert_eq!(outcome.summary.created, 1);
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn create_stores_normalized_role_definition() {
    let (reconciler, gateway) = reconciler();

    let outcome = reconciler
        .create(vec![desired("p1", "/subscriptions/sub1", SCOPED_ROLE)])
        .await;

    assert_eq!(outcome.assignments[0].role_definition_id(), Some(ROOT_ROLE));
    let calls = gateway.calls().await;
    assert!(matches!(
        &calls[0],
        GatewayCall::Create(request) if request.role_definition_id == SCOPED_ROLE
    ));
}

#[tokio::test]
async fn create_stops_at_first_failure_without_rollback() {
    let (reconciler, gateway) = reconciler();
    gateway.fail_principal("p2").await;

    let outcome = reconciler
        .create(vec![
            desired("p1", "s1", "r1"),
            desired("p2", "s1", "r1"),
            desired("p3", "s1", "r1"),
        ])
        .await;

    assert_eq!(gateway.count(is_create).await, 2);
    assert_eq!(gateway.count(is_delete).await, 0);
    assert_eq!(outcome.assignments.len(), 1);
    assert_eq!(outcome.assignments[0].principal_id(), Some("p1"));
    assert!(outcome.has_errors());
    assert_eq!(outcome.diagnostics.error_count(), 1);
}

#[tokio::test]
async fn update_with_matching_entry_only_refreshes() {
    let (reconciler, gateway) = reconciler();
    let entry = desired("p1", "s1", "r1");
    let current = applied_state(&reconciler, vec![entry.clone()]).await;
    gateway.clear_calls().await;

    let outcome = reconciler.update(vec![entry], current.clone()).await;

    assert_eq!(gateway.count(is_create).await, 0);
    assert_eq!(gateway.count(is_delete).await, 0);
    assert_eq!(gateway.count(is_get).await, 1);
    assert_eq!(outcome.assignments, current);
    assert_eq!(outcome.summary.refreshed, 1);
}

#[tokio::test]
async fn update_with_empty_plan_deletes_current_entry() {
    let (reconciler, gateway) = reconciler();
    let current = applied_state(&reconciler, vec![desired("p1", "s1", "r1")]).await;
    let resource_id = current[0].resource_id().map(str::to_owned).unwrap_or_default();
    gateway.clear_calls().await;

    let outcome = reconciler.update(Vec::new(), current).await;

    assert_eq!(gateway.calls().await, vec![GatewayCall::Delete(resource_id)]);
    assert!(outcome.assignments.is_empty());
    assert_eq!(outcome.summary.deleted, 1);
}

#[tokio::test]
async fn second_pass_over_unchanged_set_issues_no_mutations() {
    let (reconciler, gateway) = reconciler();
    let entries = vec![desired("p1", "s1", "r1"), desired("p2", "s2", "r2")];
    let current = applied_state(&reconciler, entries.clone()).await;

    let first = reconciler.update(entries.clone(), current).await;
    gateway.clear_calls().await;
    let second = reconciler.update(entries, first.assignments.clone()).await;

    assert_eq!(gateway.count(is_create).await, 0);
    assert_eq!(gateway.count(is_delete).await, 0);
    assert_eq!(second.assignments, first.assignments);
}

#[tokio::test]
async fn update_issues_set_difference_operations() {
    let (reconciler, gateway) = reconciler();
    let kept = desired("p1", "s1", "r1");
    let dropped_one = desired("p2", "s1", "r1");
    let dropped_two = desired("p3", "s1", "r1");
    let current = applied_state(
        &reconciler,
        vec![kept.clone(), dropped_one, dropped_two],
    )
    .await;
    gateway.clear_calls().await;

    let planned = vec![kept, desired("p4", "s1", "r1"), desired("p1", "s2", "r1")];
    let outcome = reconciler.update(planned, current).await;

    assert_eq!(gateway.count(is_create).await, 2);
    assert_eq!(gateway.count(is_delete).await, 2);
    assert_eq!(gateway.count(is_get).await, 1);
    assert_eq!(outcome.assignments.len(), 3);
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn update_treats_changed_role_as_new_identity() {
    let (reconciler, gateway) = reconciler();
    let current = applied_state(&reconciler, vec![desired("p1", "s1", "r1")]).await;
    gateway.clear_calls().await;

    let outcome = reconciler
        .update(vec![desired("p1", "s1", "r2")], current.clone())
        .await;

    assert_eq!(gateway.count(is_create).await, 1);
    assert_eq!(gateway.count(is_delete).await, 1);
    assert_eq!(outcome.assignments.len(), 1);
    assert_ne!(
        outcome.assignments[0].assignment_key(),
        current[0].assignment_key()
    );
}

#[tokio::test]
async fn update_matches_role_definition_spellings() {
    let (reconciler, gateway) = reconciler();
    let current =
        applied_state(&reconciler, vec![desired("p1", "/subscriptions/sub1", SCOPED_ROLE)]).await;
    gateway.clear_calls().await;

    let outcome = reconciler
        .update(vec![desired("p1", "/subscriptions/sub1", ROOT_ROLE)], current)
        .await;

    assert_eq!(gateway.count(is_create).await, 0);
    assert_eq!(gateway.count(is_delete).await, 0);
    assert_eq!(outcome.summary.refreshed, 1);
}

#[tokio::test]
async fn update_keeps_assignment_refreshed_to_cloud_spelling() {
    let (reconciler, gateway) = reconciler();
    let entry = desired("ABC", "s1/", "r1");
    let created = applied_state(&reconciler, vec![entry.clone()]).await;
    let resource_id = created[0].resource_id().map(str::to_owned).unwrap_or_default();
    let refreshed = reconciler.read(created).await;
    assert_eq!(refreshed.assignments[0].scope(), Some("s1"));
    assert_eq!(refreshed.assignments[0].principal_id(), Some("abc"));
    gateway.clear_calls().await;

    let first = reconciler
        .update(vec![entry.clone()], refreshed.assignments)
        .await;
    let second = reconciler.update(vec![entry], first.assignments.clone()).await;

    assert!(
        !gateway
            .calls()
            .await
            .contains(&GatewayCall::Delete(resource_id.clone()))
    );
    assert_eq!(gateway.count(is_create).await, 0);
    assert_eq!(first.summary.refreshed, 1);
    assert_eq!(second.summary.refreshed, 1);
    assert_eq!(
        second.assignments[0].resource_id(),
        Some(resource_id.as_str())
    );
    let cloud = gateway.assignments.lock().await;
    assert_eq!(cloud.len(), 1);
    assert!(cloud.contains_key(resource_id.as_str()));
}

#[tokio::test]
async fn update_recreates_planned_assignment_that_drifted() {
    let (reconciler, gateway) = reconciler();
    let entry = desired("p1", "s1", "r1");
    let current = applied_state(&reconciler, vec![entry.clone()]).await;
    let resource_id = current[0].resource_id().map(str::to_owned).unwrap_or_default();
    gateway.remove_remotely(resource_id.as_str()).await;
    gateway.clear_calls().await;

    let outcome = reconciler.update(vec![entry.clone()], current).await;

    assert_eq!(gateway.count(is_create).await, 1);
    assert_eq!(outcome.assignments.len(), 1);
    assert_eq!(outcome.assignments[0].resource_id(), Some(resource_id.as_str()));
    assert_eq!(outcome.assignments[0].assignment_key(), entry.assignment_key());
    assert_eq!(outcome.summary.drifted, 1);
    assert!(!outcome.has_errors());
    assert_eq!(outcome.diagnostics.len(), 1);
}

#[tokio::test]
async fn update_failure_keeps_unprocessed_entries_and_skips_deletions() {
    let (reconciler, gateway) = reconciler();
    let kept = desired("p1", "s1", "r1");
    let dropped = desired("p2", "s1", "r1");
    let current = applied_state(&reconciler, vec![kept.clone(), dropped]).await;
    gateway.fail_principal("p3").await;
    gateway.clear_calls().await;

    let outcome = reconciler
        .update(vec![desired("p3", "s1", "r1"), kept], current.clone())
        .await;

    assert!(outcome.has_errors());
    assert_eq!(gateway.count(is_delete).await, 0);
    assert_eq!(gateway.count(is_get).await, 0);
    assert_eq!(outcome.assignments.len(), 2);
    for applied in &current {
        assert!(outcome.assignments.contains(applied));
    }
}

#[tokio::test]
async fn read_clears_drifted_entry_but_keeps_it() {
    let (reconciler, gateway) = reconciler();
    let current = applied_state(
        &reconciler,
        vec![desired("p1", "s1", "r1"), desired("p2", "s1", "r1")],
    )
    .await;
    let gone = current[0].resource_id().map(str::to_owned).unwrap_or_default();
    gateway.remove_remotely(gone.as_str()).await;

    let outcome = reconciler.read(current.clone()).await;

    assert_eq!(outcome.assignments.len(), 2);
    assert!(outcome.assignments[0].is_drifted());
    assert_eq!(
        outcome.assignments[0].assignment_key(),
        current[0].assignment_key()
    );
    assert_eq!(outcome.assignments[1], current[1]);
    assert_eq!(outcome.summary.drifted, 1);
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn read_overwrites_fields_with_normalized_remote_values() {
    let (reconciler, gateway) = reconciler();
    let current = applied_state(&reconciler, vec![desired("p1", "s1", ROOT_ROLE)]).await;
    let resource_id = current[0].resource_id().map(str::to_owned).unwrap_or_default();
    gateway.assignments.lock().await.insert(
        resource_id,
        RemoteRoleAssignment {
            principal_id: "p1-renamed".to_owned(),
            scope: "s1".to_owned(),
            role_definition_id: SCOPED_ROLE.to_owned(),
        },
    );

    let outcome = reconciler.read(current).await;

    assert_eq!(outcome.assignments[0].principal_id(), Some("p1-renamed"));
    assert_eq!(outcome.assignments[0].role_definition_id(), Some(ROOT_ROLE));
}

#[tokio::test]
async fn read_stops_at_first_failure_and_returns_remaining_entries() {
    let (reconciler, gateway) = reconciler();
    let current = applied_state(
        &reconciler,
        vec![
            desired("p1", "s1", "r1"),
            desired("p2", "s1", "r1"),
            desired("p3", "s1", "r1"),
        ],
    )
    .await;
    let failing = current[1].resource_id().map(str::to_owned).unwrap_or_default();
    gateway.fail_resource(failing.as_str()).await;
    gateway.clear_calls().await;

    let outcome = reconciler.read(current.clone()).await;

    assert_eq!(gateway.count(is_get).await, 2);
    assert_eq!(outcome.assignments, current);
    assert_eq!(outcome.diagnostics.error_count(), 1);
}

#[tokio::test]
async fn read_skips_entries_without_resource_id() {
    let (reconciler, gateway) = reconciler();
    let mut current = applied_state(&reconciler, vec![desired("p1", "s1", "r1")]).await;
    current[0].mark_drifted();
    gateway.clear_calls().await;

    let outcome = reconciler.read(current.clone()).await;

    assert!(gateway.calls().await.is_empty());
    assert_eq!(outcome.assignments, current);
}

#[tokio::test]
async fn delete_treats_missing_assignment_as_deleted() {
    let (reconciler, gateway) = reconciler();
    let current = applied_state(&reconciler, vec![desired("p1", "s1", "r1")]).await;
    let resource_id = current[0].resource_id().map(str::to_owned).unwrap_or_default();
    gateway.remove_remotely(resource_id.as_str()).await;

    let diagnostics = reconciler.delete(current).await;

    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn delete_continues_past_failures() {
    let (reconciler, gateway) = reconciler();
    let current = applied_state(
        &reconciler,
        vec![
            desired("p1", "s1", "r1"),
            desired("p2", "s1", "r1"),
            desired("p3", "s1", "r1"),
        ],
    )
    .await;
    let failing = current[0].resource_id().map(str::to_owned).unwrap_or_default();
    gateway.fail_resource(failing.as_str()).await;
    gateway.clear_calls().await;

    let diagnostics = reconciler.delete(current).await;

    assert_eq!(gateway.count(is_delete).await, 3);
    assert_eq!(diagnostics.error_count(), 1);
    assert_eq!(gateway.assignments.lock().await.len(), 1);
}

#[tokio::test]
async fn run_plan_mode_makes_no_gateway_calls_and_saves_nothing() {
    let (reconciler, gateway) = reconciler();
    let store = FakeAssignmentStateStore::default();

    let run = reconciler
        .run(ReconcileMode::Plan, vec![desired("p1", "s1", "r1")], &store)
        .await;

    assert!(run.is_ok());
    let run = match run {
        Ok(run) => run,
        Err(error) => panic!("plan run failed: {error}"),
    };
    assert_eq!(run.plan.as_ref().map(|plan| plan.create_count()), Some(1));
    assert!(gateway.calls().await.is_empty());
    assert_eq!(*store.saves.lock().await, 0);
}

#[tokio::test]
async fn run_apply_persists_state_and_converges() {
    let (reconciler, gateway) = reconciler();
    let store = FakeAssignmentStateStore::default();
    let entries = vec![desired("p1", "s1", "r1"), desired("p2", "s1", "r1")];

    let first = reconciler
        .run(ReconcileMode::Apply, entries.clone(), &store)
        .await;
    assert!(first.is_ok());
    assert_eq!(store.state.lock().await.assignments.len(), 2);
    assert!(store.state.lock().await.reconciled_at.is_some());

    gateway.clear_calls().await;
    let second = reconciler.run(ReconcileMode::Apply, entries, &store).await;

    assert!(
        second
            .as_ref()
            .is_ok_and(|run| run.plan.as_ref().is_some_and(|plan| plan.is_converged()))
    );
    assert_eq!(gateway.count(is_create).await, 0);
    assert_eq!(gateway.count(is_delete).await, 0);
    assert_eq!(*store.saves.lock().await, 2);
}

#[tokio::test]
async fn run_apply_on_empty_store_creates_duplicates_once() {
    let (reconciler, gateway) = reconciler();
    let store = FakeAssignmentStateStore::default();
    let entries = vec![
        desired("p1", "/subscriptions/sub1", SCOPED_ROLE),
        desired("p1", "/subscriptions/sub1", ROOT_ROLE),
        desired("p1", "/subscriptions/sub1", SCOPED_ROLE),
    ];

    let planned = reconciler
        .run(ReconcileMode::Plan, entries.clone(), &store)
        .await;
    let applied = reconciler.run(ReconcileMode::Apply, entries, &store).await;

    assert!(planned.is_ok_and(|run| run.plan.is_some_and(|plan| plan.create_count() == 1)));
    assert!(applied.is_ok_and(|run| run.outcome.summary.created == 1));
    assert_eq!(gateway.count(is_create).await, 1);
    assert_eq!(store.state.lock().await.assignments.len(), 1);
}

#[tokio::test]
async fn run_destroy_empties_state_except_failed_deletions() {
    let (reconciler, gateway) = reconciler();
    let store = FakeAssignmentStateStore::default();
    let entries = vec![desired("p1", "s1", "r1"), desired("p2", "s1", "r1")];
    let _ = reconciler.run(ReconcileMode::Apply, entries, &store).await;
    let failing = store.state.lock().await.assignments[1]
        .resource_id()
        .map(str::to_owned)
        .unwrap_or_default();
    gateway.fail_resource(failing.as_str()).await;

    let run = reconciler
        .run(ReconcileMode::Destroy, Vec::new(), &store)
        .await;

    assert!(run.is_ok_and(|run| run.outcome.has_errors() && run.plan.is_none()));
    let state = store.state.lock().await;
    assert_eq!(state.assignments.len(), 1);
    assert_eq!(state.assignments[0].resource_id(), Some(failing.as_str()));
}

#[test]
fn reconcile_mode_parses_known_values() {
    for mode in [
        ReconcileMode::Apply,
        ReconcileMode::Plan,
        ReconcileMode::Refresh,
        ReconcileMode::Destroy,
    ] {
        assert_eq!(mode.as_str().parse::<ReconcileMode>().ok(), Some(mode));
    }
    assert!("sync".parse::<ReconcileMode>().is_err());
}
