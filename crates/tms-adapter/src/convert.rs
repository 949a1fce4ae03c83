//! Mapping between in-memory execution entities and the wire models.
//!
//! All functions here are pure; anything that cannot be mapped is logged and
//! dropped so one malformed entity never blocks a batch.

use tracing::warn;

use tms_client::models::{
    AttachmentRef, AutoTest, AutoTestStep, CreateAutoTestRequest, LabelModel, LinkModel, Outcome,
    StepResultModel, TestResultResponse, TestResultUpdateRequest, TestRunResultRequest,
    UpdateAutoTestRequest, WireLinkType,
};

use crate::entities::{FixtureResult, ItemStatus, Label, LinkItem, LinkType, StepResult, TestResult};

pub fn outcome_for(status: ItemStatus) -> Outcome {
    match status {
        ItemStatus::Passed => Outcome::Passed,
        ItemStatus::Failed => Outcome::Failed,
        ItemStatus::Skipped => Outcome::Skipped,
        ItemStatus::InProgress => Outcome::InProgress,
        ItemStatus::Blocked => Outcome::Blocked,
    }
}

pub fn status_for(outcome: Outcome) -> ItemStatus {
    match outcome {
        Outcome::Passed => ItemStatus::Passed,
        Outcome::Failed => ItemStatus::Failed,
        Outcome::Skipped => ItemStatus::Skipped,
        Outcome::InProgress => ItemStatus::InProgress,
        Outcome::Blocked => ItemStatus::Blocked,
    }
}

fn wire_link_type(link_type: LinkType) -> WireLinkType {
    match link_type {
        LinkType::Related => WireLinkType::Related,
        LinkType::BlockedBy => WireLinkType::BlockedBy,
        LinkType::Defect => WireLinkType::Defect,
        LinkType::Issue => WireLinkType::Issue,
        LinkType::Requirement => WireLinkType::Requirement,
        LinkType::Repository => WireLinkType::Repository,
    }
}

pub fn link_model(link: &LinkItem) -> LinkModel {
    LinkModel {
        title: link.title.clone(),
        url: link.url.clone(),
        description: link.description.clone(),
        link_type: link.link_type.map(wire_link_type),
    }
}

pub fn link_models(links: &[LinkItem]) -> Vec<LinkModel> {
    links.iter().map(link_model).collect()
}

fn internal_link_type(link_type: WireLinkType) -> LinkType {
    match link_type {
        WireLinkType::Related => LinkType::Related,
        WireLinkType::BlockedBy => LinkType::BlockedBy,
        WireLinkType::Defect => LinkType::Defect,
        WireLinkType::Issue => LinkType::Issue,
        WireLinkType::Requirement => LinkType::Requirement,
        WireLinkType::Repository => LinkType::Repository,
    }
}

pub fn link_item(link: &LinkModel) -> LinkItem {
    LinkItem {
        title: link.title.clone(),
        url: link.url.clone(),
        description: link.description.clone(),
        link_type: link.link_type.map(internal_link_type),
    }
}

fn steps_from_definition(steps: &[AutoTestStep]) -> Vec<StepResult> {
    steps
        .iter()
        .map(|step| StepResult {
            name: Some(step.title.clone()),
            description: step.description.clone(),
            steps: steps_from_definition(&step.steps),
            ..StepResult::default()
        })
        .collect()
}

/// Internal view of a remote autotest, used by fetch-merge-update flows to
/// compare remote state against the local run. The status reflects the last
/// recorded remote outcome.
pub fn test_from_remote(remote: &AutoTest) -> TestResult {
    TestResult {
        external_id: remote.external_id.clone(),
        external_key: remote.external_key.clone(),
        name: remote.name.clone(),
        space_name: remote.namespace.clone().unwrap_or_default(),
        class_name: remote.classname.clone().unwrap_or_default(),
        title: remote.title.clone(),
        description: remote.description.clone(),
        labels: remote
            .labels
            .iter()
            .map(|label| Label {
                name: label.name.clone(),
            })
            .collect(),
        link_items: remote.links.iter().map(link_item).collect(),
        status: remote.last_test_result_outcome.map(status_for),
        steps: steps_from_definition(&remote.steps),
        ..TestResult::default()
    }
}

fn label_models(labels: &[Label]) -> Vec<LabelModel> {
    labels
        .iter()
        .map(|label| LabelModel {
            name: label.name.clone(),
        })
        .collect()
}

fn attachment_refs(ids: &[String]) -> Vec<AttachmentRef> {
    ids.iter()
        .map(|id| AttachmentRef { id: id.clone() })
        .collect()
}

/// Seconds since epoch from a millisecond timestamp, 0 when unknown.
fn seconds(millis: Option<i64>) -> i64 {
    millis.unwrap_or(0) / 1000
}

fn duration_millis(start: Option<i64>, stop: Option<i64>) -> i64 {
    match (start, stop) {
        (Some(start), Some(stop)) if stop >= start => stop - start,
        _ => 0,
    }
}

/// Definition-side steps (no outcomes, just structure).
pub fn definition_steps(steps: &[StepResult]) -> Vec<AutoTestStep> {
    steps
        .iter()
        .map(|step| AutoTestStep {
            title: step.name.clone().unwrap_or_default(),
            description: step.description.clone(),
            steps: definition_steps(&step.steps),
        })
        .collect()
}

/// Result-side steps. Steps without a status are reported as in progress so
/// partially executed bodies stay visible.
pub fn result_steps(steps: &[StepResult]) -> Vec<StepResultModel> {
    steps
        .iter()
        .map(|step| StepResultModel {
            title: step.name.clone(),
            description: step.description.clone(),
            started_on: seconds(step.start),
            completed_on: seconds(step.stop),
            duration: duration_millis(step.start, step.stop),
            outcome: step.status.map(outcome_for).unwrap_or(Outcome::InProgress),
            step_results: result_steps(&step.steps),
            attachments: attachment_refs(&step.attachments),
            parameters: step.parameters.clone(),
        })
        .collect()
}

/// Selects the fixtures visible to one test: container-scoped fixtures
/// (no parent) apply to every test in the container, per-test fixtures only
/// to the test they name.
fn scoped<'a>(
    fixtures: &'a [FixtureResult],
    test_id: &'a str,
) -> impl Iterator<Item = &'a FixtureResult> {
    fixtures
        .iter()
        .filter(move |fixture| match fixture.parent.as_deref() {
            None => true,
            Some(parent) => parent == test_id,
        })
}

pub fn fixture_definition_steps(fixtures: &[FixtureResult], test_id: &str) -> Vec<AutoTestStep> {
    scoped(fixtures, test_id)
        .map(|fixture| AutoTestStep {
            title: fixture.name.clone().unwrap_or_default(),
            description: fixture.description.clone(),
            steps: definition_steps(&fixture.steps),
        })
        .collect()
}

pub fn fixture_result_steps(fixtures: &[FixtureResult], test_id: &str) -> Vec<StepResultModel> {
    scoped(fixtures, test_id)
        .map(|fixture| StepResultModel {
            title: fixture.name.clone(),
            description: fixture.description.clone(),
            started_on: seconds(fixture.start),
            completed_on: seconds(fixture.stop),
            duration: duration_millis(fixture.start, fixture.stop),
            outcome: fixture
                .status
                .map(outcome_for)
                .unwrap_or(Outcome::InProgress),
            step_results: result_steps(&fixture.steps),
            attachments: attachment_refs(&fixture.attachments),
            parameters: fixture.parameters.clone(),
        })
        .collect()
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Request to register a previously unknown autotest. `None` when the entity
/// lacks the identity fields the TMS requires.
pub fn create_request(test: &TestResult, project_id: &str) -> Option<CreateAutoTestRequest> {
    if test.external_id.is_empty() || test.name.is_empty() {
        warn!(uuid = %test.uuid, "test lacks external id or name; cannot create autotest");
        return None;
    }
    Some(CreateAutoTestRequest {
        project_id: project_id.to_string(),
        external_id: test.external_id.clone(),
        external_key: test.external_key.clone(),
        name: test.name.clone(),
        namespace: optional(&test.space_name),
        classname: optional(&test.class_name),
        title: test.title.clone(),
        description: test.description.clone(),
        is_flaky: false,
        should_create_work_item: test.automatic_creation_test_cases,
        steps: definition_steps(&test.steps),
        setup: Vec::new(),
        teardown: Vec::new(),
        labels: label_models(&test.labels),
        links: link_models(&test.link_items),
    })
}

/// Update built from the local entity, used when the test passed and the
/// local definition is authoritative.
pub fn update_request_from_test(
    test: &TestResult,
    project_id: &str,
    remote_id: Option<String>,
    is_flaky: bool,
) -> UpdateAutoTestRequest {
    UpdateAutoTestRequest {
        id: remote_id,
        project_id: project_id.to_string(),
        external_id: test.external_id.clone(),
        external_key: test.external_key.clone(),
        name: test.name.clone(),
        namespace: optional(&test.space_name),
        classname: optional(&test.class_name),
        title: test.title.clone(),
        description: test.description.clone(),
        is_flaky,
        steps: definition_steps(&test.steps),
        setup: Vec::new(),
        teardown: Vec::new(),
        labels: label_models(&test.labels),
        links: link_models(&test.link_items),
    }
}

/// Update built from the remote definition, used when the test failed: the
/// last known-good steps are preserved and only links (and the flaky flag)
/// are refreshed from the local run.
pub fn update_request_from_remote(
    remote: &AutoTest,
    links: Vec<LinkModel>,
    is_flaky: bool,
) -> UpdateAutoTestRequest {
    UpdateAutoTestRequest {
        id: Some(remote.id.clone()),
        project_id: remote.project_id.clone(),
        external_id: remote.external_id.clone(),
        external_key: remote.external_key.clone(),
        name: remote.name.clone(),
        namespace: remote.namespace.clone(),
        classname: remote.classname.clone(),
        title: remote.title.clone(),
        description: remote.description.clone(),
        is_flaky,
        steps: remote.steps.clone(),
        setup: remote.setup.clone(),
        teardown: remote.teardown.clone(),
        labels: remote.labels.clone(),
        links,
    }
}

/// A remote autotest stays flaky once marked; it also becomes flaky when the
/// current execution failed after a non-failing recorded outcome.
pub fn escalated_flakiness(remote: &AutoTest, current: Option<ItemStatus>) -> bool {
    if remote.is_flaky {
        return true;
    }
    current == Some(ItemStatus::Failed)
        && remote
            .last_test_result_outcome
            .is_some_and(|outcome| !outcome.is_failing())
}

/// Result submission for one finished test. `None` when the test never
/// received a verdict, which is logged and skips only this test.
pub fn run_result_request(
    test: &TestResult,
    configuration_id: &str,
    setup_results: Option<Vec<StepResultModel>>,
    teardown_results: Option<Vec<StepResultModel>>,
) -> Option<TestRunResultRequest> {
    let Some(status) = test.status else {
        warn!(uuid = %test.uuid, external_id = %test.external_id, "test has no status; skipping result submission");
        return None;
    };
    Some(TestRunResultRequest {
        configuration_id: configuration_id.to_string(),
        auto_test_external_id: test.external_id.clone(),
        outcome: outcome_for(status),
        message: test.message.clone(),
        traces: test.trace.clone(),
        started_on: seconds(test.start),
        completed_on: seconds(test.stop),
        duration: duration_millis(test.start, test.stop),
        links: link_models(&test.result_links),
        attachments: attachment_refs(&test.attachments),
        parameters: test.parameters.clone(),
        step_results: result_steps(&test.steps),
        setup_results,
        teardown_results,
    })
}

/// Patch for an already submitted result, carrying its recorded fields
/// forward and adding the late container-scoped fixture outcomes.
pub fn result_update_request(
    response: &TestResultResponse,
    setup_results: Vec<StepResultModel>,
    teardown_results: Vec<StepResultModel>,
) -> TestResultUpdateRequest {
    TestResultUpdateRequest {
        outcome: response.outcome,
        comment: response.comment.clone(),
        duration: response.duration_in_ms,
        links: response.links.clone(),
        step_results: response.step_results.clone(),
        attachments: response.attachments.clone(),
        setup_results: Some(setup_results),
        teardown_results: Some(teardown_results),
    }
}
