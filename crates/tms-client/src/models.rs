use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result outcome as the TMS encodes it on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
    InProgress,
    Blocked,
}

impl Outcome {
    pub fn is_failing(self) -> bool {
        matches!(self, Outcome::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireLinkType {
    Related,
    BlockedBy,
    Defect,
    Issue,
    Requirement,
    Repository,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkModel {
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub link_type: Option<WireLinkType>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelModel {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub id: String,
}

/// One step in an autotest definition. Recursive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTestStep {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<AutoTestStep>,
}

/// Remote representation of an autotest definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTest {
    pub id: String,
    pub project_id: String,
    pub external_id: String,
    #[serde(default)]
    pub external_key: Option<String>,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub classname: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_flaky: bool,
    #[serde(default)]
    pub steps: Vec<AutoTestStep>,
    #[serde(default)]
    pub setup: Vec<AutoTestStep>,
    #[serde(default)]
    pub teardown: Vec<AutoTestStep>,
    #[serde(default)]
    pub labels: Vec<LabelModel>,
    #[serde(default)]
    pub links: Vec<LinkModel>,
    #[serde(default)]
    pub last_test_result_outcome: Option<Outcome>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutoTestRequest {
    pub project_id: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_key: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_flaky: bool,
    pub should_create_work_item: bool,
    pub steps: Vec<AutoTestStep>,
    pub setup: Vec<AutoTestStep>,
    pub teardown: Vec<AutoTestStep>,
    pub labels: Vec<LabelModel>,
    pub links: Vec<LinkModel>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutoTestRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub project_id: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_key: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_flaky: bool,
    pub steps: Vec<AutoTestStep>,
    pub setup: Vec<AutoTestStep>,
    pub teardown: Vec<AutoTestStep>,
    pub labels: Vec<LabelModel>,
    pub links: Vec<LinkModel>,
}

/// One step's outcome inside a submitted or patched result. Recursive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResultModel {
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Seconds since epoch.
    pub started_on: i64,
    /// Seconds since epoch.
    pub completed_on: i64,
    /// Milliseconds.
    pub duration: i64,
    pub outcome: Outcome,
    #[serde(default)]
    pub step_results: Vec<StepResultModel>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Submission of one test's result into a test run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunResultRequest {
    pub configuration_id: String,
    pub auto_test_external_id: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<String>,
    /// Seconds since epoch.
    pub started_on: i64,
    /// Seconds since epoch.
    pub completed_on: i64,
    /// Milliseconds.
    pub duration: i64,
    pub links: Vec<LinkModel>,
    pub attachments: Vec<AttachmentRef>,
    pub parameters: BTreeMap<String, String>,
    pub step_results: Vec<StepResultModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_results: Option<Vec<StepResultModel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_results: Option<Vec<StepResultModel>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state_name: Option<String>,
}

impl TestRun {
    pub fn is_completed(&self) -> bool {
        self.state_name.as_deref() == Some("Completed")
    }
}

/// A previously submitted result as the TMS returns it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultResponse {
    pub id: String,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub duration_in_ms: Option<i64>,
    #[serde(default)]
    pub links: Vec<LinkModel>,
    #[serde(default)]
    pub step_results: Vec<StepResultModel>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

/// Patch for a previously submitted result, used once container-scoped
/// fixture data becomes available.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    pub links: Vec<LinkModel>,
    pub step_results: Vec<StepResultModel>,
    pub attachments: Vec<AttachmentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_results: Option<Vec<StepResultModel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_results: Option<Vec<StepResultModel>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemIdentifier {
    pub id: String,
    #[serde(default)]
    pub global_id: Option<i64>,
}
