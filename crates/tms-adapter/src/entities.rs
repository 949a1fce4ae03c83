use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub type EntityId = String;

/// Terminal or in-flight verdict of a test, fixture, or step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Passed,
    Failed,
    Skipped,
    InProgress,
    Blocked,
}

/// Lifecycle stage. Strictly forward: scheduled, then running, then finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Scheduled,
    Running,
    Finished,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    Related,
    BlockedBy,
    Defect,
    Issue,
    Requirement,
    Repository,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkItem {
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub link_type: Option<LinkType>,
}

/// One step inside a test or fixture body. Recursive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: Option<String>,
    pub status: Option<ItemStatus>,
    pub stage: Option<ItemStage>,
    pub description: Option<String>,
    pub steps: Vec<StepResult>,
    pub attachments: Vec<String>,
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub parameters: BTreeMap<String, String>,
}

/// One setup or teardown execution, scoped to the run, a class, or a single
/// test (`parent` carries the test id for each-test fixtures).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureResult {
    pub name: Option<String>,
    pub status: Option<ItemStatus>,
    pub stage: Option<ItemStage>,
    pub description: Option<String>,
    pub trace: Option<String>,
    pub steps: Vec<StepResult>,
    pub attachments: Vec<String>,
    pub parent: Option<EntityId>,
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub parameters: BTreeMap<String, String>,
}

/// One test-case execution.
///
/// `external_id` is the stable hash of the fully-qualified test name and is
/// what correlates this execution with the TMS-side autotest across runs.
/// Timestamps are milliseconds since epoch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub uuid: EntityId,
    pub external_id: String,
    pub external_key: Option<String>,
    pub work_item_ids: Vec<String>,
    pub class_name: String,
    pub space_name: String,
    pub labels: Vec<Label>,
    pub tags: Vec<String>,
    pub link_items: Vec<LinkItem>,
    pub result_links: Vec<LinkItem>,
    /// Local file paths until the test stops; attachment ids afterwards.
    pub attachments: Vec<String>,
    pub name: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub trace: Option<String>,
    pub status: Option<ItemStatus>,
    pub stage: Option<ItemStage>,
    pub description: Option<String>,
    pub steps: Vec<StepResult>,
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub parameters: BTreeMap<String, String>,
    pub automatic_creation_test_cases: bool,
}

/// Groups every test case sharing one logical grouping key, with the four
/// fixture lists scoped to it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassContainer {
    pub uuid: EntityId,
    pub name: Option<String>,
    pub before_each: Vec<FixtureResult>,
    pub after_each: Vec<FixtureResult>,
    pub before_class: Vec<FixtureResult>,
    pub after_class: Vec<FixtureResult>,
    pub children: Vec<EntityId>,
    pub start: Option<i64>,
    pub stop: Option<i64>,
}

/// Top-level grouping for one execution session. Lives for the process
/// lifetime once created.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContainer {
    pub uuid: EntityId,
    pub before_all: Vec<FixtureResult>,
    pub after_all: Vec<FixtureResult>,
    pub children: Vec<EntityId>,
    pub start: Option<i64>,
    pub stop: Option<i64>,
}

/// Stable external id for a fully-qualified test name: uppercase hex of its
/// content hash, identical across re-runs of the same test.
pub fn external_id(full_name: &str) -> String {
    blake3::hash(full_name.as_bytes())
        .to_hex()
        .to_string()
        .to_uppercase()
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

pub fn new_entity_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}
