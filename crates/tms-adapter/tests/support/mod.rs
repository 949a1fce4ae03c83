//! Shared fakes for the adapter integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tms_client::api::{ApiError, ApiResult, TmsClient};
use tms_client::models::{
    AutoTest, CreateAutoTestRequest, TestResultResponse, TestResultUpdateRequest, TestRun,
    TestRunResultRequest, UpdateAutoTestRequest, WorkItemIdentifier,
};

use tms_adapter::config::{AdapterConfig, ClientConfig};
use tms_adapter::entities::{TestResult, external_id};
use tms_adapter::manager::AdapterManager;
use tms_adapter::store::EntityStore;
use tms_adapter::writer::HttpWriter;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateTestRun,
    StartTestRun(String),
    CompleteTestRun(String),
    GetTestRun(String),
    SearchAutoTest(String),
    CreateAutoTest(String),
    UpdateAutoTest(String),
    GetLinkedWorkItems(String),
    LinkWorkItem(String, String),
    UnlinkWorkItem(String, String),
    SubmitResults(String, usize),
    GetTestResult(String),
    UpdateTestResult(String),
    UploadAttachment(String),
    GetTestsFromRun(String),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    auto_tests: HashMap<String, AutoTest>,
    linked: HashMap<String, Vec<WorkItemIdentifier>>,
    submitted: Vec<TestRunResultRequest>,
    updates: Vec<UpdateAutoTestRequest>,
    results: HashMap<String, TestResultResponse>,
    result_updates: Vec<(String, TestResultUpdateRequest)>,
    planned: Vec<String>,
    fail_uploads: HashSet<String>,
    link_failures_remaining: usize,
    run_state: Option<String>,
    next_id: usize,
}

/// In-memory [`TmsClient`] that records every call and can be primed with
/// remote state and failures.
#[derive(Default)]
pub struct FakeClient {
    state: Mutex<FakeState>,
}

fn remote_failure() -> ApiError {
    ApiError::Status {
        operation: "fake call",
        status: 500,
        body: "injected failure".to_string(),
    }
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state mutex poisoned")
    }

    pub fn preload_auto_test(&self, auto_test: AutoTest) {
        self.state()
            .auto_tests
            .insert(auto_test.external_id.clone(), auto_test);
    }

    pub fn preload_linked(&self, auto_test_id: &str, items: Vec<WorkItemIdentifier>) {
        self.state().linked.insert(auto_test_id.to_string(), items);
    }

    pub fn fail_upload(&self, path: &str) {
        self.state().fail_uploads.insert(path.to_string());
    }

    pub fn fail_links(&self, times: usize) {
        self.state().link_failures_remaining = times;
    }

    pub fn set_run_state(&self, state: &str) {
        self.state().run_state = Some(state.to_string());
    }

    pub fn set_planned(&self, external_ids: Vec<String>) {
        self.state().planned = external_ids;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn submitted(&self) -> Vec<TestRunResultRequest> {
        self.state().submitted.clone()
    }

    pub fn updates(&self) -> Vec<UpdateAutoTestRequest> {
        self.state().updates.clone()
    }

    pub fn result_updates(&self) -> Vec<(String, TestResultUpdateRequest)> {
        self.state().result_updates.clone()
    }

    pub fn linked(&self, auto_test_id: &str) -> Vec<WorkItemIdentifier> {
        self.state()
            .linked
            .get(auto_test_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl TmsClient for FakeClient {
    async fn create_test_run(&self, name: Option<&str>) -> ApiResult<TestRun> {
        let mut state = self.state();
        state.calls.push(Call::CreateTestRun);
        Ok(TestRun {
            id: "run-1".to_string(),
            name: name.map(str::to_string),
            state_name: Some("NotStarted".to_string()),
        })
    }

    async fn start_test_run(&self, run_id: &str) -> ApiResult<()> {
        self.state().calls.push(Call::StartTestRun(run_id.to_string()));
        Ok(())
    }

    async fn complete_test_run(&self, run_id: &str) -> ApiResult<()> {
        self.state()
            .calls
            .push(Call::CompleteTestRun(run_id.to_string()));
        Ok(())
    }

    async fn get_test_run(&self, run_id: &str) -> ApiResult<TestRun> {
        let mut state = self.state();
        state.calls.push(Call::GetTestRun(run_id.to_string()));
        Ok(TestRun {
            id: run_id.to_string(),
            name: None,
            state_name: state.run_state.clone().or(Some("InProgress".to_string())),
        })
    }

    async fn get_auto_test_by_external_id(&self, external_id: &str) -> ApiResult<Option<AutoTest>> {
        let mut state = self.state();
        state
            .calls
            .push(Call::SearchAutoTest(external_id.to_string()));
        Ok(state.auto_tests.get(external_id).cloned())
    }

    async fn create_auto_test(&self, request: CreateAutoTestRequest) -> ApiResult<String> {
        let mut state = self.state();
        state
            .calls
            .push(Call::CreateAutoTest(request.external_id.clone()));
        let id = format!("auto-{}", request.external_id);
        state.auto_tests.insert(
            request.external_id.clone(),
            AutoTest {
                id: id.clone(),
                project_id: request.project_id,
                external_id: request.external_id,
                name: request.name,
                ..AutoTest::default()
            },
        );
        Ok(id)
    }

    async fn update_auto_test(&self, request: UpdateAutoTestRequest) -> ApiResult<()> {
        let mut state = self.state();
        state
            .calls
            .push(Call::UpdateAutoTest(request.external_id.clone()));
        state.updates.push(request);
        Ok(())
    }

    async fn link_work_item(&self, auto_test_id: &str, work_item_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.calls.push(Call::LinkWorkItem(
            auto_test_id.to_string(),
            work_item_id.to_string(),
        ));
        if state.link_failures_remaining > 0 {
            state.link_failures_remaining -= 1;
            return Err(remote_failure());
        }
        state
            .linked
            .entry(auto_test_id.to_string())
            .or_default()
            .push(WorkItemIdentifier {
                id: work_item_id.to_string(),
                global_id: None,
            });
        Ok(())
    }

    async fn unlink_work_item(&self, auto_test_id: &str, work_item_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.calls.push(Call::UnlinkWorkItem(
            auto_test_id.to_string(),
            work_item_id.to_string(),
        ));
        if let Some(items) = state.linked.get_mut(auto_test_id) {
            items.retain(|item| item.id != work_item_id);
        }
        Ok(())
    }

    async fn get_linked_work_items(
        &self,
        auto_test_id: &str,
    ) -> ApiResult<Vec<WorkItemIdentifier>> {
        let mut state = self.state();
        state
            .calls
            .push(Call::GetLinkedWorkItems(auto_test_id.to_string()));
        Ok(state.linked.get(auto_test_id).cloned().unwrap_or_default())
    }

    async fn submit_results(
        &self,
        run_id: &str,
        results: Vec<TestRunResultRequest>,
    ) -> ApiResult<Vec<String>> {
        let mut state = self.state();
        state
            .calls
            .push(Call::SubmitResults(run_id.to_string(), results.len()));
        let mut ids = Vec::new();
        for result in results {
            state.next_id += 1;
            let id = format!("result-{}", state.next_id);
            state.results.insert(
                id.clone(),
                TestResultResponse {
                    id: id.clone(),
                    outcome: Some(result.outcome),
                    comment: result.message.clone(),
                    duration_in_ms: Some(result.duration),
                    links: result.links.clone(),
                    step_results: result.step_results.clone(),
                    attachments: result.attachments.clone(),
                },
            );
            state.submitted.push(result);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_test_result(&self, result_id: &str) -> ApiResult<TestResultResponse> {
        let mut state = self.state();
        state.calls.push(Call::GetTestResult(result_id.to_string()));
        state
            .results
            .get(result_id)
            .cloned()
            .ok_or_else(|| ApiError::MissingData(format!("unknown result {result_id}")))
    }

    async fn update_test_result(
        &self,
        result_id: &str,
        request: TestResultUpdateRequest,
    ) -> ApiResult<()> {
        let mut state = self.state();
        state
            .calls
            .push(Call::UpdateTestResult(result_id.to_string()));
        state.result_updates.push((result_id.to_string(), request));
        Ok(())
    }

    async fn upload_attachment(&self, path: &str) -> ApiResult<String> {
        let mut state = self.state();
        state
            .calls
            .push(Call::UploadAttachment(path.to_string()));
        if state.fail_uploads.contains(path) {
            return Err(remote_failure());
        }
        Ok(format!("att-{path}"))
    }

    async fn get_tests_from_run(
        &self,
        run_id: &str,
        _configuration_id: &str,
    ) -> ApiResult<Vec<String>> {
        let mut state = self.state();
        state
            .calls
            .push(Call::GetTestsFromRun(run_id.to_string()));
        Ok(state.planned.clone())
    }
}

pub fn client_config() -> ClientConfig {
    ClientConfig {
        url: Some("https://tms.example.com".to_string()),
        private_token: Some("token".to_string()),
        project_id: Some("p1".to_string()),
        configuration_id: Some("cfg-1".to_string()),
        ..ClientConfig::default()
    }
}

pub fn manager_with(
    client: Arc<FakeClient>,
    adapter_config: AdapterConfig,
    config: ClientConfig,
    automatic_link_updates: bool,
) -> AdapterManager {
    let storage = EntityStore::new();
    let writer = Arc::new(HttpWriter::new(
        client.clone(),
        storage.clone(),
        config.project_id.clone().unwrap_or_default(),
        config.configuration_id.clone().unwrap_or_default(),
        automatic_link_updates,
    ));
    AdapterManager::new(client, writer, storage, adapter_config, config)
}

pub fn manager(client: Arc<FakeClient>) -> AdapterManager {
    manager_with(client, AdapterConfig::default(), client_config(), false)
}

pub fn sample_test(uuid: &str, full_name: &str, short_name: &str) -> TestResult {
    TestResult {
        uuid: uuid.to_string(),
        external_id: external_id(full_name),
        name: short_name.to_string(),
        class_name: "SampleClass".to_string(),
        space_name: "SampleSuite".to_string(),
        ..TestResult::default()
    }
}
