use crate::models::{
    AutoTest, CreateAutoTestRequest, TestResultResponse, TestResultUpdateRequest, TestRun,
    TestRunResultRequest, UpdateAutoTestRequest, WorkItemIdentifier,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid client configuration: {0}")]
    InvalidConfiguration(String),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("TMS returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("missing data in TMS response: {0}")]
    MissingData(String),

    #[error("cannot read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Remote TMS operations consumed by the adapter core.
///
/// Every call is fallible and may be retried at the call site; none of them
/// is invoked while the caller holds the entity-store lock.
#[async_trait::async_trait]
pub trait TmsClient: Send + Sync {
    async fn create_test_run(&self, name: Option<&str>) -> ApiResult<TestRun>;
    async fn start_test_run(&self, run_id: &str) -> ApiResult<()>;
    async fn complete_test_run(&self, run_id: &str) -> ApiResult<()>;
    async fn get_test_run(&self, run_id: &str) -> ApiResult<TestRun>;

    /// Look up an autotest by its stable external id. `Ok(None)` means the
    /// definition does not exist yet.
    async fn get_auto_test_by_external_id(&self, external_id: &str) -> ApiResult<Option<AutoTest>>;
    /// Returns the id of the created autotest.
    async fn create_auto_test(&self, request: CreateAutoTestRequest) -> ApiResult<String>;
    async fn update_auto_test(&self, request: UpdateAutoTestRequest) -> ApiResult<()>;

    async fn link_work_item(&self, auto_test_id: &str, work_item_id: &str) -> ApiResult<()>;
    async fn unlink_work_item(&self, auto_test_id: &str, work_item_id: &str) -> ApiResult<()>;
    async fn get_linked_work_items(&self, auto_test_id: &str)
    -> ApiResult<Vec<WorkItemIdentifier>>;

    /// Returns the TMS-side result ids, one per submitted model.
    async fn submit_results(
        &self,
        run_id: &str,
        results: Vec<TestRunResultRequest>,
    ) -> ApiResult<Vec<String>>;
    async fn get_test_result(&self, result_id: &str) -> ApiResult<TestResultResponse>;
    async fn update_test_result(
        &self,
        result_id: &str,
        request: TestResultUpdateRequest,
    ) -> ApiResult<()>;

    /// Uploads the file at `path` and returns the attachment id.
    async fn upload_attachment(&self, path: &str) -> ApiResult<String>;

    /// External ids of the autotests scheduled for `run_id` under the given
    /// configuration. Used by hosts running in filter mode.
    async fn get_tests_from_run(
        &self,
        run_id: &str,
        configuration_id: &str,
    ) -> ApiResult<Vec<String>>;
}
