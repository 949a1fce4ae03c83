use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::api::{ApiError, ApiResult, TmsClient};
use crate::models::{
    AutoTest, CreateAutoTestRequest, TestResultResponse, TestResultUpdateRequest, TestRun,
    TestRunResultRequest, UpdateAutoTestRequest, WorkItemIdentifier,
};

const AUTH_PREFIX: &str = "PrivateToken";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct HttpClientOptions {
    pub base_url: String,
    pub private_token: String,
    pub project_id: String,
    pub cert_validation: bool,
    pub timeout: Duration,
}

impl HttpClientOptions {
    pub fn new(
        base_url: impl Into<String>,
        private_token: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            private_token: private_token.into(),
            project_id: project_id.into(),
            cert_validation: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Production [`TmsClient`] over the TMS v2 REST API.
pub struct HttpTmsClient {
    base: String,
    project_id: String,
    http: reqwest::Client,
}

impl HttpTmsClient {
    pub fn new(options: HttpClientOptions) -> ApiResult<Self> {
        let base = options.base_url.trim_end_matches('/').to_string();
        if base.is_empty() || base.eq_ignore_ascii_case("null") {
            return Err(ApiError::InvalidConfiguration(
                "TMS base URL is missing".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("{AUTH_PREFIX} {}", options.private_token);
        let mut auth_value = HeaderValue::from_str(&auth)
            .map_err(|_| ApiError::InvalidConfiguration("private token is not ASCII".to_string()))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.cert_validation)
            .build()?;

        Ok(Self {
            base,
            project_id: options.project_id,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn check(
        operation: &'static str,
        response: reqwest::Response,
    ) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(operation, status = status.as_u16(), %body, "TMS call failed");
        Err(ApiError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestRunWithResults {
    #[serde(default)]
    test_results: Vec<ShortTestResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortTestResult {
    #[serde(default)]
    configuration_id: Option<String>,
    #[serde(default)]
    auto_test: Option<ShortAutoTest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortAutoTest {
    #[serde(default)]
    external_id: Option<String>,
}

#[async_trait::async_trait]
impl TmsClient for HttpTmsClient {
    async fn create_test_run(&self, name: Option<&str>) -> ApiResult<TestRun> {
        debug!(project_id = %self.project_id, "creating test run");
        let mut body = json!({ "projectId": self.project_id });
        if let Some(name) = name {
            body["name"] = json!(name);
        }
        let response = self
            .http
            .post(self.url("/api/v2/testRuns"))
            .json(&body)
            .send()
            .await?;
        let run: TestRun = Self::check("create_test_run", response).await?.json().await?;
        debug!(run_id = %run.id, "created test run");
        Ok(run)
    }

    async fn start_test_run(&self, run_id: &str) -> ApiResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/v2/testRuns/{run_id}/start")))
            .send()
            .await?;
        Self::check("start_test_run", response).await?;
        Ok(())
    }

    async fn complete_test_run(&self, run_id: &str) -> ApiResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/v2/testRuns/{run_id}/complete")))
            .send()
            .await?;
        Self::check("complete_test_run", response).await?;
        Ok(())
    }

    async fn get_test_run(&self, run_id: &str) -> ApiResult<TestRun> {
        let response = self
            .http
            .get(self.url(&format!("/api/v2/testRuns/{run_id}")))
            .send()
            .await?;
        Ok(Self::check("get_test_run", response).await?.json().await?)
    }

    async fn get_auto_test_by_external_id(&self, external_id: &str) -> ApiResult<Option<AutoTest>> {
        let body = json!({
            "filter": {
                "projectIds": [self.project_id],
                "externalIds": [external_id],
                "isDeleted": false,
            },
            "includes": {
                "includeSteps": true,
                "includeLinks": true,
                "includeLabels": true,
            },
        });
        let response = self
            .http
            .post(self.url("/api/v2/autoTests/search"))
            .json(&body)
            .send()
            .await?;
        let mut found: Vec<AutoTest> = Self::check("search_auto_tests", response)
            .await?
            .json()
            .await?;
        debug!(external_id, matches = found.len(), "searched autotests");
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    async fn create_auto_test(&self, request: CreateAutoTestRequest) -> ApiResult<String> {
        debug!(external_id = %request.external_id, "creating autotest");
        let response = self
            .http
            .post(self.url("/api/v2/autoTests"))
            .json(&request)
            .send()
            .await?;
        let created: AutoTest = Self::check("create_auto_test", response).await?.json().await?;
        Ok(created.id)
    }

    async fn update_auto_test(&self, request: UpdateAutoTestRequest) -> ApiResult<()> {
        debug!(external_id = %request.external_id, "updating autotest");
        let response = self
            .http
            .put(self.url("/api/v2/autoTests"))
            .json(&request)
            .send()
            .await?;
        Self::check("update_auto_test", response).await?;
        Ok(())
    }

    async fn link_work_item(&self, auto_test_id: &str, work_item_id: &str) -> ApiResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/v2/autoTests/{auto_test_id}/workItems")))
            .json(&json!({ "id": work_item_id }))
            .send()
            .await?;
        Self::check("link_work_item", response).await?;
        Ok(())
    }

    async fn unlink_work_item(&self, auto_test_id: &str, work_item_id: &str) -> ApiResult<()> {
        let response = self
            .http
            .delete(self.url(&format!(
                "/api/v2/autoTests/{auto_test_id}/workItems/{work_item_id}"
            )))
            .send()
            .await?;
        Self::check("unlink_work_item", response).await?;
        Ok(())
    }

    async fn get_linked_work_items(
        &self,
        auto_test_id: &str,
    ) -> ApiResult<Vec<WorkItemIdentifier>> {
        let response = self
            .http
            .get(self.url(&format!("/api/v2/autoTests/{auto_test_id}/workItems")))
            .query(&[("isDeleted", "false"), ("isWorkItemDeleted", "false")])
            .send()
            .await?;
        Ok(Self::check("get_linked_work_items", response)
            .await?
            .json()
            .await?)
    }

    async fn submit_results(
        &self,
        run_id: &str,
        results: Vec<TestRunResultRequest>,
    ) -> ApiResult<Vec<String>> {
        debug!(run_id, count = results.len(), "submitting results");
        let response = self
            .http
            .post(self.url(&format!("/api/v2/testRuns/{run_id}/testResults")))
            .json(&results)
            .send()
            .await?;
        Ok(Self::check("submit_results", response).await?.json().await?)
    }

    async fn get_test_result(&self, result_id: &str) -> ApiResult<TestResultResponse> {
        let response = self
            .http
            .get(self.url(&format!("/api/v2/testResults/{result_id}")))
            .send()
            .await?;
        Ok(Self::check("get_test_result", response).await?.json().await?)
    }

    async fn update_test_result(
        &self,
        result_id: &str,
        request: TestResultUpdateRequest,
    ) -> ApiResult<()> {
        let response = self
            .http
            .put(self.url(&format!("/api/v2/testResults/{result_id}")))
            .json(&request)
            .send()
            .await?;
        Self::check("update_test_result", response).await?;
        Ok(())
    }

    async fn upload_attachment(&self, path: &str) -> ApiResult<String> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Attachment {
            path: path.to_string(),
            source,
        })?;
        let file_name = std::path::Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/api/v2/attachments"))
            .multipart(form)
            .send()
            .await?;
        let uploaded: crate::models::AttachmentRef = Self::check("upload_attachment", response)
            .await?
            .json()
            .await?;
        debug!(path, id = %uploaded.id, "uploaded attachment");
        Ok(uploaded.id)
    }

    async fn get_tests_from_run(
        &self,
        run_id: &str,
        configuration_id: &str,
    ) -> ApiResult<Vec<String>> {
        let response = self
            .http
            .get(self.url(&format!("/api/v2/testRuns/{run_id}")))
            .send()
            .await?;
        let run: TestRunWithResults = Self::check("get_tests_from_run", response)
            .await?
            .json()
            .await?;
        Ok(run
            .test_results
            .into_iter()
            .filter(|result| result.configuration_id.as_deref() == Some(configuration_id))
            .filter_map(|result| result.auto_test.and_then(|auto_test| auto_test.external_id))
            .collect())
    }
}
