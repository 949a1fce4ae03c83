//! Synchronizes finished entities to the TMS.
//!
//! Tests are submitted as soon as they finish; class and run containers
//! arrive later and patch the already submitted results with the
//! container-scoped fixture outcomes (the two-phase flow).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, warn};

use tms_client::TmsClient;
use tms_client::models::AutoTest;

use crate::convert;
use crate::entities::{ClassContainer, FixtureResult, ItemStatus, RunContainer, TestResult};
use crate::store::EntityStore;

const MAX_TRIES: usize = 10;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Remote-sync seam between the lifecycle manager and the TMS client.
#[async_trait::async_trait]
pub trait Writer: Send + Sync {
    /// Records the resolved run id. Called exactly once, before any write.
    fn set_test_run_id(&self, run_id: String);

    /// Patches every result in the run with run-scoped fixture data.
    async fn write_run(&self, container: RunContainer);

    /// Pushes class-scoped fixture definitions for every test in the class.
    async fn write_class(&self, container: ClassContainer);

    /// Ensures the autotest definition, reconciles work-item links, uploads
    /// the test's attachments, and submits the result.
    async fn write_test(&self, test: TestResult);

    /// Uploads one file; `None` means the upload failed and was logged.
    async fn write_attachment(&self, path: &str) -> Option<String>;
}

#[derive(Default)]
struct WriterState {
    run_id: Option<String>,
    /// external id -> TMS result id, recorded at submission so containers
    /// can patch the result later.
    result_ids: HashMap<String, String>,
}

pub struct HttpWriter {
    client: Arc<dyn TmsClient>,
    storage: EntityStore,
    project_id: String,
    configuration_id: String,
    automatic_link_updates: bool,
    state: Mutex<WriterState>,
}

impl HttpWriter {
    pub fn new(
        client: Arc<dyn TmsClient>,
        storage: EntityStore,
        project_id: impl Into<String>,
        configuration_id: impl Into<String>,
        automatic_link_updates: bool,
    ) -> Self {
        Self {
            client,
            storage,
            project_id: project_id.into(),
            configuration_id: configuration_id.into(),
            automatic_link_updates,
            state: Mutex::new(WriterState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, WriterState> {
        self.state.lock().expect("writer state mutex poisoned")
    }

    fn run_id(&self) -> Option<String> {
        self.state().run_id.clone()
    }

    fn result_id_for(&self, external_id: &str) -> Option<String> {
        self.state().result_ids.get(external_id).cloned()
    }

    /// Ensures the remote definition matches the finished test and returns
    /// the autotest id. `None` aborts this test's submission; the cause has
    /// been logged.
    async fn sync_definition(&self, test: &TestResult) -> Option<String> {
        let remote = match self
            .client
            .get_auto_test_by_external_id(&test.external_id)
            .await
        {
            Ok(remote) => remote,
            Err(error) => {
                error!(external_id = %test.external_id, %error, "autotest lookup failed");
                return None;
            }
        };

        match remote {
            Some(remote) => {
                let is_flaky = convert::escalated_flakiness(&remote, test.status);
                // A failing run must not overwrite the last known-good step
                // definitions; only links and flakiness are refreshed.
                let request = if test.status == Some(ItemStatus::Failed) {
                    convert::update_request_from_remote(
                        &remote,
                        convert::link_models(&test.link_items),
                        is_flaky,
                    )
                } else {
                    convert::update_request_from_test(
                        test,
                        &self.project_id,
                        Some(remote.id.clone()),
                        is_flaky,
                    )
                };
                // A failed update still leaves a usable definition behind;
                // reporting continues against the possibly stale remote id.
                if let Err(error) = self.client.update_auto_test(request).await {
                    error!(external_id = %test.external_id, %error, "autotest update failed");
                }
                Some(remote.id)
            }
            None => {
                let request = convert::create_request(test, &self.project_id)?;
                match self.client.create_auto_test(request).await {
                    Ok(id) => Some(id),
                    Err(error) => {
                        error!(external_id = %test.external_id, %error, "autotest creation failed");
                        None
                    }
                }
            }
        }
    }

    /// Brings the remote work-item links in line with the ones the test
    /// declares. Failures are logged; the result submission proceeds either
    /// way so the verdict is never lost to a link hiccup.
    async fn sync_work_items(&self, auto_test_id: &str, test: &TestResult) {
        if test.work_item_ids.is_empty() && !self.automatic_link_updates {
            return;
        }

        let linked = match self.client.get_linked_work_items(auto_test_id).await {
            Ok(linked) => linked,
            Err(error) => {
                error!(auto_test_id, %error, "cannot list linked work items");
                return;
            }
        };

        let is_linked = |work_item_id: &str| {
            linked.iter().any(|item| {
                item.id == work_item_id
                    || item
                        .global_id
                        .is_some_and(|global| global.to_string() == work_item_id)
            })
        };
        let declared = |item_id: &str, global_id: Option<i64>| {
            test.work_item_ids.iter().any(|declared| {
                declared == item_id
                    || global_id.is_some_and(|global| global.to_string() == *declared)
            })
        };

        if self.automatic_link_updates {
            for item in &linked {
                if declared(&item.id, item.global_id) {
                    continue;
                }
                let outcome = with_retry("unlink work item", || {
                    self.client.unlink_work_item(auto_test_id, &item.id)
                })
                .await;
                if let Err(error) = outcome {
                    error!(auto_test_id, work_item_id = %item.id, %error, "unlinking work item failed");
                }
            }
        }

        for work_item_id in &test.work_item_ids {
            if is_linked(work_item_id) {
                continue;
            }
            let outcome = with_retry("link work item", || {
                self.client.link_work_item(auto_test_id, work_item_id)
            })
            .await;
            if let Err(error) = outcome {
                error!(auto_test_id, %work_item_id, %error, "linking work item failed; remaining links skipped");
                return;
            }
        }
    }

    async fn remote_for(&self, external_id: &str) -> Option<AutoTest> {
        match self.client.get_auto_test_by_external_id(external_id).await {
            Ok(Some(remote)) => Some(remote),
            Ok(None) => {
                warn!(external_id, "autotest vanished before container sync");
                None
            }
            Err(error) => {
                error!(external_id, %error, "autotest lookup failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Writer for HttpWriter {
    fn set_test_run_id(&self, run_id: String) {
        self.state().run_id = Some(run_id);
    }

    async fn write_test(&self, mut test: TestResult) {
        let Some(auto_test_id) = self.sync_definition(&test).await else {
            return;
        };
        self.sync_work_items(&auto_test_id, &test).await;

        // Local paths become remote attachment ids; a failed upload drops
        // only that file.
        if !test.attachments.is_empty() {
            let mut uploaded = Vec::new();
            for path in &test.attachments {
                if let Some(id) = self.write_attachment(path).await {
                    uploaded.push(id);
                }
            }
            self.storage.append_attachments(&test.uuid, uploaded);
            let ids = self.storage.attachments_list(&test.uuid);
            test.attachments = ids.clone();
            if let Err(error) = self.storage.update_test(&test.uuid, |stored| {
                stored.attachments = ids;
            }) {
                warn!(%error, "cannot record attachment ids");
            }
        }

        let Some(run_id) = self.run_id() else {
            warn!(external_id = %test.external_id, "no test run id resolved; dropping result");
            return;
        };
        let Some(request) = convert::run_result_request(&test, &self.configuration_id, None, None)
        else {
            return;
        };
        match self.client.submit_results(&run_id, vec![request]).await {
            Ok(result_ids) => {
                if let Some(result_id) = result_ids.into_iter().next() {
                    self.state()
                        .result_ids
                        .insert(test.external_id.clone(), result_id);
                } else {
                    warn!(external_id = %test.external_id, "TMS returned no result id");
                }
            }
            Err(error) => {
                error!(external_id = %test.external_id, %error, "result submission failed");
            }
        }
    }

    async fn write_class(&self, container: ClassContainer) {
        let setup = [container.before_class.as_slice(), container.before_each.as_slice()].concat();
        let teardown = [container.after_each.as_slice(), container.after_class.as_slice()].concat();

        for child in &container.children {
            let test = match self.storage.test(child) {
                Ok(test) => test,
                Err(error) => {
                    warn!(%error, "skipping class sync for missing test");
                    continue;
                }
            };
            let Some(remote) = self.remote_for(&test.external_id).await else {
                continue;
            };
            let mut request = convert::update_request_from_remote(
                &remote,
                remote.links.clone(),
                remote.is_flaky,
            );
            request.setup = convert::fixture_definition_steps(&setup, child);
            request.teardown = convert::fixture_definition_steps(&teardown, child);
            if let Err(error) = self.client.update_auto_test(request).await {
                error!(external_id = %test.external_id, %error, "class fixture sync failed");
            }
        }
    }

    async fn write_run(&self, container: RunContainer) {
        for class_id in &container.children {
            let class = match self.storage.class(class_id) {
                Ok(class) => class,
                Err(error) => {
                    warn!(%error, "skipping run sync for missing class container");
                    continue;
                }
            };
            let setup: Vec<FixtureResult> = [
                container.before_all.as_slice(),
                class.before_class.as_slice(),
                class.before_each.as_slice(),
            ]
            .concat();
            let teardown: Vec<FixtureResult> = [
                class.after_each.as_slice(),
                class.after_class.as_slice(),
                container.after_all.as_slice(),
            ]
            .concat();

            for child in &class.children {
                let test = match self.storage.test(child) {
                    Ok(test) => test,
                    Err(error) => {
                        warn!(%error, "skipping run sync for missing test");
                        continue;
                    }
                };
                let Some(remote) = self.remote_for(&test.external_id).await else {
                    continue;
                };

                let mut request = convert::update_request_from_remote(
                    &remote,
                    remote.links.clone(),
                    remote.is_flaky,
                );
                let mut setup_steps =
                    convert::fixture_definition_steps(&container.before_all, child);
                setup_steps.extend(remote.setup.clone());
                let mut teardown_steps = remote.teardown.clone();
                teardown_steps
                    .extend(convert::fixture_definition_steps(&container.after_all, child));
                request.setup = setup_steps;
                request.teardown = teardown_steps;
                if let Err(error) = self.client.update_auto_test(request).await {
                    error!(external_id = %test.external_id, %error, "run fixture sync failed");
                    continue;
                }

                let Some(result_id) = self.result_id_for(&test.external_id) else {
                    warn!(external_id = %test.external_id, "no recorded result id; cannot patch fixtures");
                    continue;
                };
                let response = match self.client.get_test_result(&result_id).await {
                    Ok(response) => response,
                    Err(error) => {
                        error!(%result_id, %error, "cannot fetch submitted result");
                        continue;
                    }
                };
                let request = convert::result_update_request(
                    &response,
                    convert::fixture_result_steps(&setup, child),
                    convert::fixture_result_steps(&teardown, child),
                );
                if let Err(error) = self.client.update_test_result(&result_id, request).await {
                    error!(%result_id, %error, "result fixture patch failed");
                }
            }
        }
    }

    async fn write_attachment(&self, path: &str) -> Option<String> {
        match self.client.upload_attachment(path).await {
            Ok(id) => Some(id),
            Err(error) => {
                error!(path, %error, "attachment upload failed");
                None
            }
        }
    }
}

/// Fixed-interval retry for flaky remote calls.
async fn with_retry<T, E, F, Fut>(operation: &'static str, mut call: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < MAX_TRIES => {
                debug!(operation, attempt, %error, "retrying TMS call");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(error) => return Err(error),
        }
    }
}
