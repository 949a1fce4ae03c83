//! Lifecycle entry point driven by the host test runtime.
//!
//! Every operation is a no-op when TMS integration is disabled, tolerates
//! events for unknown entities, and never panics the host: remote failures
//! are logged and degrade only the affected entity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use tms_client::TmsClient;

use crate::config::{AdapterConfig, AdapterMode, ClientConfig};
use crate::context::ExecutionContext;
use crate::entities::{
    ClassContainer, EntityId, FixtureResult, ItemStage, RunContainer, TestResult, now_millis,
};
use crate::store::{Entity, EntityStore, StoreError};
use crate::writer::Writer;

/// CI systems can pin the run id without touching the properties file.
pub const AUTO_RUN_ID_ENV_VAR: &str = "TEST_RUN_AUTO_ID";

/// Which container list a running fixture will fold into when it stops.
#[derive(Clone, Copy, Debug)]
enum FixtureSlot {
    BeforeAll,
    AfterAll,
    BeforeClass,
    AfterClass,
    BeforeEach,
    AfterEach,
}

pub struct AdapterManager {
    client: Arc<dyn TmsClient>,
    writer: Arc<dyn Writer>,
    storage: EntityStore,
    adapter_config: AdapterConfig,
    client_config: Mutex<ClientConfig>,
    /// fixture uuid -> (container uuid, destination slot).
    pending_fixtures: Mutex<HashMap<EntityId, (EntityId, FixtureSlot)>>,
}

impl AdapterManager {
    pub fn new(
        client: Arc<dyn TmsClient>,
        writer: Arc<dyn Writer>,
        storage: EntityStore,
        adapter_config: AdapterConfig,
        client_config: ClientConfig,
    ) -> Self {
        Self {
            client,
            writer,
            storage,
            adapter_config,
            client_config: Mutex::new(client_config),
            pending_fixtures: Mutex::new(HashMap::new()),
        }
    }

    fn enabled(&self) -> bool {
        self.adapter_config.tms_integration
    }

    fn client_config(&self) -> std::sync::MutexGuard<'_, ClientConfig> {
        self.client_config.lock().expect("client config mutex poisoned")
    }

    pub fn storage(&self) -> &EntityStore {
        &self.storage
    }

    /// Resolves the test run to report into: the configured id, then the
    /// `TEST_RUN_AUTO_ID` environment variable, then a freshly created run.
    /// In new-run mode the first two sources are ignored. Failures are
    /// logged; without a run id every later result write is dropped.
    pub async fn create_test_run_if_needed(&self) {
        if !self.enabled() {
            return;
        }

        let (configured, run_name) = {
            let config = self.client_config();
            (config.test_run_id.clone(), config.test_run_name.clone())
        };

        let existing = if self.adapter_config.mode == AdapterMode::NewTestRun {
            None
        } else {
            configured.or_else(|| std::env::var(AUTO_RUN_ID_ENV_VAR).ok().filter(|id| !id.is_empty()))
        };

        let run_id = match existing {
            Some(run_id) => run_id,
            None => {
                let created = match self.client.create_test_run(run_name.as_deref()).await {
                    Ok(run) => run,
                    Err(error) => {
                        error!(%error, "cannot create test run; results will be dropped");
                        return;
                    }
                };
                if let Err(error) = self.client.start_test_run(&created.id).await {
                    warn!(run_id = %created.id, %error, "cannot start test run");
                }
                info!(run_id = %created.id, "created test run");
                created.id
            }
        };

        self.client_config().test_run_id = Some(run_id.clone());
        self.writer.set_test_run_id(run_id);
    }

    /// Completes the run unless the TMS already marked it completed.
    pub async fn complete_test_run_if_needed(&self) {
        if !self.enabled() {
            return;
        }
        let Some(run_id) = self.client_config().test_run_id.clone() else {
            warn!("no test run id resolved; nothing to complete");
            return;
        };
        let completed = match self.client.get_test_run(&run_id).await {
            Ok(run) => run.is_completed(),
            Err(error) => {
                error!(%run_id, %error, "cannot read test run state");
                return;
            }
        };
        if completed {
            return;
        }
        if let Err(error) = self.client.complete_test_run(&run_id).await {
            error!(%run_id, %error, "cannot complete test run");
        }
    }

    /// External ids scheduled for the resolved run under the configured
    /// configuration. Empty when unavailable; hosts in filter mode treat
    /// that as "run everything".
    pub async fn tests_from_run(&self) -> Vec<String> {
        if !self.enabled() {
            return Vec::new();
        }
        let (run_id, configuration_id) = {
            let config = self.client_config();
            (config.test_run_id.clone(), config.configuration_id.clone())
        };
        let (Some(run_id), Some(configuration_id)) = (run_id, configuration_id) else {
            warn!("run id or configuration id missing; cannot read run plan");
            return Vec::new();
        };
        match self
            .client
            .get_tests_from_run(&run_id, &configuration_id)
            .await
        {
            Ok(external_ids) => external_ids,
            Err(error) => {
                error!(%run_id, %error, "cannot read run plan");
                Vec::new()
            }
        }
    }

    pub fn start_main_container(&self, mut container: RunContainer) {
        if !self.enabled() {
            return;
        }
        container.start = Some(now_millis());
        self.storage
            .put(container.uuid.clone(), Entity::Run(container));
    }

    pub async fn stop_main_container(&self, uuid: &str) {
        if !self.enabled() {
            return;
        }
        if let Err(error) = self
            .storage
            .update_run(uuid, |run| run.stop = Some(now_millis()))
        {
            warn!(%error, "cannot stop run container");
            return;
        }
        match self.storage.run(uuid) {
            Ok(run) => self.writer.write_run(run).await,
            Err(error) => warn!(%error, "run container disappeared before write"),
        }
    }

    pub fn start_class_container(&self, parent_uuid: &str, mut container: ClassContainer) {
        if !self.enabled() {
            return;
        }
        container.start = Some(now_millis());
        let uuid = container.uuid.clone();
        self.storage.put(uuid.clone(), Entity::Class(container));
        if let Err(error) = self
            .storage
            .update_run(parent_uuid, |run| run.children.push(uuid))
        {
            warn!(%error, "class container has no run parent");
        }
    }

    pub async fn stop_class_container(&self, uuid: &str) {
        if !self.enabled() {
            return;
        }
        if let Err(error) = self
            .storage
            .update_class(uuid, |class| class.stop = Some(now_millis()))
        {
            warn!(%error, "cannot stop class container");
            return;
        }
        match self.storage.class(uuid) {
            Ok(class) => self.writer.write_class(class).await,
            Err(error) => warn!(%error, "class container disappeared before write"),
        }
    }

    /// Registers a test before execution. Scheduled tests become visible to
    /// their class container immediately so container syncs can find them
    /// even if the test never starts.
    pub fn schedule_test_case(&self, parent_uuid: &str, mut test: TestResult) {
        if !self.enabled() {
            return;
        }
        test.stage = Some(ItemStage::Scheduled);
        test.automatic_creation_test_cases = self.adapter_config.automatic_creation_test_cases;
        let uuid = test.uuid.clone();
        self.storage.put(uuid.clone(), Entity::Test(test));
        if let Err(error) = self
            .storage
            .update_class(parent_uuid, |class| class.children.push(uuid))
        {
            warn!(%error, "test has no class parent");
        }
    }

    pub fn start_test_case(&self, context: &mut ExecutionContext, uuid: &str) {
        if !self.enabled() {
            return;
        }
        context.clear();
        let outcome = self.storage.update_test(uuid, |test| {
            if test.stage != Some(ItemStage::Scheduled) {
                warn!(uuid = %test.uuid, stage = ?test.stage, "starting a test that was not scheduled");
            }
            test.stage = Some(ItemStage::Running);
            test.start = Some(now_millis());
        });
        if let Err(error) = outcome {
            warn!(%error, "cannot start test case");
            return;
        }
        context.start(uuid);
    }

    /// Mutates the test the context is currently executing.
    pub fn update_test_case(
        &self,
        context: &ExecutionContext,
        apply: impl FnOnce(&mut TestResult),
    ) {
        if !self.enabled() {
            return;
        }
        let Some(uuid) = context.root().cloned() else {
            warn!("no test open on this context");
            return;
        };
        self.update_test_case_by_id(&uuid, apply);
    }

    pub fn update_test_case_by_id(&self, uuid: &str, apply: impl FnOnce(&mut TestResult)) {
        if !self.enabled() {
            return;
        }
        if let Err(error) = self.storage.update_test(uuid, apply) {
            warn!(%error, "cannot update test case");
        }
    }

    /// Finishes a test and hands the result to the writer, which uploads its
    /// attachments and submits the verdict.
    pub async fn stop_test_case(&self, context: &mut ExecutionContext, uuid: &str) {
        if !self.enabled() {
            return;
        }
        let outcome = self.storage.update_test(uuid, |test| {
            test.stage = Some(ItemStage::Finished);
            if test.stop.is_none() {
                test.stop = Some(now_millis());
            }
        });
        if let Err(error) = outcome {
            warn!(%error, "cannot stop test case");
            return;
        }

        context.clear();
        match self.storage.test(uuid) {
            Ok(test) => self.writer.write_test(test).await,
            Err(error) => warn!(%error, "test disappeared before write"),
        }
    }

    pub fn start_prepare_fixture_all(
        &self,
        context: &mut ExecutionContext,
        parent_uuid: &str,
        uuid: &str,
        fixture: FixtureResult,
    ) {
        self.start_fixture(context, parent_uuid, FixtureSlot::BeforeAll, uuid, fixture);
    }

    pub fn start_tear_down_fixture_all(
        &self,
        context: &mut ExecutionContext,
        parent_uuid: &str,
        uuid: &str,
        fixture: FixtureResult,
    ) {
        self.start_fixture(context, parent_uuid, FixtureSlot::AfterAll, uuid, fixture);
    }

    pub fn start_prepare_fixture(
        &self,
        context: &mut ExecutionContext,
        parent_uuid: &str,
        uuid: &str,
        fixture: FixtureResult,
    ) {
        self.start_fixture(context, parent_uuid, FixtureSlot::BeforeClass, uuid, fixture);
    }

    pub fn start_tear_down_fixture(
        &self,
        context: &mut ExecutionContext,
        parent_uuid: &str,
        uuid: &str,
        fixture: FixtureResult,
    ) {
        self.start_fixture(context, parent_uuid, FixtureSlot::AfterClass, uuid, fixture);
    }

    pub fn start_prepare_fixture_each_test(
        &self,
        context: &mut ExecutionContext,
        parent_uuid: &str,
        uuid: &str,
        fixture: FixtureResult,
    ) {
        self.start_fixture(context, parent_uuid, FixtureSlot::BeforeEach, uuid, fixture);
    }

    pub fn start_tear_down_fixture_each_test(
        &self,
        context: &mut ExecutionContext,
        parent_uuid: &str,
        uuid: &str,
        fixture: FixtureResult,
    ) {
        self.start_fixture(context, parent_uuid, FixtureSlot::AfterEach, uuid, fixture);
    }

    fn start_fixture(
        &self,
        context: &mut ExecutionContext,
        parent_uuid: &str,
        slot: FixtureSlot,
        uuid: &str,
        mut fixture: FixtureResult,
    ) {
        if !self.enabled() {
            return;
        }
        if !self.storage.contains(parent_uuid) {
            warn!(parent_uuid, "fixture started under unknown container");
            return;
        }
        fixture.stage = Some(ItemStage::Running);
        fixture.start = Some(now_millis());
        self.storage.put(uuid, Entity::Fixture(fixture));
        self.pending_fixtures
            .lock()
            .expect("pending fixtures mutex poisoned")
            .insert(uuid.to_string(), (parent_uuid.to_string(), slot));
        context.clear();
        context.start(uuid);
    }

    pub fn update_fixture(&self, uuid: &str, apply: impl FnOnce(&mut FixtureResult)) {
        if !self.enabled() {
            return;
        }
        if let Err(error) = self.storage.update_fixture(uuid, apply) {
            warn!(%error, "cannot update fixture");
        }
    }

    /// Finishes a fixture and folds it into its container's slot, uploading
    /// its attachments on the way.
    pub async fn stop_fixture(&self, context: &mut ExecutionContext, uuid: &str) {
        if !self.enabled() {
            return;
        }
        let outcome = self.storage.update_fixture(uuid, |fixture| {
            fixture.stage = Some(ItemStage::Finished);
            if fixture.stop.is_none() {
                fixture.stop = Some(now_millis());
            }
        });
        if let Err(error) = outcome {
            warn!(%error, "cannot stop fixture");
            return;
        }

        let mut fixture = match self.storage.fixture(uuid) {
            Ok(fixture) => fixture,
            Err(error) => {
                warn!(%error, "fixture disappeared before fold");
                return;
            }
        };

        let mut uploaded = Vec::new();
        for path in &fixture.attachments {
            if let Some(id) = self.writer.write_attachment(path).await {
                uploaded.push(id);
            }
        }
        fixture.attachments = uploaded;

        let destination = self
            .pending_fixtures
            .lock()
            .expect("pending fixtures mutex poisoned")
            .remove(uuid);
        let Some((parent_uuid, slot)) = destination else {
            warn!(uuid, "fixture has no registered container");
            self.storage.remove(uuid);
            context.clear();
            return;
        };

        let fold = match slot {
            FixtureSlot::BeforeAll => self
                .storage
                .update_run(&parent_uuid, |run| run.before_all.push(fixture)),
            FixtureSlot::AfterAll => self
                .storage
                .update_run(&parent_uuid, |run| run.after_all.push(fixture)),
            FixtureSlot::BeforeClass => self
                .storage
                .update_class(&parent_uuid, |class| class.before_class.push(fixture)),
            FixtureSlot::AfterClass => self
                .storage
                .update_class(&parent_uuid, |class| class.after_class.push(fixture)),
            FixtureSlot::BeforeEach => self
                .storage
                .update_class(&parent_uuid, |class| class.before_each.push(fixture)),
            FixtureSlot::AfterEach => self
                .storage
                .update_class(&parent_uuid, |class| class.after_each.push(fixture)),
        };
        if let Err(error) = fold {
            warn!(%error, "fixture container disappeared before fold");
        }
        self.storage.remove(uuid);
        context.clear();
    }

    /// Records attachment paths against whatever the context currently
    /// executes (a test body or a fixture). Paths become ids at stop time.
    pub fn add_attachments(&self, context: &ExecutionContext, paths: Vec<String>) {
        if !self.enabled() {
            return;
        }
        let Some(uuid) = context.current().cloned() else {
            warn!("no entity open on this context; dropping attachments");
            return;
        };
        let mut paths = Some(paths);
        let attempt = self.storage.update_test(&uuid, |test| {
            if let Some(paths) = paths.take() {
                test.attachments.extend(paths);
            }
        });
        match attempt {
            Ok(()) => {}
            Err(StoreError::WrongKind { .. }) => {
                let outcome = self.storage.update_fixture(&uuid, |fixture| {
                    if let Some(paths) = paths.take() {
                        fixture.attachments.extend(paths);
                    }
                });
                if let Err(error) = outcome {
                    warn!(%error, "cannot attach files");
                }
            }
            Err(error) => warn!(%error, "cannot attach files"),
        }
    }
}
