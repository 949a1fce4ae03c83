mod support;

use tms_adapter::config::AdapterConfig;
use tms_adapter::context::ExecutionContext;
use tms_adapter::entities::{
    ClassContainer, FixtureResult, ItemStatus, RunContainer, TestResult, external_id,
};
use tms_adapter::manager::AdapterManager;
use tms_client::models::{AutoTest, AutoTestStep, Outcome, WorkItemIdentifier};

use support::{Call, FakeClient, client_config, manager, manager_with, sample_test};

fn remote_auto_test(external_id: &str) -> AutoTest {
    AutoTest {
        id: "auto-1".to_string(),
        project_id: "p1".to_string(),
        external_id: external_id.to_string(),
        name: "testLinks".to_string(),
        last_test_result_outcome: Some(Outcome::Passed),
        ..AutoTest::default()
    }
}

async fn run_single_test(manager: &AdapterManager, test: TestResult) {
    let uuid = test.uuid.clone();
    manager.create_test_run_if_needed().await;
    manager.start_main_container(RunContainer {
        uuid: "rc".to_string(),
        ..RunContainer::default()
    });
    manager.start_class_container(
        "rc",
        ClassContainer {
            uuid: "cc".to_string(),
            name: Some("SampleClass".to_string()),
            ..ClassContainer::default()
        },
    );
    manager.schedule_test_case("cc", test);
    let mut context = ExecutionContext::new();
    manager.start_test_case(&mut context, &uuid);
    manager.stop_test_case(&mut context, &uuid).await;
}

#[tokio::test(flavor = "current_thread")]
async fn already_linked_work_items_are_not_relinked() {
    let client = FakeClient::new();
    let eid = external_id("SampleClass.testLinks");
    client.preload_auto_test(remote_auto_test(&eid));
    client.preload_linked(
        "auto-1",
        vec![WorkItemIdentifier {
            id: "wi-1".to_string(),
            global_id: None,
        }],
    );
    let manager = manager(client.clone());

    let mut test = sample_test("t1", "SampleClass.testLinks", "testLinks");
    test.status = Some(ItemStatus::Passed);
    test.work_item_ids = vec!["wi-1".to_string(), "wi-2".to_string()];
    run_single_test(&manager, test).await;

    assert_eq!(
        client.count(|call| matches!(call, Call::LinkWorkItem(_, _))),
        1
    );
    assert!(client
        .calls()
        .contains(&Call::LinkWorkItem("auto-1".to_string(), "wi-2".to_string())));
    let linked: Vec<String> = client
        .linked("auto-1")
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(linked, vec!["wi-1", "wi-2"]);
}

#[tokio::test(flavor = "current_thread")]
async fn undeclared_links_are_removed_when_maintenance_is_on() {
    let client = FakeClient::new();
    let eid = external_id("SampleClass.testLinks");
    client.preload_auto_test(remote_auto_test(&eid));
    client.preload_linked(
        "auto-1",
        vec![WorkItemIdentifier {
            id: "wi-9".to_string(),
            global_id: None,
        }],
    );
    let manager = manager_with(client.clone(), AdapterConfig::default(), client_config(), true);

    let mut test = sample_test("t1", "SampleClass.testLinks", "testLinks");
    test.status = Some(ItemStatus::Passed);
    test.work_item_ids = vec!["wi-1".to_string()];
    run_single_test(&manager, test).await;

    assert!(client
        .calls()
        .contains(&Call::UnlinkWorkItem("auto-1".to_string(), "wi-9".to_string())));
    let linked: Vec<String> = client
        .linked("auto-1")
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(linked, vec!["wi-1"]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn transient_link_failures_are_retried() {
    let client = FakeClient::new();
    let eid = external_id("SampleClass.testLinks");
    client.preload_auto_test(remote_auto_test(&eid));
    client.fail_links(3);
    let manager = manager(client.clone());

    let mut test = sample_test("t1", "SampleClass.testLinks", "testLinks");
    test.status = Some(ItemStatus::Passed);
    test.work_item_ids = vec!["wi-1".to_string()];
    run_single_test(&manager, test).await;

    assert_eq!(
        client.count(|call| matches!(call, Call::LinkWorkItem(_, _))),
        4
    );
    assert_eq!(client.submitted().len(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn exhausted_link_retries_never_block_the_result() {
    let client = FakeClient::new();
    let eid = external_id("SampleClass.testLinks");
    client.preload_auto_test(remote_auto_test(&eid));
    client.fail_links(usize::MAX);
    let manager = manager(client.clone());

    let mut test = sample_test("t1", "SampleClass.testLinks", "testLinks");
    test.status = Some(ItemStatus::Passed);
    test.work_item_ids = vec!["wi-1".to_string(), "wi-2".to_string()];
    run_single_test(&manager, test).await;

    // 10 tries on the first id, then the second id is skipped.
    assert_eq!(
        client.count(|call| matches!(call, Call::LinkWorkItem(_, _))),
        10
    );
    assert!(!client
        .calls()
        .contains(&Call::LinkWorkItem("auto-1".to_string(), "wi-2".to_string())));
    assert_eq!(client.submitted().len(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn failing_test_keeps_the_known_good_definition_and_turns_flaky() {
    let client = FakeClient::new();
    let eid = external_id("SampleClass.testLinks");
    let mut remote = remote_auto_test(&eid);
    remote.steps = vec![AutoTestStep {
        title: "golden step".to_string(),
        ..AutoTestStep::default()
    }];
    client.preload_auto_test(remote);
    let manager = manager(client.clone());

    let mut test = sample_test("t1", "SampleClass.testLinks", "testLinks");
    test.status = Some(ItemStatus::Failed);
    run_single_test(&manager, test).await;

    let updates = client.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].steps.len(), 1);
    assert_eq!(updates[0].steps[0].title, "golden step");
    assert!(updates[0].is_flaky);
    assert_eq!(client.submitted()[0].outcome, Outcome::Failed);
}

#[tokio::test(flavor = "current_thread")]
async fn container_fixtures_patch_the_submitted_result() {
    let client = FakeClient::new();
    let manager = manager(client.clone());
    manager.create_test_run_if_needed().await;

    manager.start_main_container(RunContainer {
        uuid: "rc".to_string(),
        ..RunContainer::default()
    });
    manager.start_class_container(
        "rc",
        ClassContainer {
            uuid: "cc".to_string(),
            name: Some("SampleClass".to_string()),
            ..ClassContainer::default()
        },
    );

    let mut context = ExecutionContext::new();

    manager.start_prepare_fixture_all(
        &mut context,
        "rc",
        "fa",
        FixtureResult {
            name: Some("global setup".to_string()),
            status: Some(ItemStatus::Passed),
            ..FixtureResult::default()
        },
    );
    manager.stop_fixture(&mut context, "fa").await;

    manager.start_prepare_fixture(
        &mut context,
        "cc",
        "f0",
        FixtureResult {
            name: Some("class setup".to_string()),
            status: Some(ItemStatus::Passed),
            ..FixtureResult::default()
        },
    );
    manager.stop_fixture(&mut context, "f0").await;

    manager.start_prepare_fixture_each_test(
        &mut context,
        "cc",
        "f1",
        FixtureResult {
            name: Some("each setup".to_string()),
            status: Some(ItemStatus::Passed),
            ..FixtureResult::default()
        },
    );
    manager.stop_fixture(&mut context, "f1").await;

    let mut test = sample_test("t1", "SampleClass.testFixtures", "testFixtures");
    test.status = Some(ItemStatus::Passed);
    manager.schedule_test_case("cc", test);
    manager.start_test_case(&mut context, "t1");
    manager.stop_test_case(&mut context, "t1").await;

    manager.stop_class_container("cc").await;
    manager.stop_main_container("rc").await;

    // Class sync pushes the class-scoped setup into the definition.
    let class_update = client
        .updates()
        .into_iter()
        .find(|update| update.setup.len() == 2)
        .expect("class sync should update the definition");
    let titles: Vec<&str> = class_update
        .setup
        .iter()
        .map(|step| step.title.as_str())
        .collect();
    assert_eq!(titles, vec!["class setup", "each setup"]);

    // Run sync patches the stored result with every scoped fixture outcome.
    let result_updates = client.result_updates();
    assert_eq!(result_updates.len(), 1);
    let (result_id, patch) = &result_updates[0];
    assert_eq!(result_id.as_str(), "result-1");
    let setup_titles: Vec<String> = patch
        .setup_results
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|step| step.title.clone())
        .collect();
    assert_eq!(setup_titles, vec!["global setup", "class setup", "each setup"]);
    assert_eq!(patch.outcome, Some(Outcome::Passed));
    assert!(client
        .calls()
        .contains(&Call::GetTestResult("result-1".to_string())));
}
