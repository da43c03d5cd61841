//! Integration tests for the record-on-first-run lifecycle

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use wirecord::context::{META_TEST_CLASS, META_TEST_METHOD, META_TEST_NAME};
use wirecord::engine::{EngineConfig, HttpMockEngine, MockEngine};
use wirecord::mapping::{MappingRecord, RequestPattern, ResponseDefinition};
use wirecord::network::HttpClient;
use wirecord::recording::RecordingState;
use wirecord::{Notifier, RecordingConfig, RecordingExtension, TestContext};

const EXAMPLE_MAPPING_JSON: &str = r#"{
    "id":"5fded1bd-bfe3-4e43-9354-85fe0e794c78",
    "name":"",
    "request":{ "url":"/", "method":"GET" },
    "response":{ "status":200, "body":"<!doctype html><html><body>Upstream</body></html>" },
    "uuid":"5fded1bd-bfe3-4e43-9354-85fe0e794c78",
    "persistent":true,
    "metadata":{
        "test-class":"integration_test",
        "test-method":"recording_creates_file",
        "test-name":"a test"
    },
    "insertionIndex":1
}"#;

/// Stand-in for the real upstream service
struct Upstream {
    _dir: TempDir,
    engine: HttpMockEngine,
}

impl Upstream {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let engine = HttpMockEngine::start(EngineConfig::new(dir.path()))
            .await
            .unwrap();
        let mut response =
            ResponseDefinition::with_body(200, "<!doctype html><html><body>Upstream</body></html>");
        response
            .headers
            .insert("Content-Type".to_string(), "text/html".to_string());
        engine
            .add_stub_mapping(MappingRecord::new(RequestPattern::new("GET", "/"), response))
            .unwrap();

        Self { _dir: dir, engine }
    }

    fn url(&self) -> String {
        self.engine.base_url()
    }
}

#[derive(Default)]
struct CountingNotifier {
    info: AtomicUsize,
    error: AtomicUsize,
}

impl Notifier for CountingNotifier {
    fn info(&self, _message: &str) {
        self.info.fetch_add(1, Ordering::SeqCst);
    }

    fn error(&self, _message: &str) {
        self.error.fetch_add(1, Ordering::SeqCst);
    }
}

fn temp_root_with_mappings() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("mappings")).unwrap();
    dir
}

fn file_names_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn assert_single_file_starting_with(dir: &Path, prefix: &str) -> String {
    let names = file_names_in(dir);
    assert_eq!(names.len(), 1, "expected one file, found {names:?}");
    assert!(names[0].starts_with(prefix), "unexpected file {}", names[0]);
    names[0].clone()
}

async fn get(base_url: &str) -> wirecord::network::ForwardedResponse {
    HttpClient::new().get(&format!("{base_url}/")).await.unwrap()
}

#[tokio::test]
async fn test_recording_creates_file() {
    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    let context = TestContext::for_test("integration_test", "recording_creates_file", "a test");

    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url(upstream.url())
            .build()
            .unwrap(),
    );

    extension.before_all().await.unwrap();
    assert!(extension.server().unwrap().is_running());

    extension.before_each(&context).await.unwrap();
    assert!(matches!(extension.state(), RecordingState::Recording { .. }));
    assert!(file_names_in(&mappings).is_empty());

    let response = get(&extension.server().unwrap().base_url()).await;
    assert!(response.is_success());
    assert!(response.text().contains("Upstream"));

    let report = extension.after_each(&context).await.unwrap().unwrap();
    assert_eq!(report.moved(), 1);

    let file = assert_single_file_starting_with(&mappings, "recording_creates_file-");
    let stored: MappingRecord =
        serde_json::from_str(&std::fs::read_to_string(mappings.join(&file)).unwrap()).unwrap();
    assert!(stored.persistent);
    assert_eq!(stored.request.url.as_deref(), Some("/"));
    assert_eq!(stored.metadata_value(META_TEST_CLASS), Some("integration_test"));
    assert_eq!(stored.metadata_value(META_TEST_METHOD), Some("recording_creates_file"));
    assert_eq!(stored.metadata_value(META_TEST_NAME), Some("a test"));
    assert!(stored.response.body.as_deref().unwrap().contains("Upstream"));
    assert_eq!(file, format!("recording_creates_file-{}.json", stored.id));

    extension.after_all().await;
    assert!(!extension.server().unwrap().is_running());
    upstream.engine.stop().await;
}

#[tokio::test]
async fn test_recording_doesnt_overwrite_file() {
    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    std::fs::write(
        mappings.join("recording_doesnt_overwrite_file-1234.json"),
        EXAMPLE_MAPPING_JSON,
    )
    .unwrap();
    let context =
        TestContext::for_test("integration_test", "recording_doesnt_overwrite_file", "a test");

    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url(upstream.url())
            .build()
            .unwrap(),
    );

    extension.before_all().await.unwrap();
    extension.before_each(&context).await.unwrap();
    assert_eq!(extension.state(), &RecordingState::Idle);
    assert_single_file_starting_with(&mappings, "recording_doesnt_overwrite_file");

    // served from the existing mapping, not the upstream
    let response = get(&extension.server().unwrap().base_url()).await;
    assert!(response.is_success());

    assert!(extension.after_each(&context).await.unwrap().is_none());
    assert_single_file_starting_with(&mappings, "recording_doesnt_overwrite_file");

    extension.after_all().await;
    assert!(!extension.server().unwrap().is_running());
    upstream.engine.stop().await;
}

#[tokio::test]
async fn test_recording_doesnt_fail_if_dir_invalid() {
    let upstream = Upstream::start().await;
    let temp_dir = TempDir::new().unwrap();
    let context = TestContext::for_test("integration_test", "recording_creates_file", "a test");

    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(temp_dir.path().join("non-existing"))
            .target_url(upstream.url())
            .build()
            .unwrap(),
    );

    extension.before_all().await.unwrap();
    assert!(extension.server().unwrap().is_running());

    extension.before_each(&context).await.unwrap();
    assert_eq!(extension.state(), &RecordingState::Idle);
    assert!(file_names_in(temp_dir.path()).is_empty());

    let response = get(&extension.server().unwrap().base_url()).await;
    assert!(response.is_client_error());

    assert!(extension.after_each(&context).await.unwrap().is_none());
    assert!(file_names_in(temp_dir.path()).is_empty());

    extension.after_all().await;
    assert!(!extension.server().unwrap().is_running());
    upstream.engine.stop().await;
}

#[tokio::test]
async fn test_recording_skipped_by_settings() {
    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    let context = TestContext::for_test("integration_test", "recording_creates_file", "a test");

    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url(upstream.url())
            .skip_recording_for(["recording_creates_file"])
            .build()
            .unwrap(),
    );

    extension.before_all().await.unwrap();
    extension.before_each(&context).await.unwrap();
    assert!(file_names_in(&mappings).is_empty());

    let response = get(&extension.server().unwrap().base_url()).await;
    assert!(!response.is_success());

    assert!(extension.after_each(&context).await.unwrap().is_none());
    assert!(file_names_in(&mappings).is_empty());

    extension.after_all().await;
    assert!(!extension.server().unwrap().is_running());
    upstream.engine.stop().await;
}

#[tokio::test]
async fn test_custom_notifier() {
    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    let context = TestContext::for_test("integration_test", "recording_creates_file", "a test");
    let notifier = Arc::new(CountingNotifier::default());

    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url(upstream.url())
            .notifier(notifier.clone())
            .build()
            .unwrap(),
    );

    extension.before_all().await.unwrap();
    extension.before_each(&context).await.unwrap();
    assert!(file_names_in(&mappings).is_empty());

    let response = get(&extension.server().unwrap().base_url()).await;
    assert!(response.is_success());

    extension.after_each(&context).await.unwrap();
    assert_single_file_starting_with(&mappings, "recording_creates_file");

    extension.after_all().await;
    assert!(!extension.server().unwrap().is_running());

    assert_eq!(notifier.info.load(Ordering::SeqCst), 2);
    assert_eq!(notifier.error.load(Ordering::SeqCst), 0);
    upstream.engine.stop().await;
}

#[tokio::test]
async fn test_extension_handles_mock_server_death() {
    let root = TempDir::new().unwrap();
    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url("http://127.0.0.1:1")
            .build()
            .unwrap(),
    );

    extension.after_all().await;
    extension.before_all().await.unwrap();
    assert!(extension.server().is_some());

    extension.server().unwrap().stop().await;
    extension.after_all().await;
    extension.after_all().await;
    assert!(!extension.server().unwrap().is_running());
}

#[tokio::test]
async fn test_second_run_replays_without_upstream() {
    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    let context = TestContext::for_test("integration_test", "replays_later", "replays later");
    let config = RecordingConfig::builder()
        .recording_location(root.path())
        .target_url(upstream.url())
        .build()
        .unwrap();

    // first run records
    let mut first: RecordingExtension = RecordingExtension::new(config.clone());
    first.before_all().await.unwrap();
    first.before_each(&context).await.unwrap();
    assert!(get(&first.server().unwrap().base_url()).await.is_success());
    first.after_each(&context).await.unwrap();
    first.after_all().await;
    upstream.engine.stop().await;

    // second run has no upstream and must not add files
    let mut second: RecordingExtension = RecordingExtension::new(config);
    second.before_all().await.unwrap();
    second.before_each(&context).await.unwrap();
    assert_eq!(second.state(), &RecordingState::Idle);

    let response = get(&second.server().unwrap().base_url()).await;
    assert!(response.is_success());
    assert!(response.text().contains("Upstream"));

    second.after_each(&context).await.unwrap();
    assert_single_file_starting_with(&mappings, "replays_later-");
    second.after_all().await;
}

#[tokio::test]
async fn test_deleted_recording_is_recorded_again() {
    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    let context = TestContext::for_test("integration_test", "rerecords", "rerecords");

    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url(upstream.url())
            .build()
            .unwrap(),
    );
    extension.before_all().await.unwrap();
    let base_url = extension.server().unwrap().base_url();

    extension.before_each(&context).await.unwrap();
    get(&base_url).await;
    extension.after_each(&context).await.unwrap();
    let first = assert_single_file_starting_with(&mappings, "rerecords-");

    std::fs::remove_file(mappings.join(&first)).unwrap();

    extension.before_each(&context).await.unwrap();
    assert!(matches!(extension.state(), RecordingState::Recording { .. }));
    get(&base_url).await;
    extension.after_each(&context).await.unwrap();
    assert_single_file_starting_with(&mappings, "rerecords-");
    assert_eq!(extension.reports().len(), 2);

    extension.after_all().await;
    upstream.engine.stop().await;
}

#[tokio::test]
async fn test_recorded_case_without_traffic_writes_nothing() {
    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    let context = TestContext::for_test("integration_test", "quiet", "quiet");

    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url(upstream.url())
            .build()
            .unwrap(),
    );
    extension.before_all().await.unwrap();
    extension.before_each(&context).await.unwrap();

    let report = extension.after_each(&context).await.unwrap().unwrap();
    assert!(report.is_empty());
    assert!(file_names_in(&mappings).is_empty());

    extension.after_all().await;
    upstream.engine.stop().await;
}

#[tokio::test]
async fn test_long_url_path_is_recorded_once() {
    let upstream = Upstream::start().await;
    let long_path = format!("/{}", "resource/".repeat(26));
    upstream
        .engine
        .add_stub_mapping(MappingRecord::new(
            RequestPattern::new("GET", long_path.as_str()),
            ResponseDefinition::with_body(200, "deep"),
        ))
        .unwrap();

    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    let context = TestContext::for_test("integration_test", "fetches_long_resource", "long path");
    let config = RecordingConfig::builder()
        .recording_location(root.path())
        .target_url(upstream.url())
        .build()
        .unwrap();

    for run in 0..2 {
        let mut extension: RecordingExtension = RecordingExtension::new(config.clone());
        extension.before_all().await.unwrap();
        extension.before_each(&context).await.unwrap();
        assert_eq!(
            extension.state() == &RecordingState::Idle,
            run == 1,
            "run {run} state {:?}",
            extension.state()
        );

        let url = format!("{}{long_path}", extension.server().unwrap().base_url());
        let response = HttpClient::new().get(&url).await.unwrap();
        assert_eq!(response.text(), "deep");

        if let Some(report) = extension.after_each(&context).await.unwrap() {
            assert_eq!(report.failures().count(), 0, "{report:?}");
        }
        extension.after_all().await;

        let file = assert_single_file_starting_with(&mappings, "fetches_long_resource-");
        assert!(file.len() <= 255);
    }

    upstream.engine.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_unwritable_mappings_dir_fails_closed() {
    use std::os::unix::fs::PermissionsExt;

    let upstream = Upstream::start().await;
    let root = temp_root_with_mappings();
    let mappings = root.path().join("mappings");
    std::fs::set_permissions(&mappings, std::fs::Permissions::from_mode(0o555)).unwrap();
    if std::fs::write(mappings.join("writable"), "").is_ok() {
        // permissions are not enforced for this user
        std::fs::remove_file(mappings.join("writable")).unwrap();
        return;
    }

    let context = TestContext::for_test("integration_test", "read_only_store", "read only");
    let notifier = Arc::new(CountingNotifier::default());
    let mut extension: RecordingExtension = RecordingExtension::new(
        RecordingConfig::builder()
            .recording_location(root.path())
            .target_url(upstream.url())
            .notifier(notifier.clone())
            .build()
            .unwrap(),
    );

    extension.before_all().await.unwrap();
    extension.before_each(&context).await.unwrap();
    assert!(get(&extension.server().unwrap().base_url()).await.is_success());

    let report = extension.after_each(&context).await.unwrap().unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.moved(), 0);
    assert_eq!(report.failures().count(), 1);
    assert!(file_names_in(&mappings).is_empty());
    assert!(notifier.error.load(Ordering::SeqCst) >= 1);
    assert_eq!(extension.state(), &RecordingState::Idle);

    extension.after_all().await;
    std::fs::set_permissions(&mappings, std::fs::Permissions::from_mode(0o755)).unwrap();
    upstream.engine.stop().await;
}
